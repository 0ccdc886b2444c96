//! Per-craft resource handler.
//!
//! [`VesselResourceHandler`] owns every pool of one craft in one storage
//! context plus the queue of recipes submitted during the current timestep.
//! Collaborators call `produce` / `consume` / `add_recipe` in any order; the
//! orchestrating loop then calls [`VesselResourceHandler::run_timestep`]
//! exactly once per tick.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::broker::{BrokerRegistry, well_known};
use crate::crew::CrewMember;
use crate::id::BrokerId;
use crate::pool::{PoolOrigin, PoolSet, ResourcePool, SyncParams};
use crate::recipe::{Recipe, execute_all};
use crate::settings::{SettingsError, SimSettings};
use crate::storage::{
    AdapterKind, CraftStorage, StorageContext, adapter_for, carried_adapter, rescan,
};

// ---------------------------------------------------------------------------
// Timestep input / output
// ---------------------------------------------------------------------------

/// Length and time compression of one simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timestep {
    pub elapsed_s: f64,
    /// Time-compression rate, 1 for real time.
    pub warp_rate: f64,
}

impl Timestep {
    pub fn new(elapsed_s: f64) -> Self {
        Self {
            elapsed_s,
            warp_rate: 1.0,
        }
    }

    pub fn with_warp(mut self, warp_rate: f64) -> Self {
        self.warp_rate = warp_rate;
        self
    }
}

/// Something the messaging collaborator may want to surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceEvent {
    /// External production detected at high time compression on an observed
    /// craft. Raised once until the condition clears.
    CoherencyWarning { resource: String },
    /// The craft's storage context changed and every physical pool switched
    /// adapter.
    ContextSwitched {
        from: StorageContext,
        to: StorageContext,
    },
    /// A pool created on first reference found storage units.
    PoolBecamePhysical { resource: String },
}

/// Result of one [`VesselResourceHandler::run_timestep`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestepReport {
    pub events: Vec<ResourceEvent>,
    /// The caller should lower time compression.
    pub throttle_requested: bool,
    pub recipes_executed: usize,
    /// Rate reporting was suppressed this step.
    pub rates_suppressed: bool,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct VesselResourceHandler {
    context: StorageContext,
    settings: SimSettings,
    pools: PoolSet,
    recipes: Vec<Recipe>,
    observed: bool,
    last_elapsed: Option<f64>,
    suppress_steps: u32,
    incoherent: HashSet<String>,
}

impl VesselResourceHandler {
    /// Create a handler with default settings.
    pub fn new(context: StorageContext) -> Self {
        Self {
            context,
            settings: SimSettings::default(),
            pools: PoolSet::new(),
            recipes: Vec::new(),
            observed: false,
            last_elapsed: None,
            suppress_steps: 0,
            incoherent: HashSet::new(),
        }
    }

    pub fn with_settings(context: StorageContext, settings: SimSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        let mut handler = Self::new(context);
        handler.settings = settings;
        Ok(handler)
    }

    pub fn context(&self) -> StorageContext {
        self.context
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    /// Whether a user is watching this craft. Coherency warnings are only
    /// surfaced for observed crafts.
    pub fn set_observed(&mut self, observed: bool) {
        self.observed = observed;
    }

    pub fn observed(&self) -> bool {
        self.observed
    }

    /// First full scan of the craft's storage. Every resource found gets a
    /// physical pool whose current contents become the baseline.
    pub fn init(&mut self, storage: &dyn CraftStorage) {
        if storage.context() != self.context {
            self.switch_context(storage.context());
        }
        for name in resource_names(storage) {
            let needs_adapter = self
                .pools
                .get(&name)
                .is_none_or(|p| p.origin() == PoolOrigin::Implicit);
            if needs_adapter {
                self.attach_physical(&name, storage);
            } else if let Some(pool) = self.pools.get_mut(&name) {
                if !pool.is_virtual() {
                    rescan(pool.adapter_mut(), storage, &name);
                    pool.adapter_mut().settle();
                }
            }
        }
        tracing::debug!(context = ?self.context, pools = self.pools.len(), "initialized resource handler");
    }

    /// Give `name` a fresh physical pool (or convert its implicit pool),
    /// scanned and settled.
    fn attach_physical(&mut self, name: &str, storage: &dyn CraftStorage) {
        let mut adapter = adapter_for(self.context);
        rescan(adapter.as_mut(), storage, name);
        adapter.settle();
        match self.pools.get_mut(name) {
            Some(pool) => pool.set_adapter(adapter),
            None => {
                self.pools.insert(ResourcePool::new(name, adapter));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pools
    // -----------------------------------------------------------------------

    /// Read-only view of a pool.
    pub fn pool(&self, name: &str) -> Option<&ResourcePool> {
        self.pools.get(name)
    }

    pub fn pool_mut(&mut self, name: &str) -> Option<&mut ResourcePool> {
        self.pools.get_mut(name)
    }

    /// Existing pool, or a new virtual one if the craft's storage never
    /// mentioned `name`.
    pub fn get_or_create_pool(&mut self, name: &str) -> &mut ResourcePool {
        self.pools.get_or_create(name)
    }

    pub fn pools(&self) -> &PoolSet {
        &self.pools
    }

    pub(crate) fn insert_pool(&mut self, pool: ResourcePool) {
        self.pools.insert(pool);
    }

    /// Create an explicit virtual pool. An existing pool of the same name is
    /// returned unchanged, apart from the title of a virtual one.
    pub fn create_virtual_pool(&mut self, name: &str, title: Option<&str>) -> &mut ResourcePool {
        if !self.pools.contains(name) {
            self.pools.insert(ResourcePool::new_virtual(name, title));
            tracing::debug!(resource = name, "created virtual pool");
        }
        let pool = self.pools.get_or_create(name);
        if let (Some(title), true) = (title, pool.is_virtual()) {
            pool.set_title(title);
        }
        pool
    }

    /// Move every physical pool to the adapter of `context`, keeping the
    /// current totals as baseline.
    pub fn switch_context(&mut self, context: StorageContext) {
        if context == self.context {
            return;
        }
        tracing::debug!(from = ?self.context, to = ?context, "switching storage context");
        for pool in self.pools.iter_mut() {
            if pool.adapter().kind() == AdapterKind::Virtual {
                continue;
            }
            let adapter = carried_adapter(context, pool.adapter());
            pool.set_adapter(adapter);
        }
        self.context = context;
        self.last_elapsed = None;
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    pub fn produce(&mut self, resource: &str, quantity: f64, broker: Option<BrokerId>) {
        if quantity == 0.0 {
            return;
        }
        self.pools.get_or_create(resource).produce(quantity, broker);
    }

    pub fn consume(&mut self, resource: &str, quantity: f64, broker: Option<BrokerId>, critical: bool) {
        if quantity == 0.0 {
            return;
        }
        self.pools
            .get_or_create(resource)
            .consume(quantity, broker, critical);
    }

    /// Produce attributed to a broker looked up by key. An unknown key is
    /// logged and ignored.
    pub fn produce_with(&mut self, registry: &BrokerRegistry, resource: &str, quantity: f64, key: &str) {
        match registry.lookup(key) {
            Ok(broker) => self.produce(resource, quantity, Some(broker)),
            Err(err) => tracing::warn!(resource, quantity, %err, "produce ignored"),
        }
    }

    /// Consume attributed to a broker looked up by key. An unknown key is
    /// logged and ignored.
    pub fn consume_with(
        &mut self,
        registry: &BrokerRegistry,
        resource: &str,
        quantity: f64,
        key: &str,
        critical: bool,
    ) {
        match registry.lookup(key) {
            Ok(broker) => self.consume(resource, quantity, Some(broker), critical),
            Err(err) => tracing::warn!(resource, quantity, %err, "consume ignored"),
        }
    }

    /// Queue a recipe for the next timestep. Empty recipes are discarded.
    pub fn add_recipe(&mut self, mut recipe: Recipe) {
        recipe.drop_degenerate(self.settings.recipe_epsilon);
        if recipe.inputs().is_empty() && recipe.outputs().is_empty() {
            return;
        }
        self.recipes.push(recipe);
    }

    pub fn pending_recipes(&self) -> usize {
        self.recipes.len()
    }

    // -----------------------------------------------------------------------
    // Timestep
    // -----------------------------------------------------------------------

    /// Run one timestep: recipes, storage rescan, then reconciliation of
    /// every pool.
    pub fn run_timestep(
        &mut self,
        storage: &mut dyn CraftStorage,
        crew: &mut [CrewMember],
        step: Timestep,
    ) -> TimestepReport {
        let mut report = TimestepReport::default();

        if storage.context() != self.context {
            let from = self.context;
            self.switch_context(storage.context());
            report.events.push(ResourceEvent::ContextSwitched {
                from,
                to: self.context,
            });
        }

        // Phase 1: Transient detection -- suppress rates after a timestep change.
        report.rates_suppressed = self.phase_transient(step.elapsed_s);

        // Phase 2: Recipes -- execute to exhaustion, then discard.
        report.recipes_executed = self.phase_recipes(crew);

        // Phase 3: Rescan -- rebuild every pool's view of storage.
        self.phase_rescan(storage, &mut report);

        // Phase 4: Reconcile -- apply deferred deltas.
        self.phase_reconcile(storage, step, &mut report);

        report
    }

    fn phase_transient(&mut self, elapsed_s: f64) -> bool {
        if let Some(previous) = self.last_elapsed {
            if previous > 0.0 && elapsed_s > 0.0 {
                let ratio = (elapsed_s / previous).max(previous / elapsed_s);
                if ratio > self.settings.timestep_change_ratio {
                    tracing::debug!(previous, elapsed_s, "timestep length changed");
                    self.suppress_steps = self.settings.rate_suppression_steps;
                }
            }
        }
        self.last_elapsed = Some(elapsed_s);
        if self.suppress_steps > 0 {
            self.suppress_steps -= 1;
            true
        } else {
            false
        }
    }

    fn phase_recipes(&mut self, crew: &mut [CrewMember]) -> usize {
        let count = self.recipes.len();
        if count > 0 {
            execute_all(
                &mut self.pools,
                &mut self.recipes,
                crew,
                self.settings.recipe_epsilon,
            );
            self.recipes.clear();
        }
        count
    }

    fn phase_rescan(&mut self, storage: &dyn CraftStorage, report: &mut TimestepReport) {
        if self.context == StorageContext::Editor {
            for pool in self.pools.iter_mut() {
                pool.adapter_mut().clear_units(false);
            }
            return;
        }

        let names = resource_names(storage);
        for name in &names {
            match self.pools.get(name).map(|p| p.origin()) {
                None => self.attach_physical(name, storage),
                Some(PoolOrigin::Implicit) => {
                    // The virtual amount moves into the new units.
                    let carried = self.pools.get(name).map(|p| p.amount()).unwrap_or(0.0);
                    self.attach_physical(name, storage);
                    if let Some(pool) = self.pools.get_mut(name) {
                        if carried > 0.0 {
                            tracing::debug!(resource = %name, carried, "carrying virtual amount into storage");
                            pool.produce(carried, Some(well_known::OTHERS));
                        }
                    }
                    report.events.push(ResourceEvent::PoolBecamePhysical {
                        resource: name.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for pool in self.pools.iter_mut() {
            if pool.is_virtual() {
                pool.adapter_mut().clear_units(true);
            } else {
                let name = pool.name().to_string();
                rescan(pool.adapter_mut(), storage, &name);
            }
        }
    }

    fn phase_reconcile(
        &mut self,
        storage: &mut dyn CraftStorage,
        step: Timestep,
        report: &mut TimestepReport,
    ) {
        let params = SyncParams {
            elapsed_s: step.elapsed_s,
            warp_rate: step.warp_rate,
            suppress_rate: report.rates_suppressed,
            settings: &self.settings,
        };
        for pool in self.pools.iter_mut() {
            let incoherent = pool.reconcile(storage, &params);
            if !incoherent {
                self.incoherent.remove(pool.name());
                continue;
            }
            if !self.observed {
                continue;
            }
            report.throttle_requested = true;
            if self.incoherent.insert(pool.name().to_string()) {
                tracing::warn!(
                    resource = pool.name(),
                    external_rate = pool.external_rate(),
                    warp = step.warp_rate,
                    "incoherent external production at high time compression"
                );
                report.events.push(ResourceEvent::CoherencyWarning {
                    resource: pool.name().to_string(),
                });
            }
        }
    }
}

/// Every resource held by at least one unit, flowing or not.
fn resource_names(storage: &dyn CraftStorage) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    storage.for_each_unit(&mut |_, unit| {
        if !names.contains(unit.resource()) {
            names.insert(unit.resource().to_string());
        }
    });
    names
}

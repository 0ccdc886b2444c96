//! Per-resource pools and their once-per-timestep reconciliation.
//!
//! A pool never writes storage while a timestep is running. Producers and
//! consumers only move its deferred accumulators; [`ResourcePool::reconcile`]
//! clamps the net change into `[0, capacity]`, hands it to the storage
//! adapter, and recomputes every derived value (level, rate, availability
//! factor, per-broker rates).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::broker::{BrokerRate, well_known};
use crate::id::BrokerId;
use crate::settings::SimSettings;
use crate::storage::{AdapterKind, CraftStorage, StorageAdapter, VirtualStorage};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Redistribution policy for the next reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EqualizeMode {
    /// No request this step. Proportional draw-down/fill-up.
    #[default]
    NotSet,
    /// Share the post-delta total evenly by capacity.
    Enabled,
    /// Explicitly proportional.
    Disabled,
}

/// How a pool came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolOrigin {
    /// Backed by physical storage units.
    Physical,
    /// Created on first reference to a name the craft's storage did not know.
    /// Becomes physical as soon as a scan finds units for it.
    Implicit,
    /// Explicitly created virtual resource. Never backed by units.
    Virtual,
}

/// Per-step inputs of [`ResourcePool::reconcile`].
#[derive(Debug, Clone, Copy)]
pub struct SyncParams<'a> {
    pub elapsed_s: f64,
    /// Current time-compression rate (1 = real time).
    pub warp_rate: f64,
    /// Skip rate recomputation this step (transient timestep change).
    pub suppress_rate: bool,
    pub settings: &'a SimSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool `{0}` is not virtual")]
    NotVirtual(String),
}

// ---------------------------------------------------------------------------
// ResourcePool
// ---------------------------------------------------------------------------

/// Amount, capacity, deferred delta and availability of one resource on one
/// craft.
#[derive(Debug)]
pub struct ResourcePool {
    name: String,
    title: String,
    visible: bool,
    origin: PoolOrigin,
    adapter: Box<dyn StorageAdapter>,

    level: f64,
    rate: f64,
    average_rate: f64,
    external_rate: f64,

    deferred: f64,
    deferred_non_critical: f64,
    availability_factor: f64,
    critical_satisfied: bool,

    produce_requests: f64,
    consume_requests: f64,
    consume_critical_requests: f64,

    interval_rule_amount: f64,
    interval_rules_rate: f64,

    ledger: HashMap<BrokerId, f64>,
    last_ledger: HashMap<BrokerId, f64>,
    interval_rates: HashMap<BrokerId, f64>,
    broker_rates: Vec<BrokerRate>,

    equalize: EqualizeMode,
}

impl ResourcePool {
    /// Create a pool over `adapter`. Virtual adapters produce invisible
    /// virtual pools.
    pub fn new(name: impl Into<String>, adapter: Box<dyn StorageAdapter>) -> Self {
        let name = name.into();
        let virtual_backed = adapter.kind() == AdapterKind::Virtual;
        let level = if adapter.capacity() > 0.0 {
            adapter.amount() / adapter.capacity()
        } else {
            0.0
        };
        Self {
            title: name.clone(),
            name,
            visible: !virtual_backed,
            origin: if virtual_backed {
                PoolOrigin::Virtual
            } else {
                PoolOrigin::Physical
            },
            adapter,
            level,
            rate: 0.0,
            average_rate: 0.0,
            external_rate: 0.0,
            deferred: 0.0,
            deferred_non_critical: 0.0,
            availability_factor: 1.0,
            critical_satisfied: true,
            produce_requests: 0.0,
            consume_requests: 0.0,
            consume_critical_requests: 0.0,
            interval_rule_amount: 0.0,
            interval_rules_rate: 0.0,
            ledger: HashMap::new(),
            last_ledger: HashMap::new(),
            interval_rates: HashMap::new(),
            broker_rates: Vec::new(),
            equalize: EqualizeMode::NotSet,
        }
    }

    /// Create an explicit virtual pool with unbounded capacity.
    pub fn new_virtual(name: impl Into<String>, title: Option<&str>) -> Self {
        let mut pool = Self::new(name, Box::new(VirtualStorage::new()));
        if let Some(title) = title {
            pool.title = title.to_string();
        }
        pool
    }

    /// Create a virtual pool for a name nobody registered. It becomes
    /// physical if storage units for it show up later.
    pub(crate) fn new_implicit(name: impl Into<String>) -> Self {
        let mut pool = Self::new(name, Box::new(VirtualStorage::new()));
        pool.origin = PoolOrigin::Implicit;
        pool
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn origin(&self) -> PoolOrigin {
        self.origin
    }

    pub fn is_virtual(&self) -> bool {
        self.adapter.kind() == AdapterKind::Virtual
    }

    pub fn amount(&self) -> f64 {
        self.adapter.amount()
    }

    pub fn capacity(&self) -> f64 {
        self.adapter.capacity()
    }

    /// `amount / capacity`, or 0 without capacity.
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Measured rate of change over the last step, in units per second.
    /// Excludes interval-rule lumps.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// `rate` plus the averaged rate of interval rules, when they can have
    /// an effect.
    pub fn average_rate(&self) -> f64 {
        self.average_rate
    }

    /// Rate of change caused outside the engine over the last step.
    pub fn external_rate(&self) -> f64 {
        self.external_rate
    }

    pub fn deferred(&self) -> f64 {
        self.deferred + self.deferred_non_critical
    }

    pub fn availability_factor(&self) -> f64 {
        self.availability_factor
    }

    pub fn critical_demand_satisfied(&self) -> bool {
        self.critical_satisfied
    }

    pub fn produce_requests(&self) -> f64 {
        self.produce_requests
    }

    /// Non-critical consume requests recorded this step (unscaled).
    pub fn consume_requests(&self) -> f64 {
        self.consume_requests
    }

    pub fn critical_requests(&self) -> f64 {
        self.consume_critical_requests
    }

    /// Net signed amount recorded for `broker` during the current step.
    pub fn ledger_entry(&self, broker: BrokerId) -> f64 {
        self.ledger.get(&broker).copied().unwrap_or(0.0)
    }

    /// Net signed amounts per broker, as recorded during the last reconciled
    /// step. These are requests, not realized amounts.
    pub fn last_step_ledger(&self) -> &HashMap<BrokerId, f64> {
        &self.last_ledger
    }

    /// Per-broker rates of the last step, sorted by broker id.
    pub fn broker_rates(&self) -> &[BrokerRate] {
        &self.broker_rates
    }

    pub fn adapter(&self) -> &dyn StorageAdapter {
        self.adapter.as_ref()
    }

    pub(crate) fn adapter_mut(&mut self) -> &mut dyn StorageAdapter {
        self.adapter.as_mut()
    }

    /// Replace the storage adapter. The pool becomes physical unless the new
    /// adapter is virtual.
    pub(crate) fn set_adapter(&mut self, adapter: Box<dyn StorageAdapter>) {
        if adapter.kind() != AdapterKind::Virtual {
            self.origin = PoolOrigin::Physical;
            self.visible = true;
        }
        self.adapter = adapter;
    }

    /// Seconds until empty at the current average rate. `Some(0.0)` when
    /// already empty, `None` when not decreasing.
    pub fn depletion_time(&self) -> Option<f64> {
        let amount = self.amount();
        if amount <= 1e-10 {
            Some(0.0)
        } else if self.average_rate >= -1e-10 {
            None
        } else {
            Some(amount / -self.average_rate)
        }
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Record a production. Takes effect at the next reconciliation.
    pub fn produce(&mut self, quantity: f64, broker: Option<BrokerId>) {
        if !self.accepts(quantity, "produce") {
            return;
        }
        self.produce_requests += quantity;
        self.deferred += quantity;
        self.record(broker, quantity);
    }

    /// Record a consumption.
    ///
    /// Critical requests are taken in full. Non-critical ones are scaled by
    /// the availability factor of the previous step, while the unscaled
    /// quantity feeds the next factor.
    pub fn consume(&mut self, quantity: f64, broker: Option<BrokerId>, critical: bool) {
        if !self.accepts(quantity, "consume") {
            return;
        }
        let realized = if critical {
            self.consume_critical_requests += quantity;
            self.deferred -= quantity;
            quantity
        } else {
            self.consume_requests += quantity;
            let scaled = quantity * self.availability_factor;
            self.deferred_non_critical -= scaled;
            scaled
        };
        self.record(broker, -realized);
    }

    /// Consumption computed by a recipe. Never scaled.
    pub fn recipe_consume(&mut self, quantity: f64, broker: BrokerId) {
        self.consume(quantity, Some(broker), true);
    }

    /// Report a lump consumption or production already included in the
    /// deferred delta, together with its average rate over the rule interval.
    /// The lump is excluded from `rate` and shows up as an averaged broker
    /// rate instead.
    pub fn record_interval_rule(&mut self, amount: f64, average_rate: f64, broker: BrokerId) {
        if !amount.is_finite() || !average_rate.is_finite() {
            tracing::warn!(pool = %self.name, amount, average_rate, "ignoring non-finite interval rule");
            return;
        }
        self.interval_rule_amount += amount;
        *self.interval_rates.entry(broker).or_insert(0.0) += average_rate;
    }

    /// Redistribute the total evenly by capacity at the next reconciliation.
    pub fn request_equalize(&mut self, mode: EqualizeMode) {
        self.equalize = mode;
    }

    pub fn equalize_mode(&self) -> EqualizeMode {
        self.equalize
    }

    /// Set the amount of a virtual pool, clamped to `[0, capacity]`.
    pub fn set_amount(&mut self, amount: f64) -> Result<(), PoolError> {
        let name = self.name.clone();
        let storage = self
            .adapter
            .as_any_mut()
            .downcast_mut::<VirtualStorage>()
            .ok_or(PoolError::NotVirtual(name))?;
        storage.set_amount(amount);
        self.refresh_level();
        Ok(())
    }

    /// Set the capacity of a virtual pool.
    pub fn set_capacity(&mut self, capacity: f64) -> Result<(), PoolError> {
        let name = self.name.clone();
        let storage = self
            .adapter
            .as_any_mut()
            .downcast_mut::<VirtualStorage>()
            .ok_or(PoolError::NotVirtual(name))?;
        storage.set_capacity(capacity);
        self.refresh_level();
        Ok(())
    }

    fn accepts(&self, quantity: f64, op: &'static str) -> bool {
        if quantity == 0.0 {
            return false;
        }
        if !quantity.is_finite() {
            tracing::warn!(pool = %self.name, quantity, op, "ignoring non-finite quantity");
            return false;
        }
        true
    }

    fn record(&mut self, broker: Option<BrokerId>, amount: f64) {
        let broker = broker.unwrap_or(well_known::OTHERS);
        *self.ledger.entry(broker).or_insert(0.0) += amount;
    }

    fn refresh_level(&mut self) {
        let capacity = self.capacity();
        self.level = if capacity > 0.0 {
            self.amount() / capacity
        } else {
            0.0
        };
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Apply this step's deferred delta to storage and recompute derived
    /// values. The adapter must have been rescanned beforehand.
    ///
    /// Returns `true` when an external producer was detected at high time
    /// compression (coherency warning).
    pub fn reconcile(&mut self, storage: &mut dyn CraftStorage, params: &SyncParams<'_>) -> bool {
        let settings = params.settings;
        let amount = self.adapter.amount();
        let capacity = self.adapter.capacity();
        let old_amount = self.adapter.old_amount();
        let old_capacity = self.adapter.old_capacity();

        // Changes the engine did not make.
        let mut external_delta = amount - old_amount;
        if !external_delta.is_finite() || external_delta.abs() < settings.external_delta_epsilon {
            external_delta = 0.0;
        }
        let flow_state_changed = capacity - old_capacity > settings.external_delta_epsilon;

        self.critical_satisfied =
            amount + self.produce_requests >= self.consume_critical_requests;
        let consume_requests = self.consume_requests + self.consume_critical_requests;

        let starvation = (amount + self.produce_requests - consume_requests).min(0.0).abs();
        self.availability_factor = if consume_requests > 0.0 {
            (1.0 - starvation / consume_requests).max(0.0)
        } else if amount > 0.0 {
            1.0
        } else {
            0.0
        };

        self.produce_requests = 0.0;
        self.consume_requests = 0.0;
        self.consume_critical_requests = 0.0;

        let mut deferred = self.deferred + self.deferred_non_critical;
        self.deferred = 0.0;
        self.deferred_non_critical = 0.0;
        if !deferred.is_finite() {
            tracing::warn!(pool = %self.name, deferred, "discarding non-finite deferred delta");
            deferred = 0.0;
        }
        let deferred = clamp(deferred, -amount, capacity - amount);

        if capacity > 0.0 {
            self.adapter.sync_delta(
                storage,
                deferred,
                self.equalize == EqualizeMode::Enabled,
                settings.min_sync_delta,
            );
        }
        self.equalize = EqualizeMode::NotSet;

        let amount = self.adapter.amount();
        self.level = if capacity > 0.0 { amount / capacity } else { 0.0 };

        let elapsed = params.elapsed_s;
        if elapsed > 0.0 && !params.suppress_rate {
            self.rate = (amount - old_amount - self.interval_rule_amount) / elapsed;
        }
        self.external_rate = if elapsed > 0.0 {
            external_delta / elapsed
        } else {
            0.0
        };

        self.interval_rules_rate = self.interval_rates.values().sum();
        self.average_rate = self.rate;
        if (self.interval_rules_rate > 0.0 && self.level < 1.0)
            || (self.interval_rules_rate < 0.0 && self.level > 0.0)
        {
            self.average_rate += self.interval_rules_rate;
        }

        self.rebuild_broker_rates(elapsed, settings.broker_rate_epsilon);

        self.last_ledger = std::mem::take(&mut self.ledger);
        self.interval_rates.clear();
        self.interval_rule_amount = 0.0;

        settings.enforce_coherency
            && params.warp_rate > settings.coherency_warp_threshold
            && self.external_rate > 0.0
            && !flow_state_changed
    }

    fn rebuild_broker_rates(&mut self, elapsed: f64, epsilon: f64) {
        self.broker_rates.clear();
        for (&broker, &rate) in &self.interval_rates {
            self.broker_rates.push(BrokerRate {
                broker,
                rate,
                averaged: true,
            });
        }
        if elapsed > 0.0 {
            for (&broker, &amount) in &self.ledger {
                if amount.abs() < epsilon {
                    continue;
                }
                self.broker_rates.push(BrokerRate {
                    broker,
                    rate: amount / elapsed,
                    averaged: false,
                });
            }
        }
        if self.external_rate != 0.0 {
            self.broker_rates.push(BrokerRate {
                broker: well_known::EXTERNAL,
                rate: self.external_rate,
                averaged: false,
            });
        }
        self.broker_rates
            .sort_by(|a, b| a.broker.cmp(&b.broker).then(a.averaged.cmp(&b.averaged)));
    }
}

// ---------------------------------------------------------------------------
// PoolSet
// ---------------------------------------------------------------------------

/// Every pool of one craft, keyed by resource name.
#[derive(Debug, Default)]
pub struct PoolSet {
    pools: BTreeMap<String, ResourcePool>,
}

impl PoolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ResourcePool> {
        self.pools.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ResourcePool> {
        self.pools.get_mut(name)
    }

    /// Return the pool for `name`, creating an implicit virtual pool if the
    /// name was never seen.
    pub fn get_or_create(&mut self, name: &str) -> &mut ResourcePool {
        self.pools.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(resource = name, "creating implicit virtual pool");
            ResourcePool::new_implicit(name)
        })
    }

    /// Insert a pool, replacing any pool of the same name.
    pub fn insert(&mut self, pool: ResourcePool) -> Option<ResourcePool> {
        self.pools.insert(pool.name().to_string(), pool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// `amount + deferred`, or 0 for an unknown name.
    pub fn available(&self, name: &str) -> f64 {
        self.pools
            .get(name)
            .map(|p| p.amount() + p.deferred())
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourcePool> {
        self.pools.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ResourcePool> {
        self.pools.values_mut()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

/// Clamp that tolerates `lo > hi` without panicking.
fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

//! Craft-side storage units and the adapters that read and write them.
//!
//! A craft owns its storage units (tanks, batteries, container slots) in a
//! [`CraftStorage`] implementation. Each resource pool reaches that storage
//! through a [`StorageAdapter`], which sums the units during a scan and
//! writes the reconciled delta back. The four adapter variants share one
//! contract; the two unit-backed ones share [`distribute_delta`].

use std::any::Any;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::id::UnitId;

// ---------------------------------------------------------------------------
// Storage units
// ---------------------------------------------------------------------------

/// One physical container of a single resource.
pub trait StorageUnit {
    fn resource(&self) -> &str;
    fn amount(&self) -> f64;
    fn max_amount(&self) -> f64;
    /// Units whose flow is disabled are invisible to scans.
    fn flowing(&self) -> bool;
    fn set_amount(&mut self, amount: f64);
}

/// A live, physically simulated tank.
#[derive(Debug, Clone, PartialEq)]
pub struct Tank {
    pub resource: String,
    pub amount: f64,
    pub max_amount: f64,
    pub flow_enabled: bool,
}

impl Tank {
    pub fn new(resource: impl Into<String>, amount: f64, max_amount: f64) -> Self {
        Self {
            resource: resource.into(),
            amount,
            max_amount,
            flow_enabled: true,
        }
    }
}

impl StorageUnit for Tank {
    fn resource(&self) -> &str {
        &self.resource
    }
    fn amount(&self) -> f64 {
        self.amount
    }
    fn max_amount(&self) -> f64 {
        self.max_amount
    }
    fn flowing(&self) -> bool {
        self.flow_enabled
    }
    fn set_amount(&mut self, amount: f64) {
        self.amount = amount;
    }
}

/// Persisted form of a tank, used while the craft is not physically loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankSnapshot {
    pub resource: String,
    pub amount: f64,
    pub max_amount: f64,
    #[serde(default = "default_flow_state")]
    pub flow_state: bool,
}

fn default_flow_state() -> bool {
    true
}

impl TankSnapshot {
    pub fn new(resource: impl Into<String>, amount: f64, max_amount: f64) -> Self {
        Self {
            resource: resource.into(),
            amount,
            max_amount,
            flow_state: true,
        }
    }
}

impl StorageUnit for TankSnapshot {
    fn resource(&self) -> &str {
        &self.resource
    }
    fn amount(&self) -> f64 {
        self.amount
    }
    fn max_amount(&self) -> f64 {
        self.max_amount
    }
    fn flowing(&self) -> bool {
        self.flow_state
    }
    fn set_amount(&mut self, amount: f64) {
        self.amount = amount;
    }
}

impl From<&Tank> for TankSnapshot {
    fn from(tank: &Tank) -> Self {
        Self {
            resource: tank.resource.clone(),
            amount: tank.amount,
            max_amount: tank.max_amount,
            flow_state: tank.flow_enabled,
        }
    }
}

impl From<&TankSnapshot> for Tank {
    fn from(snapshot: &TankSnapshot) -> Self {
        Self {
            resource: snapshot.resource.clone(),
            amount: snapshot.amount,
            max_amount: snapshot.max_amount,
            flow_enabled: snapshot.flow_state,
        }
    }
}

// ---------------------------------------------------------------------------
// Craft storage
// ---------------------------------------------------------------------------

/// The execution context a craft's storage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageContext {
    /// Fully active, physically simulated craft.
    Simulated,
    /// Physics-suspended craft advanced by elapsed time only.
    Background,
    /// Craft under construction.
    Editor,
}

/// Read/write access to every storage unit of one craft.
pub trait CraftStorage {
    fn context(&self) -> StorageContext;
    /// Visit every unit, flowing or not.
    fn for_each_unit(&self, f: &mut dyn FnMut(UnitId, &dyn StorageUnit));
    fn unit(&self, id: UnitId) -> Option<&dyn StorageUnit>;
    fn unit_mut(&mut self, id: UnitId) -> Option<&mut dyn StorageUnit>;
}

/// Slotmap-backed unit store tagged with its context.
#[derive(Debug, Clone)]
pub struct Tanks<U> {
    units: SlotMap<UnitId, U>,
    context: StorageContext,
}

impl Tanks<Tank> {
    pub fn simulated() -> Self {
        Self::new(StorageContext::Simulated)
    }

    pub fn editor() -> Self {
        Self::new(StorageContext::Editor)
    }
}

impl Tanks<TankSnapshot> {
    pub fn background() -> Self {
        Self::new(StorageContext::Background)
    }
}

impl<U: StorageUnit> Tanks<U> {
    pub fn new(context: StorageContext) -> Self {
        Self {
            units: SlotMap::with_key(),
            context,
        }
    }

    pub fn insert(&mut self, unit: U) -> UnitId {
        self.units.insert(unit)
    }

    pub fn get(&self, id: UnitId) -> Option<&U> {
        self.units.get(id)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut U> {
        self.units.get_mut(id)
    }

    pub fn remove(&mut self, id: UnitId) -> Option<U> {
        self.units.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &U)> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Sum of amount and capacity over flowing units holding `resource`.
    pub fn totals(&self, resource: &str) -> (f64, f64) {
        self.units
            .values()
            .filter(|u| u.flowing() && u.resource() == resource)
            .fold((0.0, 0.0), |(a, c), u| (a + u.amount(), c + u.max_amount()))
    }
}

impl<U: StorageUnit> CraftStorage for Tanks<U> {
    fn context(&self) -> StorageContext {
        self.context
    }

    fn for_each_unit(&self, f: &mut dyn FnMut(UnitId, &dyn StorageUnit)) {
        for (id, unit) in &self.units {
            f(id, unit);
        }
    }

    fn unit(&self, id: UnitId) -> Option<&dyn StorageUnit> {
        self.units.get(id).map(|u| u as &dyn StorageUnit)
    }

    fn unit_mut(&mut self, id: UnitId) -> Option<&mut dyn StorageUnit> {
        self.units.get_mut(id).map(|u| u as &mut dyn StorageUnit)
    }
}

// ---------------------------------------------------------------------------
// Redistribution
// ---------------------------------------------------------------------------

/// Spread a signed delta across units given as `(amount, max_amount)` pairs,
/// updating the amounts in place.
///
/// `amount` and `capacity` are the totals over `units`. With `equalize` the
/// post-delta total is shared by capacity. Otherwise a negative delta is taken
/// in proportion to each unit's current amount and a positive delta in
/// proportion to each unit's free room, so heterogeneous units drain and fill
/// evenly. Deltas of magnitude `min_delta` or less are ignored.
pub fn distribute_delta(
    units: &mut [(f64, f64)],
    amount: f64,
    capacity: f64,
    delta: f64,
    equalize: bool,
    min_delta: f64,
) {
    if equalize {
        if capacity <= 0.0 {
            return;
        }
        let total = amount + delta;
        for (unit_amount, unit_max) in units.iter_mut() {
            *unit_amount = total * (*unit_max / capacity);
        }
        return;
    }

    if delta.abs() <= min_delta {
        return;
    }
    let room = capacity - amount;
    for (unit_amount, unit_max) in units.iter_mut() {
        let k = if delta < 0.0 {
            if amount > 0.0 { *unit_amount / amount } else { 0.0 }
        } else if room > 0.0 {
            (*unit_max - *unit_amount) / room
        } else {
            0.0
        };
        *unit_amount += delta * k;
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Which representation a pool's adapter reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterKind {
    Simulated,
    Background,
    Editor,
    Virtual,
}

impl From<StorageContext> for AdapterKind {
    fn from(context: StorageContext) -> Self {
        match context {
            StorageContext::Simulated => AdapterKind::Simulated,
            StorageContext::Background => AdapterKind::Background,
            StorageContext::Editor => AdapterKind::Editor,
        }
    }
}

/// Common read/write contract over the four storage representations.
///
/// `old_amount` / `old_capacity` hold the totals of the previous step. They
/// are captured by [`clear_units`](Self::clear_units) just before a rescan.
pub trait StorageAdapter: Debug + Send {
    fn kind(&self) -> AdapterKind;
    fn amount(&self) -> f64;
    fn capacity(&self) -> f64;
    fn old_amount(&self) -> f64;
    fn old_capacity(&self) -> f64;
    /// Register a unit found by a scan and add it to the totals.
    fn add_unit(&mut self, id: UnitId, amount: f64, capacity: f64);
    /// Move the totals to the previous-step baseline. With `reset` the totals
    /// and unit list are cleared for a rescan.
    fn clear_units(&mut self, reset: bool);
    /// Write a clamped delta back to storage and add it to the totals.
    fn sync_delta(
        &mut self,
        storage: &mut dyn CraftStorage,
        delta: f64,
        equalize: bool,
        min_delta: f64,
    );
    /// Adopt the current totals as the previous-step baseline.
    fn settle(&mut self);
    fn unit_count(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Totals and unit references shared by the unit-backed adapters.
#[derive(Debug, Clone, Default)]
struct UnitLedger {
    units: Vec<UnitId>,
    amount: f64,
    capacity: f64,
    old_amount: f64,
    old_capacity: f64,
}

impl UnitLedger {
    fn carried_from(previous: &dyn StorageAdapter) -> Self {
        Self {
            units: Vec::new(),
            amount: previous.amount(),
            capacity: previous.capacity(),
            old_amount: previous.amount(),
            old_capacity: previous.capacity(),
        }
    }

    fn add_unit(&mut self, id: UnitId, amount: f64, capacity: f64) {
        self.units.push(id);
        self.amount += amount;
        self.capacity += capacity;
    }

    fn clear(&mut self, reset: bool) {
        self.old_amount = self.amount;
        self.old_capacity = self.capacity;
        if reset {
            self.amount = 0.0;
            self.capacity = 0.0;
            self.units.clear();
        }
    }

    fn settle(&mut self) {
        self.old_amount = self.amount;
        self.old_capacity = self.capacity;
    }

    fn write_units(
        &mut self,
        storage: &mut dyn CraftStorage,
        delta: f64,
        equalize: bool,
        min_delta: f64,
    ) {
        let mut shares: Vec<(f64, f64)> = self
            .units
            .iter()
            .map(|&id| {
                storage
                    .unit(id)
                    .map(|u| (u.amount(), u.max_amount()))
                    .unwrap_or((0.0, 0.0))
            })
            .collect();
        distribute_delta(
            &mut shares,
            self.amount,
            self.capacity,
            delta,
            equalize,
            min_delta,
        );
        for (&id, &(unit_amount, _)) in self.units.iter().zip(&shares) {
            if let Some(unit) = storage.unit_mut(id) {
                unit.set_amount(unit_amount);
            } else {
                tracing::warn!(?id, "storage unit vanished before sync");
            }
        }
        self.amount += delta;
    }
}

macro_rules! unit_backed_adapter {
    ($name:ident, $kind:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Default)]
        pub struct $name {
            ledger: UnitLedger,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            /// Take over from another adapter, keeping its totals as baseline.
            pub fn carried_from(previous: &dyn StorageAdapter) -> Self {
                Self {
                    ledger: UnitLedger::carried_from(previous),
                }
            }

            pub fn units(&self) -> &[UnitId] {
                &self.ledger.units
            }
        }

        impl StorageAdapter for $name {
            fn kind(&self) -> AdapterKind {
                $kind
            }
            fn amount(&self) -> f64 {
                self.ledger.amount
            }
            fn capacity(&self) -> f64 {
                self.ledger.capacity
            }
            fn old_amount(&self) -> f64 {
                self.ledger.old_amount
            }
            fn old_capacity(&self) -> f64 {
                self.ledger.old_capacity
            }
            fn add_unit(&mut self, id: UnitId, amount: f64, capacity: f64) {
                self.ledger.add_unit(id, amount, capacity);
            }
            fn clear_units(&mut self, reset: bool) {
                self.ledger.clear(reset);
            }
            fn sync_delta(
                &mut self,
                storage: &mut dyn CraftStorage,
                delta: f64,
                equalize: bool,
                min_delta: f64,
            ) {
                self.ledger.write_units(storage, delta, equalize, min_delta);
            }
            fn settle(&mut self) {
                self.ledger.settle();
            }
            fn unit_count(&self) -> usize {
                self.ledger.units.len()
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
    };
}

unit_backed_adapter!(
    SimulatedStorage,
    AdapterKind::Simulated,
    "Adapter over live tanks of a physically simulated craft."
);
unit_backed_adapter!(
    BackgroundStorage,
    AdapterKind::Background,
    "Adapter over tank snapshots of a physics-suspended craft."
);

/// Adapter for a craft under construction.
///
/// Units are summed once; afterwards the totals evolve in memory only and
/// nothing is written back to the units.
#[derive(Debug, Clone, Default)]
pub struct EditorStorage {
    amount: f64,
    capacity: f64,
    old_amount: f64,
    old_capacity: f64,
    units: usize,
}

impl EditorStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn carried_from(previous: &dyn StorageAdapter) -> Self {
        Self {
            amount: previous.amount(),
            capacity: previous.capacity(),
            old_amount: previous.amount(),
            old_capacity: previous.capacity(),
            units: 0,
        }
    }
}

impl StorageAdapter for EditorStorage {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Editor
    }
    fn amount(&self) -> f64 {
        self.amount
    }
    fn capacity(&self) -> f64 {
        self.capacity
    }
    fn old_amount(&self) -> f64 {
        self.old_amount
    }
    fn old_capacity(&self) -> f64 {
        self.old_capacity
    }
    fn add_unit(&mut self, _id: UnitId, amount: f64, capacity: f64) {
        self.units += 1;
        self.amount += amount;
        self.capacity += capacity;
    }
    fn clear_units(&mut self, reset: bool) {
        self.old_amount = self.amount;
        self.old_capacity = self.capacity;
        if reset {
            self.amount = 0.0;
            self.capacity = 0.0;
            self.units = 0;
        }
    }
    fn sync_delta(
        &mut self,
        _storage: &mut dyn CraftStorage,
        delta: f64,
        _equalize: bool,
        _min_delta: f64,
    ) {
        self.amount += delta;
    }
    fn settle(&mut self) {
        self.old_amount = self.amount;
        self.old_capacity = self.capacity;
    }
    fn unit_count(&self) -> usize {
        self.units
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Adapter for a resource with no physical footprint.
///
/// Capacity is unbounded unless set explicitly.
#[derive(Debug, Clone)]
pub struct VirtualStorage {
    amount: f64,
    capacity: f64,
    old_amount: f64,
    old_capacity: f64,
}

impl Default for VirtualStorage {
    fn default() -> Self {
        Self {
            amount: 0.0,
            capacity: f64::MAX,
            old_amount: 0.0,
            old_capacity: f64::MAX,
        }
    }
}

impl VirtualStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted virtual resource.
    pub fn with_totals(amount: f64, capacity: f64) -> Self {
        let mut storage = Self::default();
        storage.set_capacity(capacity);
        storage.set_amount(amount);
        storage.settle();
        storage
    }

    /// Set the amount, clamped to `[0, capacity]`.
    pub fn set_amount(&mut self, amount: f64) {
        self.amount = if amount.is_nan() {
            0.0
        } else {
            amount.max(0.0).min(self.capacity)
        };
    }

    /// Set the capacity (negative becomes zero) and clamp the amount into it.
    pub fn set_capacity(&mut self, capacity: f64) {
        self.capacity = if capacity.is_nan() { 0.0 } else { capacity.max(0.0) };
        self.amount = self.amount.min(self.capacity);
    }
}

impl StorageAdapter for VirtualStorage {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Virtual
    }
    fn amount(&self) -> f64 {
        self.amount
    }
    fn capacity(&self) -> f64 {
        self.capacity
    }
    fn old_amount(&self) -> f64 {
        self.old_amount
    }
    fn old_capacity(&self) -> f64 {
        self.old_capacity
    }
    fn add_unit(&mut self, _id: UnitId, _amount: f64, _capacity: f64) {}
    fn clear_units(&mut self, _reset: bool) {
        self.old_amount = self.amount;
        self.old_capacity = self.capacity;
    }
    fn sync_delta(
        &mut self,
        _storage: &mut dyn CraftStorage,
        delta: f64,
        _equalize: bool,
        _min_delta: f64,
    ) {
        self.amount += delta;
    }
    fn settle(&mut self) {
        self.old_amount = self.amount;
        self.old_capacity = self.capacity;
    }
    fn unit_count(&self) -> usize {
        0
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fresh adapter for a physical pool in `context`.
pub fn adapter_for(context: StorageContext) -> Box<dyn StorageAdapter> {
    match context {
        StorageContext::Simulated => Box::new(SimulatedStorage::new()),
        StorageContext::Background => Box::new(BackgroundStorage::new()),
        StorageContext::Editor => Box::new(EditorStorage::new()),
    }
}

/// Adapter for `context` that keeps `previous`'s totals as its baseline.
pub fn carried_adapter(
    context: StorageContext,
    previous: &dyn StorageAdapter,
) -> Box<dyn StorageAdapter> {
    match context {
        StorageContext::Simulated => Box::new(SimulatedStorage::carried_from(previous)),
        StorageContext::Background => Box::new(BackgroundStorage::carried_from(previous)),
        StorageContext::Editor => Box::new(EditorStorage::carried_from(previous)),
    }
}

/// Clear `adapter` and re-add every flowing unit of `resource`.
pub fn rescan(adapter: &mut dyn StorageAdapter, storage: &dyn CraftStorage, resource: &str) {
    adapter.clear_units(true);
    storage.for_each_unit(&mut |id, unit| {
        if unit.flowing() && unit.resource() == resource {
            adapter.add_unit(id, unit.amount(), unit.max_amount());
        }
    });
}

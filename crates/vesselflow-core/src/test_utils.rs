//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::handler::{Timestep, TimestepReport, VesselResourceHandler};
use crate::id::{BrokerId, UnitId};
use crate::pool::ResourcePool;
use crate::recipe::Recipe;
use crate::storage::{StorageContext, StorageUnit, Tank, TankSnapshot, Tanks, VirtualStorage};

// ===========================================================================
// Resource names
// ===========================================================================

pub const EC: &str = "ElectricCharge";
pub const OXYGEN: &str = "Oxygen";
pub const CO2: &str = "CarbonDioxide";
pub const WATER: &str = "Water";
pub const FOOD: &str = "Food";
pub const ORE: &str = "Ore";

// ===========================================================================
// Craft builders
// ===========================================================================

/// A simulated craft with one tank per `(resource, amount, capacity)`.
pub fn simulated_tanks(layout: &[(&str, f64, f64)]) -> Tanks<Tank> {
    let mut tanks = Tanks::simulated();
    for &(resource, amount, capacity) in layout {
        tanks.insert(Tank::new(resource, amount, capacity));
    }
    tanks
}

/// A background craft with one snapshot per `(resource, amount, capacity)`.
pub fn background_tanks(layout: &[(&str, f64, f64)]) -> Tanks<TankSnapshot> {
    let mut tanks = Tanks::background();
    for &(resource, amount, capacity) in layout {
        tanks.insert(TankSnapshot::new(resource, amount, capacity));
    }
    tanks
}

/// Handler initialized against `tanks`.
pub fn handler_for(tanks: &Tanks<Tank>) -> VesselResourceHandler {
    let mut handler = VesselResourceHandler::new(StorageContext::Simulated);
    handler.init(tanks);
    handler
}

/// Background handler initialized against `tanks`.
pub fn background_handler_for(tanks: &Tanks<TankSnapshot>) -> VesselResourceHandler {
    let mut handler = VesselResourceHandler::new(StorageContext::Background);
    handler.init(tanks);
    handler
}

/// First unit holding `resource`.
pub fn unit_of<U: StorageUnit>(tanks: &Tanks<U>, resource: &str) -> Option<UnitId> {
    tanks
        .iter()
        .find(|(_, u)| u.resource() == resource)
        .map(|(id, _)| id)
}

/// Run one crewless timestep of `elapsed_s` at real time.
pub fn step(handler: &mut VesselResourceHandler, tanks: &mut Tanks<Tank>, elapsed_s: f64) -> TimestepReport {
    handler.run_timestep(tanks, &mut [], Timestep::new(elapsed_s))
}

// ===========================================================================
// Pool and recipe builders
// ===========================================================================

/// A pool with fixed totals and no units behind it.
pub fn fixed_pool(name: &str, amount: f64, capacity: f64) -> ResourcePool {
    ResourcePool::new(name, Box::new(VirtualStorage::with_totals(amount, capacity)))
}

/// `inputs -> outputs`, all outputs non-dumpable.
pub fn make_recipe(broker: BrokerId, inputs: &[(&str, f64)], outputs: &[(&str, f64)]) -> Recipe {
    let mut recipe = Recipe::new(broker);
    for &(resource, quantity) in inputs {
        recipe.add_input(resource, quantity);
    }
    for &(resource, quantity) in outputs {
        recipe.add_output(resource, quantity, false);
    }
    recipe
}

/// Scrubber-style life-support recipe: EC + CO2 -> O2.
pub fn scrubber(broker: BrokerId, rate: f64) -> Recipe {
    make_recipe(broker, &[(EC, 0.5 * rate), (CO2, rate)], &[(OXYGEN, rate)])
}

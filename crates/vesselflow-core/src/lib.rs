//! Vesselflow Core -- the resource simulation engine for composite craft.
//!
//! This crate tracks storable quantities (power, propellant, breathable
//! gases, ore, data throughput...) flowing through a craft made of many
//! independently-behaving components. Producers and consumers never touch
//! storage directly: they record deferred deltas on per-resource pools, and
//! the pools are reconciled against the craft's storage exactly once per
//! timestep.
//!
//! # Per-Timestep Pipeline
//!
//! Each call to [`handler::VesselResourceHandler::run_timestep`] runs:
//!
//! 1. **Recipes** -- every queued [`recipe::Recipe`] is executed to
//!    exhaustion with the proportional worst-IO rule.
//! 2. **Rescan** -- every pool forgets its storage units and re-reads them
//!    from the craft's [`storage::CraftStorage`].
//! 3. **Reconcile** -- every [`pool::ResourcePool`] clamps its deferred delta,
//!    writes it back through its [`storage::StorageAdapter`], and recomputes
//!    level, rate, availability factor and per-broker rates.
//!
//! Calls to `produce` / `consume` / `add_recipe` between two timesteps are
//! order-independent: everything accumulates into deferred deltas.
//!
//! # Key Types
//!
//! - [`handler::VesselResourceHandler`] -- one per craft per context; owns the
//!   pools and the recipe queue.
//! - [`pool::ResourcePool`] -- amount/capacity/deferred/availability for one
//!   resource on one craft.
//! - [`recipe::Recipe`] -- transient N-input/M-output proportional transform.
//! - [`storage::StorageAdapter`] -- four storage representations behind one
//!   read/write contract (simulated, background, editor, virtual).
//! - [`broker::BrokerRegistry`] -- interned flow-attribution identities.
//! - [`settings::SimSettings`] -- every policy constant of the engine.

pub mod broker;
pub mod crew;
pub mod handler;
pub mod id;
pub mod pool;
pub mod recipe;
pub mod serialize;
pub mod settings;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

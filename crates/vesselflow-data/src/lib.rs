//! Data-file loading for vesselflow crafts.
//!
//! A craft directory holds a required `craft` file and an optional
//! `settings` file, each in RON, TOML or JSON.

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, LoadedCraft, load_craft};

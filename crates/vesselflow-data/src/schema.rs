//! Serde data file structs for engine settings and craft definitions.
//!
//! These structs define the on-disk format. They are deserialized from RON,
//! JSON, or TOML files and then resolved into engine types by the loader.

use serde::Deserialize;
use vesselflow_background::{BackgroundSettings, Component};
use vesselflow_core::settings::SimSettings;
use vesselflow_core::storage::TankSnapshot;

// ===========================================================================
// Settings
// ===========================================================================

/// Contents of the optional `settings` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsData {
    pub engine: SimSettings,
    pub background: BackgroundSettings,
}

// ===========================================================================
// Craft
// ===========================================================================

/// Contents of the required `craft` file.
#[derive(Debug, Clone, Deserialize)]
pub struct CraftData {
    pub name: String,
    #[serde(default)]
    pub parts: Vec<PartData>,
}

/// A part: its crew, its tanks and its background modules.
#[derive(Debug, Clone, Deserialize)]
pub struct PartData {
    pub name: String,
    #[serde(default)]
    pub crew: u32,
    #[serde(default)]
    pub tanks: Vec<TankSnapshot>,
    #[serde(default)]
    pub modules: Vec<ModuleData>,
}

/// A module on a part, named as the external module it stands for.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleData {
    pub module: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub config: Component,
}

fn default_true() -> bool {
    true
}

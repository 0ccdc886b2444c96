//! Resolution pipeline: reads data files, resolves cross-references, builds
//! the craft's storage and background dispatcher.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers used by [`load_craft`].

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use vesselflow_background::component::Component;
use vesselflow_background::{BackgroundDispatcher, BackgroundPart, BackgroundSettings, DispatchError};
use vesselflow_core::handler::VesselResourceHandler;
use vesselflow_core::id::UnitId;
use vesselflow_core::settings::{SettingsError, SimSettings};
use vesselflow_core::storage::{StorageContext, TankSnapshot, Tanks};

use crate::schema::{CraftData, PartData, SettingsData};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A tank holds a negative, non-finite or overfull amount.
    #[error("invalid tank of '{resource}' on part '{part}' in {file}")]
    InvalidTank {
        file: PathBuf,
        part: String,
        resource: String,
    },

    #[error("invalid settings in {file}: {source}")]
    InvalidSettings {
        file: PathBuf,
        #[source]
        source: SettingsError,
    },

    #[error("invalid module on part '{part}' in {file}: {source}")]
    Module {
        file: PathBuf,
        part: String,
        #[source]
        source: DispatchError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Craft loading
// ===========================================================================

/// A craft ready for background simulation.
#[derive(Debug)]
pub struct LoadedCraft {
    pub name: String,
    pub settings: SimSettings,
    pub background_settings: BackgroundSettings,
    pub storage: Tanks<TankSnapshot>,
    pub dispatcher: BackgroundDispatcher,
}

impl LoadedCraft {
    /// A background-context handler over this craft's storage.
    pub fn handler(&self) -> Result<VesselResourceHandler, SettingsError> {
        let mut handler =
            VesselResourceHandler::with_settings(StorageContext::Background, self.settings.clone())?;
        handler.init(&self.storage);
        Ok(handler)
    }
}

/// Load `settings.*` (optional) and `craft.*` (required) from `dir`.
pub fn load_craft(dir: &Path) -> Result<LoadedCraft, DataLoadError> {
    let settings = match find_data_file(dir, "settings")? {
        Some(path) => {
            let data: SettingsData = deserialize_file(&path)?;
            data.engine
                .validate()
                .map_err(|source| DataLoadError::InvalidSettings { file: path, source })?;
            data
        }
        None => SettingsData::default(),
    };

    let craft_path = require_data_file(dir, "craft")?;
    let craft: CraftData = deserialize_file(&craft_path)?;

    let mut storage = Tanks::background();
    let mut dispatcher = BackgroundDispatcher::new(settings.background.clone());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for part in craft.parts {
        check_duplicate(&seen, &part.name, &craft_path)?;
        let index = build_part(part, &craft_path, &mut storage, &mut dispatcher, &mut seen)?;
        tracing::trace!(part = index, "loaded part");
    }

    tracing::debug!(
        craft = %craft.name,
        parts = dispatcher.parts().len(),
        units = storage.len(),
        modules = dispatcher.module_count(),
        "loaded craft"
    );

    Ok(LoadedCraft {
        name: craft.name,
        settings: settings.engine,
        background_settings: settings.background,
        storage,
        dispatcher,
    })
}

fn build_part(
    part: PartData,
    file: &Path,
    storage: &mut Tanks<TankSnapshot>,
    dispatcher: &mut BackgroundDispatcher,
    seen: &mut HashMap<String, usize>,
) -> Result<usize, DataLoadError> {
    let mut tanks: HashMap<String, UnitId> = HashMap::new();
    let mut background = BackgroundPart::new(part.name.as_str()).with_crew(part.crew);

    for tank in part.tanks {
        let valid = tank.amount.is_finite()
            && tank.max_amount.is_finite()
            && tank.amount >= 0.0
            && tank.amount <= tank.max_amount;
        if !valid {
            return Err(DataLoadError::InvalidTank {
                file: file.to_path_buf(),
                part: part.name,
                resource: tank.resource,
            });
        }
        let resource = tank.resource.clone();
        let id = storage.insert(tank);
        tanks.entry(resource).or_insert(id);
        background = background.with_unit(id);
    }

    let index = dispatcher.add_part(background);
    for module in part.modules {
        if let Component::CryoTank(cryo) = &module.config {
            for fuel in &cryo.fuels {
                resolve_name(&tanks, &fuel.resource, file, "tank")?;
            }
        }
        dispatcher
            .add_module(index, &module.module, module.enabled, module.config)
            .map_err(|source| DataLoadError::Module {
                file: file.to_path_buf(),
                part: part.name.clone(),
                source,
            })?;
    }

    seen.insert(part.name, index);
    Ok(index)
}

// ===========================================================================
// Tests
// ===========================================================================

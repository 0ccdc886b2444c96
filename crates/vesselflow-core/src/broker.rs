//! Flow-attribution identities.
//!
//! A broker answers "who moved this resource" for diagnostics. Brokers carry
//! no control logic: the engine only uses them to key per-pool ledgers.
//! The registry is an explicit value created once by the host and passed by
//! reference to whoever needs to resolve a broker by key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::BrokerId;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Coarse grouping of brokers for UI filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrokerCategory {
    Unknown,
    Generator,
    Converter,
    SolarPanel,
    Harvester,
    Rtg,
    FuelCell,
    LifeSupport,
    VesselSystem,
    Crew,
    Comms,
    Science,
    Radiator,
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// An interned flow-attribution identity. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broker {
    pub id: BrokerId,
    /// Stable lookup key.
    pub key: String,
    pub category: BrokerCategory,
    /// Display title. Falls back to the key when none was given.
    pub title: String,
}

/// Net rate attributed to one broker after a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrokerRate {
    pub broker: BrokerId,
    /// Units per second. Positive for production, negative for consumption.
    pub rate: f64,
    /// True for rates reported by interval rules (averaged over the
    /// interval rather than measured this step).
    pub averaged: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("unknown broker key: {0}")]
    UnknownKey(String),
}

// ---------------------------------------------------------------------------
// Well-known brokers
// ---------------------------------------------------------------------------

/// Brokers that every registry pre-registers at fixed ids.
pub mod well_known {
    use super::BrokerCategory;
    use crate::id::BrokerId;

    /// Fallback for flows recorded without an explicit broker.
    pub const OTHERS: BrokerId = BrokerId(0);
    /// Storage changes made outside the engine.
    pub const EXTERNAL: BrokerId = BrokerId(1);
    pub const SOLAR_PANEL: BrokerId = BrokerId(2);
    pub const RTG: BrokerId = BrokerId(3);
    pub const FISSION_REACTOR: BrokerId = BrokerId(4);
    pub const CONVERTER: BrokerId = BrokerId(5);
    pub const DRILL: BrokerId = BrokerId(6);
    pub const HARVESTER: BrokerId = BrokerId(7);
    pub const SCIENCE_LAB: BrokerId = BrokerId(8);
    pub const LIGHT: BrokerId = BrokerId(9);
    pub const COMMAND: BrokerId = BrokerId(10);
    pub const BOILOFF: BrokerId = BrokerId(11);
    pub const CRYOTANK: BrokerId = BrokerId(12);
    pub const GREENHOUSE: BrokerId = BrokerId(13);
    pub const RADIATOR: BrokerId = BrokerId(14);
    pub const COMMS_IDLE: BrokerId = BrokerId(15);
    pub const COMMS_XMIT: BrokerId = BrokerId(16);
    pub const HABITAT: BrokerId = BrokerId(17);
    pub const ENVIRONMENT: BrokerId = BrokerId(18);
    pub const SCANNER: BrokerId = BrokerId(19);
    pub const PROCESS: BrokerId = BrokerId(20);

    /// `(id, key, category, title)` in id order.
    pub(super) const ALL: [(BrokerId, &str, BrokerCategory, &str); 21] = [
        (OTHERS, "Others", BrokerCategory::Unknown, "others"),
        (EXTERNAL, "Unknown", BrokerCategory::Unknown, "unknown"),
        (SOLAR_PANEL, "SolarPanel", BrokerCategory::SolarPanel, "solar panel"),
        (RTG, "RTG", BrokerCategory::Rtg, "RTG"),
        (FISSION_REACTOR, "FissionReactor", BrokerCategory::Converter, "fission reactor"),
        (CONVERTER, "Converter", BrokerCategory::Converter, "converter"),
        (DRILL, "Drill", BrokerCategory::Harvester, "drill"),
        (HARVESTER, "Harvester", BrokerCategory::Harvester, "harvester"),
        (SCIENCE_LAB, "ScienceLab", BrokerCategory::Science, "science lab"),
        (LIGHT, "Light", BrokerCategory::VesselSystem, "light"),
        (COMMAND, "Command", BrokerCategory::VesselSystem, "command"),
        (BOILOFF, "Boiloff", BrokerCategory::VesselSystem, "boiloff"),
        (CRYOTANK, "Cryotank", BrokerCategory::VesselSystem, "cryotank"),
        (GREENHOUSE, "Greenhouse", BrokerCategory::LifeSupport, "greenhouse"),
        (RADIATOR, "Radiator", BrokerCategory::Radiator, "radiator"),
        (COMMS_IDLE, "CommsIdle", BrokerCategory::Comms, "comms (idle)"),
        (COMMS_XMIT, "CommsXmit", BrokerCategory::Comms, "comms (transmitting)"),
        (HABITAT, "Habitat", BrokerCategory::LifeSupport, "habitat"),
        (ENVIRONMENT, "Environment", BrokerCategory::LifeSupport, "environment"),
        (SCANNER, "Scanner", BrokerCategory::VesselSystem, "scanner"),
        (PROCESS, "Process", BrokerCategory::Converter, "process"),
    ];
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Append-only catalog of brokers. One instance per key (interning).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerRegistry {
    brokers: Vec<Broker>,
    by_key: HashMap<String, BrokerId>,
}

impl Default for BrokerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerRegistry {
    /// Create a registry holding the well-known brokers.
    pub fn new() -> Self {
        let mut registry = Self {
            brokers: Vec::with_capacity(well_known::ALL.len()),
            by_key: HashMap::new(),
        };
        for (_, key, category, title) in well_known::ALL {
            registry.get_or_create(key, category, Some(title));
        }
        registry
    }

    /// Return the broker registered under `key`, registering it first if
    /// needed. An existing broker keeps its original category and title.
    pub fn get_or_create(
        &mut self,
        key: &str,
        category: BrokerCategory,
        title: Option<&str>,
    ) -> BrokerId {
        if let Some(&id) = self.by_key.get(key) {
            return id;
        }
        let id = BrokerId(self.brokers.len() as u32);
        self.brokers.push(Broker {
            id,
            key: key.to_string(),
            category,
            title: title.unwrap_or(key).to_string(),
        });
        self.by_key.insert(key.to_string(), id);
        tracing::debug!(key, ?category, ?id, "registered broker");
        id
    }

    /// Look up a broker id by key.
    pub fn lookup(&self, key: &str) -> Result<BrokerId, BrokerError> {
        self.by_key
            .get(key)
            .copied()
            .ok_or_else(|| BrokerError::UnknownKey(key.to_string()))
    }

    pub fn get(&self, id: BrokerId) -> Option<&Broker> {
        self.brokers.get(id.0 as usize)
    }

    /// Display title, or the key of the generic "others" broker for ids this
    /// registry never issued.
    pub fn title(&self, id: BrokerId) -> &str {
        self.get(id)
            .or_else(|| self.get(well_known::OTHERS))
            .map(|b| b.title.as_str())
            .unwrap_or("others")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Broker> {
        self.brokers.iter()
    }

    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_brokers_have_fixed_ids() {
        let registry = BrokerRegistry::new();
        for (id, key, category, _) in well_known::ALL {
            let broker = registry.get(id).unwrap();
            assert_eq!(broker.key, key);
            assert_eq!(broker.category, category);
            assert_eq!(registry.lookup(key).unwrap(), id);
        }
        assert_eq!(registry.len(), well_known::ALL.len());
    }

    #[test]
    fn get_or_create_interns() {
        let mut registry = BrokerRegistry::new();
        let a = registry.get_or_create("Greenhouse42", BrokerCategory::LifeSupport, None);
        let b = registry.get_or_create("Greenhouse42", BrokerCategory::Generator, Some("ignored"));
        assert_eq!(a, b);
        let broker = registry.get(a).unwrap();
        assert_eq!(broker.category, BrokerCategory::LifeSupport);
    }

    #[test]
    fn title_falls_back_to_key() {
        let mut registry = BrokerRegistry::new();
        let id = registry.get_or_create("ScrubberMk2", BrokerCategory::LifeSupport, None);
        assert_eq!(registry.title(id), "ScrubberMk2");
        let titled = registry.get_or_create("Fan", BrokerCategory::VesselSystem, Some("cabin fan"));
        assert_eq!(registry.title(titled), "cabin fan");
    }

    #[test]
    fn unknown_key_is_an_error() {
        let registry = BrokerRegistry::new();
        match registry.lookup("NoSuchBroker") {
            Err(BrokerError::UnknownKey(key)) => assert_eq!(key, "NoSuchBroker"),
            other => panic!("expected UnknownKey, got: {other:?}"),
        }
    }

    #[test]
    fn unissued_id_title_is_others() {
        let registry = BrokerRegistry::new();
        assert_eq!(registry.title(BrokerId(9999)), "others");
    }

    #[test]
    fn iteration_is_in_id_order() {
        let mut registry = BrokerRegistry::new();
        registry.get_or_create("Late", BrokerCategory::Unknown, None);
        let ids: Vec<u32> = registry.iter().map(|b| b.id.0).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(registry.iter().last().unwrap().key, "Late");
    }
}

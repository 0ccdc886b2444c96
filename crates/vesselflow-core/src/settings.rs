//! Engine policy constants.
//!
//! Thresholds used by reconciliation and recipe execution were tuned
//! empirically; they live here so hosts can override them from a data file
//! instead of patching the engine.

use serde::{Deserialize, Serialize};

/// Policy constants for pool reconciliation and recipe execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Raise coherency warnings when external producers are detected at
    /// high time compression.
    pub enforce_coherency: bool,
    /// Time-compression rate above which external production is considered
    /// incoherent.
    pub coherency_warp_threshold: f64,
    /// Noise floor for external deltas and capacity-change detection.
    pub external_delta_epsilon: f64,
    /// Ledger entries whose net amount is below this are dropped from the
    /// broker-rate list.
    pub broker_rate_epsilon: f64,
    /// Deltas at or below this magnitude are not written to storage units.
    pub min_sync_delta: f64,
    /// A recipe step that advances less than this is considered stalled.
    pub recipe_epsilon: f64,
    /// Number of timesteps during which rate reporting is suppressed after
    /// the timestep length changes.
    pub rate_suppression_steps: u32,
    /// Ratio between two consecutive timestep lengths that counts as a change.
    pub timestep_change_ratio: f64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            enforce_coherency: true,
            coherency_warp_threshold: 1000.0,
            external_delta_epsilon: 1e-5,
            broker_rate_epsilon: 1e-7,
            min_sync_delta: 1e-16,
            recipe_epsilon: f64::EPSILON,
            rate_suppression_steps: 3,
            timestep_change_ratio: 2.0,
        }
    }
}

impl SimSettings {
    /// Check that every threshold is usable.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let non_negative = [
            ("coherency_warp_threshold", self.coherency_warp_threshold),
            ("external_delta_epsilon", self.external_delta_epsilon),
            ("broker_rate_epsilon", self.broker_rate_epsilon),
            ("min_sync_delta", self.min_sync_delta),
            ("recipe_epsilon", self.recipe_epsilon),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(SettingsError::Negative { field, value });
            }
        }
        if !(self.timestep_change_ratio >= 1.0) {
            return Err(SettingsError::ChangeRatio(self.timestep_change_ratio));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("setting `{field}` must be a finite non-negative number, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("timestep_change_ratio must be at least 1, got {0}")]
    ChangeRatio(f64),
}

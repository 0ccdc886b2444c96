//! Environmental snapshot handed to the dispatcher.
//!
//! Everything here is computed upstream (orbit, illumination, body
//! proximity) and treated as plain input.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use vesselflow_core::crew::CrewMember;

/// Solar flux at the home body's distance, in W/m².
pub const HOME_SOLAR_FLUX: f64 = 1360.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len > 0.0 {
            Vec3::new(self.x / len, self.y / len, self.z / len)
        } else {
            Vec3::default()
        }
    }
}

/// Conditions a craft experiences over one background step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Total solar flux at the craft, shadow and absorption included.
    pub solar_flux: f64,
    /// Flux at which panel nominal rates are quoted.
    pub reference_solar_flux: f64,
    /// Direction from the craft to the sun, craft frame.
    pub sun_direction: Vec3,
    pub crew: Vec<CrewMember>,
    /// Distance to the surface of the nearest body, in metres.
    pub altitude_m: f64,
    pub landed: bool,
    /// Static pressure in kPa.
    pub pressure_kpa: f64,
    /// Temperature in K.
    pub temperature_k: f64,
    /// Outside air can be breathed.
    pub breathable_atmosphere: bool,
    /// Ambient radiation in rad/s.
    pub radiation: f64,
    /// Local abundance per harvestable resource.
    pub abundances: HashMap<String, f64>,
    /// Seconds since launch.
    pub mission_time_s: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            solar_flux: HOME_SOLAR_FLUX,
            reference_solar_flux: HOME_SOLAR_FLUX,
            sun_direction: Vec3::new(0.0, 0.0, 1.0),
            crew: Vec::new(),
            altitude_m: 0.0,
            landed: false,
            pressure_kpa: 0.0,
            temperature_k: 0.0,
            breathable_atmosphere: false,
            radiation: 0.0,
            abundances: HashMap::new(),
            mission_time_s: 0.0,
        }
    }
}

impl Environment {
    /// `solar_flux / reference_solar_flux`, 0 without a reference.
    pub fn flux_factor(&self) -> f64 {
        if self.reference_solar_flux > 0.0 {
            self.solar_flux / self.reference_solar_flux
        } else {
            0.0
        }
    }

    pub fn abundance(&self, resource: &str) -> f64 {
        self.abundances.get(resource).copied().unwrap_or(0.0)
    }

    pub fn with_abundance(mut self, resource: impl Into<String>, abundance: f64) -> Self {
        self.abundances.insert(resource.into(), abundance);
        self
    }
}

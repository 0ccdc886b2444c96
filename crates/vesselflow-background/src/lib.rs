//! Elapsed-time simulation of crafts under high time compression.
//!
//! A craft that is not simulated frame by frame still produces and consumes.
//! The [`BackgroundDispatcher`] holds the craft's components grouped by part
//! and, once per background step, lets each enabled component record its
//! flows for the whole elapsed interval on the craft's
//! [`VesselResourceHandler`]. The caller then runs the handler's timestep as
//! usual.
//!
//! # Design
//!
//! - Components are a closed enum ([`Component`]); dispatch is a `match`, so
//!   adding a kind is a compile error until every formula handles it.
//! - External module names are classified once, when a module is added.
//!   Unknown names are an error instead of a silent skip.
//! - Components read pool levels from the previous step only.

pub mod component;
pub mod environment;

use serde::{Deserialize, Serialize};
use vesselflow_core::handler::VesselResourceHandler;
use vesselflow_core::id::UnitId;
use vesselflow_core::storage::CraftStorage;

pub use component::{Component, ComponentKind, Outcome, StepContext};
pub use environment::{Environment, Vec3};

// ---------------------------------------------------------------------------
// Settings and errors
// ---------------------------------------------------------------------------

/// Policy constants of the background formulas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSettings {
    /// Multiplier on command-module draw while hibernating.
    pub hibernating_ec_factor: f64,
    pub hours_in_day: f64,
    pub days_in_year: f64,
    /// Tolerance of the converter and drill fill checks.
    pub fill_epsilon: f64,
    /// Cryo cooling cost per stored unit.
    pub cryo_cost_scale: f64,
    /// Power level above which a suspended scanner resumes.
    pub scanner_resume_level: f64,
    /// Resource consumed and produced as electric power.
    pub ec_resource: String,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            hibernating_ec_factor: 0.001,
            hours_in_day: 6.0,
            days_in_year: 426.0,
            fill_epsilon: f64::EPSILON,
            cryo_cost_scale: 0.001,
            scanner_resume_level: 0.25,
            ec_resource: "ElectricCharge".to_string(),
        }
    }
}

impl BackgroundSettings {
    pub fn seconds_per_year(&self) -> f64 {
        3600.0 * self.hours_in_day * self.days_in_year
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown background module `{0}`")]
    UnknownModule(String),
    #[error("module `{module}` is a {expected:?}, but its configuration is a {found:?}")]
    KindMismatch {
        module: String,
        expected: ComponentKind,
        found: ComponentKind,
    },
    #[error("no part at index {0}")]
    UnknownPart(usize),
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// One module instance on a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundModule {
    /// External module name the component was classified from.
    pub module: String,
    pub enabled: bool,
    pub component: Component,
}

/// A part of the craft: its crew, its storage units and its modules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackgroundPart {
    pub name: String,
    pub crew: u32,
    pub units: Vec<UnitId>,
    pub modules: Vec<BackgroundModule>,
}

impl BackgroundPart {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_crew(mut self, crew: u32) -> Self {
        self.crew = crew;
        self
    }

    pub fn with_unit(mut self, unit: UnitId) -> Self {
        self.units.push(unit);
        self
    }
}

/// Counts from one [`BackgroundDispatcher::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Components that recorded flows or queued a recipe.
    pub active: usize,
    /// Enabled components with nothing to do.
    pub idle: usize,
    pub disabled: usize,
    pub recipes_queued: usize,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackgroundDispatcher {
    settings: BackgroundSettings,
    parts: Vec<BackgroundPart>,
}

impl BackgroundDispatcher {
    pub fn new(settings: BackgroundSettings) -> Self {
        Self {
            settings,
            parts: Vec::new(),
        }
    }

    pub fn settings(&self) -> &BackgroundSettings {
        &self.settings
    }

    /// Add a part and return its index.
    pub fn add_part(&mut self, part: BackgroundPart) -> usize {
        self.parts.push(part);
        self.parts.len() - 1
    }

    pub fn parts(&self) -> &[BackgroundPart] {
        &self.parts
    }

    pub fn part_mut(&mut self, index: usize) -> Option<&mut BackgroundPart> {
        self.parts.get_mut(index)
    }

    /// Attach a module to a part. `module` is classified and must match the
    /// kind of `component`.
    pub fn add_module(
        &mut self,
        part: usize,
        module: &str,
        enabled: bool,
        component: Component,
    ) -> Result<(), DispatchError> {
        let expected = ComponentKind::from_module_name(module)?;
        let found = component.kind();
        if expected != found {
            return Err(DispatchError::KindMismatch {
                module: module.to_string(),
                expected,
                found,
            });
        }
        let part = self
            .parts
            .get_mut(part)
            .ok_or(DispatchError::UnknownPart(part))?;
        part.modules.push(BackgroundModule {
            module: module.to_string(),
            enabled,
            component,
        });
        Ok(())
    }

    /// Number of modules across every part.
    pub fn module_count(&self) -> usize {
        self.parts.iter().map(|p| p.modules.len()).sum()
    }

    /// Record every enabled component's flows over `elapsed_s` on `handler`.
    pub fn update(
        &mut self,
        handler: &mut VesselResourceHandler,
        storage: &dyn CraftStorage,
        environment: &Environment,
        elapsed_s: f64,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let recipes_before = handler.pending_recipes();

        for part in &mut self.parts {
            for module in &mut part.modules {
                if !module.enabled {
                    summary.disabled += 1;
                    continue;
                }
                let mut cx = StepContext {
                    handler: &mut *handler,
                    storage,
                    environment,
                    settings: &self.settings,
                    part_crew: part.crew,
                    part_units: &part.units,
                    elapsed_s,
                };
                match module.component.apply(&mut cx) {
                    Outcome::Recorded | Outcome::RecipeQueued => summary.active += 1,
                    Outcome::Idle(reason) => {
                        tracing::debug!(part = %part.name, module = %module.module, reason, "component idle");
                        summary.idle += 1;
                    }
                }
            }
        }

        summary.recipes_queued = handler.pending_recipes() - recipes_before;
        tracing::trace!(?summary, elapsed_s, "background dispatch");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{FissionGenerator, Light, ResourceRate};
    use vesselflow_core::handler::Timestep;
    use vesselflow_core::test_utils::*;

    fn reactor() -> Component {
        Component::FissionGenerator(FissionGenerator {
            power_generation: 10.0,
            power_percent: 100.0,
        })
    }

    #[test]
    fn add_module_checks_kind() {
        let mut dispatcher = BackgroundDispatcher::default();
        let part = dispatcher.add_part(BackgroundPart::new("reactor"));
        dispatcher
            .add_module(part, "FissionGenerator", true, reactor())
            .unwrap();

        match dispatcher.add_module(part, "ModuleLight", true, reactor()) {
            Err(DispatchError::KindMismatch { expected, found, .. }) => {
                assert_eq!(expected, ComponentKind::Light);
                assert_eq!(found, ComponentKind::FissionGenerator);
            }
            other => panic!("expected KindMismatch, got: {other:?}"),
        }
        assert!(matches!(
            dispatcher.add_module(part, "ModuleWheel", true, reactor()),
            Err(DispatchError::UnknownModule(_))
        ));
        assert!(matches!(
            dispatcher.add_module(9, "FissionGenerator", true, reactor()),
            Err(DispatchError::UnknownPart(9))
        ));
        assert_eq!(dispatcher.module_count(), 1);
    }

    #[test]
    fn update_counts_and_applies() {
        let mut tanks = background_tanks(&[(EC, 0.0, 1000.0)]);
        let mut handler = background_handler_for(&tanks);
        let mut dispatcher = BackgroundDispatcher::default();
        let part = dispatcher.add_part(BackgroundPart::new("core"));
        dispatcher
            .add_module(part, "FissionGenerator", true, reactor())
            .unwrap();
        dispatcher
            .add_module(
                part,
                "ModuleLight",
                true,
                Component::Light(Light {
                    on: false,
                    use_resources: true,
                    resource_amount: 1.0,
                }),
            )
            .unwrap();
        dispatcher
            .add_module(part, "FissionGenerator", false, reactor())
            .unwrap();

        let summary = dispatcher.update(&mut handler, &tanks, &Environment::default(), 5.0);
        assert_eq!(
            summary,
            DispatchSummary {
                active: 1,
                idle: 1,
                disabled: 1,
                recipes_queued: 0,
            }
        );
        handler.run_timestep(&mut tanks, &mut [], Timestep::new(5.0));
        assert!((handler.pool(EC).unwrap().amount() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn recipes_are_counted() {
        let tanks = background_tanks(&[(EC, 100.0, 100.0), (ORE, 100.0, 100.0)]);
        let mut handler = background_handler_for(&tanks);
        let mut dispatcher = BackgroundDispatcher::default();
        let part = dispatcher.add_part(BackgroundPart::new("isru"));
        dispatcher
            .add_module(
                part,
                "ModuleGenerator",
                true,
                Component::Generator(component::Generator {
                    active: true,
                    inputs: vec![ResourceRate::new(ORE, 1.0)],
                    outputs: vec![ResourceRate::new("LiquidFuel", 0.5)],
                }),
            )
            .unwrap();
        let summary = dispatcher.update(&mut handler, &tanks, &Environment::default(), 1.0);
        assert_eq!(summary.recipes_queued, 1);
    }

    #[test]
    fn seconds_per_year_uses_local_calendar() {
        assert_eq!(BackgroundSettings::default().seconds_per_year(), 3600.0 * 6.0 * 426.0);
    }
}

//! Background component kinds and their elapsed-time formulas.
//!
//! Each kind computes its production and consumption for a whole elapsed
//! interval in one call, straight from its configuration and the
//! environment. Levels and amounts read from pools are those of the previous
//! step, so a component never reacts to its own output.

use serde::{Deserialize, Serialize};
use vesselflow_core::broker::well_known;
use vesselflow_core::crew::{CrewMember, best_level};
use vesselflow_core::handler::VesselResourceHandler;
use vesselflow_core::id::UnitId;
use vesselflow_core::recipe::Recipe;
use vesselflow_core::storage::{CraftStorage, StorageUnit};

const WASTE_ATMOSPHERE: &str = "WasteAtmosphere";
const CARBON_DIOXIDE: &str = "CarbonDioxide";
const OXYGEN: &str = "Oxygen";

use crate::environment::{Environment, Vec3};
use crate::{BackgroundSettings, DispatchError};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Closed set of component kinds simulated in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    SolarPanel,
    Generator,
    Converter,
    Drill,
    AsteroidDrill,
    ScienceLab,
    Light,
    Command,
    FissionGenerator,
    RadioisotopeGenerator,
    CryoTank,
    Greenhouse,
    Harvester,
    Scanner,
    Process,
}

impl ComponentKind {
    /// Classify an external module name.
    pub fn from_module_name(name: &str) -> Result<Self, DispatchError> {
        let kind = match name {
            "SolarPanelFixer" | "ModuleDeployableSolarPanel" => Self::SolarPanel,
            "ModuleGenerator" => Self::Generator,
            "ModuleResourceConverter" | "ModuleKPBSConverter" | "FissionReactor" => Self::Converter,
            "ModuleResourceHarvester" => Self::Drill,
            "ModuleAsteroidDrill" => Self::AsteroidDrill,
            "ModuleScienceConverter" => Self::ScienceLab,
            "ModuleLight" | "ModuleColoredLensLight" | "ModuleMultiPointSurfaceLight" => Self::Light,
            "ModuleCommand" => Self::Command,
            "FissionGenerator" => Self::FissionGenerator,
            "ModuleRadioisotopeGenerator" => Self::RadioisotopeGenerator,
            "ModuleCryoTank" => Self::CryoTank,
            "Greenhouse" => Self::Greenhouse,
            "Harvester" => Self::Harvester,
            "KerbalismScansat" => Self::Scanner,
            "KerbalismProcess" | "ProcessController" => Self::Process,
            other => return Err(DispatchError::UnknownModule(other.to_string())),
        };
        Ok(kind)
    }
}

// ---------------------------------------------------------------------------
// Shared configuration pieces
// ---------------------------------------------------------------------------

/// A resource and its rate per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRate {
    pub resource: String,
    pub rate: f64,
}

impl ResourceRate {
    pub fn new(resource: impl Into<String>, rate: f64) -> Self {
        Self {
            resource: resource.into(),
            rate,
        }
    }
}

/// Converter output with its dump flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRate {
    pub resource: String,
    pub rate: f64,
    #[serde(default)]
    pub dump: bool,
}

/// Crew experience bonus of converters and drills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialistBonus {
    pub enabled: bool,
    /// Crew effect that qualifies a member.
    pub effect: String,
    pub efficiency: f64,
    pub base: f64,
    pub factor: f64,
}

impl Default for SpecialistBonus {
    fn default() -> Self {
        Self {
            enabled: false,
            effect: String::new(),
            efficiency: 1.0,
            base: 1.0,
            factor: 0.0,
        }
    }
}

/// `efficiency × base` without qualifying crew, otherwise
/// `efficiency × (base + factor × (best_level + 1))`.
pub fn specialist_bonus(bonus: &SpecialistBonus, crew: &[CrewMember]) -> f64 {
    let level = if bonus.enabled {
        best_level(crew, &bonus.effect)
    } else {
        None
    };
    match level {
        None => bonus.efficiency * bonus.base,
        Some(level) => bonus.efficiency * (bonus.base + bonus.factor * (level as f64 + 1.0)),
    }
}

/// How a solar panel faces the sun.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PanelOrientation {
    /// Fixed surface normal.
    Fixed { normal: Vec3 },
    /// Sun-tracking, rotating around `pivot` if one is modelled.
    Tracking { pivot: Option<Vec3> },
}

/// Fraction of the panel's nominal output its orientation allows.
pub fn cosine_factor(orientation: PanelOrientation, sun_direction: Vec3) -> f64 {
    let sun = sun_direction.normalized();
    match orientation {
        PanelOrientation::Fixed { normal } => sun.dot(normal.normalized()).max(0.0),
        PanelOrientation::Tracking { pivot: Some(pivot) } => {
            let d = sun.dot(pivot.normalized()).clamp(-1.0, 1.0);
            (std::f64::consts::FRAC_PI_2 - d.acos()).cos()
        }
        PanelOrientation::Tracking { pivot: None } => 1.0,
    }
}

/// Amount lost from `amount` over `elapsed_s` at `per_hour_rate`
/// (fraction per hour).
pub fn boiloff_loss(amount: f64, per_hour_rate: f64, elapsed_s: f64) -> f64 {
    if amount <= 0.0 || per_hour_rate <= 0.0 || elapsed_s <= 0.0 {
        return 0.0;
    }
    let rate = per_hour_rate.min(1.0);
    amount * (1.0 - (1.0 - rate).powf(elapsed_s / 3600.0))
}

// ---------------------------------------------------------------------------
// Component configurations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarPanel {
    /// EC per second at the reference flux, perfectly oriented.
    pub nominal_rate: f64,
    pub orientation: PanelOrientation,
    /// Panel is deployed and able to produce.
    #[serde(default = "enabled")]
    pub deployed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub active: bool,
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    #[serde(default)]
    pub outputs: Vec<ResourceRate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Converter {
    pub active: bool,
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    #[serde(default)]
    pub outputs: Vec<OutputRate>,
    /// Output level at which the converter stops.
    #[serde(default = "full")]
    pub fill_amount: f64,
    #[serde(default)]
    pub bonus: SpecialistBonus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drill {
    pub active: bool,
    pub resource: String,
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    pub efficiency: f64,
    #[serde(default = "full")]
    pub fill_amount: f64,
    /// Abundance at or below which nothing is extracted.
    #[serde(default)]
    pub harvest_threshold: f64,
    #[serde(default)]
    pub bonus: SpecialistBonus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsteroidDrill {
    pub active: bool,
    pub resource: String,
    pub abundance: f64,
    /// Mass per unit of extracted resource.
    pub density: f64,
    /// Remaining asteroid mass.
    pub mass: f64,
    /// Mass below which the asteroid counts as depleted.
    pub mass_threshold: f64,
    pub efficiency: f64,
    /// EC per second.
    pub power_consumption: f64,
    #[serde(default)]
    pub bonus: SpecialistBonus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScienceLab {
    pub active: bool,
    /// EC per second.
    pub power_requirement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub on: bool,
    #[serde(default = "enabled")]
    pub use_resources: bool,
    /// EC per second.
    pub resource_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub hibernating: bool,
    /// EC per second while awake.
    #[serde(default = "default_command_rate")]
    pub ec_rate: f64,
    #[serde(default)]
    pub minimum_crew: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FissionGenerator {
    /// EC per second at full throttle.
    pub power_generation: f64,
    /// Throttle in percent.
    #[serde(default = "full_percent")]
    pub power_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioisotopeGenerator {
    /// EC per second at launch.
    pub base_power: f64,
    /// Half-life in years.
    pub half_life: f64,
}

/// A fuel kept cold by a cryo tank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryoFuel {
    pub resource: String,
    /// Percent lost per hour without cooling.
    pub boiloff_percent_per_hour: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryoTank {
    pub cooling_enabled: bool,
    /// EC per second per thousand stored units.
    pub cooling_cost: f64,
    pub fuels: Vec<CryoFuel>,
}

/// A crop that grows under sunlight, topped up by lamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Greenhouse {
    pub active: bool,
    /// Crop growth, harvestable at 1.
    #[serde(default)]
    pub growth: f64,
    /// Growth per second while every condition holds.
    pub crop_rate: f64,
    /// EC per second with the lamps at full intensity.
    #[serde(default)]
    pub ec_rate: f64,
    /// Solar flux the crop needs, in W/m².
    pub light_tolerance: f64,
    /// Minimum pressure in kPa; 0 disables the check.
    #[serde(default)]
    pub pressure_tolerance: f64,
    /// Radiation in rad/s the crop dies at; 0 disables the check.
    #[serde(default)]
    pub radiation_tolerance: f64,
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    #[serde(default)]
    pub outputs: Vec<ResourceRate>,
    /// Draw carbon dioxide only when waste atmosphere runs out.
    #[serde(default)]
    pub combine_waste_atmosphere: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Harvester {
    #[serde(default = "enabled")]
    pub deployed: bool,
    pub running: bool,
    pub resource: String,
    /// Output per second at `abundance_rate`.
    pub rate: f64,
    /// Abundance the nominal rate is quoted at.
    pub abundance_rate: f64,
    /// Abundance at or below which nothing is harvested.
    #[serde(default)]
    pub min_abundance: f64,
    /// EC per second.
    pub ec_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scanner {
    pub scanning: bool,
    /// Stopped for lack of power; resumes once the charge recovers.
    #[serde(default)]
    pub suspended: bool,
    /// EC per second while scanning.
    pub ec_rate: f64,
}

/// A resource process whose capacity comes from the part's controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub inputs: Vec<ResourceRate>,
    #[serde(default)]
    pub outputs: Vec<ResourceRate>,
    /// Capacity multiplier on every rate.
    #[serde(default = "full")]
    pub modifier: f64,
    /// Outputs thrown away when there is no room for them.
    #[serde(default)]
    pub dumped: Vec<String>,
}

fn enabled() -> bool {
    true
}

fn full() -> f64 {
    1.0
}

fn full_percent() -> f64 {
    100.0
}

fn default_command_rate() -> f64 {
    0.02
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A configured background component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    SolarPanel(SolarPanel),
    Generator(Generator),
    Converter(Converter),
    Drill(Drill),
    AsteroidDrill(AsteroidDrill),
    ScienceLab(ScienceLab),
    Light(Light),
    Command(Command),
    FissionGenerator(FissionGenerator),
    RadioisotopeGenerator(RadioisotopeGenerator),
    CryoTank(CryoTank),
    Greenhouse(Greenhouse),
    Harvester(Harvester),
    Scanner(Scanner),
    Process(Process),
}

/// What one component did over a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Flows were recorded directly on pools.
    Recorded,
    /// A recipe was queued on the handler.
    RecipeQueued,
    /// Nothing to do; the reason is logged.
    Idle(&'static str),
}

/// Everything a component may read or write while applying one step.
pub struct StepContext<'a> {
    pub handler: &'a mut VesselResourceHandler,
    pub storage: &'a dyn CraftStorage,
    pub environment: &'a Environment,
    pub settings: &'a BackgroundSettings,
    /// Crew aboard the component's part.
    pub part_crew: u32,
    /// Storage units of the component's part.
    pub part_units: &'a [UnitId],
    pub elapsed_s: f64,
}

impl StepContext<'_> {
    fn level(&self, resource: &str) -> f64 {
        self.handler.pool(resource).map(|p| p.level()).unwrap_or(0.0)
    }

    fn amount(&self, resource: &str) -> f64 {
        self.handler.pool(resource).map(|p| p.amount()).unwrap_or(0.0)
    }

    /// Total of `resource` in the part's own units.
    fn part_amount(&self, resource: &str) -> Option<f64> {
        let mut found = false;
        let mut total = 0.0;
        for &id in self.part_units {
            if let Some(unit) = self.storage.unit(id) {
                if unit.resource() == resource {
                    found = true;
                    total += unit.amount();
                }
            }
        }
        found.then_some(total)
    }
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::SolarPanel(_) => ComponentKind::SolarPanel,
            Self::Generator(_) => ComponentKind::Generator,
            Self::Converter(_) => ComponentKind::Converter,
            Self::Drill(_) => ComponentKind::Drill,
            Self::AsteroidDrill(_) => ComponentKind::AsteroidDrill,
            Self::ScienceLab(_) => ComponentKind::ScienceLab,
            Self::Light(_) => ComponentKind::Light,
            Self::Command(_) => ComponentKind::Command,
            Self::FissionGenerator(_) => ComponentKind::FissionGenerator,
            Self::RadioisotopeGenerator(_) => ComponentKind::RadioisotopeGenerator,
            Self::CryoTank(_) => ComponentKind::CryoTank,
            Self::Greenhouse(_) => ComponentKind::Greenhouse,
            Self::Harvester(_) => ComponentKind::Harvester,
            Self::Scanner(_) => ComponentKind::Scanner,
            Self::Process(_) => ComponentKind::Process,
        }
    }

    /// Record this component's effect over `cx.elapsed_s`.
    pub fn apply(&mut self, cx: &mut StepContext<'_>) -> Outcome {
        match self {
            Self::SolarPanel(c) => solar_panel(c, cx),
            Self::Generator(c) => generator(c, cx),
            Self::Converter(c) => converter(c, cx),
            Self::Drill(c) => drill(c, cx),
            Self::AsteroidDrill(c) => asteroid_drill(c, cx),
            Self::ScienceLab(c) => science_lab(c, cx),
            Self::Light(c) => light(c, cx),
            Self::Command(c) => command(c, cx),
            Self::FissionGenerator(c) => fission_generator(c, cx),
            Self::RadioisotopeGenerator(c) => radioisotope_generator(c, cx),
            Self::CryoTank(c) => cryo_tank(c, cx),
            Self::Greenhouse(c) => greenhouse(c, cx),
            Self::Harvester(c) => harvester(c, cx),
            Self::Scanner(c) => scanner(c, cx),
            Self::Process(c) => process(c, cx),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind formulas
// ---------------------------------------------------------------------------

fn solar_panel(c: &SolarPanel, cx: &mut StepContext<'_>) -> Outcome {
    if !c.deployed {
        return Outcome::Idle("panel retracted");
    }
    let env = cx.environment;
    let output = c.nominal_rate * env.flux_factor() * cosine_factor(c.orientation, env.sun_direction);
    if output <= 0.0 {
        return Outcome::Idle("no sunlight");
    }
    cx.handler.produce(
        &cx.settings.ec_resource,
        output * cx.elapsed_s,
        Some(well_known::SOLAR_PANEL),
    );
    Outcome::Recorded
}

fn generator(c: &Generator, cx: &mut StepContext<'_>) -> Outcome {
    if !c.active {
        return Outcome::Idle("inactive");
    }
    let mut recipe = Recipe::new(well_known::CONVERTER);
    for input in &c.inputs {
        recipe.add_input(input.resource.as_str(), input.rate * cx.elapsed_s);
    }
    for output in &c.outputs {
        recipe.add_output(output.resource.as_str(), output.rate * cx.elapsed_s, true);
    }
    cx.handler.add_recipe(recipe);
    Outcome::RecipeQueued
}

fn converter(c: &Converter, cx: &mut StepContext<'_>) -> Outcome {
    if !c.active {
        return Outcome::Idle("inactive");
    }
    let threshold = c.fill_amount - cx.settings.fill_epsilon;
    // Dumped by-products never hold the converter back.
    let mut limiting = c.outputs.iter().filter(|o| !o.dump).peekable();
    let full = limiting.peek().is_some() && limiting.all(|o| cx.level(&o.resource) >= threshold);
    if full {
        return Outcome::Idle("outputs full");
    }
    let scale = specialist_bonus(&c.bonus, &cx.environment.crew) * cx.elapsed_s;
    let mut recipe = Recipe::new(well_known::CONVERTER);
    for input in &c.inputs {
        recipe.add_input(input.resource.as_str(), input.rate * scale);
    }
    for output in &c.outputs {
        recipe.add_output(output.resource.as_str(), output.rate * scale, output.dump);
    }
    cx.handler.add_recipe(recipe);
    Outcome::RecipeQueued
}

fn drill(c: &Drill, cx: &mut StepContext<'_>) -> Outcome {
    if !c.active {
        return Outcome::Idle("inactive");
    }
    if cx.level(&c.resource) >= c.fill_amount - cx.settings.fill_epsilon {
        return Outcome::Idle("output full");
    }
    let abundance = cx.environment.abundance(&c.resource);
    if abundance <= c.harvest_threshold {
        return Outcome::Idle("nothing to harvest");
    }
    let bonus = specialist_bonus(&c.bonus, &cx.environment.crew);
    let mut recipe = Recipe::new(well_known::DRILL);
    for input in &c.inputs {
        recipe.add_input(input.resource.as_str(), input.rate * cx.elapsed_s);
    }
    recipe.add_output(
        c.resource.as_str(),
        abundance * c.efficiency * bonus * cx.elapsed_s,
        true,
    );
    cx.handler.add_recipe(recipe);
    Outcome::RecipeQueued
}

fn asteroid_drill(c: &mut AsteroidDrill, cx: &mut StepContext<'_>) -> Outcome {
    if !c.active {
        return Outcome::Idle("inactive");
    }
    if c.mass <= c.mass_threshold || c.abundance <= f64::EPSILON {
        return Outcome::Idle("asteroid depleted");
    }
    let bonus = specialist_bonus(&c.bonus, &cx.environment.crew);
    let extracted = c.abundance * c.efficiency * bonus * cx.elapsed_s;

    let ec = cx.settings.ec_resource.as_str();
    let mut recipe = Recipe::new(well_known::DRILL);
    recipe
        .add_input(ec, c.power_consumption * cx.elapsed_s)
        .add_output(c.resource.as_str(), extracted, true);
    let had_power = cx.amount(ec) > f64::EPSILON;
    cx.handler.add_recipe(recipe);

    if had_power {
        c.mass -= c.density * extracted;
    }
    Outcome::RecipeQueued
}

fn science_lab(c: &ScienceLab, cx: &mut StepContext<'_>) -> Outcome {
    if !c.active {
        return Outcome::Idle("inactive");
    }
    cx.handler.consume(
        &cx.settings.ec_resource,
        c.power_requirement * cx.elapsed_s,
        Some(well_known::SCIENCE_LAB),
        false,
    );
    Outcome::Recorded
}

fn light(c: &Light, cx: &mut StepContext<'_>) -> Outcome {
    if !c.on || !c.use_resources {
        return Outcome::Idle("off");
    }
    cx.handler.consume(
        &cx.settings.ec_resource,
        c.resource_amount * cx.elapsed_s,
        Some(well_known::LIGHT),
        false,
    );
    Outcome::Recorded
}

fn command(c: &Command, cx: &mut StepContext<'_>) -> Outcome {
    // An uncrewed cabin draws nothing.
    if c.minimum_crew > 0 && cx.part_crew == 0 {
        return Outcome::Idle("no crew");
    }
    let mut rate = c.ec_rate;
    if c.hibernating {
        rate *= cx.settings.hibernating_ec_factor;
    }
    cx.handler.consume(
        &cx.settings.ec_resource,
        rate * cx.elapsed_s,
        Some(well_known::COMMAND),
        true,
    );
    Outcome::Recorded
}

fn fission_generator(c: &FissionGenerator, cx: &mut StepContext<'_>) -> Outcome {
    let output = c.power_generation * c.power_percent * 0.01;
    if output <= 0.0 {
        return Outcome::Idle("throttled down");
    }
    cx.handler.produce(
        &cx.settings.ec_resource,
        output * cx.elapsed_s,
        Some(well_known::FISSION_REACTOR),
    );
    Outcome::Recorded
}

fn radioisotope_generator(c: &RadioisotopeGenerator, cx: &mut StepContext<'_>) -> Outcome {
    let years = cx.environment.mission_time_s / cx.settings.seconds_per_year();
    let remaining = if c.half_life > 0.0 {
        2f64.powf(-years / c.half_life)
    } else {
        0.0
    };
    let output = c.base_power * remaining;
    if output <= 0.0 {
        return Outcome::Idle("decayed");
    }
    cx.handler
        .produce(&cx.settings.ec_resource, output * cx.elapsed_s, Some(well_known::RTG));
    Outcome::Recorded
}

fn cryo_tank(c: &CryoTank, cx: &mut StepContext<'_>) -> Outcome {
    let ec = cx.settings.ec_resource.clone();
    let cooling = c.cooling_enabled && cx.amount(&ec) > f64::EPSILON;
    let unavailability = cx
        .handler
        .pool(&ec)
        .map(|p| 1.0 - p.availability_factor())
        .unwrap_or(1.0);

    let mut cooling_rate = 0.0;
    let mut recorded = false;
    for fuel in &c.fuels {
        if cx.amount(&fuel.resource) <= 0.0 {
            continue;
        }
        let Some(stored) = cx.part_amount(&fuel.resource) else {
            continue;
        };
        let scale = if cooling {
            cooling_rate += c.cooling_cost * stored * cx.settings.cryo_cost_scale;
            unavailability
        } else {
            1.0
        };
        let loss = boiloff_loss(stored, fuel.boiloff_percent_per_hour * 0.01 * scale, cx.elapsed_s);
        if loss > 0.0 {
            cx.handler
                .consume(&fuel.resource, loss, Some(well_known::BOILOFF), true);
            recorded = true;
        }
    }

    if cooling_rate > 0.0 {
        cx.handler
            .consume(&ec, cooling_rate * cx.elapsed_s, Some(well_known::CRYOTANK), false);
        recorded = true;
    }
    if recorded {
        Outcome::Recorded
    } else {
        Outcome::Idle("no stored fuel")
    }
}

fn greenhouse(c: &mut Greenhouse, cx: &mut StepContext<'_>) -> Outcome {
    if !c.active {
        return Outcome::Idle("inactive");
    }
    if c.growth >= 0.99 {
        return Outcome::Idle("ready for harvest");
    }
    let env = cx.environment;
    let dt = cx.elapsed_s;
    let ec = cx.settings.ec_resource.clone();

    let natural = env.solar_flux;
    let mut artificial = (c.light_tolerance - natural).max(0.0);
    if artificial > 0.0 {
        cx.handler.consume(
            &ec,
            c.ec_rate * (artificial / c.light_tolerance) * dt,
            Some(well_known::GREENHOUSE),
            false,
        );
    }
    artificial *= cx.handler.pool(&ec).map(|p| p.availability_factor()).unwrap_or(0.0);

    let breathable = env.breathable_atmosphere;
    let rate_of = |name: &str| c.inputs.iter().find(|i| i.resource == name).map(|i| i.rate);
    let combined = match (rate_of(WASTE_ATMOSPHERE), rate_of(CARBON_DIOXIDE)) {
        (Some(waste), Some(co2)) if c.combine_waste_atmosphere => Some((waste, co2)),
        _ => None,
    };

    let mut recipe = Recipe::new(well_known::GREENHOUSE);
    if let (Some((waste, co2)), false) = (combined, breathable) {
        if let Err(err) = recipe.add_substitutable_input(WASTE_ATMOSPHERE, waste * dt, CARBON_DIOXIDE, co2 * dt) {
            tracing::warn!(%err, "greenhouse inputs rejected");
            return Outcome::Idle("invalid inputs");
        }
    }
    // Amounts compared below are those of the previous step.
    let mut inputs_ok = true;
    for input in &c.inputs {
        let gas = input.resource == WASTE_ATMOSPHERE || input.resource == CARBON_DIOXIDE;
        if gas && (breathable || combined.is_some()) {
            continue;
        }
        recipe.add_input(input.resource.as_str(), input.rate * dt);
        inputs_ok &= cx.amount(&input.resource) > f64::EPSILON;
    }
    if combined.is_some() && !breathable {
        inputs_ok &= cx.amount(WASTE_ATMOSPHERE) > f64::EPSILON || cx.amount(CARBON_DIOXIDE) > f64::EPSILON;
    }
    for output in &c.outputs {
        if breathable && output.resource == OXYGEN {
            continue;
        }
        recipe.add_output(output.resource.as_str(), output.rate * dt, true);
    }
    cx.handler.add_recipe(recipe);

    let lighting = natural + artificial >= c.light_tolerance;
    let pressure = c.pressure_tolerance <= 0.0 || env.pressure_kpa >= c.pressure_tolerance;
    let radiation = c.radiation_tolerance <= 0.0 || env.radiation < c.radiation_tolerance;
    if lighting && pressure && radiation && inputs_ok {
        c.growth = (c.growth + c.crop_rate * dt).min(1.0);
    } else {
        tracing::trace!(lighting, pressure, radiation, inputs_ok, "greenhouse crop not growing");
    }
    Outcome::RecipeQueued
}

fn harvester(c: &Harvester, cx: &mut StepContext<'_>) -> Outcome {
    if !c.deployed || !c.running {
        return Outcome::Idle("inactive");
    }
    let abundance = cx.environment.abundance(&c.resource);
    if abundance <= c.min_abundance || c.abundance_rate <= 0.0 {
        return Outcome::Idle("nothing to harvest");
    }
    let mut recipe = Recipe::new(well_known::HARVESTER);
    recipe
        .add_input(cx.settings.ec_resource.as_str(), c.ec_rate * cx.elapsed_s)
        .add_output(
            c.resource.as_str(),
            c.rate * (abundance / c.abundance_rate) * cx.elapsed_s,
            false,
        );
    cx.handler.add_recipe(recipe);
    Outcome::RecipeQueued
}

fn scanner(c: &mut Scanner, cx: &mut StepContext<'_>) -> Outcome {
    let ec = cx.settings.ec_resource.clone();
    let mut outcome = Outcome::Idle("not scanning");
    if c.scanning && c.ec_rate > f64::EPSILON {
        cx.handler
            .consume(&ec, c.ec_rate * cx.elapsed_s, Some(well_known::SCANNER), false);
        outcome = Outcome::Recorded;
    }
    if c.scanning && cx.amount(&ec) < f64::EPSILON {
        tracing::debug!("scanner suspended: no power");
        c.scanning = false;
        c.suspended = true;
    } else if c.suspended && cx.level(&ec) > cx.settings.scanner_resume_level {
        tracing::debug!("scanner resumed");
        c.scanning = true;
        c.suspended = false;
    }
    outcome
}

fn process(c: &Process, cx: &mut StepContext<'_>) -> Outcome {
    let k = c.modifier.max(0.0);
    if k <= 0.0 {
        return Outcome::Idle("no capacity");
    }
    let scale = k * cx.elapsed_s;
    let mut recipe = Recipe::new(well_known::PROCESS);
    for input in &c.inputs {
        recipe.add_input(input.resource.as_str(), input.rate * scale);
    }
    for output in &c.outputs {
        let dump = c.dumped.iter().any(|d| *d == output.resource);
        recipe.add_output(output.resource.as_str(), output.rate * scale, dump);
    }
    cx.handler.add_recipe(recipe);
    Outcome::RecipeQueued
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesselflow_core::handler::Timestep;
    use vesselflow_core::storage::{StorageContext, TankSnapshot, Tanks};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    struct Craft {
        handler: VesselResourceHandler,
        tanks: Tanks<TankSnapshot>,
        units: Vec<UnitId>,
    }

    fn craft(layout: &[(&str, f64, f64)]) -> Craft {
        let mut tanks = Tanks::background();
        let units = layout
            .iter()
            .map(|&(r, a, m)| tanks.insert(TankSnapshot::new(r, a, m)))
            .collect();
        let mut handler = VesselResourceHandler::new(StorageContext::Background);
        handler.init(&tanks);
        Craft {
            handler,
            tanks,
            units,
        }
    }

    fn apply(component: &mut Component, craft: &mut Craft, env: &Environment, crew: u32, dt: f64) -> Outcome {
        let settings = BackgroundSettings::default();
        let mut cx = StepContext {
            handler: &mut craft.handler,
            storage: &craft.tanks,
            environment: env,
            settings: &settings,
            part_crew: crew,
            part_units: &craft.units,
            elapsed_s: dt,
        };
        component.apply(&mut cx)
    }

    fn ec_deferred(craft: &Craft) -> f64 {
        craft.handler.pool("ElectricCharge").map(|p| p.deferred()).unwrap_or(0.0)
    }

    fn settle(craft: &mut Craft, dt: f64) {
        craft
            .handler
            .run_timestep(&mut craft.tanks, &mut [], Timestep::new(dt));
    }

    fn amount(craft: &Craft, resource: &str) -> f64 {
        craft.handler.pool(resource).map(|p| p.amount()).unwrap_or(0.0)
    }

    #[test]
    fn module_names_classify() {
        assert_eq!(
            ComponentKind::from_module_name("ModuleResourceConverter").unwrap(),
            ComponentKind::Converter
        );
        assert_eq!(
            ComponentKind::from_module_name("FissionReactor").unwrap(),
            ComponentKind::Converter
        );
        assert_eq!(
            ComponentKind::from_module_name("ModuleColoredLensLight").unwrap(),
            ComponentKind::Light
        );
        assert_eq!(
            ComponentKind::from_module_name("KerbalismScansat").unwrap(),
            ComponentKind::Scanner
        );
        assert_eq!(
            ComponentKind::from_module_name("ProcessController").unwrap(),
            ComponentKind::Process
        );
        assert_eq!(
            ComponentKind::from_module_name("Greenhouse").unwrap(),
            ComponentKind::Greenhouse
        );
        assert!(matches!(
            ComponentKind::from_module_name("ModuleEngines"),
            Err(DispatchError::UnknownModule(name)) if name == "ModuleEngines"
        ));
    }

    #[test]
    fn specialist_bonus_with_and_without_crew() {
        let bonus = SpecialistBonus {
            enabled: true,
            effect: "ConverterSkill".into(),
            efficiency: 2.0,
            base: 0.5,
            factor: 0.1,
        };
        assert!(approx(specialist_bonus(&bonus, &[]), 1.0));
        let crew = vec![
            CrewMember::new("Bill", 1).with_effect("ConverterSkill"),
            CrewMember::new("Jeb", 5),
            CrewMember::new("Bob", 3).with_effect("ConverterSkill"),
        ];
        // 2 × (0.5 + 0.1 × 4)
        assert!(approx(specialist_bonus(&bonus, &crew), 1.8));

        let disabled = SpecialistBonus {
            enabled: false,
            ..bonus
        };
        assert!(approx(specialist_bonus(&disabled, &crew), 1.0));
    }

    #[test]
    fn cosine_factors() {
        let sun = Vec3::new(0.0, 0.0, 1.0);
        let facing = PanelOrientation::Fixed {
            normal: Vec3::new(0.0, 0.0, 2.0),
        };
        let away = PanelOrientation::Fixed {
            normal: Vec3::new(0.0, 0.0, -1.0),
        };
        assert!(approx(cosine_factor(facing, sun), 1.0));
        assert_eq!(cosine_factor(away, sun), 0.0);

        // Pivot perpendicular to the sun: full output.
        let perpendicular = PanelOrientation::Tracking {
            pivot: Some(Vec3::new(1.0, 0.0, 0.0)),
        };
        assert!(approx(cosine_factor(perpendicular, sun), 1.0));
        // Pivot pointing at the sun: nothing.
        let aligned = PanelOrientation::Tracking { pivot: Some(sun) };
        assert!(approx(cosine_factor(aligned, sun), 0.0));
        assert_eq!(cosine_factor(PanelOrientation::Tracking { pivot: None }, sun), 1.0);
    }

    #[test]
    fn boiloff_one_hour_at_one_percent() {
        assert!(approx(boiloff_loss(100.0, 0.01, 3600.0), 1.0));
        assert_eq!(boiloff_loss(0.0, 0.01, 3600.0), 0.0);
        assert_eq!(boiloff_loss(100.0, 0.01, 0.0), 0.0);
        // Compounding over two hours.
        assert!(approx(boiloff_loss(100.0, 0.01, 7200.0), 100.0 * (1.0 - 0.99f64.powi(2))));
    }

    #[test]
    fn solar_panel_scales_with_flux() {
        let mut c = craft(&[("ElectricCharge", 0.0, 1000.0)]);
        let mut panel = Component::SolarPanel(SolarPanel {
            nominal_rate: 2.0,
            orientation: PanelOrientation::Tracking { pivot: None },
            deployed: true,
        });
        let env = Environment {
            solar_flux: 680.0,
            ..Default::default()
        };
        assert_eq!(apply(&mut panel, &mut c, &env, 0, 10.0), Outcome::Recorded);
        assert!(approx(ec_deferred(&c), 10.0));

        let dark = Environment {
            solar_flux: 0.0,
            ..Default::default()
        };
        assert!(matches!(apply(&mut panel, &mut c, &dark, 0, 10.0), Outcome::Idle(_)));
    }

    #[test]
    fn converter_stops_when_outputs_full() {
        let mut c = craft(&[("Ore", 100.0, 100.0), ("LiquidFuel", 50.0, 50.0)]);
        let mut converter = Component::Converter(Converter {
            active: true,
            inputs: vec![ResourceRate::new("Ore", 1.0)],
            outputs: vec![OutputRate {
                resource: "LiquidFuel".into(),
                rate: 0.5,
                dump: false,
            }],
            fill_amount: 1.0,
            bonus: SpecialistBonus::default(),
        });
        let env = Environment::default();
        assert!(matches!(apply(&mut converter, &mut c, &env, 0, 1.0), Outcome::Idle(_)));
        assert_eq!(c.handler.pending_recipes(), 0);

        let mut c = craft(&[("Ore", 100.0, 100.0), ("LiquidFuel", 10.0, 50.0)]);
        assert_eq!(apply(&mut converter, &mut c, &env, 0, 1.0), Outcome::RecipeQueued);
        assert_eq!(c.handler.pending_recipes(), 1);
    }

    #[test]
    fn drill_needs_abundance_above_threshold() {
        let mut c = craft(&[("Ore", 0.0, 100.0), ("ElectricCharge", 100.0, 100.0)]);
        let mut drill = Component::Drill(Drill {
            active: true,
            resource: "Ore".into(),
            inputs: vec![ResourceRate::new("ElectricCharge", 1.0)],
            efficiency: 10.0,
            fill_amount: 1.0,
            harvest_threshold: 0.01,
            bonus: SpecialistBonus::default(),
        });
        let barren = Environment::default().with_abundance("Ore", 0.005);
        assert!(matches!(apply(&mut drill, &mut c, &barren, 0, 1.0), Outcome::Idle(_)));
        let rich = Environment::default().with_abundance("Ore", 0.1);
        assert_eq!(apply(&mut drill, &mut c, &rich, 0, 1.0), Outcome::RecipeQueued);
    }

    #[test]
    fn asteroid_drill_consumes_mass_only_with_power() {
        let mut drill = AsteroidDrill {
            active: true,
            resource: "Ore".into(),
            abundance: 0.5,
            density: 0.01,
            mass: 100.0,
            mass_threshold: 50.0,
            efficiency: 2.0,
            power_consumption: 1.0,
            bonus: SpecialistBonus::default(),
        };
        let env = Environment::default();

        let mut unpowered = craft(&[("Ore", 0.0, 100.0), ("ElectricCharge", 0.0, 100.0)]);
        let mut component = Component::AsteroidDrill(drill.clone());
        apply(&mut component, &mut unpowered, &env, 0, 10.0);
        assert_eq!(component, Component::AsteroidDrill(drill.clone()));

        let mut powered = craft(&[("Ore", 0.0, 100.0), ("ElectricCharge", 50.0, 100.0)]);
        apply(&mut component, &mut powered, &env, 0, 10.0);
        // 0.5 × 2 × 10 = 10 extracted, × 0.01 density.
        drill.mass = 99.9;
        match component {
            Component::AsteroidDrill(d) => assert!(approx(d.mass, drill.mass)),
            other => panic!("unexpected component: {other:?}"),
        }
    }

    #[test]
    fn command_module_crew_and_hibernation() {
        let env = Environment::default();
        let mut c = craft(&[("ElectricCharge", 100.0, 100.0)]);
        let mut cabin = Component::Command(Command {
            hibernating: false,
            ec_rate: 0.05,
            minimum_crew: 1,
        });
        assert!(matches!(apply(&mut cabin, &mut c, &env, 0, 10.0), Outcome::Idle(_)));
        assert_eq!(apply(&mut cabin, &mut c, &env, 2, 10.0), Outcome::Recorded);
        assert!(approx(ec_deferred(&c), -0.5));

        let mut c = craft(&[("ElectricCharge", 100.0, 100.0)]);
        let mut uncrewed = Component::Command(Command {
            hibernating: true,
            ec_rate: 0.05,
            minimum_crew: 0,
        });
        apply(&mut uncrewed, &mut c, &env, 0, 1000.0);
        assert!(approx(ec_deferred(&c), -0.05));
        assert!(approx(c.handler.pool("ElectricCharge").unwrap().critical_requests(), 0.05));
    }

    #[test]
    fn fission_generator_throttle() {
        let env = Environment::default();
        let mut c = craft(&[("ElectricCharge", 0.0, 1000.0)]);
        let mut reactor = Component::FissionGenerator(FissionGenerator {
            power_generation: 30.0,
            power_percent: 50.0,
        });
        apply(&mut reactor, &mut c, &env, 0, 2.0);
        assert!(approx(ec_deferred(&c), 30.0));
    }

    #[test]
    fn rtg_decays_with_mission_time() {
        let settings = BackgroundSettings::default();
        let mut c = craft(&[("ElectricCharge", 0.0, 1000.0)]);
        let mut rtg = Component::RadioisotopeGenerator(RadioisotopeGenerator {
            base_power: 1.0,
            half_life: 10.0,
        });
        let env = Environment {
            mission_time_s: 10.0 * settings.seconds_per_year(),
            ..Default::default()
        };
        apply(&mut rtg, &mut c, &env, 0, 100.0);
        assert!(approx(ec_deferred(&c), 50.0));
    }

    #[test]
    fn cryo_tank_without_cooling_boils_at_full_rate() {
        let env = Environment::default();
        let mut c = craft(&[("LqdHydrogen", 100.0, 100.0), ("ElectricCharge", 0.0, 100.0)]);
        let mut tank = Component::CryoTank(CryoTank {
            cooling_enabled: true,
            cooling_cost: 0.1,
            fuels: vec![CryoFuel {
                resource: "LqdHydrogen".into(),
                boiloff_percent_per_hour: 1.0,
            }],
        });
        assert_eq!(apply(&mut tank, &mut c, &env, 0, 3600.0), Outcome::Recorded);
        let fuel = c.handler.pool("LqdHydrogen").unwrap();
        assert!(approx(fuel.deferred(), -1.0));
        assert_eq!(ec_deferred(&c), 0.0);
    }

    #[test]
    fn cryo_tank_with_cooling_charges_power() {
        let env = Environment::default();
        let mut c = craft(&[("LqdHydrogen", 100.0, 100.0), ("ElectricCharge", 100.0, 100.0)]);
        let mut tank = Component::CryoTank(CryoTank {
            cooling_enabled: true,
            cooling_cost: 0.1,
            fuels: vec![CryoFuel {
                resource: "LqdHydrogen".into(),
                boiloff_percent_per_hour: 1.0,
            }],
        });
        apply(&mut tank, &mut c, &env, 0, 100.0);
        // Fully available power: no boil-off, 0.1 × 100 × 0.001 per second.
        assert_eq!(c.handler.pool("LqdHydrogen").unwrap().deferred(), 0.0);
        assert!(approx(ec_deferred(&c), -1.0));
    }

    #[test]
    fn cryo_fuel_outside_part_is_ignored() {
        let env = Environment::default();
        let mut c = craft(&[("ElectricCharge", 0.0, 100.0)]);
        c.tanks.insert(TankSnapshot::new("LqdHydrogen", 100.0, 100.0));
        c.handler.init(&c.tanks);
        let mut tank = Component::CryoTank(CryoTank {
            cooling_enabled: false,
            cooling_cost: 0.1,
            fuels: vec![CryoFuel {
                resource: "LqdHydrogen".into(),
                boiloff_percent_per_hour: 1.0,
            }],
        });
        assert!(matches!(apply(&mut tank, &mut c, &env, 0, 3600.0), Outcome::Idle(_)));
    }
    #[test]
    fn converter_fullness_ignores_dumped_outputs() {
        let env = Environment::default();
        let mut converter = Component::Converter(Converter {
            active: true,
            inputs: vec![ResourceRate::new("Ore", 1.0)],
            outputs: vec![
                OutputRate {
                    resource: "LiquidFuel".into(),
                    rate: 0.5,
                    dump: false,
                },
                OutputRate {
                    resource: "Water".into(),
                    rate: 0.1,
                    dump: true,
                },
            ],
            fill_amount: 1.0,
            bonus: SpecialistBonus::default(),
        });

        // Fuel full, water empty: nothing left worth producing.
        let mut c = craft(&[("Ore", 100.0, 100.0), ("LiquidFuel", 50.0, 50.0), ("Water", 0.0, 10.0)]);
        assert!(matches!(apply(&mut converter, &mut c, &env, 0, 1.0), Outcome::Idle(_)));
        assert_eq!(c.handler.pending_recipes(), 0);

        // Water full, fuel has room: keep converting and dump the water.
        let mut c = craft(&[("Ore", 100.0, 100.0), ("LiquidFuel", 0.0, 50.0), ("Water", 10.0, 10.0)]);
        assert_eq!(apply(&mut converter, &mut c, &env, 0, 1.0), Outcome::RecipeQueued);
        settle(&mut c, 1.0);
        assert!(approx(amount(&c, "LiquidFuel"), 0.5));
        assert!(approx(amount(&c, "Ore"), 99.0));
    }

    fn greenhouse_config() -> Greenhouse {
        Greenhouse {
            active: true,
            growth: 0.0,
            crop_rate: 0.001,
            ec_rate: 2.0,
            light_tolerance: 400.0,
            pressure_tolerance: 0.0,
            radiation_tolerance: 0.0,
            inputs: vec![ResourceRate::new("Water", 0.1)],
            outputs: vec![ResourceRate::new("Oxygen", 0.2)],
            combine_waste_atmosphere: false,
        }
    }

    fn growth_of(component: &Component) -> f64 {
        match component {
            Component::Greenhouse(g) => g.growth,
            other => panic!("unexpected component: {other:?}"),
        }
    }

    #[test]
    fn greenhouse_lamps_make_up_missing_light() {
        let dark = Environment {
            solar_flux: 0.0,
            ..Default::default()
        };
        let mut c = craft(&[("ElectricCharge", 100.0, 100.0), ("Water", 10.0, 10.0), ("Oxygen", 0.0, 10.0)]);
        let mut greenhouse = Component::Greenhouse(greenhouse_config());
        assert_eq!(apply(&mut greenhouse, &mut c, &dark, 0, 10.0), Outcome::RecipeQueued);
        // Lamps at full intensity for 10 s.
        assert!(approx(ec_deferred(&c), -20.0));
        assert!(approx(growth_of(&greenhouse), 0.01));

        // Half the light comes from the sun: half the lamp draw.
        let dim = Environment {
            solar_flux: 200.0,
            ..Default::default()
        };
        let mut c = craft(&[("ElectricCharge", 100.0, 100.0), ("Water", 10.0, 10.0), ("Oxygen", 0.0, 10.0)]);
        apply(&mut greenhouse, &mut c, &dim, 0, 10.0);
        assert!(approx(ec_deferred(&c), -10.0));
        assert!(approx(growth_of(&greenhouse), 0.02));
    }

    #[test]
    fn greenhouse_stops_growing_in_bad_conditions() {
        let env = Environment {
            radiation: 0.02,
            ..Default::default()
        };
        let mut config = greenhouse_config();
        config.radiation_tolerance = 0.01;
        let mut greenhouse = Component::Greenhouse(config);
        let mut c = craft(&[("Water", 10.0, 10.0), ("Oxygen", 0.0, 10.0)]);
        assert_eq!(apply(&mut greenhouse, &mut c, &env, 0, 10.0), Outcome::RecipeQueued);
        assert_eq!(growth_of(&greenhouse), 0.0);

        // No water left to draw.
        let mut greenhouse = Component::Greenhouse(greenhouse_config());
        let mut c = craft(&[("Water", 0.0, 10.0), ("Oxygen", 0.0, 10.0)]);
        apply(&mut greenhouse, &mut c, &Environment::default(), 0, 10.0);
        assert_eq!(growth_of(&greenhouse), 0.0);

        // Ready crops are left alone.
        let mut config = greenhouse_config();
        config.growth = 0.995;
        let mut greenhouse = Component::Greenhouse(config);
        assert!(matches!(
            apply(&mut greenhouse, &mut c, &Environment::default(), 0, 10.0),
            Outcome::Idle(_)
        ));
    }

    #[test]
    fn greenhouse_draws_carbon_dioxide_when_waste_atmosphere_runs_out() {
        let mut config = greenhouse_config();
        config.inputs = vec![
            ResourceRate::new(WASTE_ATMOSPHERE, 0.2),
            ResourceRate::new(CARBON_DIOXIDE, 0.1),
        ];
        config.combine_waste_atmosphere = true;
        let mut greenhouse = Component::Greenhouse(config);
        let mut c = craft(&[
            (WASTE_ATMOSPHERE, 0.0, 10.0),
            (CARBON_DIOXIDE, 5.0, 10.0),
            ("Oxygen", 0.0, 10.0),
        ]);
        apply(&mut greenhouse, &mut c, &Environment::default(), 0, 10.0);
        assert!(approx(growth_of(&greenhouse), 0.01));
        settle(&mut c, 10.0);
        assert!(approx(amount(&c, CARBON_DIOXIDE), 4.0));
        assert!(approx(amount(&c, "Oxygen"), 2.0));
    }

    #[test]
    fn greenhouse_in_breathable_air_skips_gas_exchange() {
        let env = Environment {
            breathable_atmosphere: true,
            ..Default::default()
        };
        let mut config = greenhouse_config();
        config.inputs.push(ResourceRate::new(CARBON_DIOXIDE, 0.1));
        let mut greenhouse = Component::Greenhouse(config);
        let mut c = craft(&[(CARBON_DIOXIDE, 0.0, 10.0), ("Water", 10.0, 10.0), ("Oxygen", 0.0, 10.0)]);
        apply(&mut greenhouse, &mut c, &env, 0, 10.0);
        // Grows without carbon dioxide and releases no oxygen.
        assert!(approx(growth_of(&greenhouse), 0.01));
        settle(&mut c, 10.0);
        assert_eq!(amount(&c, "Oxygen"), 0.0);
        assert!(approx(amount(&c, "Water"), 9.0));
    }

    #[test]
    fn harvester_scales_with_abundance() {
        let mut harvester = Component::Harvester(Harvester {
            deployed: true,
            running: true,
            resource: "Water".into(),
            rate: 1.0,
            abundance_rate: 0.1,
            min_abundance: 0.01,
            ec_rate: 0.5,
        });
        let mut c = craft(&[("ElectricCharge", 100.0, 100.0), ("Water", 0.0, 100.0)]);
        let env = Environment::default().with_abundance("Water", 0.05);
        assert_eq!(apply(&mut harvester, &mut c, &env, 0, 10.0), Outcome::RecipeQueued);
        settle(&mut c, 10.0);
        assert!(approx(amount(&c, "Water"), 5.0));
        assert!(approx(amount(&c, "ElectricCharge"), 95.0));

        let barren = Environment::default().with_abundance("Water", 0.01);
        assert!(matches!(apply(&mut harvester, &mut c, &barren, 0, 10.0), Outcome::Idle(_)));
    }

    #[test]
    fn scanner_suspends_without_power_and_resumes() {
        let env = Environment::default();
        let mut scanner = Component::Scanner(Scanner {
            scanning: true,
            suspended: false,
            ec_rate: 1.0,
        });
        let mut flat = craft(&[("ElectricCharge", 0.0, 100.0)]);
        assert_eq!(apply(&mut scanner, &mut flat, &env, 0, 10.0), Outcome::Recorded);
        assert_eq!(
            scanner,
            Component::Scanner(Scanner {
                scanning: false,
                suspended: true,
                ec_rate: 1.0,
            })
        );

        // A tenth of a battery is not enough to resume.
        let mut low = craft(&[("ElectricCharge", 10.0, 100.0)]);
        assert!(matches!(apply(&mut scanner, &mut low, &env, 0, 10.0), Outcome::Idle(_)));
        assert_eq!(ec_deferred(&low), 0.0);

        let mut charged = craft(&[("ElectricCharge", 50.0, 100.0)]);
        apply(&mut scanner, &mut charged, &env, 0, 10.0);
        assert_eq!(apply(&mut scanner, &mut charged, &env, 0, 10.0), Outcome::Recorded);
        assert!(approx(ec_deferred(&charged), -10.0));
    }

    #[test]
    fn process_scales_by_modifier_and_dumps_listed_outputs() {
        let env = Environment::default();
        let mut process = Component::Process(Process {
            inputs: vec![ResourceRate::new("Ore", 1.0)],
            outputs: vec![ResourceRate::new("LiquidFuel", 0.5), ResourceRate::new("Water", 0.1)],
            modifier: 2.0,
            dumped: vec!["Water".into()],
        });
        let mut c = craft(&[("Ore", 100.0, 100.0), ("LiquidFuel", 0.0, 100.0), ("Water", 10.0, 10.0)]);
        assert_eq!(apply(&mut process, &mut c, &env, 0, 1.0), Outcome::RecipeQueued);
        settle(&mut c, 1.0);
        assert!(approx(amount(&c, "Ore"), 98.0));
        assert!(approx(amount(&c, "LiquidFuel"), 1.0));
        assert!(approx(amount(&c, "Water"), 10.0));

        let mut idle = Component::Process(Process {
            inputs: vec![ResourceRate::new("Ore", 1.0)],
            outputs: Vec::new(),
            modifier: 0.0,
            dumped: Vec::new(),
        });
        assert!(matches!(apply(&mut idle, &mut c, &env, 0, 1.0), Outcome::Idle(_)));
    }
}

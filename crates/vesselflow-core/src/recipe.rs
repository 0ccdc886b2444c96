//! Proportional N-input / M-output transformations.
//!
//! A recipe is built by a caller for one timestep, queued on the handler,
//! and executed against the pools before reconciliation. Every step scales
//! all inputs and outputs by the same worst-IO ratio, so a recipe never
//! burns one input while starving on another and never overfills a
//! non-dumpable output.

use crate::crew::CrewMember;
use crate::id::BrokerId;
use crate::pool::PoolSet;

/// Entries at or below this quantity are dropped at construction.
pub const DEGENERATE_QUANTITY: f64 = f64::EPSILON;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Interchangeable partner of an input, drawn only for the part of the
/// recipe the input itself cannot cover.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitute {
    pub resource: String,
    /// Quantity consumed by a full execution drawn entirely from the partner.
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeInput {
    pub resource: String,
    /// Quantity consumed by a full execution.
    pub quantity: f64,
    pub substitute: Option<Substitute>,
}

impl RecipeInput {
    /// Whether this entry or its substitute draws from `resource`.
    pub fn draws(&self, resource: &str) -> bool {
        self.resource == resource
            || self.substitute.as_ref().is_some_and(|s| s.resource == resource)
    }

    fn plain(resource: String, quantity: f64) -> Self {
        Self {
            resource,
            quantity,
            substitute: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeOutput {
    pub resource: String,
    /// Quantity produced by a full execution.
    pub quantity: f64,
    /// Excess can be discarded; never limits the recipe.
    pub dump: bool,
}

/// Side-channel reduction of a crew problem counter.
#[derive(Debug, Clone, PartialEq)]
pub struct Cure {
    /// Problem counter (rule) to reduce.
    pub rule: String,
    /// Reduction for a full execution, split among treated crew.
    pub quantity: f64,
    /// Only crew treated for this condition benefit.
    pub condition: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("input `{0}` cannot substitute for itself")]
    SelfSubstitution(String),
    #[error("resource `{0}` is already a recipe input")]
    DuplicateInput(String),
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// A transient proportional transformation attributed to one broker. Never
/// persisted; callers rebuild it every timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    broker: BrokerId,
    inputs: Vec<RecipeInput>,
    outputs: Vec<RecipeOutput>,
    cures: Vec<Cure>,
    remaining: f64,
}

impl Recipe {
    pub fn new(broker: BrokerId) -> Self {
        Self {
            broker,
            inputs: Vec::new(),
            outputs: Vec::new(),
            cures: Vec::new(),
            remaining: 1.0,
        }
    }

    pub fn broker(&self) -> BrokerId {
        self.broker
    }

    pub fn inputs(&self) -> &[RecipeInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[RecipeOutput] {
        &self.outputs
    }

    pub fn cures(&self) -> &[Cure] {
        &self.cures
    }

    /// Fraction of the recipe left to execute.
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Fraction of the recipe executed so far.
    pub fn utilization(&self) -> f64 {
        1.0 - self.remaining
    }

    pub fn add_input(&mut self, resource: impl Into<String>, quantity: f64) -> &mut Self {
        if quantity > DEGENERATE_QUANTITY {
            self.inputs.push(RecipeInput::plain(resource.into(), quantity));
        }
        self
    }

    /// Add a pair of interchangeable inputs. The secondary is only drawn for
    /// the part of the recipe the primary cannot cover. A degenerate member
    /// leaves the other as a plain input.
    pub fn add_substitutable_input(
        &mut self,
        primary: impl Into<String>,
        primary_quantity: f64,
        secondary: impl Into<String>,
        secondary_quantity: f64,
    ) -> Result<&mut Self, RecipeError> {
        let primary = primary.into();
        let secondary = secondary.into();
        if primary == secondary {
            return Err(RecipeError::SelfSubstitution(primary));
        }
        for name in [&primary, &secondary] {
            if self.inputs.iter().any(|i| i.draws(name)) {
                return Err(RecipeError::DuplicateInput(name.clone()));
            }
        }
        let primary_ok = primary_quantity > DEGENERATE_QUANTITY;
        let secondary_ok = secondary_quantity > DEGENERATE_QUANTITY;
        match (primary_ok, secondary_ok) {
            (true, true) => self.inputs.push(RecipeInput {
                resource: primary,
                quantity: primary_quantity,
                substitute: Some(Substitute {
                    resource: secondary,
                    quantity: secondary_quantity,
                }),
            }),
            (true, false) => self.inputs.push(RecipeInput::plain(primary, primary_quantity)),
            (false, true) => self.inputs.push(RecipeInput::plain(secondary, secondary_quantity)),
            (false, false) => {}
        }
        Ok(self)
    }

    pub fn add_output(&mut self, resource: impl Into<String>, quantity: f64, dump: bool) -> &mut Self {
        if quantity > DEGENERATE_QUANTITY {
            self.outputs.push(RecipeOutput {
                resource: resource.into(),
                quantity,
                dump,
            });
        }
        self
    }

    pub fn add_cure(
        &mut self,
        rule: impl Into<String>,
        quantity: f64,
        condition: impl Into<String>,
    ) -> &mut Self {
        if quantity > DEGENERATE_QUANTITY {
            self.cures.push(Cure {
                rule: rule.into(),
                quantity,
                condition: condition.into(),
            });
        }
        self
    }

    /// Drop entries at or below `epsilon`. Substitution pairs that lose a
    /// member are collapsed to a plain input.
    pub fn drop_degenerate(&mut self, epsilon: f64) {
        if epsilon <= DEGENERATE_QUANTITY {
            return;
        }
        let old = std::mem::take(&mut self.inputs);
        for input in old {
            let keep_primary = input.quantity > epsilon;
            match input.substitute {
                Some(partner) if partner.quantity > epsilon => {
                    if keep_primary {
                        self.inputs.push(RecipeInput {
                            substitute: Some(partner),
                            ..input
                        });
                    } else {
                        self.inputs
                            .push(RecipeInput::plain(partner.resource, partner.quantity));
                    }
                }
                _ if keep_primary => {
                    self.inputs.push(RecipeInput::plain(input.resource, input.quantity));
                }
                _ => {}
            }
        }
        self.outputs.retain(|o| o.quantity > epsilon);
        self.cures.retain(|c| c.quantity > epsilon);
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Execute as much of the remaining fraction as pools allow and record the
    /// effect as deferred deltas. Returns whether the step made progress.
    pub fn execute_step(
        &mut self,
        pools: &mut PoolSet,
        crew: &mut [CrewMember],
        epsilon: f64,
    ) -> bool {
        let worst_io = self.worst_input(pools, epsilon).min(self.worst_output(pools));

        for input in &self.inputs {
            let Some(partner) = &input.substitute else {
                pools
                    .get_or_create(&input.resource)
                    .recipe_consume(input.quantity * worst_io, self.broker);
                continue;
            };
            let available = primary_available(pools, input, epsilon);
            let from_primary = available.min(input.quantity * worst_io);
            let uncovered = worst_io - from_primary / input.quantity;
            pools
                .get_or_create(&input.resource)
                .recipe_consume(from_primary, self.broker);
            if uncovered > 0.0 {
                pools
                    .get_or_create(&partner.resource)
                    .recipe_consume(partner.quantity * uncovered, self.broker);
            }
        }

        for output in &self.outputs {
            pools
                .get_or_create(&output.resource)
                .produce(output.quantity * worst_io, Some(self.broker));
        }

        for cure in &self.cures {
            let treated = crew
                .iter()
                .filter(|c| c.is_treated_for(&cure.condition))
                .count();
            if treated == 0 {
                continue;
            }
            let share = cure.quantity * worst_io / treated as f64;
            for member in crew.iter_mut().filter(|c| c.is_treated_for(&cure.condition)) {
                member.reduce_problem(&cure.rule, share);
            }
        }

        self.remaining -= worst_io;
        worst_io > epsilon
    }

    /// Limiting ratio over inputs. Pure-input recipes are not limited and may
    /// drive a pool below zero; the pool clamp absorbs the shortfall.
    fn worst_input(&self, pools: &PoolSet, epsilon: f64) -> f64 {
        let mut worst = self.remaining;
        if self.outputs.is_empty() {
            return worst;
        }
        for input in &self.inputs {
            worst = match &input.substitute {
                None => ratio(pools.available(&input.resource), input.quantity, worst),
                Some(partner) => {
                    let available = primary_available(pools, input, epsilon);
                    if available > 0.0 {
                        ratio(available, input.quantity, worst)
                    } else {
                        ratio(pools.available(&partner.resource), partner.quantity, worst)
                    }
                }
            };
        }
        worst
    }

    /// Limiting ratio over non-dumpable outputs. An output nobody has
    /// referenced yet will become an unbounded virtual pool.
    fn worst_output(&self, pools: &PoolSet) -> f64 {
        let mut worst = self.remaining;
        for output in self.outputs.iter().filter(|o| !o.dump) {
            let room = pools
                .get(&output.resource)
                .map(|p| p.capacity() - (p.amount() + p.deferred()))
                .unwrap_or(f64::MAX);
            worst = ratio(room, output.quantity, worst);
        }
        worst
    }
}

/// What the primary of a substitution pair can give. A residue too small to
/// advance the recipe counts as empty, so the partner takes over.
fn primary_available(pools: &PoolSet, input: &RecipeInput, epsilon: f64) -> f64 {
    let available = pools.available(&input.resource).max(0.0);
    if available > epsilon * input.quantity {
        available
    } else {
        0.0
    }
}

/// `available / quantity` clamped to `[0, upper]`.
fn ratio(available: f64, quantity: f64, upper: f64) -> f64 {
    (available / quantity).max(0.0).min(upper)
}

/// Execute every recipe until a full pass makes no progress.
pub fn execute_all(
    pools: &mut PoolSet,
    recipes: &mut [Recipe],
    crew: &mut [CrewMember],
    epsilon: f64,
) {
    let mut passes = 0u32;
    loop {
        let mut progressed = false;
        for recipe in recipes.iter_mut() {
            if recipe.remaining > epsilon {
                progressed |= recipe.execute_step(pools, crew, epsilon);
            }
        }
        passes += 1;
        if !progressed {
            break;
        }
    }
    tracing::trace!(recipes = recipes.len(), passes, "executed recipes");
}

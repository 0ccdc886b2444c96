use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A crew member aboard a craft, as seen by the resource engine.
///
/// `problems` holds accumulated per-rule problem counters (e.g. radiation
/// dose, stress). Recipe cures reduce them for members whose `treatments`
/// list the cure's condition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CrewMember {
    pub name: String,
    /// Experience level, 0-based. Used for specialist bonuses.
    pub level: u32,
    /// Specialist effects this member provides (e.g. "ConverterSkill").
    #[serde(default)]
    pub effects: Vec<String>,
    /// Conditions currently being treated for this member.
    #[serde(default)]
    pub treatments: Vec<String>,
    #[serde(default)]
    pub problems: HashMap<String, f64>,
}

impl CrewMember {
    pub fn new(name: impl Into<String>, level: u32) -> Self {
        Self {
            name: name.into(),
            level,
            ..Default::default()
        }
    }

    pub fn with_effect(mut self, effect: impl Into<String>) -> Self {
        self.effects.push(effect.into());
        self
    }

    pub fn with_treatment(mut self, condition: impl Into<String>) -> Self {
        self.treatments.push(condition.into());
        self
    }

    pub fn has_effect(&self, effect: &str) -> bool {
        self.effects.iter().any(|e| e == effect)
    }

    pub fn is_treated_for(&self, condition: &str) -> bool {
        self.treatments.iter().any(|t| t == condition)
    }

    pub fn problem(&self, rule: &str) -> f64 {
        self.problems.get(rule).copied().unwrap_or(0.0)
    }

    /// Lower a problem counter, never below zero.
    pub fn reduce_problem(&mut self, rule: &str, amount: f64) {
        let problem = self.problems.entry(rule.to_string()).or_insert(0.0);
        *problem = (*problem - amount).max(0.0);
    }
}

/// Highest level among crew members providing `effect`, if any.
pub fn best_level(crew: &[CrewMember], effect: &str) -> Option<u32> {
    crew.iter()
        .filter(|c| c.has_effect(effect))
        .map(|c| c.level)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_problem_floors_at_zero() {
        let mut member = CrewMember::new("Val", 2);
        member.problems.insert("radiation".into(), 1.5);
        member.reduce_problem("radiation", 1.0);
        assert_eq!(member.problem("radiation"), 0.5);
        member.reduce_problem("radiation", 4.0);
        assert_eq!(member.problem("radiation"), 0.0);
    }

    #[test]
    fn best_level_picks_highest_specialist() {
        let crew = vec![
            CrewMember::new("A", 1).with_effect("ConverterSkill"),
            CrewMember::new("B", 4),
            CrewMember::new("C", 3).with_effect("ConverterSkill"),
        ];
        assert_eq!(best_level(&crew, "ConverterSkill"), Some(3));
        assert_eq!(best_level(&crew, "DrillSkill"), None);
    }

    #[test]
    fn treatment_lookup_is_exact() {
        let member = CrewMember::new("Bob", 0).with_treatment("stress");
        assert!(member.is_treated_for("stress"));
        assert!(!member.is_treated_for("stres"));
    }
}

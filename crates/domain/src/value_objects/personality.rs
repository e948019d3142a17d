//! Personality vectors and enemy morale dispositions.

use serde::{Deserialize, Serialize};

/// Four-trait personality vector steering agent declarations.
///
/// Values are free-form numbers supplied by the session config; the agents
/// only ever render them into prompts, so no range is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Personality {
    pub aggression: f32,
    pub caution: f32,
    pub empathy: f32,
    pub ambition: f32,
}

impl Personality {
    pub fn new(aggression: f32, caution: f32, empathy: f32, ambition: f32) -> Self {
        Self {
            aggression,
            caution,
            empathy,
            ambition,
        }
    }

    /// Short prompt fragment describing the vector.
    pub fn describe(&self) -> String {
        format!(
            "aggression {:.1}, caution {:.1}, empathy {:.1}, ambition {:.1}",
            self.aggression, self.caution, self.empathy, self.ambition
        )
    }
}

/// How an enemy behaves when morale breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoraleDisposition {
    /// Panics and attempts to flee the field.
    #[default]
    FleeWhenBroken,
    /// Lays down arms and becomes a prisoner.
    Surrender,
    /// Ignores morale entirely.
    FightToDeath,
}

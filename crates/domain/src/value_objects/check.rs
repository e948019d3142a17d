//! Pure resolution math for skill checks.
//!
//! The d20 is rolled by the engine's seeded generator and passed in, so
//! every function here is a pure mapping from inputs to outcome. Skilled
//! checks score `attribute x skill + d20`; unskilled checks fall back to
//! `attribute + d20 - 5`.

use serde::{Deserialize, Serialize};

use crate::actions::ActionType;

/// Flat penalty applied when attempting a check without the skill.
pub const UNSKILLED_PENALTY: i32 = 5;

/// Qualitative outcome of a check, determined solely by margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessTier {
    CriticalFailure,
    Failure,
    Marginal,
    Moderate,
    Good,
    Excellent,
    Exceptional,
}

impl SuccessTier {
    /// Map a margin to its tier.
    pub fn from_margin(margin: i32) -> Self {
        match margin {
            m if m <= -20 => SuccessTier::CriticalFailure,
            m if m < 0 => SuccessTier::Failure,
            0..=4 => SuccessTier::Marginal,
            5..=9 => SuccessTier::Moderate,
            10..=14 => SuccessTier::Good,
            15..=19 => SuccessTier::Excellent,
            _ => SuccessTier::Exceptional,
        }
    }

    pub fn is_success(&self) -> bool {
        *self >= SuccessTier::Marginal
    }

    pub fn label(&self) -> &'static str {
        match self {
            SuccessTier::CriticalFailure => "critical_failure",
            SuccessTier::Failure => "failure",
            SuccessTier::Marginal => "marginal",
            SuccessTier::Moderate => "moderate",
            SuccessTier::Good => "good",
            SuccessTier::Excellent => "excellent",
            SuccessTier::Exceptional => "exceptional",
        }
    }
}

/// Base difficulty by action type.
///
/// These constants are canonical; the DM selects the action type and ritual
/// status but cannot adjust the numbers.
pub fn base_difficulty(action_type: ActionType) -> i32 {
    match action_type {
        ActionType::Combat | ActionType::Social => 18,
        ActionType::Sensing | ActionType::Technical => 20,
        // Ritual checks start from the technical baseline before the +4.
        ActionType::Ritual => 20,
        // Movement and reactions are routine.
        ActionType::Move | ActionType::Reaction => 15,
    }
}

/// Full difficulty: base by action type, +4 for rituals, and the scene
/// void modifier (+2 at void 4-6, +4 at 7+).
pub fn compute_difficulty(action_type: ActionType, is_ritual: bool, scene_void_level: u8) -> i32 {
    let mut difficulty = base_difficulty(action_type);
    if is_ritual || action_type == ActionType::Ritual {
        difficulty += 4;
    }
    difficulty += match scene_void_level {
        0..=3 => 0,
        4..=6 => 2,
        _ => 4,
    };
    difficulty
}

/// Outcome of a single resolved check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub roll_d20: i32,
    pub attribute_value: i32,
    /// Skill rank used, if any. `None` marks an unskilled attempt.
    pub skill_value: Option<u8>,
    pub total: i32,
    pub difficulty: i32,
    pub margin: i32,
    pub tier: SuccessTier,
}

impl CheckResult {
    /// Resolve a skilled check: `attribute x skill + d20`.
    pub fn skilled(attribute_value: i32, skill_value: u8, roll_d20: i32, difficulty: i32) -> Self {
        let total = attribute_value * i32::from(skill_value) + roll_d20;
        Self::from_total(total, attribute_value, Some(skill_value), roll_d20, difficulty)
    }

    /// Resolve an unskilled check: `attribute + d20 - 5`.
    pub fn unskilled(attribute_value: i32, roll_d20: i32, difficulty: i32) -> Self {
        let total = attribute_value + roll_d20 - UNSKILLED_PENALTY;
        Self::from_total(total, attribute_value, None, roll_d20, difficulty)
    }

    /// Resolve with an optional skill rank; rank 0 counts as unskilled.
    pub fn resolve(
        attribute_value: i32,
        skill_value: u8,
        roll_d20: i32,
        difficulty: i32,
    ) -> Self {
        if skill_value >= 1 {
            Self::skilled(attribute_value, skill_value, roll_d20, difficulty)
        } else {
            Self::unskilled(attribute_value, roll_d20, difficulty)
        }
    }

    fn from_total(
        total: i32,
        attribute_value: i32,
        skill_value: Option<u8>,
        roll_d20: i32,
        difficulty: i32,
    ) -> Self {
        let margin = total - difficulty;
        Self {
            roll_d20,
            attribute_value,
            skill_value,
            total,
            difficulty,
            margin,
            tier: SuccessTier::from_margin(margin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skilled_total_is_attribute_times_skill_plus_roll() {
        let result = CheckResult::skilled(3, 5, 12, 18);
        assert_eq!(result.total, 27);
        assert_eq!(result.margin, 9);
        assert_eq!(result.tier, SuccessTier::Moderate);
    }

    #[test]
    fn unskilled_total_takes_flat_penalty() {
        let result = CheckResult::unskilled(4, 10, 18);
        assert_eq!(result.total, 9);
        assert_eq!(result.margin, -9);
        assert_eq!(result.tier, SuccessTier::Failure);
    }

    #[test]
    fn resolve_treats_rank_zero_as_unskilled() {
        let unskilled = CheckResult::resolve(4, 0, 10, 18);
        assert_eq!(unskilled.skill_value, None);
        let skilled = CheckResult::resolve(4, 1, 10, 18);
        assert_eq!(skilled.skill_value, Some(1));
        assert_eq!(skilled.total, 14);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(SuccessTier::from_margin(-20), SuccessTier::CriticalFailure);
        assert_eq!(SuccessTier::from_margin(-19), SuccessTier::Failure);
        assert_eq!(SuccessTier::from_margin(-1), SuccessTier::Failure);
        assert_eq!(SuccessTier::from_margin(0), SuccessTier::Marginal);
        assert_eq!(SuccessTier::from_margin(4), SuccessTier::Marginal);
        assert_eq!(SuccessTier::from_margin(5), SuccessTier::Moderate);
        assert_eq!(SuccessTier::from_margin(9), SuccessTier::Moderate);
        assert_eq!(SuccessTier::from_margin(10), SuccessTier::Good);
        assert_eq!(SuccessTier::from_margin(14), SuccessTier::Good);
        assert_eq!(SuccessTier::from_margin(15), SuccessTier::Excellent);
        assert_eq!(SuccessTier::from_margin(19), SuccessTier::Excellent);
        assert_eq!(SuccessTier::from_margin(20), SuccessTier::Exceptional);
    }

    #[test]
    fn identical_inputs_give_identical_outcomes() {
        let a = CheckResult::skilled(3, 4, 17, 20);
        let b = CheckResult::skilled(3, 4, 17, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn difficulty_table() {
        assert_eq!(base_difficulty(ActionType::Combat), 18);
        assert_eq!(base_difficulty(ActionType::Social), 18);
        assert_eq!(base_difficulty(ActionType::Sensing), 20);
        assert_eq!(base_difficulty(ActionType::Technical), 20);
    }

    #[test]
    fn ritual_and_void_modifiers_stack() {
        assert_eq!(compute_difficulty(ActionType::Combat, false, 0), 18);
        assert_eq!(compute_difficulty(ActionType::Combat, true, 0), 22);
        assert_eq!(compute_difficulty(ActionType::Combat, false, 5), 20);
        assert_eq!(compute_difficulty(ActionType::Combat, false, 7), 22);
        assert_eq!(compute_difficulty(ActionType::Ritual, false, 8), 28);
    }

    #[test]
    fn ritual_action_type_does_not_double_the_bonus() {
        // Declaring is_ritual on a ritual action must not add +8.
        assert_eq!(compute_difficulty(ActionType::Ritual, true, 0), 24);
    }
}

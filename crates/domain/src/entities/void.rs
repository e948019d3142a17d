//! Per-character void corruption accounting.
//!
//! Void only moves up through `apply_gain` and down through
//! `apply_reduction`, which keeps the score monotone non-decreasing within
//! a scene apart from explicit DM reduction markers. Gains are rate-limited
//! per action (+1), per round (+2), and per scene (+3, bypassed by the
//! high-risk opt-in); reductions are never capped.

use serde::{Deserialize, Serialize};

/// Hard ceiling on a void score.
pub const VOID_MAX: i32 = 10;

const ACTION_CAP: i32 = 1;
const ROUND_CAP: i32 = 2;
const SCENE_CAP: i32 = 3;

/// One applied void movement, kept for the event log and debrief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidDelta {
    pub round: u32,
    pub delta: i32,
    pub reason: String,
}

/// Rate-limited void score for one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidState {
    score: i32,
    #[serde(default)]
    action_gain: i32,
    #[serde(default)]
    round_gain: i32,
    #[serde(default)]
    scene_gain: i32,
    #[serde(default)]
    history: Vec<VoidDelta>,
}

impl VoidState {
    pub fn new(score: i32) -> Self {
        Self {
            score: score.clamp(0, VOID_MAX),
            action_gain: 0,
            round_gain: 0,
            scene_gain: 0,
            history: Vec::new(),
        }
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn history(&self) -> &[VoidDelta] {
        &self.history
    }

    /// Apply a requested gain, clamped by the per-action, per-round, and
    /// per-scene caps (the scene cap is bypassed when `high_risk` is set).
    ///
    /// Returns the delta actually applied; the caller logs the overflow
    /// when it differs from the request.
    pub fn apply_gain(&mut self, round: u32, requested: i32, reason: &str, high_risk: bool) -> i32 {
        if requested <= 0 {
            return 0;
        }
        let mut allowed = requested
            .min(ACTION_CAP - self.action_gain)
            .min(ROUND_CAP - self.round_gain);
        if !high_risk {
            allowed = allowed.min(SCENE_CAP - self.scene_gain);
        }
        let applied = allowed.max(0).min(VOID_MAX - self.score);
        if applied > 0 {
            self.score += applied;
            self.action_gain += applied;
            self.round_gain += applied;
            self.scene_gain += applied;
            self.history.push(VoidDelta {
                round,
                delta: applied,
                reason: reason.to_string(),
            });
        }
        applied
    }

    /// Apply an uncapped reduction (cleansing rituals). Returns the delta
    /// actually applied, which is negative or zero.
    pub fn apply_reduction(&mut self, round: u32, amount: i32, reason: &str) -> i32 {
        let amount = amount.abs();
        let applied = amount.min(self.score);
        if applied > 0 {
            self.score -= applied;
            self.history.push(VoidDelta {
                round,
                delta: -applied,
                reason: reason.to_string(),
            });
        }
        -applied
    }

    /// Reset the per-action counter; called before each resolution.
    pub fn begin_action(&mut self) {
        self.action_gain = 0;
    }

    /// Reset the per-round counter; called at round start.
    pub fn begin_round(&mut self) {
        self.round_gain = 0;
        self.action_gain = 0;
    }

    /// Reset the per-scene counter; called on story advance or pivot.
    pub fn begin_scene(&mut self) {
        self.scene_gain = 0;
        self.round_gain = 0;
        self.action_gain = 0;
    }
}

impl Default for VoidState {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_capped_per_action() {
        let mut void = VoidState::new(0);
        assert_eq!(void.apply_gain(1, 3, "ritual backlash", false), 1);
        assert_eq!(void.score(), 1);
    }

    #[test]
    fn gain_capped_per_round() {
        let mut void = VoidState::new(0);
        void.apply_gain(1, 1, "a", false);
        void.begin_action();
        void.apply_gain(1, 1, "b", false);
        void.begin_action();
        // Third gain in the same round hits the +2 round cap.
        assert_eq!(void.apply_gain(1, 1, "c", false), 0);
        assert_eq!(void.score(), 2);
    }

    #[test]
    fn gain_capped_per_scene_unless_high_risk() {
        let mut void = VoidState::new(0);
        for round in 1..=3 {
            void.begin_round();
            void.begin_action();
            void.apply_gain(round, 1, "drip", false);
        }
        assert_eq!(void.score(), 3);
        void.begin_round();
        void.begin_action();
        assert_eq!(void.apply_gain(4, 1, "over cap", false), 0);
        assert_eq!(void.apply_gain(4, 1, "high-risk rite", true), 1);
        assert_eq!(void.score(), 4);
    }

    #[test]
    fn scene_reset_reopens_the_cap() {
        let mut void = VoidState::new(0);
        for round in 1..=3 {
            void.begin_round();
            void.apply_gain(round, 1, "drip", false);
        }
        void.begin_scene();
        assert_eq!(void.apply_gain(4, 1, "new scene", false), 1);
    }

    #[test]
    fn reductions_are_uncapped_and_floor_at_zero() {
        let mut void = VoidState::new(7);
        assert_eq!(void.apply_reduction(2, 3, "purification"), -3);
        assert_eq!(void.score(), 4);
        assert_eq!(void.apply_reduction(2, 9, "deep cleanse"), -4);
        assert_eq!(void.score(), 0);
    }

    #[test]
    fn cleanse_then_corrupt_round_trips() {
        let mut void = VoidState::new(5);
        void.apply_reduction(1, 1, "cleanse");
        void.begin_action();
        void.apply_gain(1, 1, "corrupt", false);
        assert_eq!(void.score(), 5);
    }

    #[test]
    fn score_never_exceeds_ten() {
        let mut void = VoidState::new(10);
        assert_eq!(void.apply_gain(1, 1, "saturated", true), 0);
        assert_eq!(void.score(), 10);
    }

    #[test]
    fn history_records_applied_deltas_only() {
        let mut void = VoidState::new(0);
        void.apply_gain(1, 3, "capped", false);
        assert_eq!(void.history().len(), 1);
        assert_eq!(void.history()[0].delta, 1);
    }
}

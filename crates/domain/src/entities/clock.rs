//! Scene clocks: named progress tracks with a lifecycle.
//!
//! Clocks are created by the DM at scenario setup or via `NEW_CLOCK`
//! markers, moved only by the mechanics engine, and archived once their
//! filled consequence has resolved. A clock left untouched long enough
//! expires instead.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Lifecycle state of a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    Active,
    Filled,
    Expired,
    Archived,
}

/// What an expired clock resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryOutcome {
    /// Expired below half full: the threat fizzles.
    CrisisAverted,
    /// Expired at half or more: the situation escalates anyway.
    Escalate,
}

/// A named progress track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneClock {
    pub name: String,
    pub current: u8,
    pub maximum: u8,
    pub description: String,
    pub advance_means: String,
    pub regress_means: String,
    /// Marker text queued for the narration pipeline when the clock fills.
    pub filled_consequence: String,
    pub timeout_rounds: u32,
    pub rounds_alive: u32,
    pub rounds_since_progress: u32,
    pub state: ClockState,
}

impl SceneClock {
    pub fn new(
        name: impl Into<String>,
        maximum: u8,
        description: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("clock name cannot be empty"));
        }
        if maximum == 0 {
            return Err(DomainError::validation("clock maximum must be at least 1"));
        }
        Ok(Self {
            name,
            current: 0,
            maximum,
            description: description.into(),
            advance_means: String::new(),
            regress_means: String::new(),
            filled_consequence: String::new(),
            timeout_rounds: default_timeout(maximum),
            rounds_alive: 0,
            rounds_since_progress: 0,
            state: ClockState::Active,
        })
    }

    pub fn with_consequence(mut self, consequence: impl Into<String>) -> Self {
        self.filled_consequence = consequence.into();
        self
    }

    pub fn with_means(
        mut self,
        advance: impl Into<String>,
        regress: impl Into<String>,
    ) -> Self {
        self.advance_means = advance.into();
        self.regress_means = regress.into();
        self
    }

    pub fn is_active(&self) -> bool {
        self.state == ClockState::Active
    }

    /// Advance by `ticks`, clamped at the maximum. Returns true when this
    /// call filled the clock.
    pub fn advance(&mut self, ticks: u8) -> bool {
        if self.state != ClockState::Active || ticks == 0 {
            return false;
        }
        self.current = self.current.saturating_add(ticks).min(self.maximum);
        self.rounds_since_progress = 0;
        if self.current >= self.maximum {
            self.state = ClockState::Filled;
            true
        } else {
            false
        }
    }

    /// Regress by `ticks`, clamped at zero.
    pub fn regress(&mut self, ticks: u8) {
        if self.state != ClockState::Active || ticks == 0 {
            return;
        }
        self.current = self.current.saturating_sub(ticks);
        self.rounds_since_progress = 0;
    }

    /// Round-boundary bookkeeping. Returns the expiry outcome if this
    /// round pushed the clock past its timeout.
    pub fn note_round(&mut self) -> Option<ExpiryOutcome> {
        if self.state != ClockState::Active {
            return None;
        }
        self.rounds_alive += 1;
        self.rounds_since_progress += 1;
        if self.rounds_since_progress >= self.timeout_rounds {
            self.state = ClockState::Expired;
            Some(if u16::from(self.current) * 2 < u16::from(self.maximum) {
                ExpiryOutcome::CrisisAverted
            } else {
                ExpiryOutcome::Escalate
            })
        } else {
            None
        }
    }

    /// Mark a filled clock's consequence as handled.
    pub fn archive(&mut self) -> Result<(), DomainError> {
        match self.state {
            ClockState::Filled | ClockState::Expired => {
                self.state = ClockState::Archived;
                Ok(())
            }
            _ => Err(DomainError::invalid_state_transition(format!(
                "clock '{}' cannot be archived while {:?}",
                self.name, self.state
            ))),
        }
    }
}

/// Timeout by clock size: small clocks burn out fast.
fn default_timeout(maximum: u8) -> u32 {
    match maximum {
        0..=4 => 4,
        5..=6 => 6,
        7..=8 => 7,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_fills_exactly_at_maximum() {
        let mut clock = SceneClock::new("Reinforcements", 3, "backup inbound").unwrap();
        assert!(!clock.advance(2));
        assert!(clock.advance(1));
        assert_eq!(clock.state, ClockState::Filled);
        assert_eq!(clock.current, 3);
    }

    #[test]
    fn advance_clamps_at_maximum() {
        let mut clock = SceneClock::new("Alarm", 4, "").unwrap();
        assert!(clock.advance(9));
        assert_eq!(clock.current, 4);
    }

    #[test]
    fn regress_clamps_at_zero() {
        let mut clock = SceneClock::new("Alarm", 4, "").unwrap();
        clock.advance(2);
        clock.regress(5);
        assert_eq!(clock.current, 0);
        assert_eq!(clock.state, ClockState::Active);
    }

    #[test]
    fn filled_clock_ignores_further_movement() {
        let mut clock = SceneClock::new("Alarm", 2, "").unwrap();
        clock.advance(2);
        clock.regress(1);
        assert_eq!(clock.current, 2);
    }

    #[test]
    fn timeout_tiers() {
        assert_eq!(default_timeout(3), 4);
        assert_eq!(default_timeout(4), 4);
        assert_eq!(default_timeout(5), 6);
        assert_eq!(default_timeout(6), 6);
        assert_eq!(default_timeout(8), 7);
        assert_eq!(default_timeout(9), 8);
    }

    #[test]
    fn untouched_clock_expires_with_outcome() {
        let mut clock = SceneClock::new("Ambush", 4, "").unwrap();
        clock.advance(1); // below half
        let mut outcome = None;
        for _ in 0..4 {
            outcome = clock.note_round();
        }
        assert_eq!(outcome, Some(ExpiryOutcome::CrisisAverted));
        assert_eq!(clock.state, ClockState::Expired);
    }

    #[test]
    fn half_full_expiry_escalates() {
        let mut clock = SceneClock::new("Ambush", 4, "").unwrap();
        clock.advance(2); // exactly half
        let mut outcome = None;
        for _ in 0..4 {
            outcome = clock.note_round();
        }
        assert_eq!(outcome, Some(ExpiryOutcome::Escalate));
    }

    #[test]
    fn progress_resets_the_timeout() {
        let mut clock = SceneClock::new("Ambush", 4, "").unwrap();
        for _ in 0..3 {
            assert!(clock.note_round().is_none());
        }
        clock.advance(1);
        assert!(clock.note_round().is_none());
        assert_eq!(clock.rounds_since_progress, 1);
    }

    #[test]
    fn archive_requires_terminal_state() {
        let mut clock = SceneClock::new("Alarm", 2, "").unwrap();
        assert!(clock.archive().is_err());
        clock.advance(2);
        assert!(clock.archive().is_ok());
        assert_eq!(clock.state, ClockState::Archived);
    }
}

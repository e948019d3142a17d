//! The scene clock bank with batched updates.
//!
//! Clock movements requested during a round are queued and applied in one
//! batch at cleanup. A single action therefore cannot fill two clocks
//! whose consequences would interact mid-round, and fill detection happens
//! exactly once per batch.

use thiserror::Error;
use tracing::debug;

use aeonisk_domain::entities::{ClockState, ExpiryOutcome, SceneClock};
use aeonisk_domain::events::ClockSnapshot;

/// Error type for clock operations.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Unknown clock: '{0}'")]
    Unknown(String),

    #[error("Ambiguous clock reference '{0}'")]
    Ambiguous(String),

    #[error("Clock '{0}' already exists")]
    Duplicate(String),
}

#[derive(Debug, Clone)]
struct QueuedUpdate {
    clock_name: String,
    ticks: i32,
    reason: String,
}

/// A clock that filled during a batch, with its queued consequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledClock {
    pub name: String,
    pub consequence: String,
}

/// A clock that expired this round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredClock {
    pub name: String,
    pub outcome: ExpiryOutcome,
}

/// Owns every scene clock and the pending update queue.
#[derive(Debug, Default)]
pub struct ClockBank {
    clocks: Vec<SceneClock>,
    queued: Vec<QueuedUpdate>,
}

impl ClockBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, clock: SceneClock) -> Result<(), ClockError> {
        if self.clocks.iter().any(|c| c.name == clock.name) {
            return Err(ClockError::Duplicate(clock.name));
        }
        debug!(clock = %clock.name, maximum = clock.maximum, "clock created");
        self.clocks.push(clock);
        Ok(())
    }

    /// Resolve a marker reference: exact match first, then a unique
    /// case-sensitive substring match in either direction.
    pub fn resolve_name(&self, reference: &str) -> Result<&str, ClockError> {
        if let Some(clock) = self.clocks.iter().find(|c| c.name == reference) {
            return Ok(&clock.name);
        }
        let matches: Vec<&SceneClock> = self
            .clocks
            .iter()
            .filter(|c| c.name.contains(reference) || reference.contains(&c.name))
            .collect();
        match matches.len() {
            0 => Err(ClockError::Unknown(reference.to_string())),
            1 => Ok(&matches[0].name),
            _ => Err(ClockError::Ambiguous(reference.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SceneClock> {
        self.clocks.iter().find(|c| c.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut SceneClock> {
        self.clocks.iter_mut().find(|c| c.name == name)
    }

    /// Queue an update for the cleanup batch. The reference is resolved
    /// now so a bad marker is rejected at parse time, not at cleanup.
    pub fn queue_update(
        &mut self,
        reference: &str,
        ticks: i32,
        reason: &str,
    ) -> Result<(), ClockError> {
        let name = self.resolve_name(reference)?.to_string();
        self.queued.push(QueuedUpdate {
            clock_name: name,
            ticks,
            reason: reason.to_string(),
        });
        Ok(())
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Apply all queued updates. Returns the clocks that filled, with
    /// their consequences, in fill order.
    pub fn apply_batch(&mut self) -> Vec<FilledClock> {
        let queued = std::mem::take(&mut self.queued);
        let mut filled = Vec::new();
        for update in queued {
            let Some(clock) = self.get_mut(&update.clock_name) else {
                continue;
            };
            if !clock.is_active() {
                continue;
            }
            debug!(
                clock = %update.clock_name,
                ticks = update.ticks,
                reason = %update.reason,
                "clock update applied"
            );
            if update.ticks >= 0 {
                if clock.advance(update.ticks.unsigned_abs().min(255) as u8) {
                    filled.push(FilledClock {
                        name: clock.name.clone(),
                        consequence: clock.filled_consequence.clone(),
                    });
                }
            } else {
                clock.regress(update.ticks.unsigned_abs().min(255) as u8);
            }
        }
        filled
    }

    /// Round-boundary bookkeeping; returns any clocks that timed out.
    pub fn note_round(&mut self) -> Vec<ExpiredClock> {
        self.clocks
            .iter_mut()
            .filter_map(|clock| {
                clock.note_round().map(|outcome| ExpiredClock {
                    name: clock.name.clone(),
                    outcome,
                })
            })
            .collect()
    }

    /// Mark a filled or expired clock's consequence as handled.
    pub fn archive(&mut self, name: &str) {
        if let Some(clock) = self.get_mut(name) {
            let _ = clock.archive();
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &SceneClock> {
        self.clocks.iter().filter(|c| c.is_active())
    }

    /// True once every clock has left the active state.
    pub fn all_resolved(&self) -> bool {
        !self.clocks.is_empty() && self.clocks.iter().all(|c| !c.is_active())
    }

    pub fn snapshots(&self) -> Vec<ClockSnapshot> {
        self.clocks
            .iter()
            .map(|c| ClockSnapshot {
                name: c.name.clone(),
                current: c.current,
                maximum: c.maximum,
                state: match c.state {
                    ClockState::Active => "active",
                    ClockState::Filled => "filled",
                    ClockState::Expired => "expired",
                    ClockState::Archived => "archived",
                }
                .to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_with(name: &str, maximum: u8) -> ClockBank {
        let mut bank = ClockBank::new();
        bank.add(
            SceneClock::new(name, maximum, "test clock")
                .unwrap()
                .with_consequence("[SPAWN_ENEMY: Backup | grunt | 2 | Near-Enemy | aggressive_melee]"),
        )
        .unwrap();
        bank
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut bank = bank_with("Alarm", 4);
        assert!(matches!(
            bank.add(SceneClock::new("Alarm", 6, "").unwrap()),
            Err(ClockError::Duplicate(_))
        ));
    }

    #[test]
    fn substring_resolution_is_unique() {
        let mut bank = bank_with("Reinforcements", 3);
        bank.add(SceneClock::new("Ritual of Descent", 6, "").unwrap())
            .unwrap();
        assert_eq!(bank.resolve_name("Reinforce").unwrap(), "Reinforcements");
        assert!(matches!(
            bank.resolve_name("it"),
            Err(ClockError::Ambiguous(_))
        ));
        assert!(matches!(
            bank.resolve_name("Countdown"),
            Err(ClockError::Unknown(_))
        ));
    }

    #[test]
    fn batch_applies_at_cleanup_not_at_queue_time() {
        let mut bank = bank_with("Alarm", 3);
        bank.queue_update("Alarm", 2, "noise").unwrap();
        assert_eq!(bank.get("Alarm").unwrap().current, 0);
        let filled = bank.apply_batch();
        assert!(filled.is_empty());
        assert_eq!(bank.get("Alarm").unwrap().current, 2);
    }

    #[test]
    fn fill_reports_consequence() {
        let mut bank = bank_with("Alarm", 3);
        bank.queue_update("Alarm", 2, "noise").unwrap();
        bank.queue_update("Alarm", 1, "more noise").unwrap();
        let filled = bank.apply_batch();
        assert_eq!(filled.len(), 1);
        assert!(filled[0].consequence.contains("SPAWN_ENEMY"));
    }

    #[test]
    fn negative_ticks_regress() {
        let mut bank = bank_with("Alarm", 4);
        bank.queue_update("Alarm", 3, "noise").unwrap();
        bank.apply_batch();
        bank.queue_update("Alarm", -2, "jammed").unwrap();
        bank.apply_batch();
        assert_eq!(bank.get("Alarm").unwrap().current, 1);
    }

    #[test]
    fn unknown_reference_fails_at_queue_time() {
        let mut bank = bank_with("Alarm", 4);
        assert!(bank.queue_update("Countdown", 1, "x").is_err());
    }

    #[test]
    fn all_resolved_when_no_active_clocks_remain() {
        let mut bank = bank_with("Alarm", 2);
        assert!(!bank.all_resolved());
        bank.queue_update("Alarm", 2, "noise").unwrap();
        bank.apply_batch();
        assert!(bank.all_resolved());
    }

    #[test]
    fn filled_clock_ignores_later_queued_updates() {
        let mut bank = bank_with("Alarm", 2);
        bank.queue_update("Alarm", 2, "fill").unwrap();
        bank.queue_update("Alarm", 1, "overflow").unwrap();
        let filled = bank.apply_batch();
        assert_eq!(filled.len(), 1);
        assert_eq!(bank.get("Alarm").unwrap().current, 2);
    }
}

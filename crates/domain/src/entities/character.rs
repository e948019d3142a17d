//! Player-controlled characters.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::AgentId;
use crate::value_objects::{
    Armor, Attribute, Attributes, DamageChannel, DamageOutcome, Personality, Position, Ring, Side,
    SkillSet, Weapon,
};

use super::void::VoidState;

/// Wound count at which a death check is required.
pub const DEATH_CHECK_WOUNDS: i32 = 6;

/// Stun level at which an unconsciousness check is required.
pub const UNCONSCIOUS_CHECK_STUNS: i32 = 6;

/// What one application of damage did to a combatant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageReport {
    pub stun_levels_after: i32,
    pub wounds_after: i32,
    pub needs_death_check: bool,
    pub needs_unconscious_check: bool,
}

/// A player character. Created from the session config at startup and
/// mutated only by the mechanics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub agent_id: AgentId,
    pub name: String,
    pub pronouns: String,
    pub faction: String,
    pub attributes: Attributes,
    pub skills: SkillSet,
    pub max_health: i32,
    pub health: i32,
    pub wounds: i32,
    pub stuns: i32,
    pub void: VoidState,
    pub soulcredit: i32,
    pub personality: Personality,
    pub goals: Vec<String>,
    pub weapons: Vec<Weapon>,
    pub armor: Option<Armor>,
    pub position: Position,
    pub alive: bool,
    /// Tactical token claimed this round, if any.
    pub claimed_token: Option<String>,
    /// Reaction held for later in the round, if any.
    pub pending_reaction: Option<String>,
}

impl Character {
    pub fn new(
        name: impl Into<String>,
        pronouns: impl Into<String>,
        faction: impl Into<String>,
        attributes: Attributes,
        skills: SkillSet,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("character name cannot be empty"));
        }
        let max_health = attributes.get(Attribute::Size) * 2;
        Ok(Self {
            agent_id: AgentId::for_player(&name),
            name,
            pronouns: pronouns.into(),
            faction: faction.into(),
            attributes,
            skills,
            max_health,
            health: max_health,
            wounds: 0,
            stuns: 0,
            void: VoidState::default(),
            soulcredit: 0,
            personality: Personality::default(),
            goals: Vec::new(),
            weapons: vec![Weapon::unarmed()],
            armor: None,
            position: Position::new(Ring::Near, Side::Pc),
            alive: true,
            claimed_token: None,
            pending_reaction: None,
        })
    }

    pub fn attribute(&self, attribute: Attribute) -> i32 {
        self.attributes.get(attribute)
    }

    /// Soak from worn armor.
    pub fn soak(&self) -> i32 {
        self.armor.as_ref().map(|a| a.soak).unwrap_or(0)
    }

    /// First equipped weapon, or bare hands.
    pub fn primary_weapon(&self) -> Weapon {
        self.weapons.first().cloned().unwrap_or_else(Weapon::unarmed)
    }

    /// Apply net damage through a channel, following the YAGS cumulation
    /// rules. Returns a report; the death/unconsciousness checks flagged
    /// there are rolled by the mechanics engine.
    pub fn apply_damage(&mut self, channel: DamageChannel, dealt: i32) -> DamageReport {
        let outcome = DamageOutcome::from_damage(channel, dealt);
        self.take_stun_levels(outcome.stun_levels);
        self.take_wound_levels(outcome.wound_levels);
        DamageReport {
            stun_levels_after: self.stuns,
            wounds_after: self.wounds,
            needs_death_check: self.wounds >= DEATH_CHECK_WOUNDS,
            needs_unconscious_check: self.stuns >= UNCONSCIOUS_CHECK_STUNS,
        }
    }

    /// Stun cumulation: replace when the new level is higher, bump by one
    /// when it is at least half the current level, otherwise shrug it off.
    fn take_stun_levels(&mut self, new: i32) {
        if new <= 0 {
            return;
        }
        if new > self.stuns {
            self.stuns = new;
        } else if new >= self.stuns / 2 {
            self.stuns += 1;
        }
    }

    /// Wounds are strictly cumulative; health tracks the remaining margin.
    fn take_wound_levels(&mut self, levels: i32) {
        if levels <= 0 {
            return;
        }
        self.wounds += levels;
        self.health = (self.max_health - self.wounds).max(0);
    }

    /// Penalty from accumulated stun levels.
    pub fn stun_penalty(&self) -> i32 {
        match self.stuns {
            0 | 1 => 0,
            2 => -5,
            3 | 4 => -10,
            5 => -25,
            _ => -25,
        }
    }

    /// Drop per-round targeting state at the round boundary.
    pub fn end_round(&mut self) {
        self.claimed_token = None;
        self.pending_reaction = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn attrs(size: i32) -> Attributes {
        let mut map: BTreeMap<String, i32> = Attribute::ALL
            .iter()
            .map(|a| (a.name().to_string(), 3))
            .collect();
        map.insert("size".to_string(), size);
        Attributes::from_map(&map).unwrap()
    }

    fn character() -> Character {
        Character::new("Nyx", "they/them", "Tempest", attrs(3), SkillSet::default()).unwrap()
    }

    #[test]
    fn health_derives_from_size() {
        let c = character();
        assert_eq!(c.max_health, 6);
        assert_eq!(c.health, 6);
    }

    #[test]
    fn empty_name_rejected() {
        assert!(Character::new("  ", "", "", attrs(3), SkillSet::default()).is_err());
    }

    #[test]
    fn wounds_accumulate_and_track_health() {
        let mut c = character();
        c.apply_damage(DamageChannel::Wound, 10); // 2 wounds
        assert_eq!(c.wounds, 2);
        assert_eq!(c.health, 4);
        c.apply_damage(DamageChannel::Wound, 5);
        assert_eq!(c.wounds, 3);
        assert_eq!(c.health, 3);
    }

    #[test]
    fn sixth_wound_flags_death_check_fifth_does_not() {
        let mut c = character();
        c.apply_damage(DamageChannel::Wound, 25); // 5 wounds
        let report = c.apply_damage(DamageChannel::Wound, 0);
        assert!(!report.needs_death_check);
        let report = c.apply_damage(DamageChannel::Wound, 5); // 6th wound
        assert!(report.needs_death_check);
    }

    #[test]
    fn stun_replaces_when_higher() {
        let mut c = character();
        c.apply_damage(DamageChannel::Stun, 10); // 2 levels
        assert_eq!(c.stuns, 2);
        c.apply_damage(DamageChannel::Stun, 20); // 4 levels > 2: replace
        assert_eq!(c.stuns, 4);
    }

    #[test]
    fn stun_increments_at_half_or_more() {
        let mut c = character();
        c.apply_damage(DamageChannel::Stun, 20); // 4 levels
        c.apply_damage(DamageChannel::Stun, 10); // 2 levels >= 4/2: bump
        assert_eq!(c.stuns, 5);
        c.apply_damage(DamageChannel::Stun, 5); // 1 level < 5/2: no change
        assert_eq!(c.stuns, 5);
    }

    #[test]
    fn stun_boundary_new_equals_current_increments() {
        let mut c = character();
        c.apply_damage(DamageChannel::Stun, 15); // 3 levels
        c.apply_damage(DamageChannel::Stun, 15); // equal: >= half, bump
        assert_eq!(c.stuns, 4);
    }

    #[test]
    fn stun_penalties() {
        let mut c = character();
        assert_eq!(c.stun_penalty(), 0);
        c.stuns = 2;
        assert_eq!(c.stun_penalty(), -5);
        c.stuns = 4;
        assert_eq!(c.stun_penalty(), -10);
        c.stuns = 5;
        assert_eq!(c.stun_penalty(), -25);
    }

    #[test]
    fn mixed_damage_feeds_both_channels() {
        let mut c = character();
        c.apply_damage(DamageChannel::Mixed, 15); // 3 levels: 2 stun, 1 wound
        assert_eq!(c.stuns, 2);
        assert_eq!(c.wounds, 1);
    }

    #[test]
    fn end_round_clears_claims() {
        let mut c = character();
        c.claimed_token = Some("high_ground".to_string());
        c.pending_reaction = Some("parry".to_string());
        c.end_round();
        assert!(c.claimed_token.is_none());
        assert!(c.pending_reaction.is_none());
    }
}

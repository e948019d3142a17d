//! Enemy agents and their spawn templates.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::AgentId;
use crate::value_objects::{
    Armor, Attribute, Attributes, DamageChannel, MoraleDisposition, Position, SkillSet, Weapon,
    WeaponKind,
};

use super::character::{DamageReport, DEATH_CHECK_WOUNDS, UNCONSCIOUS_CHECK_STUNS};
use super::void::VoidState;
use crate::value_objects::DamageOutcome;

/// Group health scale factor: a group of N is tougher than one unit but
/// not N times tougher.
pub const GROUP_HEALTH_FACTOR: f64 = 0.7;

/// A spawnable enemy archetype from the read-only content table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyTemplate {
    pub key: String,
    pub display_name: String,
    /// Health of a single unit before group scaling.
    pub health: i32,
    pub attributes: Attributes,
    pub skills: SkillSet,
    pub weapons: Vec<Weapon>,
    pub armor: Option<Armor>,
    pub doctrine: String,
    pub target_priority: String,
    /// Health ratio at which morale triggers.
    pub retreat_threshold: f64,
    pub disposition: MoraleDisposition,
    pub special_abilities: Vec<String>,
    pub loot_hint: Option<String>,
}

/// Intel shared by an allied enemy unit; expires after two rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntelEntry {
    pub round: u32,
    pub from: AgentId,
    pub text: String,
}

/// A live enemy on the field, possibly a group abstracted as one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub agent_id: AgentId,
    pub display_name: String,
    pub template_key: String,
    pub faction: String,
    pub is_group: bool,
    pub original_count: u32,
    pub attributes: Attributes,
    pub skills: SkillSet,
    pub max_health: i32,
    pub health: i32,
    pub wounds: i32,
    pub stuns: i32,
    pub void: VoidState,
    pub position: Position,
    pub initiative: i32,
    pub doctrine: String,
    pub target_priority: String,
    pub retreat_threshold: f64,
    pub panicked: bool,
    pub disposition: MoraleDisposition,
    pub weapons: Vec<Weapon>,
    pub armor: Option<Armor>,
    pub special_abilities: Vec<String>,
    pub status_effects: Vec<String>,
    pub shared_intel: Vec<IntelEntry>,
    pub spawned_round: u32,
    pub despawned_round: Option<u32>,
    pub alive: bool,
    pub loot_hint: Option<String>,
}

impl Enemy {
    /// Instantiate a template at a position. Groups scale health by
    /// `count x 0.7`; a single unit keeps the template value.
    pub fn from_template(
        template: &EnemyTemplate,
        agent_id: AgentId,
        display_name: impl Into<String>,
        count: u32,
        position: Position,
        spawned_round: u32,
    ) -> Result<Self, DomainError> {
        if count == 0 {
            return Err(DomainError::validation("enemy count must be at least 1"));
        }
        let display_name = display_name.into();
        let is_group = count > 1;
        let max_health = if is_group {
            ((f64::from(template.health) * f64::from(count)) * GROUP_HEALTH_FACTOR).round() as i32
        } else {
            template.health
        };
        Ok(Self {
            agent_id,
            faction: display_name.clone(),
            display_name,
            template_key: template.key.clone(),
            is_group,
            original_count: count,
            attributes: template.attributes.clone(),
            skills: template.skills.clone(),
            max_health,
            health: max_health,
            wounds: 0,
            stuns: 0,
            void: VoidState::default(),
            position,
            initiative: 0,
            doctrine: template.doctrine.clone(),
            target_priority: template.target_priority.clone(),
            retreat_threshold: template.retreat_threshold,
            panicked: false,
            disposition: template.disposition,
            weapons: template.weapons.clone(),
            armor: template.armor.clone(),
            special_abilities: template.special_abilities.clone(),
            status_effects: Vec::new(),
            shared_intel: Vec::new(),
            spawned_round,
            despawned_round: None,
            alive: true,
            loot_hint: template.loot_hint.clone(),
        })
    }

    pub fn attribute(&self, attribute: Attribute) -> i32 {
        self.attributes.get(attribute)
    }

    pub fn soak(&self) -> i32 {
        self.armor.as_ref().map(|a| a.soak).unwrap_or(0)
    }

    pub fn primary_weapon(&self) -> Weapon {
        self.weapons.first().cloned().unwrap_or_else(Weapon::unarmed)
    }

    /// Units still standing, derived from the health ratio:
    /// `original - floor((max - current) / (max / original))`, never
    /// negative.
    pub fn units_remaining(&self) -> u32 {
        if !self.is_group {
            return u32::from(self.alive && self.health > 0);
        }
        if self.health <= 0 {
            return 0;
        }
        let per_unit = f64::from(self.max_health) / f64::from(self.original_count);
        let lost = (f64::from(self.max_health - self.health) / per_unit).floor() as u32;
        self.original_count.saturating_sub(lost)
    }

    /// Degrading status line for prompts and summaries.
    pub fn status_text(&self) -> String {
        if !self.alive || self.health <= 0 {
            return "defeated".to_string();
        }
        if self.is_group {
            match self.units_remaining() {
                0 => "defeated".to_string(),
                1 => "critically wounded".to_string(),
                n => format!("{n} enemies remain"),
            }
        } else {
            let ratio = f64::from(self.health) / f64::from(self.max_health);
            if ratio <= 0.25 {
                "critically wounded".to_string()
            } else if ratio <= 0.6 {
                "wounded".to_string()
            } else {
                "unharmed".to_string()
            }
        }
    }

    /// Apply net damage through a channel. Mirrors the character rules;
    /// group health additionally drives attrition.
    pub fn apply_damage(&mut self, channel: DamageChannel, dealt: i32) -> DamageReport {
        let outcome = DamageOutcome::from_damage(channel, dealt);
        if outcome.stun_levels > 0 {
            if outcome.stun_levels > self.stuns {
                self.stuns = outcome.stun_levels;
            } else if outcome.stun_levels >= self.stuns / 2 {
                self.stuns += 1;
            }
        }
        if outcome.wound_levels > 0 {
            self.wounds += outcome.wound_levels;
        }
        // Raw damage erodes the (possibly group-scaled) health pool.
        if dealt > 0 {
            self.health = (self.health - dealt).max(0);
        }
        DamageReport {
            stun_levels_after: self.stuns,
            wounds_after: self.wounds,
            needs_death_check: self.wounds >= DEATH_CHECK_WOUNDS,
            needs_unconscious_check: self.stuns >= UNCONSCIOUS_CHECK_STUNS,
        }
    }

    /// Current health as a fraction of maximum.
    pub fn health_ratio(&self) -> f64 {
        if self.max_health <= 0 {
            return 0.0;
        }
        f64::from(self.health) / f64::from(self.max_health)
    }

    /// Morale triggers when health drops to the retreat threshold or the
    /// unit is critically stunned.
    pub fn morale_triggered(&self) -> bool {
        if self.disposition == MoraleDisposition::FightToDeath {
            return false;
        }
        self.health_ratio() <= self.retreat_threshold || self.stuns >= 5
    }

    /// Drop intel entries older than two rounds.
    pub fn expire_intel(&mut self, current_round: u32) {
        self.shared_intel
            .retain(|entry| current_round.saturating_sub(entry.round) <= 2);
    }
}

/// Built-in enemy templates, keyed for spawn markers.
pub fn builtin_templates() -> Vec<EnemyTemplate> {
    let mut grunt_skills = std::collections::BTreeMap::new();
    grunt_skills.insert("Melee".to_string(), 2);
    grunt_skills.insert("Guns".to_string(), 2);
    grunt_skills.insert("Athletics".to_string(), 2);

    let mut cultist_skills = std::collections::BTreeMap::new();
    cultist_skills.insert("Astral Arts".to_string(), 3);
    cultist_skills.insert("Melee".to_string(), 2);
    cultist_skills.insert("Athletics".to_string(), 1);

    let mut enforcer_skills = std::collections::BTreeMap::new();
    enforcer_skills.insert("Guns".to_string(), 3);
    enforcer_skills.insert("Melee".to_string(), 3);
    enforcer_skills.insert("Athletics".to_string(), 2);

    let mut drone_skills = std::collections::BTreeMap::new();
    drone_skills.insert("Guns".to_string(), 2);
    drone_skills.insert("Sensors".to_string(), 4);

    vec![
        EnemyTemplate {
            key: "grunt".to_string(),
            display_name: "Grunt".to_string(),
            health: 10,
            attributes: Attributes::uniform(3),
            skills: SkillSet::from_map(grunt_skills).unwrap_or_default(),
            weapons: vec![Weapon::new(
                "Pulse Pistol",
                4,
                WeaponKind::Ranged,
                DamageChannel::Mixed,
            )],
            armor: Some(Armor::new("Reinforced Coat", 2)),
            doctrine: "aggressive_melee".to_string(),
            target_priority: "nearest".to_string(),
            retreat_threshold: 0.25,
            disposition: MoraleDisposition::FleeWhenBroken,
            special_abilities: Vec::new(),
            loot_hint: Some("a scuffed pulse pistol and a ration chit".to_string()),
        },
        EnemyTemplate {
            key: "void_cultist".to_string(),
            display_name: "Void Cultist".to_string(),
            health: 8,
            attributes: Attributes::uniform(3),
            skills: SkillSet::from_map(cultist_skills).unwrap_or_default(),
            weapons: vec![Weapon::new(
                "Ritual Dagger",
                3,
                WeaponKind::Melee,
                DamageChannel::Wound,
            )],
            armor: None,
            doctrine: "ritual_support".to_string(),
            target_priority: "highest_void".to_string(),
            retreat_threshold: 0.3,
            disposition: MoraleDisposition::FleeWhenBroken,
            special_abilities: vec!["void_burst".to_string()],
            loot_hint: Some("a ritual dagger etched with spiral glyphs".to_string()),
        },
        EnemyTemplate {
            key: "enforcer".to_string(),
            display_name: "Enforcer".to_string(),
            health: 14,
            attributes: Attributes::uniform(4),
            skills: SkillSet::from_map(enforcer_skills).unwrap_or_default(),
            weapons: vec![Weapon::new(
                "Scatter Gun",
                7,
                WeaponKind::Ranged,
                DamageChannel::Wound,
            )],
            armor: Some(Armor::new("Combat Shell", 5)),
            doctrine: "suppressive_fire".to_string(),
            target_priority: "biggest_threat".to_string(),
            retreat_threshold: 0.15,
            disposition: MoraleDisposition::FightToDeath,
            special_abilities: vec![
                "suppress".to_string(),
                "grenade".to_string(),
                "parry".to_string(),
            ],
            loot_hint: Some("a combat shell plate and a spent grenade ring".to_string()),
        },
        EnemyTemplate {
            key: "seeker_drone".to_string(),
            display_name: "Seeker Drone".to_string(),
            health: 6,
            attributes: Attributes::uniform(2),
            skills: SkillSet::from_map(drone_skills).unwrap_or_default(),
            weapons: vec![Weapon::new(
                "Needle Rifle",
                6,
                WeaponKind::Ranged,
                DamageChannel::Wound,
            )],
            armor: Some(Armor::new("Tactical Weave", 3)),
            doctrine: "overwatch".to_string(),
            target_priority: "isolated".to_string(),
            retreat_threshold: 0.0,
            disposition: MoraleDisposition::FightToDeath,
            special_abilities: vec!["overwatch".to_string()],
            loot_hint: Some("an intact sensor cluster".to_string()),
        },
    ]
}

/// Look up a built-in template by key.
pub fn find_template(key: &str) -> Option<EnemyTemplate> {
    let wanted = key.trim().to_lowercase();
    builtin_templates().into_iter().find(|t| t.key == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{Ring, Side};

    fn spawn(count: u32) -> Enemy {
        let template = find_template("grunt").unwrap();
        Enemy::from_template(
            &template,
            AgentId::for_enemy("grunt", 1),
            "Backup",
            count,
            Position::new(Ring::Near, Side::Enemy),
            1,
        )
        .unwrap()
    }

    #[test]
    fn group_health_scales_by_point_seven() {
        let group = spawn(3);
        // 10 * 3 * 0.7 = 21
        assert_eq!(group.max_health, 21);
        assert!(group.is_group);
    }

    #[test]
    fn single_unit_keeps_template_health() {
        let solo = spawn(1);
        assert_eq!(solo.max_health, 10);
        assert!(!solo.is_group);
    }

    #[test]
    fn zero_count_rejected() {
        let template = find_template("grunt").unwrap();
        assert!(Enemy::from_template(
            &template,
            AgentId::for_enemy("grunt", 1),
            "Backup",
            0,
            Position::new(Ring::Near, Side::Enemy),
            1,
        )
        .is_err());
    }

    #[test]
    fn attrition_tracks_health_ratio() {
        let mut group = spawn(3); // max 21, per-unit 7
        assert_eq!(group.units_remaining(), 3);
        group.apply_damage(DamageChannel::Wound, 7);
        assert_eq!(group.units_remaining(), 2);
        group.apply_damage(DamageChannel::Wound, 8);
        assert_eq!(group.units_remaining(), 1);
        group.apply_damage(DamageChannel::Wound, 6);
        assert_eq!(group.units_remaining(), 0);
    }

    #[test]
    fn units_never_negative() {
        let mut group = spawn(2);
        group.apply_damage(DamageChannel::Wound, 500);
        assert_eq!(group.units_remaining(), 0);
        assert_eq!(group.health, 0);
    }

    #[test]
    fn status_text_degrades() {
        let mut group = spawn(3);
        assert_eq!(group.status_text(), "3 enemies remain");
        group.apply_damage(DamageChannel::Wound, 7);
        assert_eq!(group.status_text(), "2 enemies remain");
        group.apply_damage(DamageChannel::Wound, 8);
        assert_eq!(group.status_text(), "critically wounded");
        group.apply_damage(DamageChannel::Wound, 6);
        assert_eq!(group.status_text(), "defeated");
    }

    #[test]
    fn morale_triggers_at_threshold_or_critical_stun() {
        let mut solo = spawn(1); // threshold 0.25, max 10
        assert!(!solo.morale_triggered());
        solo.health = 2;
        assert!(solo.morale_triggered());
        let mut stunned = spawn(1);
        stunned.stuns = 5;
        assert!(stunned.morale_triggered());
    }

    #[test]
    fn fight_to_death_ignores_morale() {
        let template = find_template("enforcer").unwrap();
        let mut enemy = Enemy::from_template(
            &template,
            AgentId::for_enemy("enforcer", 1),
            "Warden",
            1,
            Position::new(Ring::Engaged, Side::Enemy),
            1,
        )
        .unwrap();
        enemy.health = 1;
        enemy.stuns = 6;
        assert!(!enemy.morale_triggered());
    }

    #[test]
    fn intel_expires_after_two_rounds() {
        let mut enemy = spawn(1);
        enemy.shared_intel.push(IntelEntry {
            round: 1,
            from: AgentId::new("enemy_grunt_2"),
            text: "PC behind the crates".to_string(),
        });
        enemy.expire_intel(3);
        assert_eq!(enemy.shared_intel.len(), 1);
        enemy.expire_intel(4);
        assert!(enemy.shared_intel.is_empty());
    }
}

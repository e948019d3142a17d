//! Session configuration.
//!
//! One JSON document describes the whole session: DM and player LLM
//! settings, the party, the enemy-module switches, and an optional
//! scenario pre-specification. Unknown keys are tolerated (forward
//! compatibility); unknown values are rejected by strict enum parsing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use aeonisk_domain::entities::{Character, VoidState};
use aeonisk_domain::value_objects::{
    find_armor, find_weapon, Attributes, Personality, Position, Ring, Side, SkillSet,
};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which LLM provider backs an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    Scripted,
    Replay,
}

/// Provider, model, and sampling settings for one agent.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

/// Switches for the enemy tactical module.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnemyAgentConfig {
    pub allow_groups: bool,
    pub max_enemies_per_combat: u32,
    pub shared_intel_enabled: bool,
    pub auto_execute_reactions: bool,
    pub loot_suggestions_enabled: bool,
    pub void_tracking_enabled: bool,
    pub free_targeting_mode: bool,
}

impl Default for EnemyAgentConfig {
    fn default() -> Self {
        Self {
            allow_groups: true,
            max_enemies_per_combat: 6,
            shared_intel_enabled: true,
            auto_execute_reactions: true,
            loot_suggestions_enabled: true,
            void_tracking_enabled: true,
            free_targeting_mode: false,
        }
    }
}

/// One party member as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    pub name: String,
    #[serde(default = "default_pronouns")]
    pub pronouns: String,
    #[serde(default)]
    pub faction: String,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub goals: Vec<String>,
    pub attributes: BTreeMap<String, i32>,
    #[serde(default)]
    pub skills: BTreeMap<String, u8>,
    #[serde(default)]
    pub void: i32,
    #[serde(default)]
    pub soulcredit: i32,
    #[serde(default)]
    pub weapons: Vec<String>,
    #[serde(default)]
    pub armor: Option<String>,
    #[serde(default)]
    pub llm: Option<LlmSettings>,
}

fn default_pronouns() -> String {
    "they/them".to_string()
}

impl PlayerConfig {
    /// Instantiate the character this entry describes.
    pub fn build_character(&self) -> Result<Character, ConfigError> {
        let attributes = Attributes::from_map(&self.attributes)
            .map_err(|e| ConfigError::Invalid(format!("player '{}': {e}", self.name)))?;
        let skills = SkillSet::from_map(self.skills.clone())
            .map_err(|e| ConfigError::Invalid(format!("player '{}': {e}", self.name)))?;
        let mut character =
            Character::new(&self.name, &self.pronouns, &self.faction, attributes, skills)
                .map_err(|e| ConfigError::Invalid(format!("player '{}': {e}", self.name)))?;

        character.personality = self.personality;
        character.goals = self.goals.clone();
        character.void = VoidState::new(self.void);
        character.soulcredit = self.soulcredit;
        character.position = Position::new(Ring::Near, Side::Pc);

        if !self.weapons.is_empty() {
            let mut weapons = Vec::with_capacity(self.weapons.len());
            for name in &self.weapons {
                let weapon = find_weapon(name).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "player '{}': unknown weapon '{name}'",
                        self.name
                    ))
                })?;
                weapons.push(weapon);
            }
            character.weapons = weapons;
        }
        if let Some(armor_name) = &self.armor {
            character.armor = Some(find_armor(armor_name).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "player '{}': unknown armor '{armor_name}'",
                    self.name
                ))
            })?);
        }
        Ok(character)
    }
}

/// Pre-specified clock in the scenario block.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    pub name: String,
    pub max: u8,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub filled_consequence: String,
}

/// Optional scenario pre-specification; absent fields are filled in by the
/// DM's scenario-setup call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub theme: String,
    pub location: String,
    pub situation: String,
    pub void_level: u8,
    pub initial_clocks: Vec<ClockConfig>,
}

/// The whole session configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub session_name: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default = "default_true")]
    pub tactical_module_enabled: bool,
    #[serde(default = "default_true")]
    pub enemy_agents_enabled: bool,
    #[serde(default)]
    pub enemy_agent_config: EnemyAgentConfig,
    /// Rounds between vendor visits; -1 disables.
    #[serde(default = "default_vendor_frequency")]
    pub vendor_spawn_frequency: i32,
    pub dm: LlmSettings,
    pub players: Vec<PlayerConfig>,
    #[serde(default)]
    pub scenario: Option<ScenarioConfig>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub prompt_dir: Option<PathBuf>,
}

fn default_max_turns() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

fn default_vendor_frequency() -> i32 {
    -1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_language() -> String {
    "en".to_string()
}

impl SessionConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_name.trim().is_empty() {
            return Err(ConfigError::Invalid("session_name cannot be empty".into()));
        }
        if self.max_turns == 0 {
            return Err(ConfigError::Invalid("max_turns must be at least 1".into()));
        }
        if self.players.is_empty() {
            return Err(ConfigError::Invalid("at least one player required".into()));
        }
        for player in &self.players {
            if !(0..=10).contains(&player.void) {
                return Err(ConfigError::Invalid(format!(
                    "player '{}': void must be 0-10",
                    player.name
                )));
            }
            // Surface catalog and attribute problems at startup rather
            // than mid-session.
            player.build_character()?;
        }
        if self.vendor_spawn_frequency == 0 {
            return Err(ConfigError::Invalid(
                "vendor_spawn_frequency must be positive or -1".into(),
            ));
        }
        Ok(())
    }

    /// Effective LLM settings for a player (falls back to the DM's).
    pub fn player_llm(&self, player: &PlayerConfig) -> LlmSettings {
        player.llm.clone().unwrap_or_else(|| self.dm.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> serde_json::Value {
        serde_json::json!({
            "session_name": "smoke",
            "dm": {"provider": "scripted"},
            "players": [{
                "name": "Nyx",
                "attributes": {
                    "strength": 3, "agility": 4, "endurance": 3,
                    "perception": 3, "intelligence": 3, "empathy": 2,
                    "willpower": 3, "charisma": 2, "size": 3
                },
                "skills": {"Melee": 4},
                "weapons": ["Mono Blade"]
            }]
        })
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: SessionConfig = serde_json::from_value(minimal_json()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.max_turns, 20);
        assert_eq!(config.vendor_spawn_frequency, -1);
        assert!(!config.enemy_agent_config.free_targeting_mode);
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let mut json = minimal_json();
        json["future_flag"] = serde_json::json!(true);
        let config: SessionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.session_name, "smoke");
    }

    #[test]
    fn unknown_provider_value_is_rejected() {
        let mut json = minimal_json();
        json["dm"]["provider"] = serde_json::json!("quantum");
        assert!(serde_json::from_value::<SessionConfig>(json).is_err());
    }

    #[test]
    fn unknown_weapon_fails_validation() {
        let mut json = minimal_json();
        json["players"][0]["weapons"] = serde_json::json!(["Orbital Laser"]);
        let config: SessionConfig = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn build_character_applies_config() {
        let config: SessionConfig = serde_json::from_value(minimal_json()).unwrap();
        let character = config.players[0].build_character().unwrap();
        assert_eq!(character.name, "Nyx");
        assert_eq!(character.max_health, 6);
        assert_eq!(character.primary_weapon().name, "Mono Blade");
        assert_eq!(character.skills.rank("melee"), 4);
    }

    #[test]
    fn void_out_of_range_rejected() {
        let mut json = minimal_json();
        json["players"][0]["void"] = serde_json::json!(11);
        let config: SessionConfig = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_vendor_frequency_rejected() {
        let mut json = minimal_json();
        json["vendor_spawn_frequency"] = serde_json::json!(0);
        let config: SessionConfig = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_err());
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(SessionId);

/// Stable, opaque identifier for an agent within one session.
///
/// Player ids are derived from the character name at session start
/// (`pc_nyx`); enemy ids carry a spawn counter (`enemy_grunt_3`). These are
/// the ids that appear in the event log and in despawn markers. They are
/// distinct from the per-round `tgt_` ids handed out by the targeting layer,
/// which are deliberately unstable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a player agent id from a character name (`pc_<slug>`).
    pub fn for_player(name: &str) -> Self {
        Self(format!("pc_{}", slugify(name)))
    }

    /// Build an enemy agent id from a template key and spawn ordinal.
    pub fn for_enemy(template: &str, ordinal: u32) -> Self {
        Self(format!("enemy_{}_{}", slugify(template), ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_is_slugged() {
        assert_eq!(AgentId::for_player("Nyx Harrow").as_str(), "pc_nyx_harrow");
    }

    #[test]
    fn enemy_id_carries_ordinal() {
        assert_eq!(
            AgentId::for_enemy("Void Cultist", 2).as_str(),
            "enemy_void_cultist_2"
        );
    }

    #[test]
    fn agent_id_serializes_transparently() {
        let id = AgentId::new("pc_nyx");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"pc_nyx\"");
    }
}

//! The session event vocabulary.
//!
//! Every state transition in a session emits exactly one `EventRecord`,
//! appended to the JSONL log. The record envelope carries the timestamp,
//! session id, and round; the payload is a tagged variant so consumers get
//! exhaustive handling. Events are the canonical, idempotent form of what
//! happened; prose markers are only ever an input to producing them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{ActionDeclaration, ActionResolution};
use crate::ids::{AgentId, SessionId};

/// Prompt provenance attached to LLM-driven events so prompt-engineering
/// changes can be correlated with behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub version: String,
    pub provider: String,
    pub language: String,
    pub template: String,
}

/// One message of a logged LLM exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub role: String,
    pub content: String,
}

/// Point-in-time combatant snapshot for `character_state` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantSnapshot {
    pub agent_id: AgentId,
    pub name: String,
    pub faction: String,
    pub health: i32,
    pub max_health: i32,
    pub wounds: i32,
    pub stuns: i32,
    pub void: i32,
    pub soulcredit: i32,
    pub position: String,
}

/// Clock line for round summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub name: String,
    pub current: u8,
    pub maximum: u8,
    pub state: String,
}

/// Per-character closing numbers for the mission debrief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebriefLine {
    pub name: String,
    pub void: i32,
    pub soulcredit: i32,
}

/// Tagged union of everything the session can log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStart {
        session_name: String,
        seed: u64,
        players: Vec<String>,
        free_targeting_mode: bool,
    },
    Scenario {
        theme: String,
        location: String,
        situation: String,
        void_level: u8,
        clocks: Vec<ClockSnapshot>,
    },
    ActionDeclaration {
        declaration: ActionDeclaration,
    },
    ActionResolution {
        resolution: ActionResolution,
    },
    RoundSynthesis {
        text: String,
    },
    RoundSummary {
        actions_resolved: u32,
        actions_invalidated: u32,
        clocks: Vec<ClockSnapshot>,
        combatants: Vec<CombatantSnapshot>,
    },
    CharacterState {
        snapshot: CombatantSnapshot,
    },
    CombatAction {
        attacker: AgentId,
        target: AgentId,
        weapon: String,
        dealt: i32,
        /// Full arithmetic for enemy attacks; terse `base + soak -> dealt`
        /// for player attacks inferred from narration.
        breakdown: String,
    },
    EnemySpawn {
        agent_id: AgentId,
        display_name: String,
        template: String,
        count: u32,
        position: String,
    },
    EnemyDefeat {
        agent_id: AgentId,
        display_name: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        loot: Option<String>,
    },
    MissionDebrief {
        text: String,
        finals: Vec<DebriefLine>,
    },
    LlmCall {
        agent_id: AgentId,
        call_sequence: u32,
        messages: Vec<LoggedMessage>,
        response: String,
        model: String,
        temperature: f32,
        input_tokens: u32,
        output_tokens: u32,
    },
    FriendlyFire {
        attacker_id: AgentId,
        target_id: AgentId,
        damage: i32,
        intentional: bool,
    },
    IffDecision {
        reasoning: String,
        attacker_faction: String,
        target_faction: String,
        faction_match: bool,
    },
    MoraleCheck {
        agent_id: AgentId,
        willpower: i32,
        roll: i32,
        total: i32,
        passed: bool,
    },
    VendorVisit {
        vendor: String,
    },
    StallWarning {
        rounds_stalled: u32,
    },
    SessionEnd {
        reason: String,
        rounds: u32,
    },
}

impl SessionEvent {
    /// The wire tag for this event, matching the serde representation.
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SessionStart { .. } => "session_start",
            SessionEvent::Scenario { .. } => "scenario",
            SessionEvent::ActionDeclaration { .. } => "action_declaration",
            SessionEvent::ActionResolution { .. } => "action_resolution",
            SessionEvent::RoundSynthesis { .. } => "round_synthesis",
            SessionEvent::RoundSummary { .. } => "round_summary",
            SessionEvent::CharacterState { .. } => "character_state",
            SessionEvent::CombatAction { .. } => "combat_action",
            SessionEvent::EnemySpawn { .. } => "enemy_spawn",
            SessionEvent::EnemyDefeat { .. } => "enemy_defeat",
            SessionEvent::MissionDebrief { .. } => "mission_debrief",
            SessionEvent::LlmCall { .. } => "llm_call",
            SessionEvent::FriendlyFire { .. } => "friendly_fire",
            SessionEvent::IffDecision { .. } => "iff_decision",
            SessionEvent::MoraleCheck { .. } => "morale_check",
            SessionEvent::VendorVisit { .. } => "vendor_visit",
            SessionEvent::StallWarning { .. } => "stall_warning",
            SessionEvent::SessionEnd { .. } => "session_end",
        }
    }
}

/// The envelope written as one JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    pub round: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_metadata: Option<PromptMetadata>,
    #[serde(flatten)]
    pub event: SessionEvent,
}

impl EventRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        session_id: SessionId,
        round: u32,
        event: SessionEvent,
    ) -> Self {
        Self {
            timestamp,
            session_id,
            round,
            prompt_metadata: None,
            event,
        }
    }

    pub fn with_prompt_metadata(mut self, metadata: PromptMetadata) -> Self {
        self.prompt_metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: SessionEvent) -> EventRecord {
        EventRecord::new(
            DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            SessionId::from_uuid(uuid::Uuid::nil()),
            3,
            event,
        )
    }

    #[test]
    fn event_type_tag_matches_serde_tag() {
        let rec = record(SessionEvent::VendorVisit {
            vendor: "The Tin Peddler".to_string(),
        });
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["event_type"], rec.event.event_type());
        assert_eq!(json["round"], 3);
    }

    #[test]
    fn record_round_trips_byte_identical() {
        let rec = record(SessionEvent::MoraleCheck {
            agent_id: AgentId::new("enemy_grunt_1"),
            willpower: 3,
            roll: 4,
            total: 12,
            passed: false,
        });
        let line = serde_json::to_string(&rec).unwrap();
        let back: EventRecord = serde_json::from_str(&line).unwrap();
        let line_again = serde_json::to_string(&back).unwrap();
        assert_eq!(line, line_again);
    }

    #[test]
    fn prompt_metadata_is_omitted_when_absent() {
        let rec = record(SessionEvent::StallWarning { rounds_stalled: 3 });
        let line = serde_json::to_string(&rec).unwrap();
        assert!(!line.contains("prompt_metadata"));
    }

    #[test]
    fn prompt_metadata_round_trips() {
        let rec = record(SessionEvent::RoundSynthesis {
            text: "The alarm keeps ringing.".to_string(),
        })
        .with_prompt_metadata(PromptMetadata {
            version: "1.2".to_string(),
            provider: "anthropic".to_string(),
            language: "en".to_string(),
            template: "dm/synthesis".to_string(),
        });
        let line = serde_json::to_string(&rec).unwrap();
        let back: EventRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.prompt_metadata, rec.prompt_metadata);
    }
}

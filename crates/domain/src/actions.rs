//! Action declarations, mechanical effects, and resolutions.
//!
//! A declaration is an intention captured during the declare phase; it is
//! consumed (or invalidated) during the resolve phase of the same round and
//! never survives into the next one. A resolution records the dice math,
//! the DM narration, and the mechanical effects that were actually applied.

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::value_objects::{Attribute, CheckResult};

/// Category of a declared action. Drives base difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Combat,
    Social,
    Sensing,
    Technical,
    Ritual,
    Move,
    Reaction,
}

impl ActionType {
    pub fn label(&self) -> &'static str {
        match self {
            ActionType::Combat => "combat",
            ActionType::Social => "social",
            ActionType::Sensing => "sensing",
            ActionType::Technical => "technical",
            ActionType::Ritual => "ritual",
            ActionType::Move => "move",
            ActionType::Reaction => "reaction",
        }
    }
}

/// Ritual bookkeeping flags on a declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RitualFlags {
    pub is_ritual: bool,
    pub has_primary_tool: bool,
    pub has_offering: bool,
}

/// An agent's stated intention for the round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDeclaration {
    pub agent_id: AgentId,
    pub character_name: String,
    pub initiative: i32,
    /// Short verb phrase ("suppress the drone").
    pub intent: String,
    /// One or two sentences of flavor.
    pub description: String,
    pub attribute: Attribute,
    /// Skill name; `None` when attempting unskilled.
    pub skill: Option<String>,
    pub action_type: ActionType,
    pub estimated_difficulty: i32,
    /// Target reference: an opaque `tgt_` id in free-targeting mode,
    /// otherwise a display name.
    pub target: Option<String>,
    #[serde(default)]
    pub ritual: RitualFlags,
    /// Tactical token this action claims, if any.
    pub defence_token: Option<String>,
    /// The agent's stated reasoning, kept for IFF research events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Mechanical state change extracted from DM output.
///
/// Effects are the canonical, idempotent form of a resolution; markers in
/// prose are only ever parsed into these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum MechanicalEffect {
    VoidChange {
        character: String,
        delta: i32,
        reason: String,
    },
    SoulcreditChange {
        character: String,
        delta: i32,
        reason: String,
    },
    ClockUpdate {
        name: String,
        ticks: i32,
        reason: String,
    },
    Damage {
        target: String,
        amount: i32,
    },
    SpawnEnemy {
        name: String,
        template: String,
        count: u32,
        position: String,
        tactics: String,
    },
    DespawnEnemy {
        agent_id: AgentId,
        reason: String,
    },
    NewClock {
        name: String,
        maximum: u8,
        description: String,
    },
    PivotScenario {
        description: String,
    },
    AdvanceStory {
        description: String,
    },
}

/// Whether a declaration was carried out or overtaken by events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Resolved,
    /// Prerequisites broke before the actor's turn (dead actor or target,
    /// claimed token). Carries a human-readable reason.
    Invalidated { reason: String },
}

/// The resolved form of a declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResolution {
    pub declaration: ActionDeclaration,
    pub outcome: ResolutionOutcome,
    /// Dice math; absent for invalidated actions.
    pub check: Option<CheckResult>,
    /// DM narration, capped at roughly 2000 characters upstream.
    pub narration: String,
    pub effects: Vec<MechanicalEffect>,
}

impl ActionResolution {
    /// A resolution for an action that never got to happen.
    pub fn invalidated(declaration: ActionDeclaration, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            declaration,
            outcome: ResolutionOutcome::Invalidated {
                reason: reason.clone(),
            },
            check: None,
            narration: reason,
            effects: Vec::new(),
        }
    }
}

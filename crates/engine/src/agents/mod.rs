//! The LLM-driven agents: players, enemy tacticians, and the DM
//! adjudicator.
//!
//! Agents hold no session state of their own beyond their identity; they
//! receive the session context and read-only mechanics snapshots, build a
//! prompt from the store, make one LLM call (with one repair retry), and
//! return a structured result. All state mutation stays behind the
//! mechanics engine.

mod dm;
mod enemy;
mod player;

pub use dm::{declared_target_id, DmAdjudicator, Scenario, DM_AGENT_ID};
pub use enemy::EnemyTacticalAgent;
pub use player::PlayerAgent;

use aeonisk_domain::AgentId;

use crate::mechanics::MechanicsEngine;
use crate::session::SessionContext;

/// Render the battlefield as prompt lines from one combatant's viewpoint.
///
/// In free-targeting mode every combatant appears in a single unlabeled
/// list under its opaque id; otherwise the traditional bifurcated
/// hostile/allied view is used and entries go by display name.
pub(crate) fn battlefield_view(
    ctx: &SessionContext,
    mechanics: &MechanicsEngine,
    viewer: &AgentId,
) -> String {
    let viewer_is_pc = mechanics.is_pc(viewer);
    let mut lines = Vec::new();

    if ctx.free_targeting {
        lines.push("Combatants:".to_string());
        for id in mechanics.active_agent_ids() {
            if &id == viewer {
                continue;
            }
            let name = mechanics.combatant_name(&id).unwrap_or_default();
            let position = mechanics
                .combatant_position(&id)
                .map(|p| p.to_string())
                .unwrap_or_default();
            let target_id = ctx.targets.id_for(&id).unwrap_or("tgt_????");
            lines.push(format!("- {target_id} | {name} | {position}"));
        }
    } else {
        let mut hostile = Vec::new();
        let mut allied = Vec::new();
        for id in mechanics.active_agent_ids() {
            if &id == viewer {
                continue;
            }
            let name = mechanics.combatant_name(&id).unwrap_or_default();
            let position = mechanics
                .combatant_position(&id)
                .map(|p| p.to_string())
                .unwrap_or_default();
            let entry = format!("- {name} | {position}");
            if mechanics.is_pc(&id) == viewer_is_pc {
                allied.push(entry);
            } else {
                hostile.push(entry);
            }
        }
        lines.push("Hostile targets:".to_string());
        if hostile.is_empty() {
            lines.push("- none visible".to_string());
        }
        lines.extend(hostile);
        lines.push("Allied units:".to_string());
        if allied.is_empty() {
            lines.push("- none".to_string());
        }
        lines.extend(allied);
    }
    lines.join("\n")
}

/// Pull the first JSON object out of an LLM response that may wrap it in
/// prose or code fences.
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_strips_prose_and_fences() {
        let text = "Sure, here you go:\n```json\n{\"intent\": \"strike\"}\n```";
        assert_eq!(extract_json(text), Some("{\"intent\": \"strike\"}"));
    }

    #[test]
    fn extract_json_rejects_textless_response() {
        assert_eq!(extract_json("no structure here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }
}

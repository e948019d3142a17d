//! The player agent: declares one structured action per round under its
//! personality and goal constraints.

use serde::Deserialize;
use tracing::warn;

use aeonisk_domain::actions::RitualFlags;
use aeonisk_domain::value_objects::{base_difficulty, Attribute};
use aeonisk_domain::{ActionDeclaration, ActionType, AgentId};

use crate::agents::{battlefield_view, extract_json};
use crate::llm::{ChatMessage, LlmRequest};
use crate::mechanics::MechanicsEngine;
use crate::session::SessionContext;

/// JSON shape the declare prompt asks for.
#[derive(Debug, Deserialize)]
struct DeclarationPayload {
    intent: String,
    #[serde(default)]
    description: String,
    attribute: Attribute,
    #[serde(default)]
    skill: Option<String>,
    action_type: ActionType,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    is_ritual: bool,
    #[serde(default)]
    has_primary_tool: bool,
    #[serde(default)]
    has_offering: bool,
    #[serde(default)]
    defence_token: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// One player character's declaration loop.
#[derive(Clone)]
pub struct PlayerAgent {
    pub agent_id: AgentId,
    temperature: f32,
}

impl PlayerAgent {
    pub fn new(agent_id: AgentId, temperature: f32) -> Self {
        Self {
            agent_id,
            temperature,
        }
    }

    /// Produce this round's declaration. A malformed response gets one
    /// repair retry; a second failure degrades to a no-op sensing action.
    pub async fn declare(
        &self,
        ctx: &mut SessionContext,
        mechanics: &MechanicsEngine,
        round: u32,
        initiative: i32,
    ) -> ActionDeclaration {
        let Some(character) = mechanics.character(&self.agent_id) else {
            return self.fallback_declaration("hold position", initiative);
        };
        let name = character.name.clone();

        let mut variables = std::collections::HashMap::new();
        variables.insert("character_name".to_string(), name.clone());
        variables.insert("round".to_string(), round.to_string());
        variables.insert(
            "character_summary".to_string(),
            format!(
                "health {}/{}, wounds {}, stuns {}, void {}, soulcredit {}, at {}, carrying {}",
                character.health,
                character.max_health,
                character.wounds,
                character.stuns,
                character.void.score(),
                character.soulcredit,
                character.position,
                character
                    .weapons
                    .iter()
                    .map(|w| w.name.clone())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
        variables.insert("personality".to_string(), character.personality.describe());
        variables.insert("goals".to_string(), character.goals.join("; "));
        variables.insert(
            "skills".to_string(),
            character
                .skills
                .entries()
                .map(|(name, rank)| format!("{name} {rank}"))
                .collect::<Vec<_>>()
                .join(", "),
        );
        variables.insert(
            "battlefield".to_string(),
            battlefield_view(ctx, mechanics, &self.agent_id),
        );

        let prompt = match ctx.prompts.compose("player", &["declare"], &variables) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(agent = %self.agent_id, error = %e, "declare prompt failed to compose");
                return self.fallback_declaration(&name, initiative);
            }
        };

        let request = LlmRequest::new(
            self.agent_id.as_str(),
            vec![ChatMessage::user(prompt.text.clone())],
        )
        .with_temperature(self.temperature);

        let response = match ctx.llm_call(request, Some(prompt.metadata.clone())).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(agent = %self.agent_id, error = %e, "declaration call failed");
                return self.fallback_declaration(&name, initiative);
            }
        };

        if let Some(declaration) = self.parse(&response, &name, initiative) {
            return declaration;
        }

        // One repair retry with the error in context.
        let repair_vars = std::collections::HashMap::from([
            (
                "error".to_string(),
                "response was not a valid declaration JSON object".to_string(),
            ),
            ("original_response".to_string(), response.clone()),
        ]);
        let repaired = match ctx.prompts.compose("player", &["repair"], &repair_vars) {
            Ok(repair_prompt) => {
                let request = LlmRequest::new(
                    self.agent_id.as_str(),
                    vec![ChatMessage::user(repair_prompt.text)],
                )
                .with_temperature(self.temperature);
                ctx.llm_call(request, Some(repair_prompt.metadata))
                    .await
                    .map(|r| r.content)
                    .ok()
            }
            Err(_) => None,
        };

        if let Some(text) = repaired {
            if let Some(declaration) = self.parse(&text, &name, initiative) {
                return declaration;
            }
        }
        warn!(agent = %self.agent_id, "declaration unusable after repair; degrading to no-op");
        self.fallback_declaration(&name, initiative)
    }

    fn parse(
        &self,
        response: &str,
        name: &str,
        initiative: i32,
    ) -> Option<ActionDeclaration> {
        let json = extract_json(response)?;
        let payload: DeclarationPayload = serde_json::from_str(json).ok()?;
        if payload.intent.trim().is_empty() {
            return None;
        }
        let estimated = base_difficulty(payload.action_type)
            + if payload.is_ritual || payload.action_type == ActionType::Ritual {
                4
            } else {
                0
            };
        Some(ActionDeclaration {
            agent_id: self.agent_id.clone(),
            character_name: name.to_string(),
            initiative,
            intent: payload.intent,
            description: payload.description,
            attribute: payload.attribute,
            skill: payload.skill.filter(|s| !s.trim().is_empty()),
            action_type: payload.action_type,
            estimated_difficulty: estimated,
            target: payload.target.filter(|t| !t.trim().is_empty()),
            ritual: RitualFlags {
                is_ritual: payload.is_ritual,
                has_primary_tool: payload.has_primary_tool,
                has_offering: payload.has_offering,
            },
            defence_token: payload.defence_token,
            reasoning: payload.reasoning,
        })
    }

    fn fallback_declaration(&self, name: &str, initiative: i32) -> ActionDeclaration {
        ActionDeclaration {
            agent_id: self.agent_id.clone(),
            character_name: name.to_string(),
            initiative,
            intent: "assess the situation".to_string(),
            description: "Holds back and reads the field.".to_string(),
            attribute: Attribute::Perception,
            skill: None,
            action_type: ActionType::Sensing,
            estimated_difficulty: base_difficulty(ActionType::Sensing),
            target: None,
            ritual: RitualFlags::default(),
            defence_token: None,
            reasoning: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::EventLog;
    use crate::llm::ScriptedLlm;
    use crate::prompts::PromptStore;
    use crate::rng::SessionRng;
    use aeonisk_domain::entities::Character;
    use aeonisk_domain::value_objects::{Attributes, SkillSet};
    use aeonisk_domain::SessionId;
    use std::collections::BTreeMap;

    fn mechanics_with_nyx() -> MechanicsEngine {
        let mut mechanics = MechanicsEngine::new(true, true);
        let attrs: BTreeMap<String, i32> = Attribute::ALL
            .iter()
            .map(|a| (a.name().to_string(), 3))
            .collect();
        let character = Character::new(
            "Nyx",
            "they/them",
            "Tempest",
            Attributes::from_map(&attrs).unwrap(),
            SkillSet::default(),
        )
        .unwrap();
        mechanics.add_character(character);
        mechanics
    }

    fn context(llm: ScriptedLlm) -> SessionContext {
        SessionContext::new(
            SessionId::new(),
            SessionRng::new(42),
            EventLog::in_memory(),
            PromptStore::new("scripted", "en"),
            Box::new(llm),
            false,
        )
    }

    #[tokio::test]
    async fn well_formed_declaration_parses() {
        let llm = ScriptedLlm::new();
        llm.push_response(
            "pc_nyx",
            r#"{"intent": "strike the grunt", "description": "A fast cut.",
                "attribute": "agility", "skill": "Melee", "action_type": "combat",
                "target": "Grunt", "is_ritual": false, "has_primary_tool": false,
                "has_offering": false, "defence_token": null,
                "reasoning": "closest threat"}"#,
        );
        let mut ctx = context(llm);
        let mechanics = mechanics_with_nyx();
        let agent = PlayerAgent::new(AgentId::new("pc_nyx"), 0.7);
        let declaration = agent.declare(&mut ctx, &mechanics, 1, 15).await;
        assert_eq!(declaration.intent, "strike the grunt");
        assert_eq!(declaration.attribute, Attribute::Agility);
        assert_eq!(declaration.action_type, ActionType::Combat);
        assert_eq!(declaration.target.as_deref(), Some("Grunt"));
        assert_eq!(declaration.initiative, 15);
    }

    #[tokio::test]
    async fn repair_retry_rescues_malformed_response() {
        let llm = ScriptedLlm::new();
        llm.push_response("pc_nyx", "I attack! (no json)");
        llm.push_response(
            "pc_nyx",
            r#"{"intent": "attack", "attribute": "strength", "action_type": "combat"}"#,
        );
        let mut ctx = context(llm);
        let mechanics = mechanics_with_nyx();
        let agent = PlayerAgent::new(AgentId::new("pc_nyx"), 0.7);
        let declaration = agent.declare(&mut ctx, &mechanics, 1, 10).await;
        assert_eq!(declaration.intent, "attack");
    }

    #[tokio::test]
    async fn double_failure_degrades_to_noop() {
        let llm = ScriptedLlm::new().with_default_response("still not json");
        let mut ctx = context(llm);
        let mechanics = mechanics_with_nyx();
        let agent = PlayerAgent::new(AgentId::new("pc_nyx"), 0.7);
        let declaration = agent.declare(&mut ctx, &mechanics, 1, 10).await;
        assert_eq!(declaration.action_type, ActionType::Sensing);
        assert!(declaration.target.is_none());
    }
}

//! The enemy tactical agent.
//!
//! Each enemy (or abstracted group) receives a round-keyed tactical prompt
//! and returns orders that are converted into an action declaration. A
//! panicked unit never reaches the LLM: its declaration is forced to FLEE
//! and resolved by the scheduler as an Athletics check.

use serde::Deserialize;
use tracing::warn;

use aeonisk_domain::actions::RitualFlags;
use aeonisk_domain::value_objects::{base_difficulty, Attribute, WeaponKind};
use aeonisk_domain::{ActionDeclaration, ActionType, AgentId};

use crate::agents::{battlefield_view, extract_json};
use crate::llm::{ChatMessage, LlmRequest};
use crate::mechanics::MechanicsEngine;
use crate::session::SessionContext;

/// JSON shape the tactics prompt asks for.
#[derive(Debug, Deserialize)]
struct EnemyOrders {
    #[serde(default)]
    defence_token: Option<String>,
    major_action: String,
    #[serde(default)]
    minor_action: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    weapon: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    share_intel: Option<String>,
}

/// Autonomous declaration loop for one enemy unit.
pub struct EnemyTacticalAgent {
    pub agent_id: AgentId,
    temperature: f32,
}

impl EnemyTacticalAgent {
    pub fn new(agent_id: AgentId, temperature: f32) -> Self {
        Self {
            agent_id,
            temperature,
        }
    }

    /// Produce this round's declaration. Shared intel from the orders is
    /// pushed to allies through the mechanics engine by the caller.
    pub async fn declare(
        &self,
        ctx: &mut SessionContext,
        mechanics: &MechanicsEngine,
        round: u32,
        initiative: i32,
        intel_sink: &mut Vec<String>,
    ) -> ActionDeclaration {
        let Some(enemy) = mechanics.enemy(&self.agent_id) else {
            return self.default_tactics(mechanics, initiative);
        };

        if enemy.panicked {
            return self.flee_declaration(&enemy.display_name, initiative);
        }

        let name = enemy.display_name.clone();
        let mut variables = std::collections::HashMap::new();
        variables.insert("display_name".to_string(), name.clone());
        variables.insert("round".to_string(), round.to_string());
        variables.insert(
            "self_status".to_string(),
            format!(
                "{} (health {}/{}, wounds {}, stuns {}, void {}, at {})",
                enemy.status_text(),
                enemy.health,
                enemy.max_health,
                enemy.wounds,
                enemy.stuns,
                enemy.void.score(),
                enemy.position
            ),
        );
        variables.insert("doctrine".to_string(), enemy.doctrine.clone());
        variables.insert("target_priority".to_string(), enemy.target_priority.clone());
        variables.insert(
            "battlefield".to_string(),
            battlefield_view(ctx, mechanics, &self.agent_id),
        );
        variables.insert(
            "intel".to_string(),
            if enemy.shared_intel.is_empty() {
                "none".to_string()
            } else {
                enemy
                    .shared_intel
                    .iter()
                    .map(|entry| format!("- round {}: {}", entry.round, entry.text))
                    .collect::<Vec<_>>()
                    .join("\n")
            },
        );
        variables.insert("tokens".to_string(), "none".to_string());

        let prompt = match ctx.prompts.compose("enemy", &["tactics"], &variables) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(agent = %self.agent_id, error = %e, "tactics prompt failed to compose");
                return self.default_tactics(mechanics, initiative);
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
                warn!(agent = %self.agent_id, error = %e, "tactics call failed");
                return self.default_tactics(mechanics, initiative);
            }
        };

        if let Some(declaration) = self.parse(&response, &name, initiative, intel_sink) {
            return declaration;
        }

        let repair_vars = std::collections::HashMap::from([
            (
                "error".to_string(),
                "response was not a valid orders JSON object".to_string(),
            ),
            ("original_response".to_string(), response),
        ]);
        let repaired = match ctx.prompts.compose("enemy", &["repair"], &repair_vars) {
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
            if let Some(declaration) = self.parse(&text, &name, initiative, intel_sink) {
                return declaration;
            }
        }
        warn!(agent = %self.agent_id, "orders unusable after repair; applying default tactics");
        self.default_tactics(mechanics, initiative)
    }

    fn parse(
        &self,
        response: &str,
        name: &str,
        initiative: i32,
        intel_sink: &mut Vec<String>,
    ) -> Option<ActionDeclaration> {
        let json = extract_json(response)?;
        let orders: EnemyOrders = serde_json::from_str(json).ok()?;
        if let Some(intel) = orders.share_intel.as_deref() {
            if !intel.trim().is_empty() {
                intel_sink.push(intel.trim().to_string());
            }
        }

        let (action_type, attribute, skill, intent) = match orders.major_action.as_str() {
            "attack" => {
                let ranged = orders
                    .weapon
                    .as_deref()
                    .and_then(aeonisk_domain::value_objects::find_weapon)
                    .map(|w| w.kind == WeaponKind::Ranged)
                    .unwrap_or(false);
                if ranged {
                    (
                        ActionType::Combat,
                        Attribute::Perception,
                        Some("Guns".to_string()),
                        "open fire".to_string(),
                    )
                } else {
                    (
                        ActionType::Combat,
                        Attribute::Agility,
                        Some("Melee".to_string()),
                        "close and strike".to_string(),
                    )
                }
            }
            "advance" | "retreat" => (
                ActionType::Move,
                Attribute::Agility,
                Some("Athletics".to_string()),
                orders.major_action.clone(),
            ),
            "ability" => (
                ActionType::Technical,
                Attribute::Intelligence,
                None,
                "use special ability".to_string(),
            ),
            "hold" => (
                ActionType::Reaction,
                Attribute::Perception,
                None,
                "hold position".to_string(),
            ),
            _ => return None,
        };

        Some(ActionDeclaration {
            agent_id: self.agent_id.clone(),
            character_name: name.to_string(),
            initiative,
            intent,
            description: orders.reasoning.clone().unwrap_or_default(),
            attribute,
            skill,
            action_type,
            estimated_difficulty: base_difficulty(action_type),
            target: orders.target.filter(|t| !t.trim().is_empty()),
            ritual: RitualFlags::default(),
            defence_token: orders.defence_token,
            reasoning: orders.reasoning.or(orders.minor_action),
        })
    }

    /// Doctrine default when the LLM is unusable: attack the nearest
    /// opposing combatant with the primary weapon.
    fn default_tactics(&self, mechanics: &MechanicsEngine, initiative: i32) -> ActionDeclaration {
        let enemy = mechanics.enemy(&self.agent_id);
        let name = enemy
            .map(|e| e.display_name.clone())
            .unwrap_or_else(|| self.agent_id.to_string());
        let target = enemy.and_then(|e| {
            let own_position = e.position;
            mechanics
                .characters()
                .filter(|c| c.alive)
                .min_by_key(|c| c.position.range_to(&own_position).penalty().abs())
                .map(|c| c.name.clone())
        });
        let ranged = enemy
            .map(|e| e.primary_weapon().kind == WeaponKind::Ranged)
            .unwrap_or(false);
        ActionDeclaration {
            agent_id: self.agent_id.clone(),
            character_name: name,
            initiative,
            intent: "press the attack".to_string(),
            description: "Falls back on doctrine.".to_string(),
            attribute: if ranged {
                Attribute::Perception
            } else {
                Attribute::Agility
            },
            skill: Some(if ranged { "Guns" } else { "Melee" }.to_string()),
            action_type: ActionType::Combat,
            estimated_difficulty: base_difficulty(ActionType::Combat),
            target,
            ritual: RitualFlags::default(),
            defence_token: None,
            reasoning: None,
        }
    }

    /// Forced declaration for a panicked unit.
    fn flee_declaration(&self, name: &str, initiative: i32) -> ActionDeclaration {
        ActionDeclaration {
            agent_id: self.agent_id.clone(),
            character_name: name.to_string(),
            initiative,
            intent: "FLEE".to_string(),
            description: "Breaks and runs for the nearest exit.".to_string(),
            attribute: Attribute::Agility,
            skill: Some("Athletics".to_string()),
            action_type: ActionType::Move,
            estimated_difficulty: 15,
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
    use aeonisk_domain::value_objects::{Attributes, Position, Ring, Side, SkillSet};
    use aeonisk_domain::SessionId;
    use std::collections::BTreeMap;

    fn mechanics_with_combatants() -> (MechanicsEngine, AgentId) {
        let mut mechanics = MechanicsEngine::new(true, true);
        let attrs: BTreeMap<String, i32> = Attribute::ALL
            .iter()
            .map(|a| (a.name().to_string(), 3))
            .collect();
        mechanics.add_character(
            Character::new(
                "Nyx",
                "they/them",
                "Tempest",
                Attributes::from_map(&attrs).unwrap(),
                SkillSet::default(),
            )
            .unwrap(),
        );
        let spawn = mechanics
            .spawn_enemy("grunt", "Grunt", 1, Position::new(Ring::Near, Side::Enemy), 1)
            .unwrap();
        let aeonisk_domain::events::SessionEvent::EnemySpawn { agent_id, .. } = spawn else {
            panic!("expected spawn event");
        };
        (mechanics, agent_id)
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
    async fn orders_convert_to_declaration() {
        let (mechanics, enemy_id) = mechanics_with_combatants();
        let llm = ScriptedLlm::new();
        llm.push_response(
            enemy_id.as_str(),
            r#"{"defence_token": null, "major_action": "attack",
                "minor_action": "none", "target": "Nyx",
                "weapon": "Pulse Pistol", "reasoning": "closest hostile",
                "share_intel": "PC is lightly armored"}"#,
        );
        let mut ctx = context(llm);
        let agent = EnemyTacticalAgent::new(enemy_id.clone(), 0.7);
        let mut intel = Vec::new();
        let declaration = agent.declare(&mut ctx, &mechanics, 1, 12, &mut intel).await;
        assert_eq!(declaration.action_type, ActionType::Combat);
        assert_eq!(declaration.attribute, Attribute::Perception);
        assert_eq!(declaration.target.as_deref(), Some("Nyx"));
        assert_eq!(intel, vec!["PC is lightly armored".to_string()]);
    }

    #[tokio::test]
    async fn panicked_unit_is_forced_to_flee() {
        let (mut mechanics, enemy_id) = mechanics_with_combatants();
        mechanics.enemy_mut(&enemy_id).unwrap().panicked = true;
        // No scripted response needed: the LLM must not be consulted.
        let mut ctx = context(ScriptedLlm::new());
        let agent = EnemyTacticalAgent::new(enemy_id, 0.7);
        let mut intel = Vec::new();
        let declaration = agent.declare(&mut ctx, &mechanics, 2, 9, &mut intel).await;
        assert_eq!(declaration.intent, "FLEE");
        assert_eq!(declaration.skill.as_deref(), Some("Athletics"));
    }

    #[tokio::test]
    async fn garbage_orders_fall_back_to_doctrine() {
        let (mechanics, enemy_id) = mechanics_with_combatants();
        let llm = ScriptedLlm::new().with_default_response("REEEE");
        let mut ctx = context(llm);
        let agent = EnemyTacticalAgent::new(enemy_id, 0.7);
        let mut intel = Vec::new();
        let declaration = agent.declare(&mut ctx, &mechanics, 1, 9, &mut intel).await;
        assert_eq!(declaration.action_type, ActionType::Combat);
        assert_eq!(declaration.target.as_deref(), Some("Nyx"));
    }
}

//! The DM adjudicator: authoritative resolution of every declared action.
//!
//! For each action the adjudicator composes a prompt with pre-computed
//! outcome guidance (the dice never move after the roll), issues one LLM
//! call, and turns the output into narration plus mechanical effects. It
//! prefers the structured-output path when the provider supports it and
//! falls back to marker parsing otherwise; the two are never mixed for a
//! single action.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use aeonisk_domain::entities::SceneClock;
use aeonisk_domain::events::PromptMetadata;
use aeonisk_domain::value_objects::CheckResult;
use aeonisk_domain::{ActionDeclaration, ActionType, MechanicalEffect};

use crate::agents::extract_json;
use crate::config::ScenarioConfig;
use crate::llm::{ChatMessage, LlmError, LlmRequest};
use crate::mechanics::MechanicsEngine;
use crate::narration::{fallback_damage, parse_markers, resolution_schema, StructuredResolution};
use crate::session::SessionContext;

/// The DM's fixed agent id in logs and the replay cache.
pub const DM_AGENT_ID: &str = "dm";

/// The running scenario frame.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub theme: String,
    pub location: String,
    pub situation: String,
    pub void_level: u8,
}

impl Scenario {
    pub fn summary(&self) -> String {
        format!(
            "{} at {}: {} (ambient void {})",
            self.theme, self.location, self.situation, self.void_level
        )
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioPayload {
    theme: String,
    location: String,
    situation: String,
    #[serde(default)]
    void_level: u8,
    #[serde(default)]
    clocks: Vec<ClockPayload>,
}

#[derive(Debug, Deserialize)]
struct ClockPayload {
    name: String,
    max: u8,
    #[serde(default)]
    description: String,
    #[serde(default)]
    filled_consequence: String,
}

/// Result of adjudicating one action.
#[derive(Debug)]
pub struct Adjudication {
    pub narration: String,
    pub effects: Vec<MechanicalEffect>,
    pub metadata: Option<PromptMetadata>,
    pub warnings: Vec<String>,
}

/// The DM-role agent.
pub struct DmAdjudicator {
    temperature: f32,
}

impl DmAdjudicator {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    /// Build the opening scenario. A config preset short-circuits the LLM;
    /// otherwise the DM is asked and a double failure degrades to a stock
    /// frame so a session can always start.
    pub async fn setup_scenario(
        &self,
        ctx: &mut SessionContext,
        preset: Option<&ScenarioConfig>,
    ) -> (Scenario, Vec<SceneClock>) {
        if let Some(preset) = preset {
            if !preset.situation.is_empty() && !preset.initial_clocks.is_empty() {
                let clocks = preset
                    .initial_clocks
                    .iter()
                    .filter_map(|c| {
                        SceneClock::new(c.name.clone(), c.max, c.description.clone())
                            .ok()
                            .map(|clock| clock.with_consequence(c.filled_consequence.clone()))
                    })
                    .collect();
                return (
                    Scenario {
                        theme: preset.theme.clone(),
                        location: preset.location.clone(),
                        situation: preset.situation.clone(),
                        void_level: preset.void_level,
                    },
                    clocks,
                );
            }
        }

        let variables = HashMap::from([
            (
                "theme".to_string(),
                preset.map(|p| p.theme.clone()).unwrap_or_default(),
            ),
            (
                "location".to_string(),
                preset.map(|p| p.location.clone()).unwrap_or_default(),
            ),
        ]);
        for _attempt in 0..2 {
            let Ok(prompt) = ctx.prompts.compose("dm", &["scenario_setup"], &variables) else {
                break;
            };
            let request = LlmRequest::new(DM_AGENT_ID, vec![ChatMessage::user(prompt.text.clone())])
                .with_temperature(self.temperature)
                .with_max_tokens(1024);
            let Ok(response) = ctx.llm_call(request, Some(prompt.metadata)).await else {
                continue;
            };
            if let Some(json) = extract_json(&response.content) {
                if let Ok(payload) = serde_json::from_str::<ScenarioPayload>(json) {
                    let clocks = payload
                        .clocks
                        .iter()
                        .filter_map(|c| {
                            SceneClock::new(c.name.clone(), c.max.max(1), c.description.clone())
                                .ok()
                                .map(|clock| clock.with_consequence(c.filled_consequence.clone()))
                        })
                        .collect();
                    return (
                        Scenario {
                            theme: payload.theme,
                            location: payload.location,
                            situation: payload.situation,
                            void_level: payload.void_level.min(10),
                        },
                        clocks,
                    );
                }
            }
            warn!("scenario setup response unusable; retrying once");
        }

        warn!("scenario setup failed twice; using stock frame");
        let clock = SceneClock::new("Escalation", 4, "How far the situation spirals")
            .ok()
            .map(|c| c.with_consequence("[ADVANCE_STORY: the situation boils over]".to_string()));
        (
            Scenario {
                theme: "standoff".to_string(),
                location: "a derelict transit hub".to_string(),
                situation: "Two factions contest the same salvage.".to_string(),
                void_level: 2,
            },
            clock.into_iter().collect(),
        )
    }

    /// Adjudicate one resolved check into narration plus effects.
    pub async fn adjudicate(
        &self,
        ctx: &mut SessionContext,
        mechanics: &MechanicsEngine,
        declaration: &ActionDeclaration,
        check: &CheckResult,
        scenario: &Scenario,
    ) -> Adjudication {
        let variables = self.adjudication_variables(ctx, mechanics, declaration, check, scenario);
        let sections: &[&str] = &["adjudicate", "marker_reference"];

        let (narration, mut effects, metadata, mut warnings) = if ctx.provider.supports_structured()
        {
            self.adjudicate_structured(ctx, sections, &variables).await
        } else {
            self.adjudicate_text(ctx, sections, &variables).await
        };

        // Resolve opaque target ids inside effects to display names.
        let mut resolved = Vec::with_capacity(effects.len());
        for effect in effects.drain(..) {
            match resolve_effect_targets(effect, ctx, mechanics) {
                Ok(effect) => resolved.push(effect),
                Err(reason) => warnings.push(reason),
            }
        }

        // Fallback damage: PC-versus-enemy combat hits with no explicit
        // damage effect infer it from the margin. Never for PC-vs-PC.
        if let Some(amount) = self.fallback_amount(ctx, mechanics, declaration, check, &resolved) {
            if let Some(target_name) = declared_target_name(ctx, mechanics, declaration) {
                resolved.push(MechanicalEffect::Damage {
                    target: target_name,
                    amount,
                });
            }
        }

        Adjudication {
            narration,
            effects: resolved,
            metadata,
            warnings,
        }
    }

    async fn adjudicate_structured(
        &self,
        ctx: &mut SessionContext,
        sections: &[&str],
        variables: &HashMap<String, String>,
    ) -> (String, Vec<MechanicalEffect>, Option<PromptMetadata>, Vec<String>) {
        let schema = resolution_schema();
        for _attempt in 0..2 {
            let Ok(prompt) = ctx.prompts.compose("dm", sections, variables) else {
                break;
            };
            let request = LlmRequest::new(DM_AGENT_ID, vec![ChatMessage::user(prompt.text.clone())])
                .with_temperature(self.temperature)
                .with_max_tokens(2048);
            match ctx
                .llm_call_structured(request, &schema, Some(prompt.metadata.clone()))
                .await
            {
                Ok(value) => match serde_json::from_value::<StructuredResolution>(value) {
                    Ok(resolution) => {
                        return (
                            clamp_narration(resolution.narration),
                            resolution.effects,
                            Some(prompt.metadata),
                            Vec::new(),
                        );
                    }
                    Err(e) => warn!(error = %e, "structured resolution failed validation"),
                },
                Err(LlmError::StructuredUnsupported) => {
                    return self.adjudicate_text(ctx, sections, variables).await;
                }
                Err(e) => warn!(error = %e, "structured adjudication call failed"),
            }
        }
        (
            self.mechanical_fallback(variables),
            Vec::new(),
            None,
            vec!["structured adjudication failed twice; mechanical narration only".to_string()],
        )
    }

    async fn adjudicate_text(
        &self,
        ctx: &mut SessionContext,
        sections: &[&str],
        variables: &HashMap<String, String>,
    ) -> (String, Vec<MechanicalEffect>, Option<PromptMetadata>, Vec<String>) {
        for attempt in 0..2 {
            let composed = if attempt == 0 {
                ctx.prompts.compose("dm", sections, variables)
            } else {
                let repair_vars = HashMap::from([
                    (
                        "error".to_string(),
                        "the response was empty or unusable".to_string(),
                    ),
                    ("original_response".to_string(), String::new()),
                ]);
                ctx.prompts.compose("dm", &["repair", "adjudicate"], &{
                    let mut merged = variables.clone();
                    merged.extend(repair_vars);
                    merged
                })
            };
            let Ok(prompt) = composed else { break };
            let request = LlmRequest::new(DM_AGENT_ID, vec![ChatMessage::user(prompt.text.clone())])
                .with_temperature(self.temperature)
                .with_max_tokens(2048);
            match ctx.llm_call(request, Some(prompt.metadata.clone())).await {
                Ok(response) if !response.content.trim().is_empty() => {
                    let parsed = parse_markers(&response.content);
                    return (
                        clamp_narration(response.content),
                        parsed.effects,
                        Some(prompt.metadata),
                        parsed.warnings,
                    );
                }
                Ok(_) => warn!("empty adjudication response; retrying once"),
                Err(e) => warn!(error = %e, "adjudication call failed"),
            }
        }
        (
            self.mechanical_fallback(variables),
            Vec::new(),
            None,
            vec!["adjudication failed twice; mechanical narration only".to_string()],
        )
    }

    /// Terse DM-voice description of the mechanical outcome only.
    fn mechanical_fallback(&self, variables: &HashMap<String, String>) -> String {
        format!(
            "{} {}",
            variables
                .get("actor_summary")
                .cloned()
                .unwrap_or_else(|| "The actor".to_string()),
            variables
                .get("outcome_guidance")
                .cloned()
                .unwrap_or_else(|| "resolves the action.".to_string())
        )
    }

    fn adjudication_variables(
        &self,
        ctx: &SessionContext,
        mechanics: &MechanicsEngine,
        declaration: &ActionDeclaration,
        check: &CheckResult,
        scenario: &Scenario,
    ) -> HashMap<String, String> {
        let clocks = mechanics
            .clocks
            .snapshots()
            .iter()
            .map(|c| format!("- {} {}/{} ({})", c.name, c.current, c.maximum, c.state))
            .collect::<Vec<_>>()
            .join("\n");
        let action = format!(
            "{} - {} ({} / {}{})",
            declaration.intent,
            declaration.description,
            declaration.attribute,
            declaration
                .skill
                .clone()
                .unwrap_or_else(|| "unskilled".to_string()),
            if declaration.ritual.is_ritual {
                ", ritual"
            } else {
                ""
            }
        );
        let target_line = match declared_target_name(ctx, mechanics, declaration) {
            Some(name) => {
                let opaque = declaration
                    .target
                    .as_deref()
                    .filter(|t| t.starts_with("tgt_"))
                    .map(|t| format!(" ({t})"))
                    .unwrap_or_default();
                format!("Declared target: {name}{opaque}")
            }
            None => String::new(),
        };
        let outcome_guidance = format!(
            "d20 {} | total {} vs difficulty {} | margin {} | {}",
            check.roll_d20,
            check.total,
            check.difficulty,
            check.margin,
            check.tier.label()
        );
        HashMap::from([
            ("scenario".to_string(), scenario.summary()),
            ("clocks".to_string(), clocks),
            ("round".to_string(), ctx.round.to_string()),
            (
                "actor_summary".to_string(),
                format!(
                    "{} acts (initiative {}).",
                    declaration.character_name, declaration.initiative
                ),
            ),
            ("action".to_string(), action),
            ("target_line".to_string(), target_line),
            ("outcome_guidance".to_string(), outcome_guidance),
        ])
    }

    fn fallback_amount(
        &self,
        ctx: &SessionContext,
        mechanics: &MechanicsEngine,
        declaration: &ActionDeclaration,
        check: &CheckResult,
        effects: &[MechanicalEffect],
    ) -> Option<i32> {
        if declaration.action_type != ActionType::Combat {
            return None;
        }
        if !mechanics.is_pc(&declaration.agent_id) {
            return None;
        }
        if effects
            .iter()
            .any(|e| matches!(e, MechanicalEffect::Damage { .. }))
        {
            return None;
        }
        let target_id = declared_target_id(ctx, mechanics, declaration)?;
        // PC-against-PC narration is trusted as-is: no inferred damage.
        if mechanics.is_pc(&target_id) {
            return None;
        }
        let weapon = mechanics.character(&declaration.agent_id)?.primary_weapon();
        fallback_damage(check.tier, weapon.damage)
    }

    /// Round synthesis. Mandatory consequence markers carried over from
    /// filled clocks must appear; one retry, then the queued consequences
    /// are applied directly so they can never be lost.
    pub async fn synthesize(
        &self,
        ctx: &mut SessionContext,
        resolutions_summary: &str,
        required_markers: &[String],
    ) -> (String, Vec<MechanicalEffect>, Option<PromptMetadata>) {
        let required_text = if required_markers.is_empty() {
            String::new()
        } else {
            format!(
                "Your synthesis MUST include these markers verbatim:\n{}",
                required_markers.join("\n")
            )
        };
        let variables = HashMap::from([
            ("round".to_string(), ctx.round.to_string()),
            (
                "resolutions_summary".to_string(),
                resolutions_summary.to_string(),
            ),
            ("required_markers".to_string(), required_text),
        ]);

        let mut last_text = String::new();
        let mut last_metadata = None;
        for attempt in 0..2 {
            let Ok(prompt) = ctx.prompts.compose("dm", &["synthesis"], &variables) else {
                break;
            };
            let request = LlmRequest::new(DM_AGENT_ID, vec![ChatMessage::user(prompt.text.clone())])
                .with_temperature(self.temperature)
                .with_max_tokens(1024);
            match ctx.llm_call(request, Some(prompt.metadata.clone())).await {
                Ok(response) => {
                    let missing: Vec<&String> = required_markers
                        .iter()
                        .filter(|marker| !response.content.contains(marker.as_str()))
                        .collect();
                    if missing.is_empty() {
                        let parsed = parse_markers(&response.content);
                        for warning in parsed.warnings {
                            warn!(warning, "synthesis marker warning");
                        }
                        return (response.content, parsed.effects, Some(prompt.metadata));
                    }
                    warn!(
                        attempt,
                        missing = missing.len(),
                        "synthesis omitted mandatory markers"
                    );
                    last_text = response.content;
                    last_metadata = Some(prompt.metadata);
                }
                Err(e) => warn!(error = %e, "synthesis call failed"),
            }
        }

        // Apply the queued consequences directly rather than losing them,
        // without double-counting markers the last response did include.
        let mut effects = parse_markers(&last_text).effects;
        for marker in required_markers {
            if !last_text.contains(marker.as_str()) {
                effects.extend(parse_markers(marker).effects);
            }
        }
        if last_text.is_empty() {
            last_text = "The round closes without further comment.".to_string();
        }
        (last_text, effects, last_metadata)
    }

    /// Closing mission debrief.
    pub async fn debrief(
        &self,
        ctx: &mut SessionContext,
        rounds: u32,
        reason: &str,
        finals: &str,
    ) -> String {
        let variables = HashMap::from([
            ("rounds".to_string(), rounds.to_string()),
            ("reason".to_string(), reason.to_string()),
            ("finals".to_string(), finals.to_string()),
        ]);
        if let Ok(prompt) = ctx.prompts.compose("dm", &["debrief"], &variables) {
            let request = LlmRequest::new(DM_AGENT_ID, vec![ChatMessage::user(prompt.text.clone())])
                .with_temperature(self.temperature)
                .with_max_tokens(512);
            if let Ok(response) = ctx.llm_call(request, Some(prompt.metadata)).await {
                if !response.content.trim().is_empty() {
                    return response.content;
                }
            }
        }
        format!("Session ended after {rounds} rounds: {reason}.")
    }
}

/// Cap narration at roughly 2000 characters, backing off to the nearest
/// char boundary so multibyte markers never split.
fn clamp_narration(mut text: String) -> String {
    const MAX: usize = 2000;
    if text.len() > MAX {
        let mut cut = MAX;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Resolve a declaration's target reference to an agent id: opaque ids go
/// through the round map, anything else through name matching.
pub fn declared_target_id(
    ctx: &SessionContext,
    mechanics: &MechanicsEngine,
    declaration: &ActionDeclaration,
) -> Option<aeonisk_domain::AgentId> {
    let target = declaration.target.as_deref()?;
    if target.starts_with("tgt_") {
        return ctx.targets.resolve(target).cloned();
    }
    mechanics.resolve_combatant(target)
}

fn declared_target_name(
    ctx: &SessionContext,
    mechanics: &MechanicsEngine,
    declaration: &ActionDeclaration,
) -> Option<String> {
    declared_target_id(ctx, mechanics, declaration)
        .and_then(|id| mechanics.combatant_name(&id))
}

/// Rewrite opaque `tgt_` references inside an effect to display names the
/// mechanics engine can resolve. Unresolvable references drop the effect.
fn resolve_effect_targets(
    effect: MechanicalEffect,
    ctx: &SessionContext,
    mechanics: &MechanicsEngine,
) -> Result<MechanicalEffect, String> {
    let resolve = |reference: &str| -> Result<String, String> {
        if reference.starts_with("tgt_") {
            ctx.targets
                .resolve(reference)
                .and_then(|id| mechanics.combatant_name(id))
                .ok_or_else(|| format!("opaque target '{reference}' not in this round's map"))
        } else {
            Ok(reference.to_string())
        }
    };
    match effect {
        MechanicalEffect::VoidChange {
            character,
            delta,
            reason,
        } => Ok(MechanicalEffect::VoidChange {
            character: resolve(&character)?,
            delta,
            reason,
        }),
        MechanicalEffect::SoulcreditChange {
            character,
            delta,
            reason,
        } => Ok(MechanicalEffect::SoulcreditChange {
            character: resolve(&character)?,
            delta,
            reason,
        }),
        MechanicalEffect::Damage { target, amount } => Ok(MechanicalEffect::Damage {
            target: resolve(&target)?,
            amount,
        }),
        other => Ok(other),
    }
}

//! The session orchestrator: a deterministic, initiative-ordered
//! declare/resolve/synthesis/cleanup loop.
//!
//! The loop is single-threaded and cooperative; the only awaits are LLM
//! calls, issued strictly in initiative order, so the event stream (and
//! therefore a replay) is fully determined by the seed plus the LLM
//! responses. Declarations are intentions: the action validator re-checks
//! prerequisites at the actor's turn and emits an `invalidated` resolution
//! instead of executing a broken one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use aeonisk_domain::events::{DebriefLine, SessionEvent};
use aeonisk_domain::{
    ActionDeclaration, ActionResolution, ActionType, AgentId, MechanicalEffect, ResolutionOutcome,
};

use crate::agents::{declared_target_id, DmAdjudicator, EnemyTacticalAgent, PlayerAgent};
use crate::agents::Scenario;
use crate::config::SessionConfig;
use crate::eventlog::EventLogError;
use crate::mechanics::{InitiativeEntry, MechanicsEngine};
use crate::session::SessionContext;

/// Error type for a running session.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Event log failure: {0}")]
    EventLog(#[from] EventLogError),
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    ClocksResolved,
    TotalPartyKill,
    MaxRounds,
    Interrupted,
    Stalled,
}

impl SessionOutcome {
    pub fn reason(&self) -> &'static str {
        match self {
            SessionOutcome::ClocksResolved => "all clocks resolved",
            SessionOutcome::TotalPartyKill => "total party kill",
            SessionOutcome::MaxRounds => "maximum round count reached",
            SessionOutcome::Interrupted => "operator interrupt",
            SessionOutcome::Stalled => "scheduler stall",
        }
    }
}

/// Per-round mutable record consulted by the action validator.
#[derive(Debug, Default)]
struct ResolutionState {
    defeated: HashSet<AgentId>,
    claimed_tokens: HashSet<String>,
    position_changes: u32,
}

/// Owns the agents and drives the round loop to a terminal condition.
pub struct SessionOrchestrator {
    ctx: SessionContext,
    mechanics: MechanicsEngine,
    config: SessionConfig,
    dm: DmAdjudicator,
    players: Vec<PlayerAgent>,
    scenario: Option<Scenario>,
    shutdown: Arc<AtomicBool>,
    pending_consequences: Vec<String>,
    stalled_rounds: u32,
    scene_changed_this_round: bool,
}

impl SessionOrchestrator {
    pub fn new(config: SessionConfig, ctx: SessionContext) -> Self {
        let mut mechanics = MechanicsEngine::new(
            config.enemy_agent_config.void_tracking_enabled,
            config.enemy_agent_config.loot_suggestions_enabled,
        )
        .with_spawn_limits(
            config.enemy_agent_config.allow_groups,
            config.enemy_agent_config.max_enemies_per_combat,
        );
        let mut players = Vec::new();
        for player in &config.players {
            // Validation already proved these build; a failure here means
            // the config changed underneath us, so skip with a warning.
            match player.build_character() {
                Ok(character) => {
                    players.push(PlayerAgent::new(
                        character.agent_id.clone(),
                        config.player_llm(player).temperature,
                    ));
                    mechanics.add_character(character);
                }
                Err(e) => warn!(player = %player.name, error = %e, "player skipped"),
            }
        }
        let dm = DmAdjudicator::new(config.dm.temperature);
        Self {
            ctx,
            mechanics,
            config,
            dm,
            players,
            scenario: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            pending_consequences: Vec::new(),
            stalled_rounds: 0,
            scene_changed_this_round: false,
        }
    }

    /// Flag checked at round boundaries; an in-flight round completes and
    /// logs its summary before the session ends.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Direct access for test setup (seeding enemies, clocks).
    pub fn mechanics_mut(&mut self) -> &mut MechanicsEngine {
        &mut self.mechanics
    }

    pub fn mechanics(&self) -> &MechanicsEngine {
        &self.mechanics
    }

    pub fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.ctx
    }

    /// Run the session to a terminal condition.
    pub async fn run(&mut self) -> Result<SessionOutcome, SchedulerError> {
        self.ctx.emit(SessionEvent::SessionStart {
            session_name: self.config.session_name.clone(),
            seed: self.ctx.rng.seed(),
            players: self.players.iter().map(|p| p.agent_id.to_string()).collect(),
            free_targeting_mode: self.ctx.free_targeting,
        })?;

        let (scenario, clocks) = self
            .dm
            .setup_scenario(&mut self.ctx, self.config.scenario.as_ref())
            .await;
        for clock in clocks {
            if let Err(e) = self.mechanics.add_clock(clock) {
                warn!(error = %e, "initial clock rejected");
            }
        }
        self.mechanics.set_scene_void_level(scenario.void_level);
        self.ctx.emit(SessionEvent::Scenario {
            theme: scenario.theme.clone(),
            location: scenario.location.clone(),
            situation: scenario.situation.clone(),
            void_level: scenario.void_level,
            clocks: self.mechanics.clocks.snapshots(),
        })?;
        self.scenario = Some(scenario);

        let outcome = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break SessionOutcome::Interrupted;
            }
            if self.ctx.round >= self.config.max_turns {
                break SessionOutcome::MaxRounds;
            }
            self.ctx.round += 1;
            info!(round = self.ctx.round, "round begins");
            self.scene_changed_this_round = false;
            self.mechanics.begin_round();

            // Initiative, re-rolled every round.
            let initiative = self.mechanics.roll_initiative(&mut self.ctx.rng);

            // Fresh opaque ids before any declaration is prompted.
            if self.ctx.free_targeting {
                let ids = self.mechanics.active_agent_ids();
                self.ctx.targets.assign(&ids, &mut self.ctx.rng);
            }

            let declarations = self.declare_phase(&initiative).await?;
            let resolutions = self.resolve_phase(declarations).await?;
            let outcome = self.cleanup_phase(&resolutions).await?;

            self.mechanics.end_round(self.ctx.round);
            self.ctx.targets.clear();

            if let Some(outcome) = outcome {
                break outcome;
            }
        };

        self.finish(outcome).await?;
        Ok(outcome)
    }

    /// Declare phase: prompts issued strictly in ascending initiative.
    async fn declare_phase(
        &mut self,
        initiative: &[InitiativeEntry],
    ) -> Result<Vec<ActionDeclaration>, SchedulerError> {
        let mut declarations = Vec::with_capacity(initiative.len());
        let round = self.ctx.round;
        for entry in initiative.iter().rev() {
            let declaration = if self.mechanics.is_pc(&entry.agent_id) {
                let Some(player) = self
                    .players
                    .iter()
                    .find(|p| p.agent_id == entry.agent_id)
                    .cloned()
                else {
                    continue;
                };
                player
                    .declare(&mut self.ctx, &self.mechanics, round, entry.initiative)
                    .await
            } else if self.config.enemy_agents_enabled {
                let agent = EnemyTacticalAgent::new(entry.agent_id.clone(), self.config.dm.temperature);
                let mut intel = Vec::new();
                let declaration = agent
                    .declare(
                        &mut self.ctx,
                        &self.mechanics,
                        round,
                        entry.initiative,
                        &mut intel,
                    )
                    .await;
                if self.config.enemy_agent_config.shared_intel_enabled {
                    for note in intel {
                        self.mechanics.share_intel(&entry.agent_id, round, &note);
                    }
                }
                declaration
            } else {
                continue;
            };
            self.ctx.emit(SessionEvent::ActionDeclaration {
                declaration: declaration.clone(),
            })?;
            declarations.push(declaration);
        }
        Ok(declarations)
    }

    /// Resolve phase: descending initiative, each actor's full
    /// adjudication completing before the next begins.
    async fn resolve_phase(
        &mut self,
        mut declarations: Vec<ActionDeclaration>,
    ) -> Result<Vec<ActionResolution>, SchedulerError> {
        declarations.sort_by(|a, b| b.initiative.cmp(&a.initiative));
        let mut state = ResolutionState::default();
        let mut resolutions = Vec::with_capacity(declarations.len());

        for declaration in declarations {
            if let Some(reason) = self.validate(&declaration, &state) {
                let resolution = ActionResolution::invalidated(declaration, reason);
                self.ctx.emit(SessionEvent::ActionResolution {
                    resolution: resolution.clone(),
                })?;
                resolutions.push(resolution);
                continue;
            }

            if let Some(token) = &declaration.defence_token {
                state.claimed_tokens.insert(token.clone());
                if let Some(character) = self.mechanics.character_mut(&declaration.agent_id) {
                    character.claimed_token = Some(token.clone());
                }
            }

            self.emit_iff_events(&declaration)?;

            let resolution = if self.mechanics.is_pc(&declaration.agent_id) {
                self.resolve_player_action(declaration, &mut state).await?
            } else {
                self.resolve_enemy_action(declaration, &mut state)?
            };
            self.ctx.emit(SessionEvent::ActionResolution {
                resolution: resolution.clone(),
            })?;
            resolutions.push(resolution);
        }
        info!(
            resolved = resolutions.len(),
            tokens_claimed = state.claimed_tokens.len(),
            position_changes = state.position_changes,
            "resolve phase complete"
        );
        Ok(resolutions)
    }

    /// The action validator: actor alive, target alive, token unclaimed.
    fn validate(
        &self,
        declaration: &ActionDeclaration,
        state: &ResolutionState,
    ) -> Option<String> {
        if state.defeated.contains(&declaration.agent_id)
            || !self.mechanics.is_alive(&declaration.agent_id)
        {
            return Some(format!(
                "{} was defeated before acting",
                declaration.character_name
            ));
        }
        if let Some(target_ref) = &declaration.target {
            if let Some(target_id) = declared_target_id(&self.ctx, &self.mechanics, declaration) {
                if state.defeated.contains(&target_id) || !self.mechanics.is_alive(&target_id) {
                    let name = self
                        .mechanics
                        .combatant_name(&target_id)
                        .unwrap_or_else(|| target_ref.clone());
                    return Some(format!("target {name} ({target_id}) was already defeated"));
                }
            }
        }
        if let Some(token) = &declaration.defence_token {
            if state.claimed_tokens.contains(token) {
                return Some(format!("token '{token}' was claimed by an earlier actor"));
            }
        }
        None
    }

    /// IFF research events for opaque-id declarations in free targeting.
    fn emit_iff_events(&mut self, declaration: &ActionDeclaration) -> Result<(), SchedulerError> {
        if !self.ctx.free_targeting {
            return Ok(());
        }
        let Some(target_ref) = declaration.target.as_deref() else {
            return Ok(());
        };
        if !target_ref.starts_with("tgt_") || declaration.action_type != ActionType::Combat {
            return Ok(());
        }
        let Some(target_id) = declared_target_id(&self.ctx, &self.mechanics, declaration) else {
            return Ok(());
        };
        let attacker_faction = self
            .mechanics
            .combatant_faction(&declaration.agent_id)
            .unwrap_or_default();
        let target_faction = self
            .mechanics
            .combatant_faction(&target_id)
            .unwrap_or_default();
        let faction_match = !attacker_faction.is_empty()
            && (attacker_faction == target_faction
                || target_faction.contains(&attacker_faction)
                || attacker_faction.contains(&target_faction));
        self.ctx.emit(SessionEvent::IffDecision {
            reasoning: declaration.reasoning.clone().unwrap_or_default(),
            attacker_faction,
            target_faction,
            faction_match,
        })?;
        Ok(())
    }

    async fn resolve_player_action(
        &mut self,
        declaration: ActionDeclaration,
        state: &mut ResolutionState,
    ) -> Result<ActionResolution, SchedulerError> {
        let roll = self.ctx.rng.d20();
        let Some(check) = self.mechanics.resolve_declared_check(&declaration, roll) else {
            return Ok(ActionResolution::invalidated(
                declaration,
                "actor unknown to the mechanics engine",
            ));
        };
        let scenario = self.scenario.clone().unwrap_or_else(|| Scenario {
            theme: String::new(),
            location: String::new(),
            situation: String::new(),
            void_level: self.mechanics.scene_void_level(),
        });
        let target_id = declared_target_id(&self.ctx, &self.mechanics, &declaration);
        let mut adjudication = self
            .dm
            .adjudicate(&mut self.ctx, &self.mechanics, &declaration, &check, &scenario)
            .await;
        for warning in &adjudication.warnings {
            warn!(warning, "adjudication warning");
        }

        // Auto-parry reaction: a capable target shaves its Melee rank off
        // the incoming damage before anything is applied.
        if self.reactions_enabled()
            && declaration.action_type == ActionType::Combat
        {
            if let Some(target_id) = &target_id {
                if !self.mechanics.is_pc(target_id) {
                    if let Some(reduction) = self.mechanics.try_parry(target_id) {
                        let target_name = self
                            .mechanics
                            .combatant_name(target_id)
                            .unwrap_or_default();
                        for effect in &mut adjudication.effects {
                            if let MechanicalEffect::Damage { target, amount } = effect {
                                if *target == target_name {
                                    *amount = (*amount - reduction).max(0);
                                }
                            }
                        }
                    }
                }
            }
        }

        // High-risk opt-in: a fully provisioned ritual may pierce the
        // per-scene void cap.
        let high_risk = declaration.ritual.is_ritual
            && declaration.ritual.has_primary_tool
            && declaration.ritual.has_offering;
        let application = self.mechanics.apply_effects(
            self.ctx.round,
            Some(&declaration.agent_id),
            &adjudication.effects,
            &mut self.ctx.rng,
            high_risk,
        );
        self.absorb_application(application, state)?;

        // Movement into enemy sightlines draws overwatch fire.
        if self.reactions_enabled() && declaration.action_type == ActionType::Move {
            for reactor in self.mechanics.overwatch_reactors(&declaration.agent_id) {
                self.mechanics.spend_reaction(&reactor);
                let attack = self.mechanics.enemy_attack(
                    &reactor,
                    &declaration.agent_id,
                    &mut self.ctx.rng,
                    self.ctx.round,
                );
                if let Some((_, events)) = attack {
                    self.emit_combat_events(events, state)?;
                }
            }
        }

        // Friendly fire bookkeeping for PC-on-PC hits.
        if let Some(target_id) = target_id {
            if self.ctx.free_targeting
                && self.mechanics.is_pc(&target_id)
                && declaration.action_type == ActionType::Combat
            {
                let damage: i32 = adjudication
                    .effects
                    .iter()
                    .filter_map(|e| match e {
                        MechanicalEffect::Damage { amount, .. } => Some(*amount),
                        _ => None,
                    })
                    .sum();
                let target_faction = self
                    .mechanics
                    .combatant_faction(&target_id)
                    .unwrap_or_default();
                let intentional = declaration
                    .reasoning
                    .as_deref()
                    .map(|r| !target_faction.is_empty() && r.contains(&target_faction))
                    .unwrap_or(false);
                self.ctx.emit(SessionEvent::FriendlyFire {
                    attacker_id: declaration.agent_id.clone(),
                    target_id,
                    damage,
                    intentional,
                })?;
            }
        }

        Ok(ActionResolution {
            declaration,
            outcome: ResolutionOutcome::Resolved,
            check: Some(check),
            narration: adjudication.narration,
            effects: adjudication.effects,
        })
    }

    /// Enemy actions resolve mechanically: the attack formula is computed
    /// by the engine and logged with its full breakdown; no DM call.
    fn resolve_enemy_action(
        &mut self,
        declaration: ActionDeclaration,
        state: &mut ResolutionState,
    ) -> Result<ActionResolution, SchedulerError> {
        // Forced flee for panicked units.
        if declaration.intent == "FLEE" {
            let Some((check, defeat)) = self.mechanics.flee_check(
                &declaration.agent_id,
                &mut self.ctx.rng,
                self.ctx.round,
            ) else {
                return Ok(ActionResolution::invalidated(
                    declaration,
                    "fleeing unit unknown to the mechanics engine",
                ));
            };
            let narration = if defeat.is_some() {
                format!("{} breaks and flees the field.", declaration.character_name)
            } else {
                format!(
                    "{} tries to flee but finds no opening, and steadies instead.",
                    declaration.character_name
                )
            };
            if let Some(event) = defeat {
                if let SessionEvent::EnemyDefeat { agent_id, .. } = &event {
                    state.defeated.insert(agent_id.clone());
                }
                self.ctx.emit(event)?;
            }
            return Ok(ActionResolution {
                declaration,
                outcome: ResolutionOutcome::Resolved,
                check: Some(check),
                narration,
                effects: Vec::new(),
            });
        }

        match declaration.action_type {
            ActionType::Combat => {
                let Some(target_id) = declared_target_id(&self.ctx, &self.mechanics, &declaration)
                else {
                    return Ok(ActionResolution::invalidated(
                        declaration,
                        "declared target could not be identified",
                    ));
                };
                let Some((outcome, events)) = self.mechanics.enemy_attack(
                    &declaration.agent_id,
                    &target_id,
                    &mut self.ctx.rng,
                    self.ctx.round,
                ) else {
                    return Ok(ActionResolution::invalidated(
                        declaration,
                        "attacker unknown to the mechanics engine",
                    ));
                };
                self.emit_combat_events(events, state)?;
                let narration = format!(
                    "{} attacks {}: {}",
                    declaration.character_name,
                    self.mechanics
                        .combatant_name(&target_id)
                        .unwrap_or_else(|| target_id.to_string()),
                    outcome.breakdown
                );
                let effects = vec![MechanicalEffect::Damage {
                    target: self
                        .mechanics
                        .combatant_name(&target_id)
                        .unwrap_or_else(|| target_id.to_string()),
                    amount: outcome.dealt,
                }];
                Ok(ActionResolution {
                    declaration,
                    outcome: ResolutionOutcome::Resolved,
                    check: None,
                    narration,
                    effects,
                })
            }
            ActionType::Move => {
                let toward = declaration.intent != "retreat";
                let moved = self
                    .mechanics
                    .move_combatant(&declaration.agent_id, toward);
                if moved.is_some() {
                    state.position_changes += 1;
                }
                let narration = match moved {
                    Some(position) => format!(
                        "{} repositions to {position}.",
                        declaration.character_name
                    ),
                    None => format!("{} holds in place.", declaration.character_name),
                };
                Ok(ActionResolution {
                    declaration,
                    outcome: ResolutionOutcome::Resolved,
                    check: None,
                    narration,
                    effects: Vec::new(),
                })
            }
            _ => Ok(ActionResolution {
                declaration: declaration.clone(),
                outcome: ResolutionOutcome::Resolved,
                check: None,
                narration: format!(
                    "{} {}.",
                    declaration.character_name,
                    declaration.intent
                ),
                effects: Vec::new(),
            }),
        }
    }

    fn reactions_enabled(&self) -> bool {
        self.config.tactical_module_enabled && self.config.enemy_agent_config.auto_execute_reactions
    }

    /// Emit attack side events, marking any freshly defeated combatants in
    /// the per-round state.
    fn emit_combat_events(
        &mut self,
        events: Vec<SessionEvent>,
        state: &mut ResolutionState,
    ) -> Result<(), SchedulerError> {
        for event in events {
            if let SessionEvent::EnemyDefeat { agent_id, .. } = &event {
                state.defeated.insert(agent_id.clone());
            }
            if let SessionEvent::CharacterState { snapshot } = &event {
                if !self.mechanics.is_alive(&snapshot.agent_id) {
                    state.defeated.insert(snapshot.agent_id.clone());
                }
            }
            self.ctx.emit(event)?;
        }
        Ok(())
    }

    fn absorb_application(
        &mut self,
        application: crate::mechanics::EffectApplication,
        state: &mut ResolutionState,
    ) -> Result<(), SchedulerError> {
        for event in application.events {
            if let SessionEvent::EnemyDefeat { agent_id, .. } = &event {
                state.defeated.insert(agent_id.clone());
            }
            if let SessionEvent::CharacterState { snapshot } = &event {
                if !self.mechanics.is_alive(&snapshot.agent_id) {
                    state.defeated.insert(snapshot.agent_id.clone());
                }
            }
            self.ctx.emit(event)?;
        }
        if let Some(description) = application.pivot {
            self.apply_scene_change(&description);
        }
        if let Some(description) = application.story_advance {
            self.apply_scene_change(&description);
        }
        Ok(())
    }

    fn apply_scene_change(&mut self, description: &str) {
        info!(description, "scene change");
        self.mechanics.reset_scene();
        self.scene_changed_this_round = true;
        if let Some(scenario) = &mut self.scenario {
            scenario.situation = description.to_string();
        }
    }

    /// Cleanup phase: batched clock updates, expiry, morale, vendor
    /// visits, synthesis, round summary, terminal checks.
    async fn cleanup_phase(
        &mut self,
        resolutions: &[ActionResolution],
    ) -> Result<Option<SessionOutcome>, SchedulerError> {
        let queued = self.mechanics.clocks.queued_len();
        let filled = self.mechanics.clocks.apply_batch();
        for clock in &filled {
            if !clock.consequence.trim().is_empty() {
                self.pending_consequences.push(clock.consequence.clone());
            }
        }

        for expired in self.mechanics.clocks.note_round() {
            match expired.outcome {
                aeonisk_domain::entities::ExpiryOutcome::CrisisAverted => {
                    info!(clock = %expired.name, "clock expired quietly");
                }
                aeonisk_domain::entities::ExpiryOutcome::Escalate => {
                    if let Some(clock) = self.mechanics.clocks.get(&expired.name) {
                        if !clock.filled_consequence.trim().is_empty() {
                            self.pending_consequences
                                .push(clock.filled_consequence.clone());
                        }
                    }
                }
            }
            self.mechanics.clocks.archive(&expired.name);
        }

        // Morale and retreat checks.
        let mut morale_candidates: Vec<AgentId> = Vec::new();
        for enemy in self.mechanics.enemies() {
            if enemy.alive && !enemy.panicked && enemy.morale_triggered() {
                morale_candidates.push(enemy.agent_id.clone());
            }
        }
        for agent_id in morale_candidates {
            let disposition = self
                .mechanics
                .enemy(&agent_id)
                .map(|e| e.disposition)
                .unwrap_or_default();
            if disposition == aeonisk_domain::value_objects::MoraleDisposition::Surrender {
                if let Some(event) = self.mechanics.despawn_enemy(&agent_id, self.ctx.round, "surrendered") {
                    self.ctx.emit(event)?;
                }
                continue;
            }
            if let Some(event) = self.mechanics.morale_check(&agent_id, &mut self.ctx.rng) {
                self.ctx.emit(event)?;
            }
        }

        // Vendor cadence.
        if self.config.vendor_spawn_frequency > 0
            && self.ctx.round % (self.config.vendor_spawn_frequency as u32) == 0
        {
            self.ctx.emit(SessionEvent::VendorVisit {
                vendor: "The Tin Peddler".to_string(),
            })?;
        }

        // Synthesis, carrying any filled-clock consequences.
        let summary_text = resolutions
            .iter()
            .map(|r| match &r.outcome {
                ResolutionOutcome::Resolved => {
                    format!("- {}: {}", r.declaration.character_name, r.narration)
                }
                ResolutionOutcome::Invalidated { reason } => {
                    format!("- {}: invalidated ({reason})", r.declaration.character_name)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let required = std::mem::take(&mut self.pending_consequences);
        let (synthesis_text, synthesis_effects, metadata) = self
            .dm
            .synthesize(&mut self.ctx, &summary_text, &required)
            .await;
        let synthesis_event = SessionEvent::RoundSynthesis {
            text: synthesis_text,
        };
        match metadata {
            Some(metadata) => self.ctx.emit_with_metadata(synthesis_event, metadata)?,
            None => self.ctx.emit(synthesis_event)?,
        }
        for clock in &filled {
            self.mechanics.clocks.archive(&clock.name);
        }
        let application = self.mechanics.apply_effects(
            self.ctx.round,
            None,
            &synthesis_effects,
            &mut self.ctx.rng,
            false,
        );
        let mut throwaway = ResolutionState::default();
        self.absorb_application(application, &mut throwaway)?;
        // Synthesis clock movements land immediately rather than waiting a
        // round for the next batch.
        let late_fills = self.mechanics.clocks.apply_batch();
        for clock in late_fills {
            if !clock.consequence.trim().is_empty() {
                self.pending_consequences.push(clock.consequence.clone());
            }
        }

        let actions_resolved = resolutions
            .iter()
            .filter(|r| matches!(r.outcome, ResolutionOutcome::Resolved))
            .count() as u32;
        let actions_invalidated = resolutions.len() as u32 - actions_resolved;
        self.ctx.emit(SessionEvent::RoundSummary {
            actions_resolved,
            actions_invalidated,
            clocks: self.mechanics.clocks.snapshots(),
            combatants: self.mechanics.combatant_snapshots(),
        })?;

        // Stall detection: no clock movement, no surviving action, and no
        // marker for three consecutive rounds.
        let any_marker = resolutions.iter().any(|r| !r.effects.is_empty())
            || !synthesis_effects.is_empty();
        if queued == 0 && actions_resolved == 0 && !any_marker {
            self.stalled_rounds += 1;
        } else {
            self.stalled_rounds = 0;
        }
        if self.stalled_rounds == 3 {
            warn!("no state change for three rounds; session appears stalled");
            self.ctx.emit(SessionEvent::StallWarning {
                rounds_stalled: self.stalled_rounds,
            })?;
        }
        if self.stalled_rounds >= 4 {
            return Ok(Some(SessionOutcome::Stalled));
        }

        if self.mechanics.total_party_kill() {
            return Ok(Some(SessionOutcome::TotalPartyKill));
        }
        if self.mechanics.clocks.all_resolved()
            && self.pending_consequences.is_empty()
            && !self.scene_changed_this_round
        {
            return Ok(Some(SessionOutcome::ClocksResolved));
        }
        Ok(None)
    }

    async fn finish(&mut self, outcome: SessionOutcome) -> Result<(), SchedulerError> {
        let finals: Vec<DebriefLine> = self
            .mechanics
            .characters()
            .map(|c| DebriefLine {
                name: c.name.clone(),
                void: c.void.score(),
                soulcredit: c.soulcredit,
            })
            .collect();
        let finals_text = finals
            .iter()
            .map(|line| {
                format!(
                    "- {}: void {}, soulcredit {}",
                    line.name, line.void, line.soulcredit
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let rounds = self.ctx.round;
        let text = self
            .dm
            .debrief(&mut self.ctx, rounds, outcome.reason(), &finals_text)
            .await;
        self.ctx.emit(SessionEvent::MissionDebrief { text, finals })?;
        self.ctx.emit(SessionEvent::SessionEnd {
            reason: outcome.reason().to_string(),
            rounds,
        })?;
        info!(reason = outcome.reason(), "session ended");
        Ok(())
    }
}

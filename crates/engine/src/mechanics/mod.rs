//! The mechanics engine: the single writer for all combatant, clock, void,
//! and soulcredit state.
//!
//! Agents and the DM never mutate state directly; they produce declarations
//! and effects, and everything funnels through here. Dice are drawn from
//! the session RNG handle passed into each rolling operation, keeping the
//! call order (and therefore the replayed dice stream) explicit.

mod clocks;

pub use clocks::{ClockBank, ClockError, ExpiredClock, FilledClock};

use std::collections::BTreeMap;

use tracing::{debug, warn};

use aeonisk_domain::entities::{Character, Enemy, SceneClock};
use aeonisk_domain::events::{CombatantSnapshot, SessionEvent};
use aeonisk_domain::value_objects::{
    compute_difficulty, Attribute, CheckResult, DamageChannel, Position,
};
use aeonisk_domain::{ActionDeclaration, AgentId, MechanicalEffect};

use crate::rng::SessionRng;

/// Initiative line for one combatant, already rolled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiativeEntry {
    pub agent_id: AgentId,
    pub initiative: i32,
    pub agility: i32,
}

/// Result of applying one action's effects.
#[derive(Debug, Default)]
pub struct EffectApplication {
    /// Side events to log (spawns, defeats, combat actions).
    pub events: Vec<SessionEvent>,
    /// Human-readable reasons for effects that were dropped.
    pub dropped: Vec<String>,
    /// A `PIVOT_SCENARIO` request surfaced to the scheduler.
    pub pivot: Option<String>,
    /// An `ADVANCE_STORY` request surfaced to the scheduler.
    pub story_advance: Option<String>,
}

/// Full arithmetic of one attack roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    pub base: i32,
    pub roll: i32,
    pub soak: i32,
    pub dealt: i32,
    pub breakdown: String,
}

/// Authoritative session state.
pub struct MechanicsEngine {
    characters: BTreeMap<AgentId, Character>,
    enemies: BTreeMap<AgentId, Enemy>,
    pub clocks: ClockBank,
    scene_void_level: u8,
    void_tracking_enabled: bool,
    loot_suggestions_enabled: bool,
    allow_groups: bool,
    max_enemies: u32,
    enemy_spawn_counter: u32,
}

/// Status note marking a spent reaction; cleared at round end.
const REACTED: &str = "reacted";

impl MechanicsEngine {
    pub fn new(void_tracking_enabled: bool, loot_suggestions_enabled: bool) -> Self {
        Self {
            characters: BTreeMap::new(),
            enemies: BTreeMap::new(),
            clocks: ClockBank::new(),
            scene_void_level: 0,
            void_tracking_enabled,
            loot_suggestions_enabled,
            allow_groups: true,
            max_enemies: u32::MAX,
            enemy_spawn_counter: 0,
        }
    }

    /// Spawn-side limits from the enemy module config.
    pub fn with_spawn_limits(mut self, allow_groups: bool, max_enemies: u32) -> Self {
        self.allow_groups = allow_groups;
        self.max_enemies = max_enemies.max(1);
        self
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    pub fn add_character(&mut self, character: Character) {
        self.characters.insert(character.agent_id.clone(), character);
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.values()
    }

    pub fn character(&self, id: &AgentId) -> Option<&Character> {
        self.characters.get(id)
    }

    pub fn enemy(&self, id: &AgentId) -> Option<&Enemy> {
        self.enemies.get(id)
    }

    pub fn character_mut(&mut self, id: &AgentId) -> Option<&mut Character> {
        self.characters.get_mut(id)
    }

    pub fn enemy_mut(&mut self, id: &AgentId) -> Option<&mut Enemy> {
        self.enemies.get_mut(id)
    }

    pub fn is_pc(&self, id: &AgentId) -> bool {
        self.characters.contains_key(id)
    }

    pub fn is_alive(&self, id: &AgentId) -> bool {
        self.characters
            .get(id)
            .map(|c| c.alive)
            .or_else(|| self.enemies.get(id).map(|e| e.alive))
            .unwrap_or(false)
    }

    pub fn combatant_name(&self, id: &AgentId) -> Option<String> {
        self.characters
            .get(id)
            .map(|c| c.name.clone())
            .or_else(|| self.enemies.get(id).map(|e| e.display_name.clone()))
    }

    pub fn combatant_faction(&self, id: &AgentId) -> Option<String> {
        self.characters
            .get(id)
            .map(|c| c.faction.clone())
            .or_else(|| self.enemies.get(id).map(|e| e.faction.clone()))
    }

    pub fn combatant_position(&self, id: &AgentId) -> Option<Position> {
        self.characters
            .get(id)
            .map(|c| c.position)
            .or_else(|| self.enemies.get(id).map(|e| e.position))
    }

    /// All living combatants, characters first, in stable id order.
    pub fn active_agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .characters
            .values()
            .filter(|c| c.alive)
            .map(|c| c.agent_id.clone())
            .collect();
        ids.extend(
            self.enemies
                .values()
                .filter(|e| e.alive)
                .map(|e| e.agent_id.clone()),
        );
        ids
    }

    /// Resolve a display-name reference to an agent. Exact match first,
    /// then a unique case-sensitive substring match in either direction.
    pub fn resolve_combatant(&self, reference: &str) -> Option<AgentId> {
        let reference = reference.trim();
        let names: Vec<(AgentId, String)> = self
            .characters
            .values()
            .map(|c| (c.agent_id.clone(), c.name.clone()))
            .chain(
                self.enemies
                    .values()
                    .map(|e| (e.agent_id.clone(), e.display_name.clone())),
            )
            .collect();

        if let Some((id, _)) = names
            .iter()
            .find(|(id, name)| name == reference || id.as_str() == reference)
        {
            return Some(id.clone());
        }
        let matches: Vec<&(AgentId, String)> = names
            .iter()
            .filter(|(_, name)| name.contains(reference) || reference.contains(name.as_str()))
            .collect();
        if matches.len() == 1 {
            Some(matches[0].0.clone())
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Scene state
    // ------------------------------------------------------------------

    pub fn scene_void_level(&self) -> u8 {
        self.scene_void_level
    }

    pub fn set_scene_void_level(&mut self, level: u8) {
        self.scene_void_level = level.min(10);
    }

    pub fn add_clock(&mut self, clock: SceneClock) -> Result<(), ClockError> {
        self.clocks.add(clock)
    }

    /// Reset per-scene void counters; called on story advance or pivot.
    pub fn reset_scene(&mut self) {
        for character in self.characters.values_mut() {
            character.void.begin_scene();
        }
        for enemy in self.enemies.values_mut() {
            enemy.void.begin_scene();
        }
    }

    /// Round-start bookkeeping: per-round void counters reset.
    pub fn begin_round(&mut self) {
        for character in self.characters.values_mut() {
            character.void.begin_round();
        }
        for enemy in self.enemies.values_mut() {
            enemy.void.begin_round();
        }
    }

    /// Round-end bookkeeping: claims cleared, stale intel dropped, spent
    /// reactions refreshed.
    pub fn end_round(&mut self, current_round: u32) {
        for character in self.characters.values_mut() {
            character.end_round();
        }
        for enemy in self.enemies.values_mut() {
            enemy.expire_intel(current_round);
            enemy.status_effects.retain(|s| s != REACTED);
        }
    }

    pub fn total_party_kill(&self) -> bool {
        !self.characters.is_empty() && self.characters.values().all(|c| !c.alive)
    }

    // ------------------------------------------------------------------
    // Dice-facing operations
    // ------------------------------------------------------------------

    /// Roll initiative for every living combatant:
    /// `Agility x 4 + d20`, natural 1 collapsing to 0. Sorted descending
    /// with ties broken by higher Agility, then stable agent-id order.
    pub fn roll_initiative(&mut self, rng: &mut SessionRng) -> Vec<InitiativeEntry> {
        let mut entries = Vec::new();
        for id in self.active_agent_ids() {
            let agility = self
                .characters
                .get(&id)
                .map(|c| c.attribute(Attribute::Agility))
                .or_else(|| self.enemies.get(&id).map(|e| e.attribute(Attribute::Agility)))
                .unwrap_or(1);
            let roll = rng.d20();
            let initiative = if roll == 1 { 0 } else { agility * 4 + roll };
            entries.push(InitiativeEntry {
                agent_id: id,
                initiative,
                agility,
            });
        }
        entries.sort_by(|a, b| {
            b.initiative
                .cmp(&a.initiative)
                .then(b.agility.cmp(&a.agility))
                .then(a.agent_id.cmp(&b.agent_id))
        });
        for entry in &entries {
            if let Some(enemy) = self.enemies.get_mut(&entry.agent_id) {
                enemy.initiative = entry.initiative;
            }
        }
        entries
    }

    /// Resolve a declaration's check with an already-rolled d20.
    pub fn resolve_declared_check(
        &self,
        declaration: &ActionDeclaration,
        roll: i32,
    ) -> Option<CheckResult> {
        let (attribute_value, skill_value) = if let Some(character) =
            self.characters.get(&declaration.agent_id)
        {
            let rank = declaration
                .skill
                .as_deref()
                .map(|s| character.skills.rank(s))
                .unwrap_or(0);
            (character.attribute(declaration.attribute), rank)
        } else if let Some(enemy) = self.enemies.get(&declaration.agent_id) {
            let rank = declaration
                .skill
                .as_deref()
                .map(|s| enemy.skills.rank(s))
                .unwrap_or(0);
            (enemy.attribute(declaration.attribute), rank)
        } else {
            return None;
        };
        let difficulty = compute_difficulty(
            declaration.action_type,
            declaration.ritual.is_ritual,
            self.scene_void_level,
        );
        Some(CheckResult::resolve(
            attribute_value,
            skill_value,
            roll,
            difficulty,
        ))
    }

    /// Full attack arithmetic for the enemy-to-player path:
    /// `strength + weapon + d20 - soak`, floored at zero.
    pub fn enemy_attack(
        &mut self,
        attacker: &AgentId,
        target: &AgentId,
        rng: &mut SessionRng,
        round: u32,
    ) -> Option<(AttackOutcome, Vec<SessionEvent>)> {
        let enemy = self.enemies.get(attacker)?;
        let weapon = enemy.primary_weapon();
        let strength = enemy.attribute(Attribute::Strength);
        let soak = self
            .characters
            .get(target)
            .map(|c| c.soak())
            .or_else(|| self.enemies.get(target).map(|e| e.soak()))?;
        let roll = rng.d20();
        let base = strength + weapon.damage;
        let dealt = (base + roll - soak).max(0);
        let outcome = AttackOutcome {
            base,
            roll,
            soak,
            dealt,
            breakdown: format!(
                "str {strength} + weapon {} + d20({roll}) - soak {soak} = {dealt}",
                weapon.damage
            ),
        };
        let mut events = vec![SessionEvent::CombatAction {
            attacker: attacker.clone(),
            target: target.clone(),
            weapon: weapon.name.clone(),
            dealt,
            breakdown: outcome.breakdown.clone(),
        }];
        events.extend(self.apply_damage(target, weapon.channel, dealt, rng, round));
        Some((outcome, events))
    }

    /// Apply net damage to a combatant, rolling any triggered death or
    /// unconsciousness checks immediately.
    pub fn apply_damage(
        &mut self,
        target: &AgentId,
        channel: DamageChannel,
        dealt: i32,
        rng: &mut SessionRng,
        round: u32,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if let Some(character) = self.characters.get_mut(target) {
            let report = character.apply_damage(channel, dealt);
            if report.needs_unconscious_check && character.alive {
                let willpower = character.attribute(Attribute::Willpower);
                let roll = rng.d20();
                let total = willpower * roll;
                events.push(SessionEvent::MoraleCheck {
                    agent_id: target.clone(),
                    willpower,
                    roll,
                    total,
                    passed: total >= 20,
                });
            }
            if report.needs_death_check && character.alive {
                let health = character.health.max(1);
                let roll = rng.d20();
                if health * roll < 20 {
                    character.alive = false;
                    debug!(agent = %target, "character died to wounds");
                }
            }
            events.push(SessionEvent::CharacterState {
                snapshot: snapshot_character(character),
            });
        } else if let Some(enemy) = self.enemies.get_mut(target) {
            enemy.apply_damage(channel, dealt);
            if enemy.health <= 0 {
                events.extend(self.despawn_enemy(target, round, "destroyed"));
            }
        }
        events
    }

    // ------------------------------------------------------------------
    // Enemy lifecycle
    // ------------------------------------------------------------------

    /// Spawn from a built-in template. Returns the spawn event.
    pub fn spawn_enemy(
        &mut self,
        template_key: &str,
        display_name: &str,
        count: u32,
        position: Position,
        round: u32,
    ) -> Result<SessionEvent, String> {
        let template = aeonisk_domain::entities::find_template(template_key)
            .ok_or_else(|| format!("unknown enemy template '{template_key}'"))?;
        let alive = self.enemies.values().filter(|e| e.alive).count() as u32;
        if alive >= self.max_enemies {
            return Err(format!(
                "enemy cap reached ({alive}/{}); spawn of '{display_name}' dropped",
                self.max_enemies
            ));
        }
        let count = if self.allow_groups { count } else { count.min(1) };
        self.enemy_spawn_counter += 1;
        let agent_id = AgentId::for_enemy(&template.key, self.enemy_spawn_counter);
        let enemy = Enemy::from_template(
            &template,
            agent_id.clone(),
            display_name,
            count,
            position,
            round,
        )
        .map_err(|e| e.to_string())?;
        let event = SessionEvent::EnemySpawn {
            agent_id: agent_id.clone(),
            display_name: enemy.display_name.clone(),
            template: template.key.clone(),
            count,
            position: position.to_string(),
        };
        self.enemies.insert(agent_id, enemy);
        Ok(event)
    }

    /// Remove an enemy from play. Returns the defeat event when the enemy
    /// existed and was still alive.
    pub fn despawn_enemy(
        &mut self,
        agent_id: &AgentId,
        round: u32,
        reason: &str,
    ) -> Option<SessionEvent> {
        let loot_enabled = self.loot_suggestions_enabled;
        let enemy = self.enemies.get_mut(agent_id)?;
        if !enemy.alive {
            return None;
        }
        enemy.alive = false;
        enemy.despawned_round = Some(round);
        Some(SessionEvent::EnemyDefeat {
            agent_id: agent_id.clone(),
            display_name: enemy.display_name.clone(),
            reason: reason.to_string(),
            loot: if loot_enabled {
                enemy.loot_hint.clone()
            } else {
                None
            },
        })
    }

    /// Shift a combatant one ring toward or away from Engaged.
    pub fn move_combatant(&mut self, id: &AgentId, toward_engaged: bool) -> Option<Position> {
        use aeonisk_domain::value_objects::Ring;
        let position = self
            .characters
            .get_mut(id)
            .map(|c| &mut c.position)
            .or_else(|| self.enemies.get_mut(id).map(|e| &mut e.position))?;
        position.ring = match (position.ring, toward_engaged) {
            (Ring::Extreme, true) => Ring::Far,
            (Ring::Far, true) => Ring::Near,
            (Ring::Near, true) | (Ring::Engaged, true) => Ring::Engaged,
            (Ring::Engaged, false) => Ring::Near,
            (Ring::Near, false) => Ring::Far,
            (Ring::Far, false) | (Ring::Extreme, false) => Ring::Extreme,
        };
        Some(*position)
    }

    /// Push an intel note into every other living enemy's buffer.
    pub fn share_intel(&mut self, from: &AgentId, round: u32, text: &str) {
        let entry_from = from.clone();
        for enemy in self.enemies.values_mut() {
            if enemy.alive && &enemy.agent_id != from {
                enemy.shared_intel.push(
                    aeonisk_domain::entities::IntelEntry {
                        round,
                        from: entry_from.clone(),
                        text: text.to_string(),
                    },
                );
            }
        }
    }

    /// Auto-parry reaction: a targeted enemy with the `parry` ability
    /// spends its reaction to shave its Melee rank off incoming damage.
    /// Returns the reduction, or `None` when it cannot react.
    pub fn try_parry(&mut self, target: &AgentId) -> Option<i32> {
        let enemy = self.enemies.get_mut(target)?;
        if !enemy.alive
            || enemy.panicked
            || !enemy.special_abilities.iter().any(|a| a == "parry")
            || enemy.status_effects.iter().any(|s| s == REACTED)
        {
            return None;
        }
        enemy.status_effects.push(REACTED.to_string());
        let reduction = i32::from(enemy.skills.rank("Melee"));
        debug!(target = %target, reduction, "auto-parry spent");
        Some(reduction)
    }

    /// Enemies able to fire an overwatch reaction at a moving combatant.
    pub fn overwatch_reactors(&self, mover: &AgentId) -> Vec<AgentId> {
        self.enemies
            .values()
            .filter(|e| {
                e.alive
                    && !e.panicked
                    && &e.agent_id != mover
                    && e.special_abilities.iter().any(|a| a == "overwatch")
                    && !e.status_effects.iter().any(|s| s == REACTED)
            })
            .map(|e| e.agent_id.clone())
            .collect()
    }

    /// Mark an overwatch reaction as spent.
    pub fn spend_reaction(&mut self, agent_id: &AgentId) {
        if let Some(enemy) = self.enemies.get_mut(agent_id) {
            if !enemy.status_effects.iter().any(|s| s == REACTED) {
                enemy.status_effects.push(REACTED.to_string());
            }
        }
    }

    /// Morale check: `Willpower x d20 vs 20`. Failure sets the panicked
    /// flag for one round. Returns the logged check event.
    pub fn morale_check(&mut self, agent_id: &AgentId, rng: &mut SessionRng) -> Option<SessionEvent> {
        let enemy = self.enemies.get_mut(agent_id)?;
        let willpower = enemy.attribute(Attribute::Willpower);
        let roll = rng.d20();
        let total = willpower * roll;
        let passed = total >= 20;
        if !passed {
            enemy.panicked = true;
        }
        Some(SessionEvent::MoraleCheck {
            agent_id: agent_id.clone(),
            willpower,
            roll,
            total,
            passed,
        })
    }

    /// Panicked-flee resolution: `Agility x Athletics vs 15`. Success
    /// despawns the unit; failure clears panic and it fights on.
    pub fn flee_check(
        &mut self,
        agent_id: &AgentId,
        rng: &mut SessionRng,
        round: u32,
    ) -> Option<(CheckResult, Option<SessionEvent>)> {
        let enemy = self.enemies.get_mut(agent_id)?;
        let agility = enemy.attribute(Attribute::Agility);
        let athletics = enemy.skills.rank("Athletics");
        let roll = rng.d20();
        let check = CheckResult::resolve(agility, athletics, roll, 15);
        if check.tier.is_success() {
            let event = self.despawn_enemy(agent_id, round, "fled");
            Some((check, event))
        } else {
            enemy.panicked = false;
            Some((check, None))
        }
    }

    // ------------------------------------------------------------------
    // Effect application
    // ------------------------------------------------------------------

    /// Apply one action's collected effects atomically. Unresolvable
    /// effects are dropped with a reason rather than aborting the turn.
    pub fn apply_effects(
        &mut self,
        round: u32,
        actor: Option<&AgentId>,
        effects: &[MechanicalEffect],
        rng: &mut SessionRng,
        high_risk: bool,
    ) -> EffectApplication {
        let mut application = EffectApplication::default();
        // Fresh per-action void headroom for everyone this action touches.
        for character in self.characters.values_mut() {
            character.void.begin_action();
        }
        for enemy in self.enemies.values_mut() {
            enemy.void.begin_action();
        }

        for effect in effects {
            match effect {
                MechanicalEffect::VoidChange {
                    character,
                    delta,
                    reason,
                } => self.apply_void_change(round, character, *delta, reason, high_risk, &mut application),
                MechanicalEffect::SoulcreditChange {
                    character,
                    delta,
                    reason,
                } => {
                    let Some(id) = self.resolve_combatant(character) else {
                        application
                            .dropped
                            .push(format!("soulcredit target '{character}' not found"));
                        continue;
                    };
                    match self.characters.get_mut(&id) {
                        Some(target) => {
                            target.soulcredit += delta;
                            debug!(target = %id, delta, reason, "soulcredit changed");
                        }
                        None => application
                            .dropped
                            .push(format!("soulcredit target '{character}' is not a character")),
                    }
                }
                MechanicalEffect::ClockUpdate { name, ticks, reason } => {
                    if let Err(e) = self.clocks.queue_update(name, *ticks, reason) {
                        application.dropped.push(e.to_string());
                    }
                }
                MechanicalEffect::Damage { target, amount } => {
                    let Some(id) = self.resolve_combatant(target) else {
                        application
                            .dropped
                            .push(format!("damage target '{target}' not found"));
                        continue;
                    };
                    let channel = actor
                        .and_then(|a| {
                            self.characters
                                .get(a)
                                .map(|c| c.primary_weapon().channel)
                                .or_else(|| self.enemies.get(a).map(|e| e.primary_weapon().channel))
                        })
                        .unwrap_or(DamageChannel::Wound);
                    let events = self.apply_damage(&id, channel, *amount, rng, round);
                    if let (Some(actor_id), Some(name)) = (actor, self.combatant_name(&id)) {
                        application.events.push(SessionEvent::CombatAction {
                            attacker: actor_id.clone(),
                            target: id.clone(),
                            weapon: self
                                .characters
                                .get(actor_id)
                                .map(|c| c.primary_weapon().name)
                                .unwrap_or_else(|| "narration".to_string()),
                            dealt: *amount,
                            breakdown: format!("{amount} dealt to {name}"),
                        });
                    }
                    application.events.extend(events);
                }
                MechanicalEffect::SpawnEnemy {
                    name,
                    template,
                    count,
                    position,
                    tactics: _,
                } => match position.parse::<Position>() {
                    Ok(pos) => match self.spawn_enemy(template, name, *count, pos, round) {
                        Ok(event) => application.events.push(event),
                        Err(reason) => application.dropped.push(reason),
                    },
                    Err(e) => application.dropped.push(e.to_string()),
                },
                MechanicalEffect::DespawnEnemy { agent_id, reason } => {
                    match self.despawn_enemy(agent_id, round, reason) {
                        Some(event) => application.events.push(event),
                        None => application
                            .dropped
                            .push(format!("despawn target '{agent_id}' not found or already gone")),
                    }
                }
                MechanicalEffect::NewClock {
                    name,
                    maximum,
                    description,
                } => match SceneClock::new(name.clone(), *maximum, description.clone()) {
                    Ok(clock) => {
                        if let Err(e) = self.clocks.add(clock) {
                            application.dropped.push(e.to_string());
                        }
                    }
                    Err(e) => application.dropped.push(e.to_string()),
                },
                MechanicalEffect::PivotScenario { description } => {
                    application.pivot = Some(description.clone());
                }
                MechanicalEffect::AdvanceStory { description } => {
                    application.story_advance = Some(description.clone());
                }
            }
        }
        for reason in &application.dropped {
            warn!(reason, "effect dropped");
        }
        application
    }

    fn apply_void_change(
        &mut self,
        round: u32,
        target_ref: &str,
        delta: i32,
        reason: &str,
        high_risk: bool,
        application: &mut EffectApplication,
    ) {
        if !self.void_tracking_enabled {
            return;
        }
        let Some(id) = self.resolve_combatant(target_ref) else {
            application
                .dropped
                .push(format!("void target '{target_ref}' not found"));
            return;
        };
        let void = self
            .characters
            .get_mut(&id)
            .map(|c| &mut c.void)
            .or_else(|| self.enemies.get_mut(&id).map(|e| &mut e.void));
        let Some(void) = void else {
            application
                .dropped
                .push(format!("void target '{target_ref}' not found"));
            return;
        };
        if delta >= 0 {
            let applied = void.apply_gain(round, delta, reason, high_risk);
            if applied < delta {
                warn!(
                    target = %id,
                    requested = delta,
                    applied,
                    "void gain clamped by rate cap"
                );
            }
        } else {
            void.apply_reduction(round, delta, reason);
        }
        debug!(target = %id, delta, reason, "void change processed");
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn combatant_snapshots(&self) -> Vec<CombatantSnapshot> {
        let mut snapshots: Vec<CombatantSnapshot> =
            self.characters.values().map(snapshot_character).collect();
        snapshots.extend(self.enemies.values().filter(|e| e.alive).map(|enemy| {
            CombatantSnapshot {
                agent_id: enemy.agent_id.clone(),
                name: enemy.display_name.clone(),
                faction: enemy.faction.clone(),
                health: enemy.health,
                max_health: enemy.max_health,
                wounds: enemy.wounds,
                stuns: enemy.stuns,
                void: enemy.void.score(),
                soulcredit: 0,
                position: enemy.position.to_string(),
            }
        }));
        snapshots
    }
}

fn snapshot_character(character: &Character) -> CombatantSnapshot {
    CombatantSnapshot {
        agent_id: character.agent_id.clone(),
        name: character.name.clone(),
        faction: character.faction.clone(),
        health: character.health,
        max_health: character.max_health,
        wounds: character.wounds,
        stuns: character.stuns,
        void: character.void.score(),
        soulcredit: character.soulcredit,
        position: character.position.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeonisk_domain::actions::{ActionType, RitualFlags};
    use aeonisk_domain::value_objects::{Ring, Side, SkillSet};
    use std::collections::BTreeMap;

    fn attrs(agility: i32) -> aeonisk_domain::value_objects::Attributes {
        let mut map: BTreeMap<String, i32> = Attribute::ALL
            .iter()
            .map(|a| (a.name().to_string(), 3))
            .collect();
        map.insert("agility".to_string(), agility);
        aeonisk_domain::value_objects::Attributes::from_map(&map).unwrap()
    }

    fn engine_with_party() -> MechanicsEngine {
        let mut engine = MechanicsEngine::new(true, true);
        let mut skills = BTreeMap::new();
        skills.insert("Melee".to_string(), 4);
        skills.insert("Astral Arts".to_string(), 5);
        let character = Character::new(
            "Nyx",
            "they/them",
            "Tempest",
            attrs(4),
            SkillSet::from_map(skills).unwrap(),
        )
        .unwrap();
        engine.add_character(character);
        engine
    }

    #[test]
    fn initiative_is_deterministic_per_seed() {
        let mut engine = engine_with_party();
        engine
            .spawn_enemy("grunt", "Grunts", 2, Position::new(Ring::Near, Side::Enemy), 1)
            .unwrap();
        let mut rng_a = SessionRng::new(42);
        let mut rng_b = SessionRng::new(42);
        let order_a = engine.roll_initiative(&mut rng_a);
        let order_b = engine.roll_initiative(&mut rng_b);
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn initiative_natural_one_collapses_to_zero() {
        let mut engine = engine_with_party();
        // Walk seeds until the single combatant rolls a natural 1.
        for seed in 0..500 {
            let mut probe = SessionRng::new(seed);
            if probe.d20() == 1 {
                let mut rng = SessionRng::new(seed);
                let order = engine.roll_initiative(&mut rng);
                assert_eq!(order[0].initiative, 0);
                return;
            }
        }
        panic!("no seed produced a natural 1 in 500 tries");
    }

    #[test]
    fn declared_check_uses_scene_void_difficulty() {
        let mut engine = engine_with_party();
        engine.set_scene_void_level(5);
        let declaration = ActionDeclaration {
            agent_id: AgentId::new("pc_nyx"),
            character_name: "Nyx".to_string(),
            initiative: 10,
            intent: "strike".to_string(),
            description: String::new(),
            attribute: Attribute::Agility,
            skill: Some("Melee".to_string()),
            action_type: ActionType::Combat,
            estimated_difficulty: 18,
            target: None,
            ritual: RitualFlags::default(),
            defence_token: None,
            reasoning: None,
        };
        let check = engine.resolve_declared_check(&declaration, 10).unwrap();
        // agility 4 x melee 4 + 10 = 26 vs 18 + 2 (void 5) = 20
        assert_eq!(check.total, 26);
        assert_eq!(check.difficulty, 20);
        assert_eq!(check.margin, 6);
    }

    #[test]
    fn spawn_and_despawn_emit_events() {
        let mut engine = engine_with_party();
        let spawn = engine
            .spawn_enemy("grunt", "Backup", 2, Position::new(Ring::Near, Side::Enemy), 3)
            .unwrap();
        let SessionEvent::EnemySpawn { agent_id, count, .. } = spawn else {
            panic!("expected spawn event");
        };
        assert_eq!(count, 2);
        let defeat = engine.despawn_enemy(&agent_id, 4, "fled").unwrap();
        let SessionEvent::EnemyDefeat { reason, loot, .. } = defeat else {
            panic!("expected defeat event");
        };
        assert_eq!(reason, "fled");
        assert!(loot.is_some());
        // Second despawn is a no-op.
        assert!(engine.despawn_enemy(&agent_id, 4, "again").is_none());
    }

    #[test]
    fn unknown_template_is_an_error() {
        let mut engine = engine_with_party();
        assert!(engine
            .spawn_enemy("kaiju", "Big", 1, Position::new(Ring::Far, Side::Enemy), 1)
            .is_err());
    }

    #[test]
    fn effects_with_unknown_targets_are_dropped_not_fatal() {
        let mut engine = engine_with_party();
        let mut rng = SessionRng::new(1);
        let effects = vec![
            MechanicalEffect::Damage {
                target: "Ghost".to_string(),
                amount: 5,
            },
            MechanicalEffect::VoidChange {
                character: "Nyx".to_string(),
                delta: 1,
                reason: "backlash".to_string(),
            },
        ];
        let application = engine.apply_effects(2, None, &effects, &mut rng, false);
        assert_eq!(application.dropped.len(), 1);
        let nyx = engine.resolve_combatant("Nyx").unwrap();
        assert_eq!(engine.character(&nyx).unwrap().void.score(), 1);
    }

    #[test]
    fn void_gain_clamped_by_action_cap() {
        let mut engine = engine_with_party();
        let mut rng = SessionRng::new(1);
        let effects = vec![MechanicalEffect::VoidChange {
            character: "Nyx".to_string(),
            delta: 3,
            reason: "surge".to_string(),
        }];
        engine.apply_effects(1, None, &effects, &mut rng, false);
        let nyx = engine.resolve_combatant("Nyx").unwrap();
        assert_eq!(engine.character(&nyx).unwrap().void.score(), 1);
    }

    #[test]
    fn void_reduction_is_uncapped() {
        let mut engine = engine_with_party();
        let nyx = engine.resolve_combatant("Nyx").unwrap();
        engine.character_mut(&nyx).unwrap().void = aeonisk_domain::entities::VoidState::new(7);
        let mut rng = SessionRng::new(1);
        let effects = vec![MechanicalEffect::VoidChange {
            character: "Nyx".to_string(),
            delta: -3,
            reason: "purification".to_string(),
        }];
        engine.apply_effects(1, None, &effects, &mut rng, false);
        assert_eq!(engine.character(&nyx).unwrap().void.score(), 4);
    }

    #[test]
    fn clock_updates_queue_until_batch() {
        let mut engine = engine_with_party();
        engine
            .add_clock(SceneClock::new("Alarm", 4, "").unwrap())
            .unwrap();
        let mut rng = SessionRng::new(1);
        let effects = vec![MechanicalEffect::ClockUpdate {
            name: "Alarm".to_string(),
            ticks: 2,
            reason: "gunfire".to_string(),
        }];
        engine.apply_effects(1, None, &effects, &mut rng, false);
        assert_eq!(engine.clocks.get("Alarm").unwrap().current, 0);
        engine.clocks.apply_batch();
        assert_eq!(engine.clocks.get("Alarm").unwrap().current, 2);
    }

    #[test]
    fn enemy_attack_logs_full_breakdown() {
        let mut engine = engine_with_party();
        let spawn = engine
            .spawn_enemy("grunt", "Grunt", 1, Position::new(Ring::Engaged, Side::Enemy), 1)
            .unwrap();
        let SessionEvent::EnemySpawn { agent_id, .. } = spawn else {
            panic!("expected spawn");
        };
        let nyx = engine.resolve_combatant("Nyx").unwrap();
        let mut rng = SessionRng::new(3);
        let (outcome, events) = engine.enemy_attack(&agent_id, &nyx, &mut rng, 1).unwrap();
        assert!(outcome.breakdown.contains("str"));
        assert!(outcome.breakdown.contains("soak"));
        assert!(outcome.dealt >= 0);
        assert!(matches!(events[0], SessionEvent::CombatAction { .. }));
    }

    #[test]
    fn morale_failure_sets_panicked() {
        let mut engine = engine_with_party();
        let spawn = engine
            .spawn_enemy("grunt", "Grunt", 1, Position::new(Ring::Near, Side::Enemy), 1)
            .unwrap();
        let SessionEvent::EnemySpawn { agent_id, .. } = spawn else {
            panic!("expected spawn");
        };
        // Find a seed where willpower 3 x d20 < 20 (roll <= 6).
        for seed in 0..500 {
            let mut probe = SessionRng::new(seed);
            if probe.d20() <= 6 {
                let mut rng = SessionRng::new(seed);
                let event = engine.morale_check(&agent_id, &mut rng).unwrap();
                let SessionEvent::MoraleCheck { passed, .. } = event else {
                    panic!("expected morale check");
                };
                assert!(!passed);
                assert!(engine.enemy(&agent_id).unwrap().panicked);
                return;
            }
        }
        panic!("no failing seed found");
    }

    #[test]
    fn flee_success_despawns_with_fled_reason() {
        let mut engine = engine_with_party();
        let spawn = engine
            .spawn_enemy("grunt", "Grunt", 1, Position::new(Ring::Near, Side::Enemy), 1)
            .unwrap();
        let SessionEvent::EnemySpawn { agent_id, .. } = spawn else {
            panic!("expected spawn");
        };
        // grunt: agility 3, athletics 2 -> total = 6 + d20 vs 15; roll >= 9 passes.
        for seed in 0..500 {
            let mut probe = SessionRng::new(seed);
            if probe.d20() >= 9 {
                let mut rng = SessionRng::new(seed);
                let (check, event) = engine.flee_check(&agent_id, &mut rng, 2).unwrap();
                assert!(check.tier.is_success());
                let Some(SessionEvent::EnemyDefeat { reason, .. }) = event else {
                    panic!("expected defeat event");
                };
                assert_eq!(reason, "fled");
                return;
            }
        }
        panic!("no passing seed found");
    }

    #[test]
    fn pivot_and_advance_are_surfaced_not_applied() {
        let mut engine = engine_with_party();
        let mut rng = SessionRng::new(1);
        let effects = vec![
            MechanicalEffect::PivotScenario {
                description: "the vault floods".to_string(),
            },
            MechanicalEffect::AdvanceStory {
                description: "dawn breaks".to_string(),
            },
        ];
        let application = engine.apply_effects(1, None, &effects, &mut rng, false);
        assert_eq!(application.pivot.as_deref(), Some("the vault floods"));
        assert_eq!(application.story_advance.as_deref(), Some("dawn breaks"));
    }

    #[test]
    fn spawn_cap_and_group_limits() {
        let mut engine = MechanicsEngine::new(true, true).with_spawn_limits(false, 1);
        let spawn = engine
            .spawn_enemy("grunt", "Pair", 3, Position::new(Ring::Near, Side::Enemy), 1)
            .unwrap();
        let SessionEvent::EnemySpawn { agent_id, count, .. } = spawn else {
            panic!("expected spawn");
        };
        // Groups disabled: the requested trio collapses to a single unit.
        assert_eq!(count, 1);
        assert_eq!(engine.enemy(&agent_id).unwrap().original_count, 1);
        // Cap of one: the next spawn is rejected.
        assert!(engine
            .spawn_enemy("grunt", "More", 1, Position::new(Ring::Near, Side::Enemy), 1)
            .is_err());
    }

    #[test]
    fn parry_spends_the_reaction_once() {
        let mut engine = engine_with_party();
        let spawn = engine
            .spawn_enemy("enforcer", "Warden", 1, Position::new(Ring::Engaged, Side::Enemy), 1)
            .unwrap();
        let SessionEvent::EnemySpawn { agent_id, .. } = spawn else {
            panic!("expected spawn");
        };
        assert_eq!(engine.try_parry(&agent_id), Some(3));
        assert_eq!(engine.try_parry(&agent_id), None);
        engine.end_round(1);
        assert_eq!(engine.try_parry(&agent_id), Some(3));
    }

    #[test]
    fn grunts_cannot_parry() {
        let mut engine = engine_with_party();
        let spawn = engine
            .spawn_enemy("grunt", "Grunt", 1, Position::new(Ring::Near, Side::Enemy), 1)
            .unwrap();
        let SessionEvent::EnemySpawn { agent_id, .. } = spawn else {
            panic!("expected spawn");
        };
        assert_eq!(engine.try_parry(&agent_id), None);
    }

    #[test]
    fn overwatch_reactors_exclude_spent_and_panicked() {
        let mut engine = engine_with_party();
        let spawn = engine
            .spawn_enemy("seeker_drone", "Drone", 1, Position::new(Ring::Far, Side::Enemy), 1)
            .unwrap();
        let SessionEvent::EnemySpawn { agent_id, .. } = spawn else {
            panic!("expected spawn");
        };
        let mover = engine.resolve_combatant("Nyx").unwrap();
        assert_eq!(engine.overwatch_reactors(&mover), vec![agent_id.clone()]);
        engine.spend_reaction(&agent_id);
        assert!(engine.overwatch_reactors(&mover).is_empty());
        engine.end_round(1);
        engine.enemy_mut(&agent_id).unwrap().panicked = true;
        assert!(engine.overwatch_reactors(&mover).is_empty());
    }

    #[test]
    fn tpk_detection() {
        let mut engine = engine_with_party();
        assert!(!engine.total_party_kill());
        let nyx = engine.resolve_combatant("Nyx").unwrap();
        engine.character_mut(&nyx).unwrap().alive = false;
        assert!(engine.total_party_kill());
    }
}

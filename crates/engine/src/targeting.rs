//! Per-round opaque target ids for identification-friend-or-foe research.
//!
//! When free targeting is enabled, every active combatant gets a fresh
//! `tgt_XXXX` id each round, assigned in shuffled order so the ids carry no
//! positional information. Ids never survive the round; an agent that
//! memorizes one learns nothing about the next round's battlefield.

use std::collections::HashMap;

use tracing::debug;

use aeonisk_domain::AgentId;

use crate::rng::SessionRng;

/// Bidirectional agent <-> opaque id map for the current round.
#[derive(Debug, Default)]
pub struct TargetIdMap {
    by_id: HashMap<String, AgentId>,
    by_agent: HashMap<AgentId, String>,
}

impl TargetIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign fresh ids to every combatant for this round. The roster is
    /// shuffled first so assignment order is itself randomized.
    pub fn assign(&mut self, combatants: &[AgentId], rng: &mut SessionRng) {
        self.clear();
        let mut shuffled: Vec<AgentId> = combatants.to_vec();
        rng.shuffle(&mut shuffled);
        for agent in shuffled {
            let mut id = rng.target_id();
            // Four alphanumerics collide rarely, but a round must never
            // hand out the same id twice.
            while self.by_id.contains_key(&id) {
                id = rng.target_id();
            }
            self.by_id.insert(id.clone(), agent.clone());
            self.by_agent.insert(agent, id);
        }
        debug!(assigned = self.by_id.len(), "target ids assigned");
    }

    /// Resolve an opaque id back to the agent it names this round.
    pub fn resolve(&self, target_id: &str) -> Option<&AgentId> {
        self.by_id.get(target_id)
    }

    /// The opaque id assigned to an agent this round.
    pub fn id_for(&self, agent: &AgentId) -> Option<&str> {
        self.by_agent.get(agent).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Drop all assignments at round end.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_agent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<AgentId> {
        vec![
            AgentId::new("pc_nyx"),
            AgentId::new("pc_vale"),
            AgentId::new("enemy_grunt_1"),
        ]
    }

    #[test]
    fn every_combatant_gets_a_unique_id() {
        let mut rng = SessionRng::new(42);
        let mut map = TargetIdMap::new();
        map.assign(&roster(), &mut rng);
        assert_eq!(map.len(), 3);
        for agent in roster() {
            let id = map.id_for(&agent).expect("id assigned");
            assert!(id.starts_with("tgt_"));
            assert_eq!(map.resolve(id), Some(&agent));
        }
    }

    #[test]
    fn ids_are_fresh_each_round() {
        let mut rng = SessionRng::new(42);
        let mut map = TargetIdMap::new();
        let agents = roster();
        map.assign(&agents, &mut rng);
        let first: Vec<String> = agents
            .iter()
            .map(|a| map.id_for(a).unwrap().to_string())
            .collect();
        map.assign(&agents, &mut rng);
        let second: Vec<String> = agents
            .iter()
            .map(|a| map.id_for(a).unwrap().to_string())
            .collect();
        assert_ne!(first, second);
    }

    #[test]
    fn clear_empties_both_directions() {
        let mut rng = SessionRng::new(1);
        let mut map = TargetIdMap::new();
        map.assign(&roster(), &mut rng);
        map.clear();
        assert!(map.is_empty());
        assert!(map.resolve("tgt_aaaa").is_none());
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let mut rng = SessionRng::new(1);
        let mut map = TargetIdMap::new();
        map.assign(&roster(), &mut rng);
        assert!(map.resolve("not_a_target").is_none());
    }
}

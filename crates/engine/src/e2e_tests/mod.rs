//! End-to-end session scenarios driven by a scripted LLM.
//!
//! These run the real orchestrator round loop against canned responses,
//! the playback half of the record/replay workflow, so every assertion
//! here holds for live sessions with the same outputs.

mod scenarios;

use std::collections::BTreeMap;

use aeonisk_domain::events::EventRecord;
use aeonisk_domain::SessionId;

use crate::config::SessionConfig;
use crate::eventlog::{parse_lines, EventLog};
use crate::llm::ScriptedLlm;
use crate::prompts::PromptStore;
use crate::rng::SessionRng;
use crate::scheduler::SessionOrchestrator;
use crate::session::SessionContext;

/// A one-PC session config with a scripted provider.
pub(crate) fn base_config(max_turns: u32) -> SessionConfig {
    let attributes: BTreeMap<String, serde_json::Value> = [
        ("strength", 3),
        ("agility", 4),
        ("endurance", 3),
        ("perception", 3),
        ("intelligence", 3),
        ("empathy", 2),
        ("willpower", 3),
        ("charisma", 2),
        ("size", 3),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
    .collect();

    serde_json::from_value(serde_json::json!({
        "session_name": "e2e",
        "max_turns": max_turns,
        "dm": {"provider": "scripted"},
        "scenario": {
            "theme": "salvage standoff",
            "location": "drowned vault",
            "situation": "Two crews want the same cache.",
            "void_level": 2,
            "initial_clocks": [
                {"name": "Siege", "max": 9, "description": "outside pressure"}
            ]
        },
        "players": [{
            "name": "Nyx",
            "faction": "Tempest",
            "attributes": attributes,
            "skills": {"Melee": 4, "Guns": 3, "Astral Arts": 5},
            "weapons": ["Mono Blade"]
        }]
    }))
    .expect("base config is valid")
}

/// Build an orchestrator over a scripted provider and in-memory log.
pub(crate) fn orchestrator_with(
    config: SessionConfig,
    llm: ScriptedLlm,
    seed: u64,
) -> SessionOrchestrator {
    let free_targeting = config.enemy_agent_config.free_targeting_mode;
    let ctx = SessionContext::new(
        SessionId::new(),
        SessionRng::new(seed),
        EventLog::in_memory(),
        PromptStore::new("scripted", "en"),
        Box::new(llm),
        free_targeting,
    );
    SessionOrchestrator::new(config, ctx)
}

/// Drain the orchestrator's in-memory log into parsed records.
pub(crate) fn logged_events(orchestrator: &mut SessionOrchestrator) -> Vec<EventRecord> {
    let raw = orchestrator
        .context_mut()
        .log
        .memory_contents()
        .expect("in-memory log")
        .to_vec();
    let text = String::from_utf8(raw).expect("utf8 log");
    parse_lines(text.lines().map(String::from).collect()).expect("parseable log")
}

/// A declaration response for the scripted player.
pub(crate) fn player_json(intent: &str, action_type: &str, target: Option<&str>) -> String {
    serde_json::json!({
        "intent": intent,
        "description": "scripted",
        "attribute": "agility",
        "skill": "Melee",
        "action_type": action_type,
        "target": target,
        "is_ritual": false,
        "has_primary_tool": false,
        "has_offering": false,
        "defence_token": null,
        "reasoning": "scripted test action"
    })
    .to_string()
}

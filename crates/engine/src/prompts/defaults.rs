//! Compiled-in default prompt templates.
//!
//! These are the English, provider-neutral fallbacks used when no prompt
//! directory override exists. Section names are part of the loader's
//! contract with the agents; the prose is not.

use std::collections::BTreeMap;

use super::PromptFile;

const VERSION: &str = "1.0";

fn file(sections: &[(&str, &str)]) -> PromptFile {
    PromptFile {
        version: VERSION.to_string(),
        sections: sections
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Built-in prompt file for an agent type.
pub fn builtin(agent_type: &str) -> Option<PromptFile> {
    match agent_type {
        "dm" => Some(file(&[
            (
                "scenario_setup",
                "You are the Dungeon Master for an Aeonisk session.\n\
                 Theme hint: {theme}. Location hint: {location}.\n\
                 Respond with a JSON object only:\n\
                 {\"theme\": \"...\", \"location\": \"...\", \"situation\": \"...\", \
                 \"void_level\": 0-10, \"clocks\": [{\"name\": \"...\", \"max\": 4, \
                 \"description\": \"...\", \"filled_consequence\": \"...\"}]}",
            ),
            (
                "adjudicate",
                "You are the Dungeon Master. Scenario: {scenario}\n\
                 Active clocks:\n{clocks}\n\
                 Round {round}. {actor_summary}\n\
                 Declared action: {action}\n{target_line}\n\
                 Dice outcome (authoritative, already rolled): {outcome_guidance}\n\
                 Narrate the result in at most three sentences, then emit any \
                 mechanical markers on their own lines.",
            ),
            (
                "marker_reference",
                "Marker grammar (use exact names):\n\
                 \u{1F4CA} <clock_name>: +N (reason) or -N (reason)\n\
                 \u{26AB} Void (<target>): +N (reason) or -N (reason)\n\
                 \u{2696}\u{FE0F} Soulcredit (<character>): +N (reason) or -N (reason)\n\
                 [SPAWN_ENEMY: name | template | count | position | tactics]\n\
                 [DESPAWN_ENEMY: agent_id | reason]\n\
                 [NEW_CLOCK: name | max | description]\n\
                 [PIVOT_SCENARIO: description]\n\
                 [ADVANCE_STORY: description]",
            ),
            (
                "synthesis",
                "You are the Dungeon Master. Round {round} is over.\n\
                 What happened:\n{resolutions_summary}\n\
                 Write a short synthesis of the round (2-4 sentences).\n\
                 {required_markers}",
            ),
            (
                "debrief",
                "The session has ended after {rounds} rounds: {reason}.\n\
                 Final state:\n{finals}\n\
                 Write a short mission debrief in the DM voice.",
            ),
            (
                "repair",
                "Your previous response could not be used: {error}\n\
                 Previous response:\n{original_response}\n\
                 Answer again, following the requested format exactly.",
            ),
        ])),
        "player" => Some(file(&[
            (
                "declare",
                "You are {character_name}, a player character in an Aeonisk \
                 session. Round {round}.\n\
                 Your state: {character_summary}\n\
                 Personality: {personality}\nGoals: {goals}\nSkills: {skills}\n\
                 Battlefield:\n{battlefield}\n\
                 Declare one action as a JSON object only:\n\
                 {\"intent\": \"short verb phrase\", \"description\": \"1-2 \
                 sentences\", \"attribute\": \"strength|agility|endurance|\
                 perception|intelligence|empathy|willpower|charisma|size\", \
                 \"skill\": \"skill name or null\", \"action_type\": \
                 \"combat|social|sensing|technical|ritual|move|reaction\", \
                 \"target\": \"target id from the battlefield list, or null\", \
                 \"is_ritual\": false, \"has_primary_tool\": false, \
                 \"has_offering\": false, \"defence_token\": null, \
                 \"reasoning\": \"one sentence on why, and who you believe the \
                 target is\"}",
            ),
            (
                "repair",
                "Your previous declaration could not be used: {error}\n\
                 Previous response:\n{original_response}\n\
                 Respond again with the JSON object only.",
            ),
        ])),
        "enemy" => Some(file(&[
            (
                "tactics",
                "You control {display_name} this round ({round}).\n\
                 Status: {self_status}\nDoctrine: {doctrine}\n\
                 Target priority: {target_priority}\n\
                 Battlefield:\n{battlefield}\n\
                 Intel from allies:\n{intel}\n\
                 Available tactical tokens: {tokens}\n\
                 Respond with a JSON object only:\n\
                 {\"defence_token\": null, \"major_action\": \"attack|advance|\
                 retreat|ability|hold\", \"minor_action\": \"move|aim|share_intel|\
                 none\", \"target\": \"target id or position, or null\", \
                 \"weapon\": \"weapon name or null\", \"reasoning\": \"one \
                 sentence\", \"share_intel\": \"observation for allies, or \
                 null\"}",
            ),
            (
                "repair",
                "Your previous orders could not be used: {error}\n\
                 Previous response:\n{original_response}\n\
                 Respond again with the JSON object only.",
            ),
        ])),
        _ => None,
    }
}

//! Narration to effects: marker parsing and fallback damage.
//!
//! The DM's prose may embed emoji-prefixed or bracketed markers; this
//! module extracts them into `MechanicalEffect` values. Parsing is
//! forgiving about whitespace but strict about shape: a marker that does
//! not match its grammar is reported as a warning and otherwise ignored,
//! never a hard error.

use regex_lite::Regex;
use serde::Deserialize;

use aeonisk_domain::value_objects::SuccessTier;
use aeonisk_domain::{AgentId, MechanicalEffect};

/// Everything extracted from one piece of DM output.
#[derive(Debug, Default)]
pub struct ParsedNarration {
    pub effects: Vec<MechanicalEffect>,
    pub warnings: Vec<String>,
}

/// Parse all markers embedded in narration prose.
pub fn parse_markers(text: &str) -> ParsedNarration {
    let mut parsed = ParsedNarration::default();

    // Emoji markers. The emoji land in the patterns as literal characters
    // (Rust escapes, not regex escapes); the scales emoji may carry a
    // variation selector.
    let clock_re = cheap_regex("\u{1F4CA}\\s*([^:\\n]+):\\s*([+-]?\\d+)\\s*\\(([^)]*)\\)");
    let void_re =
        cheap_regex("\u{26AB}\\s*Void\\s*\\(([^)]+)\\)\\s*:\\s*([+-]?\\d+)\\s*\\(([^)]*)\\)");
    let soul_re = cheap_regex(
        "\u{2696}\u{FE0F}?\\s*Soulcredit\\s*\\(([^)]+)\\)\\s*:\\s*([+-]?\\d+)\\s*\\(([^)]*)\\)",
    );

    for caps in clock_re.captures_iter(text) {
        let name = caps[1].trim().to_string();
        match caps[2].parse::<i32>() {
            Ok(ticks) => parsed.effects.push(MechanicalEffect::ClockUpdate {
                name,
                ticks,
                reason: caps[3].trim().to_string(),
            }),
            Err(_) => parsed.warnings.push(format!("bad clock delta in '{}'", &caps[0])),
        }
    }
    for caps in void_re.captures_iter(text) {
        match caps[2].parse::<i32>() {
            Ok(delta) => parsed.effects.push(MechanicalEffect::VoidChange {
                character: caps[1].trim().to_string(),
                delta,
                reason: caps[3].trim().to_string(),
            }),
            Err(_) => parsed.warnings.push(format!("bad void delta in '{}'", &caps[0])),
        }
    }
    for caps in soul_re.captures_iter(text) {
        match caps[2].parse::<i32>() {
            Ok(delta) => parsed.effects.push(MechanicalEffect::SoulcreditChange {
                character: caps[1].trim().to_string(),
                delta,
                reason: caps[3].trim().to_string(),
            }),
            Err(_) => parsed
                .warnings
                .push(format!("bad soulcredit delta in '{}'", &caps[0])),
        }
    }

    // Bracketed command markers.
    let bracket_re = cheap_regex(r"\[([A-Z_]+):\s*([^\]]*)\]");
    for caps in bracket_re.captures_iter(text) {
        let command = &caps[1];
        let body = caps[2].trim();
        match command {
            "SPAWN_ENEMY" => match parse_spawn(body) {
                Ok(effect) => parsed.effects.push(effect),
                Err(warning) => parsed.warnings.push(warning),
            },
            "DESPAWN_ENEMY" => {
                let parts: Vec<&str> = body.splitn(2, '|').map(str::trim).collect();
                if parts.len() == 2 && !parts[0].is_empty() {
                    parsed.effects.push(MechanicalEffect::DespawnEnemy {
                        agent_id: AgentId::new(parts[0]),
                        reason: parts[1].to_string(),
                    });
                } else {
                    parsed
                        .warnings
                        .push(format!("malformed DESPAWN_ENEMY marker: '{body}'"));
                }
            }
            "NEW_CLOCK" => {
                let parts: Vec<&str> = body.splitn(3, '|').map(str::trim).collect();
                match (parts.first(), parts.get(1).and_then(|p| p.parse::<u8>().ok())) {
                    (Some(name), Some(maximum)) if !name.is_empty() => {
                        parsed.effects.push(MechanicalEffect::NewClock {
                            name: (*name).to_string(),
                            maximum,
                            description: parts.get(2).unwrap_or(&"").to_string(),
                        });
                    }
                    _ => parsed
                        .warnings
                        .push(format!("malformed NEW_CLOCK marker: '{body}'")),
                }
            }
            "PIVOT_SCENARIO" => parsed.effects.push(MechanicalEffect::PivotScenario {
                description: body.to_string(),
            }),
            "ADVANCE_STORY" => parsed.effects.push(MechanicalEffect::AdvanceStory {
                description: body.to_string(),
            }),
            other => parsed
                .warnings
                .push(format!("unknown bracket marker '{other}'")),
        }
    }

    parsed
}

fn parse_spawn(body: &str) -> Result<MechanicalEffect, String> {
    let parts: Vec<&str> = body.split('|').map(str::trim).collect();
    if parts.len() != 5 {
        return Err(format!(
            "SPAWN_ENEMY expects 5 fields (name | template | count | position | tactics), got {}",
            parts.len()
        ));
    }
    let count: u32 = parts[2]
        .parse()
        .map_err(|_| format!("bad SPAWN_ENEMY count '{}'", parts[2]))?;
    Ok(MechanicalEffect::SpawnEnemy {
        name: parts[0].to_string(),
        template: parts[1].to_string(),
        count,
        position: parts[3].to_string(),
        tactics: parts[4].to_string(),
    })
}

fn cheap_regex(pattern: &str) -> Regex {
    // The patterns are compile-time constants; if one ever fails to
    // compile, fall back to an expression that matches nothing.
    Regex::new(pattern).unwrap_or_else(|_| Regex::new(r"[^\s\S]").expect("fallback regex"))
}

/// Structured-output payload: what `generate_structured` must return for
/// an adjudication.
#[derive(Debug, Deserialize)]
pub struct StructuredResolution {
    pub narration: String,
    #[serde(default)]
    pub effects: Vec<MechanicalEffect>,
}

/// JSON schema handed to providers that support structured output.
pub fn resolution_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["narration"],
        "properties": {
            "narration": {"type": "string", "maxLength": 2000},
            "effects": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["effect"],
                    "properties": {
                        "effect": {"type": "string", "enum": [
                            "void_change", "soulcredit_change", "clock_update",
                            "damage", "spawn_enemy", "despawn_enemy",
                            "new_clock", "pivot_scenario", "advance_story"
                        ]}
                    }
                }
            }
        }
    })
}

/// Fallback damage for a PC-versus-enemy hit the DM narrated without an
/// explicit damage effect: a margin-tier fraction of weapon damage,
/// rounded down, at least 1 on any success.
pub fn fallback_damage(tier: SuccessTier, weapon_damage: i32) -> Option<i32> {
    let percent = match tier {
        SuccessTier::CriticalFailure | SuccessTier::Failure => return None,
        SuccessTier::Marginal => 25,
        SuccessTier::Moderate => 50,
        SuccessTier::Good => 75,
        SuccessTier::Excellent => 100,
        SuccessTier::Exceptional => 125,
    };
    Some(((weapon_damage * percent) / 100).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_marker_parses() {
        let parsed = parse_markers("The alarm spreads. \u{1F4CA} Reinforcements: +1 (gunfire echoes)");
        assert_eq!(parsed.effects.len(), 1);
        assert_eq!(
            parsed.effects[0],
            MechanicalEffect::ClockUpdate {
                name: "Reinforcements".to_string(),
                ticks: 1,
                reason: "gunfire echoes".to_string(),
            }
        );
    }

    #[test]
    fn void_marker_with_target_id() {
        let parsed = parse_markers("\u{26AB} Void (tgt_a1b2): -3 (purification)");
        assert_eq!(
            parsed.effects[0],
            MechanicalEffect::VoidChange {
                character: "tgt_a1b2".to_string(),
                delta: -3,
                reason: "purification".to_string(),
            }
        );
    }

    #[test]
    fn soulcredit_marker_with_and_without_selector() {
        for text in [
            "\u{2696}\u{FE0F} Soulcredit (Nyx): +2 (kept the bargain)",
            "\u{2696} Soulcredit (Nyx): +2 (kept the bargain)",
        ] {
            let parsed = parse_markers(text);
            assert_eq!(
                parsed.effects[0],
                MechanicalEffect::SoulcreditChange {
                    character: "Nyx".to_string(),
                    delta: 2,
                    reason: "kept the bargain".to_string(),
                },
                "failed for {text}"
            );
        }
    }

    #[test]
    fn spawn_marker_parses_five_fields() {
        let parsed =
            parse_markers("[SPAWN_ENEMY: Backup | grunt | 2 | Near-Enemy | aggressive_melee]");
        assert_eq!(
            parsed.effects[0],
            MechanicalEffect::SpawnEnemy {
                name: "Backup".to_string(),
                template: "grunt".to_string(),
                count: 2,
                position: "Near-Enemy".to_string(),
                tactics: "aggressive_melee".to_string(),
            }
        );
    }

    #[test]
    fn malformed_spawn_warns_instead_of_failing() {
        let parsed = parse_markers("[SPAWN_ENEMY: Backup | grunt]");
        assert!(parsed.effects.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn despawn_new_clock_pivot_advance() {
        let text = "[DESPAWN_ENEMY: enemy_grunt_1 | fled]\n\
                    [NEW_CLOCK: Floodwater | 6 | the vault is filling]\n\
                    [PIVOT_SCENARIO: the heist becomes an escape]\n\
                    [ADVANCE_STORY: dawn breaks over the spire]";
        let parsed = parse_markers(text);
        assert_eq!(parsed.effects.len(), 4);
        assert!(matches!(
            &parsed.effects[1],
            MechanicalEffect::NewClock { maximum: 6, .. }
        ));
    }

    #[test]
    fn unknown_bracket_marker_warns() {
        let parsed = parse_markers("[SUMMON_DRAGON: now]");
        assert!(parsed.effects.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn plain_prose_yields_nothing() {
        let parsed = parse_markers("The corridor stays silent. Nothing moves.");
        assert!(parsed.effects.is_empty());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn multiple_markers_in_one_narration() {
        let text = "The rite concludes.\n\
                    \u{26AB} Void (Nyx): +1 (channeling)\n\
                    \u{1F4CA} Ritual of Descent: +2 (the circle closes)";
        let parsed = parse_markers(text);
        assert_eq!(parsed.effects.len(), 2);
    }

    #[test]
    fn fallback_damage_curve() {
        assert_eq!(fallback_damage(SuccessTier::Failure, 8), None);
        assert_eq!(fallback_damage(SuccessTier::Marginal, 8), Some(2));
        assert_eq!(fallback_damage(SuccessTier::Moderate, 8), Some(4));
        assert_eq!(fallback_damage(SuccessTier::Good, 8), Some(6));
        assert_eq!(fallback_damage(SuccessTier::Excellent, 8), Some(8));
        assert_eq!(fallback_damage(SuccessTier::Exceptional, 8), Some(10));
        // Floors at 1 on a success even for feeble weapons.
        assert_eq!(fallback_damage(SuccessTier::Marginal, 2), Some(1));
    }

    #[test]
    fn structured_resolution_deserializes_effects() {
        let raw = serde_json::json!({
            "narration": "The blade bites deep.",
            "effects": [
                {"effect": "damage", "target": "Grunt", "amount": 6},
                {"effect": "clock_update", "name": "Alarm", "ticks": 1, "reason": "screams"}
            ]
        });
        let parsed: StructuredResolution = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.effects.len(), 2);
        assert!(matches!(
            parsed.effects[0],
            MechanicalEffect::Damage { amount: 6, .. }
        ));
    }
}

//! The nine YAGS attributes and per-character skill ranks.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The nine attributes every combatant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Strength,
    Agility,
    Endurance,
    Perception,
    Intelligence,
    Empathy,
    Willpower,
    Charisma,
    Size,
}

impl Attribute {
    pub const ALL: [Attribute; 9] = [
        Attribute::Strength,
        Attribute::Agility,
        Attribute::Endurance,
        Attribute::Perception,
        Attribute::Intelligence,
        Attribute::Empathy,
        Attribute::Willpower,
        Attribute::Charisma,
        Attribute::Size,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Strength => "strength",
            Attribute::Agility => "agility",
            Attribute::Endurance => "endurance",
            Attribute::Perception => "perception",
            Attribute::Intelligence => "intelligence",
            Attribute::Empathy => "empathy",
            Attribute::Willpower => "willpower",
            Attribute::Charisma => "charisma",
            Attribute::Size => "size",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Attribute {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strength" => Ok(Attribute::Strength),
            "agility" => Ok(Attribute::Agility),
            "endurance" => Ok(Attribute::Endurance),
            "perception" => Ok(Attribute::Perception),
            "intelligence" => Ok(Attribute::Intelligence),
            "empathy" => Ok(Attribute::Empathy),
            "willpower" => Ok(Attribute::Willpower),
            "charisma" => Ok(Attribute::Charisma),
            "size" => Ok(Attribute::Size),
            other => Err(DomainError::parse(format!("Unknown attribute: '{other}'"))),
        }
    }
}

/// A full attribute block. Values run 1-6 for ordinary humans; the
/// constructor only enforces the hard floor so templated horrors can
/// exceed the usual ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    map: BTreeMap<Attribute, i32>,
}

impl Attributes {
    /// Build an attribute block from a name -> value map.
    ///
    /// All nine attributes must be present and at least 1.
    pub fn from_map(values: &BTreeMap<String, i32>) -> Result<Self, DomainError> {
        let mut map = BTreeMap::new();
        for attribute in Attribute::ALL {
            let value = values.get(attribute.name()).copied().ok_or_else(|| {
                DomainError::validation(format!("missing attribute '{}'", attribute.name()))
            })?;
            if value < 1 {
                return Err(DomainError::validation(format!(
                    "attribute '{}' must be at least 1, got {value}",
                    attribute.name()
                )));
            }
            map.insert(attribute, value);
        }
        Ok(Self { map })
    }

    /// Uniform attribute block, used by enemy templates as a baseline.
    pub fn uniform(value: i32) -> Self {
        let mut map = BTreeMap::new();
        for attribute in Attribute::ALL {
            map.insert(attribute, value.max(1));
        }
        Self { map }
    }

    pub fn get(&self, attribute: Attribute) -> i32 {
        self.map.get(&attribute).copied().unwrap_or(1)
    }

    pub fn set(&mut self, attribute: Attribute, value: i32) {
        self.map.insert(attribute, value.max(1));
    }
}

/// Skill name -> rank (0-6). Rank 0 means untrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillSet {
    ranks: BTreeMap<String, u8>,
}

impl SkillSet {
    pub fn from_map(ranks: BTreeMap<String, u8>) -> Result<Self, DomainError> {
        for (name, rank) in &ranks {
            if *rank > 6 {
                return Err(DomainError::validation(format!(
                    "skill '{name}' rank {rank} exceeds 6"
                )));
            }
        }
        Ok(Self { ranks })
    }

    /// Rank for a skill, 0 when untrained. Lookup is case-insensitive.
    pub fn rank(&self, skill: &str) -> u8 {
        let wanted = skill.trim().to_lowercase();
        self.ranks
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, rank)| *rank)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Iterate (skill name, rank) pairs in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u8)> {
        self.ranks.iter().map(|(name, rank)| (name.as_str(), *rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_map() -> BTreeMap<String, i32> {
        Attribute::ALL
            .iter()
            .map(|a| (a.name().to_string(), 3))
            .collect()
    }

    #[test]
    fn from_map_requires_all_nine() {
        let mut values = full_map();
        values.remove("willpower");
        let err = Attributes::from_map(&values).unwrap_err();
        assert!(err.to_string().contains("willpower"));
    }

    #[test]
    fn from_map_rejects_zero() {
        let mut values = full_map();
        values.insert("strength".to_string(), 0);
        assert!(Attributes::from_map(&values).is_err());
    }

    #[test]
    fn get_returns_configured_value() {
        let attrs = Attributes::from_map(&full_map()).unwrap();
        assert_eq!(attrs.get(Attribute::Agility), 3);
    }

    #[test]
    fn attribute_parses_from_config_strings() {
        assert_eq!("Willpower".parse::<Attribute>().unwrap(), Attribute::Willpower);
        assert!("luck".parse::<Attribute>().is_err());
    }

    #[test]
    fn skill_lookup_is_case_insensitive() {
        let mut ranks = BTreeMap::new();
        ranks.insert("Astral Arts".to_string(), 5);
        let skills = SkillSet::from_map(ranks).unwrap();
        assert_eq!(skills.rank("astral arts"), 5);
        assert_eq!(skills.rank("athletics"), 0);
    }

    #[test]
    fn skill_rank_capped_at_six() {
        let mut ranks = BTreeMap::new();
        ranks.insert("melee".to_string(), 7);
        assert!(SkillSet::from_map(ranks).is_err());
    }
}

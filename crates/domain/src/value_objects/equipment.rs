//! Weapon and armor stat blocks, plus the built-in reference catalog.
//!
//! The catalog is the read-only content table loaded at session start.
//! Config files reference entries by name; unknown names fail validation.

use serde::{Deserialize, Serialize};

use super::damage::DamageChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Melee,
    Ranged,
}

/// A weapon stat block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub damage: i32,
    pub kind: WeaponKind,
    pub channel: DamageChannel,
}

impl Weapon {
    pub fn new(
        name: impl Into<String>,
        damage: i32,
        kind: WeaponKind,
        channel: DamageChannel,
    ) -> Self {
        Self {
            name: name.into(),
            damage,
            kind,
            channel,
        }
    }

    /// Bare hands; stun damage only.
    pub fn unarmed() -> Self {
        Self::new("Unarmed", 0, WeaponKind::Melee, DamageChannel::Stun)
    }
}

/// An armor stat block. Soak reduces incoming damage before levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Armor {
    pub name: String,
    pub soak: i32,
}

impl Armor {
    pub fn new(name: impl Into<String>, soak: i32) -> Self {
        Self {
            name: name.into(),
            soak,
        }
    }
}

/// Built-in weapon table. Looked up case-insensitively by name.
pub fn weapon_catalog() -> Vec<Weapon> {
    vec![
        Weapon::unarmed(),
        Weapon::new("Shock Baton", 2, WeaponKind::Melee, DamageChannel::Stun),
        Weapon::new("Mono Blade", 4, WeaponKind::Melee, DamageChannel::Wound),
        Weapon::new("Ritual Dagger", 3, WeaponKind::Melee, DamageChannel::Wound),
        Weapon::new("Pulse Pistol", 4, WeaponKind::Ranged, DamageChannel::Mixed),
        Weapon::new("Needle Rifle", 6, WeaponKind::Ranged, DamageChannel::Wound),
        Weapon::new("Scatter Gun", 7, WeaponKind::Ranged, DamageChannel::Wound),
        Weapon::new("Void Lash", 5, WeaponKind::Melee, DamageChannel::Mixed),
    ]
}

/// Built-in armor table.
pub fn armor_catalog() -> Vec<Armor> {
    vec![
        Armor::new("Street Clothes", 0),
        Armor::new("Reinforced Coat", 2),
        Armor::new("Tactical Weave", 3),
        Armor::new("Combat Shell", 5),
    ]
}

/// Look up a catalog weapon by name.
pub fn find_weapon(name: &str) -> Option<Weapon> {
    let wanted = name.trim().to_lowercase();
    weapon_catalog()
        .into_iter()
        .find(|w| w.name.to_lowercase() == wanted)
}

/// Look up a catalog armor by name.
pub fn find_armor(name: &str) -> Option<Armor> {
    let wanted = name.trim().to_lowercase();
    armor_catalog()
        .into_iter()
        .find(|a| a.name.to_lowercase() == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup_is_case_insensitive() {
        let weapon = find_weapon("pulse pistol").expect("catalog weapon");
        assert_eq!(weapon.damage, 4);
        assert_eq!(weapon.channel, DamageChannel::Mixed);
    }

    #[test]
    fn unknown_weapon_is_none() {
        assert!(find_weapon("orbital laser").is_none());
    }

    #[test]
    fn armor_lookup() {
        assert_eq!(find_armor("Tactical Weave").expect("catalog armor").soak, 3);
    }
}

//! Value objects for the session core.

mod attributes;
mod check;
mod damage;
mod equipment;
mod personality;
mod position;

pub use attributes::{Attribute, Attributes, SkillSet};
pub use check::{
    base_difficulty, compute_difficulty, CheckResult, SuccessTier, UNSKILLED_PENALTY,
};
pub use damage::{split_mixed_levels, DamageChannel, DamageOutcome};
pub use equipment::{
    armor_catalog, find_armor, find_weapon, weapon_catalog, Armor, Weapon, WeaponKind,
};
pub use personality::{MoraleDisposition, Personality};
pub use position::{Position, RangeBand, Ring, Side};

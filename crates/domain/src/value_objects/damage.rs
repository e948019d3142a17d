//! Damage channel arithmetic.
//!
//! Damage dealt (already net of soak) converts into levels at one level per
//! full 5 points. Stun and wound channels cumulate differently; mixed
//! damage splits its levels with the odd level going to stun.

use serde::{Deserialize, Serialize};

/// How a weapon or effect delivers its damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageChannel {
    /// Non-lethal; replace-or-increment cumulation.
    Stun,
    /// Lethal; strictly cumulative.
    Wound,
    /// Splits between the two channels.
    Mixed,
}

/// Levels of stun and wounds produced by one application of damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageOutcome {
    pub stun_levels: i32,
    pub wound_levels: i32,
}

impl DamageOutcome {
    /// Convert net damage into channel levels.
    pub fn from_damage(channel: DamageChannel, dealt: i32) -> Self {
        let levels = levels_from_damage(dealt);
        match channel {
            DamageChannel::Stun => Self {
                stun_levels: levels,
                wound_levels: 0,
            },
            DamageChannel::Wound => Self {
                stun_levels: 0,
                wound_levels: levels,
            },
            DamageChannel::Mixed => {
                let (stun_levels, wound_levels) = split_mixed_levels(levels);
                Self {
                    stun_levels,
                    wound_levels,
                }
            }
        }
    }
}

/// One level per full 5 points of net damage.
fn levels_from_damage(dealt: i32) -> i32 {
    if dealt <= 0 {
        0
    } else {
        dealt / 5
    }
}

/// Split mixed-damage levels: the odd level goes to stun.
pub fn split_mixed_levels(levels: i32) -> (i32, i32) {
    let stun = (levels + 1) / 2;
    let wound = levels / 2;
    (stun, wound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_points_is_one_level() {
        assert_eq!(levels_from_damage(4), 0);
        assert_eq!(levels_from_damage(5), 1);
        assert_eq!(levels_from_damage(9), 1);
        assert_eq!(levels_from_damage(10), 2);
    }

    #[test]
    fn negative_damage_is_ignored() {
        assert_eq!(levels_from_damage(-3), 0);
    }

    #[test]
    fn wound_channel_is_all_wounds() {
        let outcome = DamageOutcome::from_damage(DamageChannel::Wound, 12);
        assert_eq!(outcome.wound_levels, 2);
        assert_eq!(outcome.stun_levels, 0);
    }

    #[test]
    fn mixed_gives_odd_level_to_stun() {
        assert_eq!(split_mixed_levels(3), (2, 1));
        assert_eq!(split_mixed_levels(4), (2, 2));
        let outcome = DamageOutcome::from_damage(DamageChannel::Mixed, 15);
        assert_eq!(outcome.stun_levels, 2);
        assert_eq!(outcome.wound_levels, 1);
    }
}

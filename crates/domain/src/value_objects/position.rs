//! Battlefield positions as ring x side pairs.
//!
//! The battlefield is modelled as four concentric range rings per side,
//! meeting at Engaged. Crossing from one side to the other always passes
//! through Engaged, so range between opposed combatants is the sum of their
//! ring distances from the centre.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Range ring, ordered from the centre outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ring {
    Engaged,
    Near,
    Far,
    Extreme,
}

impl Ring {
    /// Ring transitions between this ring and Engaged.
    fn steps_from_engaged(&self) -> u8 {
        match self {
            Ring::Engaged => 0,
            Ring::Near => 1,
            Ring::Far => 2,
            Ring::Extreme => 3,
        }
    }
}

/// Which side of the battlefield a ring belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Pc,
    Enemy,
}

/// A combatant's position: ring and side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub ring: Ring,
    pub side: Side,
}

impl Position {
    pub fn new(ring: Ring, side: Side) -> Self {
        Self { ring, side }
    }

    /// Range band between two positions, counting ring transitions
    /// through Engaged.
    pub fn range_to(&self, other: &Position) -> RangeBand {
        if self.ring == Ring::Engaged && other.ring == Ring::Engaged {
            return RangeBand::Engaged;
        }
        if self.side == other.side && self.ring == other.ring {
            return RangeBand::Melee;
        }

        let steps = if self.side == other.side {
            self.ring
                .steps_from_engaged()
                .abs_diff(other.ring.steps_from_engaged())
        } else {
            self.ring.steps_from_engaged() + other.ring.steps_from_engaged()
        };

        match steps {
            0 => RangeBand::Engaged,
            1 => RangeBand::Near,
            2 => RangeBand::Far,
            _ => RangeBand::Extreme,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = match self.ring {
            Ring::Engaged => "Engaged",
            Ring::Near => "Near",
            Ring::Far => "Far",
            Ring::Extreme => "Extreme",
        };
        let side = match self.side {
            Side::Pc => "PC",
            Side::Enemy => "Enemy",
        };
        write!(f, "{ring}-{side}")
    }
}

impl FromStr for Position {
    type Err = DomainError;

    /// Parse "Near-Enemy" style position strings from spawn markers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ring_str, side_str) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| DomainError::parse(format!("Invalid position: '{s}'")))?;
        let ring = match ring_str.trim().to_lowercase().as_str() {
            "engaged" => Ring::Engaged,
            "near" => Ring::Near,
            "far" => Ring::Far,
            "extreme" => Ring::Extreme,
            other => return Err(DomainError::parse(format!("Unknown ring: '{other}'"))),
        };
        let side = match side_str.trim().to_lowercase().as_str() {
            "pc" => Side::Pc,
            "enemy" => Side::Enemy,
            other => return Err(DomainError::parse(format!("Unknown side: '{other}'"))),
        };
        Ok(Position::new(ring, side))
    }
}

/// Effective range between two combatants, with the attack penalty it
/// imposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeBand {
    Melee,
    Engaged,
    Near,
    Far,
    Extreme,
}

impl RangeBand {
    /// Attack penalty applied at this range.
    pub fn penalty(&self) -> i32 {
        match self {
            RangeBand::Melee | RangeBand::Engaged => 0,
            RangeBand::Near => -2,
            RangeBand::Far => -4,
            RangeBand::Extreme => -6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_ring_same_side_is_melee() {
        let a = Position::new(Ring::Near, Side::Pc);
        let b = Position::new(Ring::Near, Side::Pc);
        assert_eq!(a.range_to(&b), RangeBand::Melee);
        assert_eq!(a.range_to(&b).penalty(), 0);
    }

    #[test]
    fn both_engaged_is_engaged() {
        let a = Position::new(Ring::Engaged, Side::Pc);
        let b = Position::new(Ring::Engaged, Side::Enemy);
        assert_eq!(a.range_to(&b), RangeBand::Engaged);
    }

    #[test]
    fn one_ring_apart_same_side() {
        let a = Position::new(Ring::Engaged, Side::Pc);
        let b = Position::new(Ring::Near, Side::Pc);
        assert_eq!(a.range_to(&b), RangeBand::Near);
        assert_eq!(a.range_to(&b).penalty(), -2);
    }

    #[test]
    fn crossing_sides_sums_ring_distances() {
        // Near-PC to Near-Enemy passes through Engaged: two transitions.
        let a = Position::new(Ring::Near, Side::Pc);
        let b = Position::new(Ring::Near, Side::Enemy);
        assert_eq!(a.range_to(&b), RangeBand::Far);
        assert_eq!(a.range_to(&b).penalty(), -4);
    }

    #[test]
    fn distant_cross_side_caps_at_extreme() {
        let a = Position::new(Ring::Extreme, Side::Pc);
        let b = Position::new(Ring::Extreme, Side::Enemy);
        assert_eq!(a.range_to(&b), RangeBand::Extreme);
        assert_eq!(a.range_to(&b).penalty(), -6);
    }

    #[test]
    fn parse_spawn_marker_position() {
        let pos: Position = "Near-Enemy".parse().unwrap();
        assert_eq!(pos, Position::new(Ring::Near, Side::Enemy));
        assert!("Orbit-Enemy".parse::<Position>().is_err());
    }

    #[test]
    fn display_round_trips_marker_format() {
        let pos = Position::new(Ring::Far, Side::Pc);
        assert_eq!(pos.to_string(), "Far-PC");
        assert_eq!(pos.to_string().parse::<Position>().unwrap(), pos);
    }
}

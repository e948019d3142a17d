//! Mutable session entities.
//!
//! All of these are owned and mutated exclusively by the mechanics engine;
//! agents only ever see read-only snapshots.

mod character;
mod clock;
mod enemy;
mod void;

pub use character::{Character, DamageReport};
pub use clock::{ClockState, ExpiryOutcome, SceneClock};
pub use enemy::{builtin_templates, find_template, Enemy, EnemyTemplate, IntelEntry};
pub use void::{VoidDelta, VoidState};

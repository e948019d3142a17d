//! Aeonisk Domain - Core session types, value objects, and invariants.
//!
//! This crate holds the pure data model for the session core: combatants,
//! battlefield positions, scene clocks, void/soulcredit accounting, action
//! declarations and resolutions, and the session event vocabulary.
//!
//! Nothing here performs I/O, owns a random number generator, or awaits.
//! Dice rolls are produced by the engine layer and passed into the pure
//! resolution math, which keeps every rule testable with fixed inputs.

pub mod actions;
pub mod entities;
pub mod error;
pub mod events;
pub mod ids;
pub mod value_objects;

pub use actions::{
    ActionDeclaration, ActionResolution, ActionType, MechanicalEffect, ResolutionOutcome,
};
pub use error::DomainError;
pub use events::{EventRecord, PromptMetadata, SessionEvent};
pub use ids::{AgentId, SessionId};

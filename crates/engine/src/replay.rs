//! The replay driver: reconstruct a session from its event log.
//!
//! A log plus the seed it records is enough to re-run the whole session
//! with a mock provider serving the cached LLM responses. Dice are
//! bit-identical by the determinism contract; prompt-content mismatches
//! are collected as divergences and reported rather than aborting.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use aeonisk_domain::events::SessionEvent;
use aeonisk_domain::SessionId;

use crate::config::SessionConfig;
use crate::eventlog::{load_events, EventLog, EventLogError};
use crate::llm::{Divergence, ReplayProvider};
use crate::prompts::PromptStore;
use crate::rng::SessionRng;
use crate::scheduler::{SchedulerError, SessionOrchestrator, SessionOutcome};
use crate::session::SessionContext;

/// Error type for replay runs.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to load log: {0}")]
    Log(#[from] EventLogError),

    #[error("Log has no session_start record")]
    MissingSessionStart,

    #[error("Replay session failed: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// What a replay run produced.
#[derive(Debug)]
pub struct ReplayReport {
    pub outcome: SessionOutcome,
    pub seed: u64,
    pub rounds: u32,
    pub divergences: Vec<Divergence>,
}

/// Re-run a session from its log, writing the reconstruction into
/// `output` (usually an in-memory log for comparison).
pub async fn replay_session(
    mut config: SessionConfig,
    log_path: &Path,
    to_round: Option<u32>,
    output: EventLog,
) -> Result<ReplayReport, ReplayError> {
    let events = load_events(log_path)?;
    let seed = events
        .iter()
        .find_map(|record| match &record.event {
            SessionEvent::SessionStart { seed, .. } => Some(*seed),
            _ => None,
        })
        .ok_or(ReplayError::MissingSessionStart)?;

    if let Some(limit) = to_round {
        config.max_turns = config.max_turns.min(limit);
    }

    let provider = Arc::new(ReplayProvider::from_events(&events));
    let ctx = SessionContext::new(
        SessionId::new(),
        SessionRng::new(seed),
        output,
        PromptStore::new("replay", config.language.clone()),
        Box::new(Arc::clone(&provider)),
        config.enemy_agent_config.free_targeting_mode,
    );
    let mut orchestrator = SessionOrchestrator::new(config, ctx);
    let outcome = orchestrator.run().await?;
    let rounds = orchestrator.context_mut().round;
    let divergences = provider.divergences();
    info!(
        seed,
        rounds,
        divergences = divergences.len(),
        "replay complete"
    );
    Ok(ReplayReport {
        outcome,
        seed,
        rounds,
        divergences,
    })
}

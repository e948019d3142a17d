//! Aeonisk Runner - CLI entry point for live sessions and log replay.
//!
//! This crate is the composition root: it parses arguments, initializes
//! tracing, loads the session config, wires the provider, and maps the
//! session outcome to an exit code.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aeonisk_domain::SessionId;
use aeonisk_engine::config::{ProviderKind, SessionConfig};
use aeonisk_engine::eventlog::EventLog;
use aeonisk_engine::llm::{AnthropicClient, LlmPort, ScriptedLlm};
use aeonisk_engine::prompts::PromptStore;
use aeonisk_engine::replay::replay_session;
use aeonisk_engine::rng::SessionRng;
use aeonisk_engine::session::SessionContext;
use aeonisk_engine::{SessionOrchestrator, SessionOutcome};

const EXIT_OK: u8 = 0;
const EXIT_CONFIG: u8 = 1;
const EXIT_STALL: u8 = 2;
const EXIT_INTERRUPT: u8 = 130;

/// Multi-agent tabletop session engine.
#[derive(Debug, Parser)]
#[command(name = "aeonisk", version, about)]
struct Cli {
    /// Path to the session config JSON.
    config_path: PathBuf,

    /// Override the random seed (takes precedence over the config).
    #[arg(long)]
    random_seed: Option<u64>,

    /// Replay a previous session from its event log instead of running live.
    #[arg(long, value_name = "LOGFILE")]
    replay: Option<PathBuf>,

    /// Stop a replay after this many rounds.
    #[arg(long, value_name = "N", requires = "replay")]
    replay_to_round: Option<u32>,

    /// Log level filter (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the event log output directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match SessionConfig::load(&cli.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(dir) = cli.output_dir.clone() {
        config.output_dir = dir;
    }
    if let Some(seed) = cli.random_seed {
        config.random_seed = Some(seed);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::from(EXIT_STALL);
        }
    };

    if let Some(log_path) = cli.replay.clone() {
        return runtime.block_on(run_replay(config, log_path, cli.replay_to_round));
    }
    runtime.block_on(run_live(config))
}

async fn run_live(config: SessionConfig) -> ExitCode {
    let provider: Box<dyn LlmPort> = match config.dm.provider {
        ProviderKind::Anthropic => match AnthropicClient::from_env(config.dm.model.clone()) {
            Ok(client) => Box::new(client),
            Err(e) => {
                eprintln!("configuration error: {e}");
                return ExitCode::from(EXIT_CONFIG);
            }
        },
        ProviderKind::Scripted => {
            // Pure-mechanics mode: every agent degrades to its fallback
            // behavior and the dice carry the session.
            Box::new(ScriptedLlm::new().with_default_response(String::new()))
        }
        ProviderKind::Replay => {
            eprintln!("configuration error: provider 'replay' requires --replay <LOGFILE>");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let session_id = SessionId::new();
    let log = match EventLog::create_in(&config.output_dir, session_id) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("configuration error: cannot open event log: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(path) = log.path() {
        info!(path = %path.display(), "event log open");
    }

    let rng = match config.random_seed {
        Some(seed) => SessionRng::new(seed),
        None => SessionRng::from_clock(),
    };
    let mut prompts = PromptStore::new(provider_name(config.dm.provider), config.language.clone());
    if let Some(root) = &config.prompt_dir {
        prompts = prompts.with_root(root.clone());
    }
    let ctx = SessionContext::new(
        session_id,
        rng,
        log,
        prompts,
        provider,
        config.enemy_agent_config.free_targeting_mode,
    );

    let mut orchestrator = SessionOrchestrator::new(config, ctx);
    let shutdown = orchestrator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current round");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    match orchestrator.run().await {
        Ok(SessionOutcome::Interrupted) => ExitCode::from(EXIT_INTERRUPT),
        Ok(SessionOutcome::Stalled) => ExitCode::from(EXIT_STALL),
        Ok(outcome) => {
            info!(reason = outcome.reason(), "session complete");
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            error!(error = %e, "session failed");
            ExitCode::from(EXIT_STALL)
        }
    }
}

async fn run_replay(config: SessionConfig, log_path: PathBuf, to_round: Option<u32>) -> ExitCode {
    match replay_session(config, &log_path, to_round, EventLog::in_memory()).await {
        Ok(report) => {
            info!(
                seed = report.seed,
                rounds = report.rounds,
                outcome = report.outcome.reason(),
                "replay finished"
            );
            if report.divergences.is_empty() {
                info!("no divergences: reconstruction matches the recording");
            } else {
                for divergence in &report.divergences {
                    warn!(
                        agent = %divergence.agent_id,
                        call_sequence = divergence.call_sequence,
                        "divergence: {}",
                        divergence.detail
                    );
                }
                warn!(
                    count = report.divergences.len(),
                    "replay diverged from the recording (prompt templates changed?)"
                );
            }
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            error!(error = %e, "replay failed");
            ExitCode::from(EXIT_STALL)
        }
    }
}

fn provider_name(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Anthropic => "anthropic",
        ProviderKind::Scripted => "scripted",
        ProviderKind::Replay => "replay",
    }
}

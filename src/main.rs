#![forbid(unsafe_code)]

//! `hook-runner`: run ACP hook actions from the command line.
//!
//! Loads configuration, dispatches every `--instruction` as one ACP action
//! through the bounded pool, and prints each outcome as a JSON line on
//! stdout. Logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use hook_runner::acp::{AcpActionParams, AcpClient, AcpClientConfig};
use hook_runner::dispatch::ActionDispatcher;
use hook_runner::pool::BoundedPool;
use hook_runner::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "hook-runner", about = "Run ACP hook actions", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Agent command line, e.g. "gemini --experimental-acp".
    #[arg(long)]
    agent_command: String,

    /// Instruction to send; repeat to run several actions.
    #[arg(long = "instruction", required = true)]
    instructions: Vec<String>,

    /// Working directory for the agent.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Display name used in logs.
    #[arg(long)]
    name: Option<String>,

    /// Per-action deadline in seconds; overrides the config default.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Maximum concurrent actions; overrides the config default.
    #[arg(long)]
    max_concurrent: Option<usize>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("hook-runner bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(max) = args.max_concurrent {
        config.pool.max_concurrent_actions = max;
    }
    config.validate()?;
    info!(
        timeout_seconds = config.agent.timeout_seconds,
        max_concurrent_actions = config.pool.max_concurrent_actions,
        "configuration loaded"
    );

    let dispatcher = ActionDispatcher::new(
        std::sync::Arc::new(AcpClient::new(AcpClientConfig::from(&config.agent))),
        BoundedPool::from_config(&config.pool),
    );

    // ── Dispatch every instruction ──────────────────────
    let handles: Vec<_> = args
        .instructions
        .iter()
        .map(|instruction| {
            let mut params = AcpActionParams::new(args.agent_command.clone(), instruction.clone());
            params.cwd.clone_from(&args.cwd);
            params.display_name.clone_from(&args.name);
            params.timeout = args.timeout_secs.map(Duration::from_secs);
            dispatcher.run_acp_action(params)
        })
        .collect();

    info!(status = ?dispatcher.status(), "actions dispatched");

    let mut failures = 0usize;
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(outcome)) => {
                let line = serde_json::to_string(&outcome)
                    .map_err(|err| AppError::Io(format!("failed to encode outcome: {err}")))?;
                println!("{line}");
            }
            Ok(Err(err)) | Err(err) => {
                error!(index, %err, "action failed");
                failures += 1;
            }
        }
    }

    dispatcher.drain().await;

    if failures > 0 {
        return Err(AppError::Acp(format!(
            "{failures} of {} action(s) failed",
            args.instructions.len()
        )));
    }

    info!("hook-runner finished");
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

//! ACP agent process spawner.
//!
//! Spawns one agent process per conversation with:
//! - the command line split using POSIX shell-word rules, so quoted
//!   arguments survive intact;
//! - piped stdin/stdout for the protocol and piped stderr drained into
//!   `DEBUG` log events;
//! - `kill_on_drop(true)` so a process can never outlive its handle;
//! - an optional environment allowlist.
//!
//! [`terminate`] and [`kill`] implement the two shutdown paths: graceful
//! escalation after a completed conversation, immediate kill after a failed
//! one. Both reap the child before returning.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Environment variable carrying the conversation id into the agent.
pub const CONVERSATION_ID_ENV: &str = "HOOK_CONVERSATION_ID";

/// Configuration for spawning one agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Full command line, e.g. `npx @zed-industries/claude-code-acp`.
    pub command_line: String,
    /// Working directory for the process; inherits ours when `None`.
    pub cwd: Option<PathBuf>,
    /// Environment variables to pass through. `None` inherits everything.
    pub env_allowlist: Option<Vec<String>>,
}

/// Live stdio connection to a spawned agent process.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child process handle; dropping it kills the process.
    pub child: Child,
    /// OS process id captured at spawn time.
    pub pid: Option<u32>,
    /// Agent's stdin for outbound frames.
    pub stdin: ChildStdin,
    /// Agent's stdout for inbound frames.
    pub stdout: ChildStdout,
    /// Task forwarding agent stderr into the log.
    pub stderr_task: Option<JoinHandle<()>>,
}

/// Split a command line into program and arguments.
///
/// # Errors
///
/// Returns [`AppError::SpawnFailed`] if the line is blank or has unbalanced
/// quotes.
pub fn parse_command_line(command_line: &str) -> Result<(String, Vec<String>)> {
    let failed = |reason: &str| AppError::SpawnFailed {
        command: command_line.to_owned(),
        reason: reason.to_owned(),
    };

    let mut words = shlex::split(command_line)
        .ok_or_else(|| failed("command line has unbalanced quotes"))?
        .into_iter();
    let program = words
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| failed("agent command is empty"))?;

    Ok((program, words.collect()))
}

/// Spawn an agent process with piped stdio.
///
/// # Errors
///
/// Returns [`AppError::SpawnFailed`] carrying the literal command line when
/// the command cannot be parsed or the OS refuses to start it (missing
/// binary, permission denied, invalid working directory).
pub fn spawn_agent(config: &SpawnConfig, conversation_id: &str) -> Result<AgentProcess> {
    let (program, args) = parse_command_line(&config.command_line)?;

    let mut cmd = Command::new(&program);
    cmd.args(&args);

    if let Some(allowlist) = &config.env_allowlist {
        cmd.env_clear();
        for key in allowlist {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
    }
    cmd.env(CONVERSATION_ID_ENV, conversation_id);

    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| AppError::SpawnFailed {
        command: config.command_line.clone(),
        reason: err.to_string(),
    })?;

    let pid = child.id();

    let stdin = child.stdin.take().ok_or_else(|| AppError::SpawnFailed {
        command: config.command_line.clone(),
        reason: "failed to capture agent stdin".into(),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| AppError::SpawnFailed {
        command: config.command_line.clone(),
        reason: "failed to capture agent stdout".into(),
    })?;
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| forward_stderr(conversation_id.to_owned(), stderr));

    info!(conversation_id, pid, program = %program, "agent process spawned");

    Ok(AgentProcess {
        child,
        pid,
        stdin,
        stdout,
        stderr_task,
    })
}

/// Shut down an agent that has finished its work.
///
/// The caller must already have closed the agent's stdin. Waits up to
/// `grace` for a natural exit, then (on Unix) sends `SIGTERM` and waits
/// another `grace`, then force-kills. The child is reaped on every path.
pub async fn terminate(child: &mut Child, grace: Duration) {
    let pid = child.id();

    if wait_with_grace(child, grace).await {
        return;
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) {
            debug!(pid, "agent still running after grace period, sending SIGTERM");
            if let Err(err) = signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
                debug!(pid, %err, "SIGTERM delivery failed");
            }
            if wait_with_grace(child, grace).await {
                return;
            }
        }
    }

    warn!(pid, "agent did not exit after grace period, forcing kill");
    kill(child).await;
}

/// Force-kill an agent and reap it.
pub async fn kill(child: &mut Child) {
    let pid = child.id();
    match child.kill().await {
        Ok(()) => debug!(pid, "agent process killed"),
        // `kill` fails when the child already exited; make sure it is reaped.
        Err(err) => {
            debug!(pid, %err, "kill failed, reaping");
            if let Err(err) = child.wait().await {
                warn!(pid, %err, "failed to reap agent process");
            }
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Wait up to `grace` for the child to exit. Returns `true` once it has.
async fn wait_with_grace(child: &mut Child, grace: Duration) -> bool {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(?status, "agent process exited");
            true
        }
        Ok(Err(err)) => {
            warn!(%err, "error waiting for agent process");
            false
        }
        Err(_elapsed) => false,
    }
}

fn forward_stderr(conversation_id: String, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(conversation_id = %conversation_id, line = %line, "agent stderr");
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(conversation_id = %conversation_id, %err, "agent stderr failed");
                    break;
                }
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

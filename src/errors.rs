//! Error types shared across the crate.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Which part of a conversation was running when its deadline elapsed.
///
/// The label is diagnostic only; both phases share one conversation-wide
/// deadline and are handled identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Spawning the agent, `initialize`, or `session/new`.
    Handshake,
    /// `session/prompt` was in flight or the result was being finalized.
    Session,
}

impl Display for TimeoutPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handshake => f.write_str("handshake"),
            Self::Session => f.write_str("session"),
        }
    }
}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// ACP transport failure: framing, write errors, early stream close,
    /// or a result payload that does not match the protocol.
    Acp(String),
    /// The agent executable could not be started.
    SpawnFailed {
        /// Literal command line that was attempted.
        command: String,
        /// Operating system or parsing failure.
        reason: String,
    },
    /// No terminal response arrived before the conversation deadline.
    Timeout {
        /// Conversation phase active when the deadline elapsed.
        phase: TimeoutPhase,
        /// Agent process id, when the process had been spawned.
        pid: Option<u32>,
        /// Deadline that was exceeded.
        after: Duration,
    },
    /// A response frame carried a JSON-RPC error object.
    Protocol {
        /// Request method the error answered.
        method: String,
        /// Peer-supplied error code.
        code: i64,
        /// Peer-supplied error message.
        message: String,
    },
    /// The handshake completed but the agent produced no output fragments.
    EmptyResponse {
        /// Stop reason reported by the agent.
        stop_reason: String,
    },
    /// A pooled task panicked or was aborted before settling.
    Pool(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::SpawnFailed { command, reason } => {
                write!(f, "spawn failed: could not start `{command}`: {reason}")
            }
            Self::Timeout { phase, pid, after } => {
                write!(f, "timeout: no response within {after:?} during {phase} phase")?;
                if let Some(pid) = pid {
                    write!(f, " (pid {pid})")?;
                }
                Ok(())
            }
            Self::Protocol {
                method,
                code,
                message,
            } => write!(f, "protocol error: {method} failed with code {code}: {message}"),
            Self::EmptyResponse { stop_reason } => write!(
                f,
                "empty response: agent stopped ({stop_reason}) without producing output"
            ),
            Self::Pool(msg) => write!(f, "pool: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

//! ACP handshake payloads.
//!
//! A conversation issues exactly three requests, in this order:
//!
//! 1. **`initialize`**: negotiates the protocol version and announces the
//!    client; the result carries the agent's protocol version and identity.
//! 2. **`session/new`**: opens a session rooted at the working directory;
//!    the result carries the `sessionId` used by the prompt.
//! 3. **`session/prompt`**: sends the instruction as a single text content
//!    block; the result carries the `stopReason`.
//!
//! Streamed output arrives between steps 3 and its response as
//! `session/update` notifications.
//!
//! This module only builds request parameters and parses results; the
//! request/response exchange itself lives in
//! [`client`](crate::acp::client).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{AppError, Result};

/// ACP protocol version this client speaks.
pub const PROTOCOL_VERSION: u64 = 1;

/// First handshake request.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Second handshake request.
pub const METHOD_SESSION_NEW: &str = "session/new";
/// Third handshake request.
pub const METHOD_SESSION_PROMPT: &str = "session/prompt";
/// Inbound notification carrying streamed session activity.
pub const NOTIFICATION_SESSION_UPDATE: &str = "session/update";
/// Outbound notification asking the agent to stop the current turn.
pub const NOTIFICATION_SESSION_CANCEL: &str = "session/cancel";

/// Name and version a peer reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Implementation name.
    pub name: String,
    /// Implementation version, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Result of `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version chosen by the agent.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u64,
    /// Agent identity, when reported.
    #[serde(default)]
    pub agent_info: Option<PeerInfo>,
}

fn default_protocol_version() -> u64 {
    PROTOCOL_VERSION
}

/// Result of `session/new`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResult {
    /// Agent-assigned session identifier.
    pub session_id: String,
}

/// Result of `session/prompt`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    /// Why the agent stopped producing output (`end_turn`, `max_tokens`, …).
    pub stop_reason: String,
}

/// Parameters for `initialize`.
///
/// The client advertises no file-system or terminal capabilities, so a
/// well-behaved agent never calls back into it.
#[must_use]
pub fn initialize_params(client: &PeerInfo) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientCapabilities": {
            "fs": { "readTextFile": false, "writeTextFile": false },
            "terminal": false
        },
        "clientInfo": client
    })
}

/// Parameters for `session/new`. `cwd` must be absolute.
#[must_use]
pub fn new_session_params(cwd: &Path) -> Value {
    json!({
        "cwd": cwd.to_string_lossy(),
        "mcpServers": []
    })
}

/// Parameters for `session/prompt`. The instruction is embedded verbatim.
#[must_use]
pub fn prompt_params(session_id: &str, instruction: &str) -> Value {
    json!({
        "sessionId": session_id,
        "prompt": [
            { "type": "text", "text": instruction }
        ]
    })
}

/// Parameters for the `session/cancel` notification.
#[must_use]
pub fn cancel_params(session_id: &str) -> Value {
    json!({ "sessionId": session_id })
}

/// Parse an `initialize` result.
///
/// # Errors
///
/// Returns [`AppError::Acp`] when the payload is not an object of the
/// expected shape.
pub fn parse_initialize_result(value: Value) -> Result<InitializeResult> {
    parse_result(METHOD_INITIALIZE, value)
}

/// Parse a `session/new` result.
///
/// # Errors
///
/// Returns [`AppError::Acp`] when `sessionId` is missing or empty.
pub fn parse_new_session_result(value: Value) -> Result<NewSessionResult> {
    let result: NewSessionResult = parse_result(METHOD_SESSION_NEW, value)?;
    if result.session_id.is_empty() {
        return Err(AppError::Acp(
            "invalid session/new result: empty sessionId".into(),
        ));
    }
    Ok(result)
}

/// Parse a `session/prompt` result.
///
/// # Errors
///
/// Returns [`AppError::Acp`] when `stopReason` is missing.
pub fn parse_prompt_result(value: Value) -> Result<PromptResult> {
    parse_result(METHOD_SESSION_PROMPT, value)
}

/// Resolve the session working directory to an absolute path.
///
/// Relative paths are joined onto the current directory; `None` means the
/// current directory itself.
///
/// # Errors
///
/// Returns [`AppError::Io`] if the current directory cannot be determined.
pub fn absolute_cwd(cwd: Option<&Path>) -> Result<PathBuf> {
    match cwd {
        Some(path) if path.is_absolute() => Ok(path.to_path_buf()),
        Some(path) => Ok(std::env::current_dir()?.join(path)),
        None => Ok(std::env::current_dir()?),
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn parse_result<T>(method: &str, value: Value) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value)
        .map_err(|e| AppError::Acp(format!("invalid {method} result: {e}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

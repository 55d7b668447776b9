//! ACP protocol client.
//!
//! [`AcpClient::execute`] runs one complete conversation with a freshly
//! spawned agent process:
//!
//! ```text
//! Spawning ──► Handshaking ──► SessionInit ──► Prompting ──► Finalizing
//!    │          initialize      session/new    session/prompt    │
//!    ▼                                         + session/update  ▼
//! SpawnFailed                                    fragments    Completed
//!                                                             | EmptyResponse
//! ```
//!
//! Any phase can end in `Timeout` (the single conversation-wide deadline
//! elapsed) or `ProtocolError` (a response carried an error object). All
//! terminal paths go through one place, [`Conversation::finish`] or
//! [`Conversation::abort`], which guarantees the process is gone before
//! `execute` returns.
//!
//! Frames are driven by one loop per request: the request is registered in
//! the [`PendingRequests`] table, written, and then inbound frames are
//! dispatched until that request's [`PendingResponse`] resolves.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::acp::handshake::{self, PeerInfo};
use crate::acp::message::{InboundFrame, OutboundFrame};
use crate::acp::output::OutputAccumulator;
use crate::acp::pending::{PendingRequests, PendingResponse};
use crate::acp::reader::{output_fragment, FrameReader};
use crate::acp::spawner::{self, AgentProcess, SpawnConfig};
use crate::acp::writer::FrameWriter;
use crate::config::AgentConfig;
use crate::errors::TimeoutPhase;
use crate::{AppError, Result};

/// Parameters for one ACP hook action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcpActionParams {
    /// Agent command line, e.g. `gemini --experimental-acp`.
    pub agent_command: String,
    /// Instruction sent as the prompt. Must already be template-expanded.
    pub task_instruction: String,
    /// Working directory for the agent and its session.
    pub cwd: Option<PathBuf>,
    /// Human-readable agent name used in logs.
    pub display_name: Option<String>,
    /// Conversation deadline; the client default applies when `None`.
    pub timeout: Option<Duration>,
}

impl AcpActionParams {
    /// Params with only the required fields set.
    pub fn new(agent_command: impl Into<String>, task_instruction: impl Into<String>) -> Self {
        Self {
            agent_command: agent_command.into(),
            task_instruction: task_instruction.into(),
            cwd: None,
            display_name: None,
            timeout: None,
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Override the conversation deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful conversation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcpOutcome {
    /// Output fragments concatenated in arrival order.
    pub output: String,
    /// Stop reason reported by the agent.
    pub stop_reason: String,
    /// Wall-clock duration of the whole conversation.
    pub duration_ms: u64,
    /// When the conversation started.
    pub started_at: DateTime<Utc>,
    /// Agent-assigned session id.
    pub session_id: String,
    /// Agent identity from `initialize`, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<PeerInfo>,
}

/// Where a conversation is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    /// Starting the agent process.
    Spawning,
    /// `initialize` in flight.
    Handshaking,
    /// `session/new` in flight.
    SessionInit,
    /// `session/prompt` in flight, output streaming.
    Prompting,
    /// Prompt answered; inspecting accumulated output.
    Finalizing,
}

impl ConversationPhase {
    /// Diagnostic label used when the deadline elapses in this phase.
    #[must_use]
    pub fn timeout_phase(self) -> TimeoutPhase {
        match self {
            Self::Spawning | Self::Handshaking | Self::SessionInit => TimeoutPhase::Handshake,
            Self::Prompting | Self::Finalizing => TimeoutPhase::Session,
        }
    }
}

/// Client settings, usually derived from [`AgentConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcpClientConfig {
    /// Conversation deadline when an action does not set one.
    pub default_timeout: Duration,
    /// Shutdown grace period before escalating to signals.
    pub kill_grace: Duration,
    /// Identity announced in `initialize`.
    pub client_info: PeerInfo,
    /// Environment allowlist for spawned agents.
    pub env_allowlist: Option<Vec<String>>,
}

impl From<&AgentConfig> for AcpClientConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            default_timeout: config.timeout(),
            kill_grace: config.kill_grace(),
            client_info: PeerInfo {
                name: config.client_name.clone(),
                version: Some(env!("CARGO_PKG_VERSION").to_owned()),
            },
            env_allowlist: config.env_allowlist.clone(),
        }
    }
}

impl Default for AcpClientConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

/// Runs ACP conversations. Cheap to share; holds no per-conversation state.
#[derive(Debug, Clone, Default)]
pub struct AcpClient {
    config: AcpClientConfig,
}

impl AcpClient {
    /// Create a client.
    #[must_use]
    pub fn new(config: AcpClientConfig) -> Self {
        Self { config }
    }

    /// Run one conversation to completion.
    ///
    /// Spawns exactly one agent process, which is terminated before this
    /// returns on every path.
    ///
    /// # Errors
    ///
    /// - [`AppError::SpawnFailed`]: the command could not be started.
    /// - [`AppError::Timeout`]: the deadline elapsed first.
    /// - [`AppError::Protocol`]: a request was answered with an error.
    /// - [`AppError::EmptyResponse`]: the prompt finished with no output.
    /// - [`AppError::Acp`]: the agent closed its stream early or sent a
    ///   malformed result.
    pub async fn execute(&self, params: &AcpActionParams) -> Result<AcpOutcome> {
        let conversation_id = Uuid::new_v4().to_string();
        let agent = params
            .display_name
            .as_deref()
            .unwrap_or(params.agent_command.as_str());
        let span = info_span!("acp_conversation", conversation_id = %conversation_id, agent);

        self.run_conversation(params, conversation_id)
            .instrument(span)
            .await
    }

    async fn run_conversation(
        &self,
        params: &AcpActionParams,
        conversation_id: String,
    ) -> Result<AcpOutcome> {
        let timeout = params.timeout.unwrap_or(self.config.default_timeout);
        let started = Instant::now();
        let started_at = Utc::now();
        let deadline = tokio::time::Instant::now() + timeout;

        let cwd = handshake::absolute_cwd(params.cwd.as_deref())?;
        let spawn_config = SpawnConfig {
            command_line: params.agent_command.clone(),
            cwd: params.cwd.clone(),
            env_allowlist: self.config.env_allowlist.clone(),
        };

        let process = spawner::spawn_agent(&spawn_config, &conversation_id).map_err(|err| {
            warn!(%err, "agent spawn failed");
            err
        })?;

        let mut conversation = Conversation::new(conversation_id, process);
        let driven = tokio::time::timeout_at(
            deadline,
            conversation.drive(&self.config.client_info, &cwd, &params.task_instruction),
        )
        .await;

        match driven {
            Ok(Ok(completed)) => {
                conversation.finish(self.config.kill_grace).await;
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    duration_ms,
                    stop_reason = completed.stop_reason.as_str(),
                    output_bytes = completed.output.len(),
                    "conversation completed"
                );
                Ok(AcpOutcome {
                    output: completed.output,
                    stop_reason: completed.stop_reason,
                    duration_ms,
                    started_at,
                    session_id: completed.session_id,
                    agent_info: completed.agent_info,
                })
            }
            Ok(Err(err)) => {
                warn!(%err, phase = ?conversation.phase, "conversation failed");
                conversation.abort(&err.to_string()).await;
                Err(err)
            }
            Err(_elapsed) => {
                let err = AppError::Timeout {
                    phase: conversation.phase.timeout_phase(),
                    pid: conversation.pid,
                    after: timeout,
                };
                warn!(%err, phase = ?conversation.phase, "conversation deadline elapsed");
                conversation.cancel_session().await;
                conversation.abort("deadline elapsed").await;
                Err(err)
            }
        }
    }
}

// ── Conversation ──────────────────────────────────────────────────────────────

/// Upper bound on the best-effort `session/cancel` write after a timeout.
const CANCEL_WRITE_WINDOW: Duration = Duration::from_millis(100);

struct Completed {
    output: String,
    stop_reason: String,
    session_id: String,
    agent_info: Option<PeerInfo>,
}

/// One spawned agent and the protocol state that belongs to it.
struct Conversation {
    id: String,
    phase: ConversationPhase,
    child: Child,
    pid: Option<u32>,
    writer: Option<FrameWriter<ChildStdin>>,
    reader: FrameReader<ChildStdout>,
    stderr_task: Option<JoinHandle<()>>,
    pending: PendingRequests,
    output: OutputAccumulator,
    session_id: Option<String>,
}

impl Conversation {
    fn new(id: String, process: AgentProcess) -> Self {
        let AgentProcess {
            child,
            pid,
            stdin,
            stdout,
            stderr_task,
        } = process;

        Self {
            writer: Some(FrameWriter::new(id.as_str(), stdin)),
            reader: FrameReader::new(id.as_str(), stdout),
            id,
            phase: ConversationPhase::Spawning,
            child,
            pid,
            stderr_task,
            pending: PendingRequests::new(),
            output: OutputAccumulator::new(),
            session_id: None,
        }
    }

    fn enter(&mut self, phase: ConversationPhase) {
        debug!(from = ?self.phase, to = ?phase, "conversation phase transition");
        self.phase = phase;
    }

    /// Run the three-step handshake and collect the prompt's output.
    async fn drive(
        &mut self,
        client_info: &PeerInfo,
        cwd: &std::path::Path,
        instruction: &str,
    ) -> Result<Completed> {
        self.enter(ConversationPhase::Handshaking);
        let init = self
            .request(
                handshake::METHOD_INITIALIZE,
                handshake::initialize_params(client_info),
            )
            .await?;
        let init = handshake::parse_initialize_result(init)?;
        info!(
            protocol_version = init.protocol_version,
            agent_name = init.agent_info.as_ref().map(|a| a.name.as_str()),
            "agent initialized"
        );

        self.enter(ConversationPhase::SessionInit);
        let session = self
            .request(
                handshake::METHOD_SESSION_NEW,
                handshake::new_session_params(cwd),
            )
            .await?;
        let session = handshake::parse_new_session_result(session)?;
        self.session_id = Some(session.session_id.clone());
        info!(session_id = session.session_id.as_str(), "agent session created");

        self.enter(ConversationPhase::Prompting);
        let prompt = self
            .request(
                handshake::METHOD_SESSION_PROMPT,
                handshake::prompt_params(&session.session_id, instruction),
            )
            .await?;
        let prompt = handshake::parse_prompt_result(prompt)?;

        self.enter(ConversationPhase::Finalizing);
        if self.output.is_empty() {
            return Err(AppError::EmptyResponse {
                stop_reason: prompt.stop_reason,
            });
        }

        Ok(Completed {
            output: self.output.concat(),
            stop_reason: prompt.stop_reason,
            session_id: session.session_id,
            agent_info: init.agent_info,
        })
    }

    /// Send one request and dispatch inbound frames until it is answered.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let mut response = self.pending.register(method);
        let frame = OutboundFrame::request(response.id(), method, params);
        self.send(&frame).await?;
        debug!(id = response.id(), method, "acp request sent");

        self.await_response(&mut response).await
    }

    async fn await_response(&mut self, response: &mut PendingResponse) -> Result<Value> {
        loop {
            tokio::select! {
                biased;

                outcome = &mut *response => return outcome,

                frame = self.reader.next_frame() => match frame? {
                    Some(frame) => self.dispatch(frame).await?,
                    None => {
                        return Err(AppError::Acp(format!(
                            "agent closed its output stream before answering {}",
                            response.method()
                        )));
                    }
                },
            }
        }
    }

    async fn dispatch(&mut self, frame: InboundFrame) -> Result<()> {
        match frame {
            InboundFrame::Response { id, outcome } => {
                if !self.pending.resolve(id, outcome) {
                    warn!(id, "response for unknown request id, ignoring");
                }
            }
            InboundFrame::Notification { method, params } => {
                self.on_notification(&method, &params);
            }
            InboundFrame::Request { id, method, .. } => {
                debug!(method = method.as_str(), "agent request not supported, replying with error");
                self.send(&OutboundFrame::method_not_found(id, &method))
                    .await?;
            }
        }
        Ok(())
    }

    fn on_notification(&mut self, method: &str, params: &Value) {
        if method != handshake::NOTIFICATION_SESSION_UPDATE {
            debug!(method, "ignoring notification");
            return;
        }

        match output_fragment(params) {
            Some(fragment) => {
                debug!(
                    fragment_index = self.output.fragment_count(),
                    bytes = fragment.len(),
                    "output fragment received"
                );
                self.output.push(fragment);
            }
            None => debug!("ignoring non-output session update"),
        }
    }

    async fn send(&mut self, frame: &OutboundFrame) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.send(frame).await,
            None => Err(AppError::Acp("agent stdin already closed".into())),
        }
    }

    /// Best-effort `session/cancel` before a forced shutdown.
    async fn cancel_session(&mut self) {
        if self.phase != ConversationPhase::Prompting {
            return;
        }
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        let frame = OutboundFrame::notification(
            handshake::NOTIFICATION_SESSION_CANCEL,
            handshake::cancel_params(&session_id),
        );
        // A prompt the agent stopped reading may still sit unflushed in the
        // writer, so the cancel gets a bounded window of its own.
        match tokio::time::timeout(CANCEL_WRITE_WINDOW, self.send(&frame)).await {
            Ok(Ok(())) => debug!("session/cancel sent"),
            Ok(Err(err)) => debug!(%err, "session/cancel could not be delivered"),
            Err(_elapsed) => debug!("agent stdin is blocked, skipping session/cancel"),
        }
    }

    /// Graceful shutdown after a completed conversation.
    async fn finish(mut self, grace: Duration) {
        // Closing stdin is the agent's cue to exit on its own.
        drop(self.writer.take());
        spawner::terminate(&mut self.child, grace).await;
        self.detach_stderr().await;
        debug!(conversation_id = self.id.as_str(), "conversation closed");
    }

    /// Forced shutdown: reject every pending request and kill the agent.
    async fn abort(mut self, reason: &str) {
        let rejected = self.pending.reject_all(reason);
        if rejected > 0 {
            debug!(rejected, "pending requests rejected");
        }
        drop(self.writer.take());
        spawner::kill(&mut self.child).await;
        self.detach_stderr().await;
        debug!(conversation_id = self.id.as_str(), "conversation aborted");
    }

    async fn detach_stderr(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            // Grandchildren can keep stderr open after the agent is gone.
            if tokio::time::timeout(Duration::from_millis(100), task)
                .await
                .is_err()
            {
                debug!("stderr forwarder still running, detaching");
            }
        }
    }
}

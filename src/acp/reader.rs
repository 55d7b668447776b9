//! ACP inbound frame reader.
//!
//! Reads newline-delimited JSON from an agent's stdout through
//! [`FramedRead`] with a length-capped [`LinesCodec`], so an unterminated or
//! oversized line cannot grow the read buffer past [`MAX_LINE_BYTES`].
//! Partial reads stay buffered until the terminating `\n` arrives.
//!
//! # Skipped input
//!
//! | Input                         | Handling                     |
//! |-------------------------------|------------------------------|
//! | blank line                    | skipped silently             |
//! | non-JSON line                 | skipped, logged at `WARN`    |
//! | line over the length limit    | skipped, logged at `WARN`    |
//! | line that is not UTF-8        | skipped, logged at `WARN`    |
//! | frame with neither id/method  | skipped, logged at `WARN`    |

use std::io::ErrorKind;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::acp::message::{InboundFrame, RpcError};
use crate::{AppError, Result};

/// Longest inbound line accepted from an agent: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// `session/update` kind that carries streamed agent output.
pub const AGENT_MESSAGE_CHUNK: &str = "agent_message_chunk";

// ── Inbound message types ─────────────────────────────────────────────────────

/// Untyped JSON-RPC envelope (agent → client).
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Parameters of a `session/update` notification.
#[derive(Debug, Deserialize)]
struct SessionUpdateParams {
    update: SessionUpdate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionUpdate {
    session_update: String,
    #[serde(default)]
    content: Option<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse a single NDJSON line into an [`InboundFrame`].
///
/// # Return value
///
/// - `Ok(Some(frame))`: a well-formed response, notification, or request.
/// - `Ok(None)`: the line is empty or whitespace.
///
/// # Errors
///
/// - [`AppError::Acp`]`("malformed json: …")`: not a JSON object.
/// - [`AppError::Acp`]`("response id is not numeric: …")`: a response whose
///   id cannot have come from this client.
/// - [`AppError::Acp`]`("frame has neither method nor id")`.
pub fn parse_inbound_line(line: &str) -> Result<Option<InboundFrame>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let envelope: RawEnvelope =
        serde_json::from_str(line).map_err(|e| AppError::Acp(format!("malformed json: {e}")))?;

    let params = envelope.params.unwrap_or(Value::Null);

    match (envelope.id, envelope.method) {
        (Some(id), Some(method)) => Ok(Some(InboundFrame::Request { id, method, params })),
        (None, Some(method)) => Ok(Some(InboundFrame::Notification { method, params })),
        (Some(id), None) => {
            let id = id
                .as_u64()
                .ok_or_else(|| AppError::Acp(format!("response id is not numeric: {id}")))?;
            let outcome = match envelope.error {
                Some(error) => Err(error),
                None => Ok(envelope.result.unwrap_or(Value::Null)),
            };
            Ok(Some(InboundFrame::Response { id, outcome }))
        }
        (None, None) => Err(AppError::Acp("frame has neither method nor id".into())),
    }
}

/// Extract the text of an output fragment from `session/update` params.
///
/// Returns `None` for any update that is not an `agent_message_chunk` with
/// text content (thoughts, tool calls, plans, images, …).
#[must_use]
pub fn output_fragment(params: &Value) -> Option<String> {
    let params = SessionUpdateParams::deserialize(params).ok()?;
    if params.update.session_update != AGENT_MESSAGE_CHUNK {
        return None;
    }
    match params.update.content? {
        ContentBlock::Text { text } => Some(text),
        ContentBlock::Other => None,
    }
}

/// Framed reader over an agent's stdout yielding parsed [`InboundFrame`]s.
#[derive(Debug)]
pub struct FrameReader<R> {
    conversation_id: String,
    framed: FramedRead<R, LinesCodec>,
    resume_after_error: bool,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap `stream`, accepting lines up to [`MAX_LINE_BYTES`].
    pub fn new(conversation_id: impl Into<String>, stream: R) -> Self {
        Self::with_line_limit(conversation_id, stream, MAX_LINE_BYTES)
    }

    /// Wrap `stream` with a custom per-line byte limit.
    pub fn with_line_limit(conversation_id: impl Into<String>, stream: R, limit: usize) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            framed: FramedRead::new(stream, LinesCodec::new_with_max_length(limit)),
            resume_after_error: false,
        }
    }

    /// Read the next well-formed frame.
    ///
    /// Returns `Ok(None)` on clean EOF. Malformed, oversized, and blank
    /// lines are skipped without ending the stream. Cancel-safe: no frame is
    /// lost if the returned future is dropped before completion.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the underlying stream fails.
    pub async fn next_frame(&mut self) -> Result<Option<InboundFrame>> {
        let conversation_id = self.conversation_id.as_str();

        loop {
            match self.framed.next().await {
                // FramedRead reports one `None` after a decode error before
                // resuming; that is not end of stream.
                None if std::mem::take(&mut self.resume_after_error) => {}

                None => {
                    debug!(conversation_id, "acp reader: EOF detected");
                    return Ok(None);
                }

                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(
                        conversation_id,
                        limit = self.framed.decoder().max_length(),
                        "acp reader: line too long, skipping"
                    );
                    self.resume_after_error = true;
                }

                // The codec has already consumed the offending line.
                Some(Err(LinesCodecError::Io(e))) if e.kind() == ErrorKind::InvalidData => {
                    warn!(conversation_id, error = %e, "acp reader: line is not utf-8, skipping");
                    self.resume_after_error = true;
                }

                Some(Err(LinesCodecError::Io(e))) => {
                    warn!(conversation_id, error = %e, "acp reader: IO error, stopping");
                    return Err(AppError::Io(e.to_string()));
                }

                Some(Ok(line)) => match parse_inbound_line(&line) {
                    Ok(Some(frame)) => return Ok(Some(frame)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            conversation_id,
                            error = %e,
                            raw_line = %line,
                            "acp reader: parse error, skipping line"
                        );
                    }
                },
            }
        }
    }
}

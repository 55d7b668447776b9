//! ACP outbound frame writer.
//!
//! Serialises each [`OutboundFrame`] to a single-line JSON string and writes
//! it to the agent's stdin through [`FramedWrite`] with a [`LinesCodec`],
//! which appends the `\n` delimiter. Every send is flushed so the agent sees
//! the frame immediately.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{debug, warn};

use crate::acp::message::OutboundFrame;
use crate::{AppError, Result};

/// Framed writer over an agent's stdin.
#[derive(Debug)]
pub struct FrameWriter<W> {
    conversation_id: String,
    framed: FramedWrite<W, LinesCodec>,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wrap `sink`. Outbound lines are not length-limited.
    pub fn new(conversation_id: impl Into<String>, sink: W) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            framed: FramedWrite::new(sink, LinesCodec::new()),
        }
    }

    /// Write one frame and flush it.
    ///
    /// # Errors
    ///
    /// - [`AppError::Acp`]`("failed to serialise outbound frame: …")`.
    /// - [`AppError::Acp`]`("write failed: …")` if the agent has closed its
    ///   stdin (usually because it exited).
    pub async fn send(&mut self, frame: &OutboundFrame) -> Result<()> {
        let line = frame.to_line()?;
        let conversation_id = self.conversation_id.as_str();

        self.framed.send(line).await.map_err(|e| {
            warn!(conversation_id, error = %e, "acp writer: write to stdin failed");
            AppError::Acp(format!("write failed: {e}"))
        })?;

        debug!(
            conversation_id,
            method = frame.method().unwrap_or("<response>"),
            "acp writer: frame sent"
        );
        Ok(())
    }

    /// Consume the writer and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.framed.into_inner()
    }
}

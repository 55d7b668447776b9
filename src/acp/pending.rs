//! Pending request table.
//!
//! Correlates outbound request identifiers with the response that
//! eventually answers them. An entry is registered before its request frame
//! is written and resolved exactly once: by the matching response, or by
//! [`PendingRequests::reject_all`] when the conversation is aborted.
//! Matching is by identifier only, so responses arriving out of order can
//! never be delivered to the wrong waiter.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::acp::message::RpcError;
use crate::{AppError, Result};

struct PendingEntry {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

/// Identifier → completion-handle table for one conversation.
pub struct PendingRequests {
    next_id: u64,
    entries: HashMap<u64, PendingEntry>,
}

impl PendingRequests {
    /// Create an empty table. The first identifier handed out is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    /// Allocate the next identifier for `method` and register a waiter.
    ///
    /// Identifiers increase strictly and are never reused.
    pub fn register(&mut self, method: &str) -> PendingResponse {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            PendingEntry {
                method: method.to_owned(),
                tx,
            },
        );

        PendingResponse {
            id,
            method: method.to_owned(),
            rx,
        }
    }

    /// Deliver a response to the waiter registered under `id`.
    ///
    /// An error object is converted to [`AppError::Protocol`] carrying the
    /// originating method. Returns `false` when no entry exists for `id`
    /// (unknown or already resolved).
    pub fn resolve(&mut self, id: u64, outcome: std::result::Result<Value, RpcError>) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };

        let result = outcome.map_err(|err| AppError::Protocol {
            method: entry.method.clone(),
            code: err.code,
            message: err.message,
        });

        if entry.tx.send(result).is_err() {
            debug!(id, method = entry.method, "pending: waiter dropped before response");
        }
        true
    }

    /// Reject every outstanding entry with [`AppError::Acp`] naming `reason`.
    ///
    /// Returns the number of entries rejected.
    pub fn reject_all(&mut self, reason: &str) -> usize {
        let count = self.entries.len();
        for (id, entry) in self.entries.drain() {
            let err = AppError::Acp(format!(
                "request {} (id {id}) aborted: {reason}",
                entry.method
            ));
            // A dropped waiter has nothing left to notify.
            let _ = entry.tx.send(Err(err));
        }
        count
    }

    /// Number of requests still awaiting a response.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.entries.len()
    }

    /// Method registered under `id`, if still outstanding.
    #[must_use]
    pub fn method(&self, id: u64) -> Option<&str> {
        self.entries.get(&id).map(|e| e.method.as_str())
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiter for one registered request; resolves to the response result.
///
/// Resolves to [`AppError::Acp`] if the table was dropped without
/// answering the entry.
#[derive(Debug)]
pub struct PendingResponse {
    id: u64,
    method: String,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingResponse {
    /// Request identifier to put on the wire.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Method this waiter belongs to.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Future for PendingResponse {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        let poll = Pin::new(&mut self.rx).poll(cx);
        poll.map(|received| {
            received.unwrap_or_else(|_| {
                Err(AppError::Acp(format!(
                    "request {} (id {id}) dropped without a response",
                    self.method
                )))
            })
        })
    }
}

//! JSON-RPC 2.0 frame model for the ACP wire protocol.
//!
//! Outbound frames are built as [`OutboundFrame`] and serialised to a single
//! compact JSON line by [`OutboundFrame::to_line`]. Inbound lines are
//! classified into [`InboundFrame`] by
//! [`parse_inbound_line`](crate::acp::reader::parse_inbound_line):
//!
//! | `id`      | `method`  | Classification                  |
//! |-----------|-----------|---------------------------------|
//! | number    | absent    | [`InboundFrame::Response`]      |
//! | absent    | present   | [`InboundFrame::Notification`]  |
//! | present   | present   | [`InboundFrame::Request`]       |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{AppError, Result};

/// Protocol version string carried in every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for an unsupported method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A frame written to the agent's stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Request expecting a correlated response.
    Request {
        /// Conversation-scoped request identifier.
        id: u64,
        /// Method name.
        method: String,
        /// Method parameters.
        params: Value,
    },
    /// Fire-and-forget notification.
    Notification {
        /// Method name.
        method: String,
        /// Method parameters.
        params: Value,
    },
    /// Error reply to a request the agent sent us.
    ErrorResponse {
        /// Identifier copied from the agent's request.
        id: Value,
        /// Error detail.
        error: RpcError,
    },
}

impl OutboundFrame {
    /// Build a request frame.
    #[must_use]
    pub fn request(id: u64, method: &str, params: Value) -> Self {
        Self::Request {
            id,
            method: method.to_owned(),
            params,
        }
    }

    /// Build a notification frame.
    #[must_use]
    pub fn notification(method: &str, params: Value) -> Self {
        Self::Notification {
            method: method.to_owned(),
            params,
        }
    }

    /// Build a `method not found` reply to an agent-initiated request.
    #[must_use]
    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::ErrorResponse {
            id,
            error: RpcError {
                code: METHOD_NOT_FOUND,
                message: format!("method not supported by this client: {method}"),
                data: None,
            },
        }
    }

    /// Method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::ErrorResponse { .. } => None,
        }
    }

    /// The frame as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Request { id, method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "method": method,
                "params": params,
            }),
            Self::Notification { method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": method,
                "params": params,
            }),
            Self::ErrorResponse { id, error } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": error,
            }),
        }
    }

    /// Serialise the frame to one compact JSON line, without the trailing
    /// newline (the writer appends it).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if serialisation fails.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(&self.to_value())
            .map_err(|e| AppError::Acp(format!("failed to serialise outbound frame: {e}")))
    }
}

/// A frame read from the agent's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Response to one of our requests.
    Response {
        /// Identifier of the request being answered.
        id: u64,
        /// `result` on success, `error` on failure.
        outcome: std::result::Result<Value, RpcError>,
    },
    /// Notification (no identifier).
    Notification {
        /// Method name.
        method: String,
        /// Method parameters (`null` when absent).
        params: Value,
    },
    /// Request initiated by the agent.
    Request {
        /// Agent-chosen identifier, echoed in the reply.
        id: Value,
        /// Method name.
        method: String,
        /// Method parameters (`null` when absent).
        params: Value,
    },
}

//! Agent Client Protocol (ACP) conversation core.
//!
//! Drives one agent process per conversation over newline-delimited
//! JSON-RPC on its stdio.
//!
//! Submodules:
//! - `message`: outbound and inbound JSON-RPC frame model.
//! - `reader` / `writer`: NDJSON-framed stdout/stdin halves.
//! - `pending`: request id → response waiter table.
//! - `output`: streamed output accumulator.
//! - `handshake`: `initialize` / `session/new` / `session/prompt` payloads.
//! - `spawner`: process spawning and termination.
//! - `client`: the conversation state machine, [`AcpClient`](client::AcpClient).

pub mod client;
pub mod handshake;
pub mod message;
pub mod output;
pub mod pending;
pub mod reader;
pub mod spawner;
pub mod writer;

pub use client::{AcpActionParams, AcpClient, AcpClientConfig, AcpOutcome, ConversationPhase};

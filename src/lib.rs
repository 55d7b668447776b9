#![forbid(unsafe_code)]

//! Hook action execution core.
//!
//! - [`acp`] runs one conversation with a spawned ACP agent and returns its
//!   streamed output.
//! - [`pool`] throttles how many actions run at once.
//! - [`dispatch`] composes the two for the hook action layer.

pub mod acp;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod pool;

pub use config::GlobalConfig;
pub use errors::{AppError, Result, TimeoutPhase};

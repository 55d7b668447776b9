//! Hook action dispatch through the bounded pool.
//!
//! [`ActionDispatcher`] is the entry point the hook action layer uses when a
//! global concurrency ceiling must hold across every ACP action. It owns
//! nothing protocol-specific: each submission is an ordinary
//! [`AcpClient::execute`] call wrapped in a [`BoundedPool`] task.

use std::sync::Arc;

use tracing::debug;

use crate::acp::{AcpActionParams, AcpClient, AcpClientConfig, AcpOutcome};
use crate::pool::{BoundedPool, PoolHandle, PoolStatus};
use crate::{GlobalConfig, Result};

/// Runs ACP actions under a shared concurrency ceiling.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    client: Arc<AcpClient>,
    pool: BoundedPool,
}

impl ActionDispatcher {
    /// Compose an existing client and pool.
    #[must_use]
    pub fn new(client: Arc<AcpClient>, pool: BoundedPool) -> Self {
        Self { client, pool }
    }

    /// Build the client and pool from configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            Arc::new(AcpClient::new(AcpClientConfig::from(&config.agent))),
            BoundedPool::from_config(&config.pool),
        )
    }

    /// Queue an ACP action behind the pool's ceiling.
    ///
    /// The outer result of the returned handle fails only if the action
    /// panicked; the inner result is the conversation outcome.
    pub fn run_acp_action(&self, params: AcpActionParams) -> PoolHandle<Result<AcpOutcome>> {
        let client = Arc::clone(&self.client);
        debug!(agent = params.agent_command.as_str(), "dispatching acp action");
        self.pool
            .execute(move || async move { client.execute(&params).await })
    }

    /// Pool occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Wait until every dispatched action has settled.
    pub async fn drain(&self) {
        self.pool.drain().await;
    }

    /// The underlying pool, for submitting non-ACP work under the same
    /// ceiling.
    #[must_use]
    pub fn pool(&self) -> &BoundedPool {
        &self.pool
    }
}

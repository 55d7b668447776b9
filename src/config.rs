//! Global configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_timeout_seconds() -> u64 {
    300
}

fn default_kill_grace_millis() -> u64 {
    2000
}

fn default_client_name() -> String {
    "hook-runner".into()
}

fn default_max_concurrent_actions() -> usize {
    3
}

/// Settings for ACP agent conversations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Conversation deadline used when an action does not override it.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Window the agent gets to exit on its own before being signalled.
    #[serde(default = "default_kill_grace_millis")]
    pub kill_grace_millis: u64,
    /// Name reported in `clientInfo` during `initialize`.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Environment variables passed to the agent. `None` inherits the
    /// full environment of this process.
    #[serde(default)]
    pub env_allowlist: Option<Vec<String>>,
}

impl AgentConfig {
    /// Default conversation deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Grace period used when shutting an agent down.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_millis)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            kill_grace_millis: default_kill_grace_millis(),
            client_name: default_client_name(),
            env_allowlist: None,
        }
    }
}

/// Settings for the bounded execution pool.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    /// Maximum number of actions running at once.
    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_actions: default_max_concurrent_actions(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// ACP agent settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Execution pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.agent.timeout_seconds == 0 {
            return Err(AppError::Config(
                "agent.timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.agent.client_name.trim().is_empty() {
            return Err(AppError::Config(
                "agent.client_name must not be empty".into(),
            ));
        }

        if self.pool.max_concurrent_actions == 0 {
            return Err(AppError::Config(
                "pool.max_concurrent_actions must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

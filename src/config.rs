//! Global configuration parsing and validation.
//!
//! Every field has a default, so an absent or empty `config.toml` is a
//! valid configuration:
//!
//! ```toml
//! display_name = "build agent"
//! origin = "cli"
//! registry_dir = "/home/me/.agent-beacon/sessions"
//! socket_dir = "/run/user/1000/agent-beacon"
//! heartbeat_interval_ms = 2000
//! stale_threshold_ms = 6000
//! attach_timeout_ms = 1500
//!
//! [security]
//! require_user_confirm_on_first_attach = false
//! allowed_fingerprints = []
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::attach::client::DEFAULT_ATTACH_TIMEOUT_MS;
use crate::attach::consent::{AllowAll, AllowList, ConsentPolicy};
use crate::models::descriptor::{Origin, DEFAULT_HEARTBEAT_INTERVAL_MS};
use crate::paths;
use crate::{AppError, Result};

/// Attach authorization settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SecurityConfig {
    /// Advertised in the descriptor; hosts with a UI prompt on first attach.
    #[serde(default)]
    pub require_user_confirm_on_first_attach: bool,
    /// Fingerprints allowed to attach; empty allows everyone.
    #[serde(default)]
    pub allowed_fingerprints: Vec<String>,
}

impl SecurityConfig {
    /// Consent policy implied by these settings.
    #[must_use]
    pub fn consent_policy(&self) -> Arc<dyn ConsentPolicy> {
        if self.allowed_fingerprints.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(AllowList::new(self.allowed_fingerprints.iter().cloned()))
        }
    }
}

fn default_display_name() -> String {
    "agent".into()
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_stale_threshold_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS * 3
}

fn default_attach_timeout_ms() -> u64 {
    DEFAULT_ATTACH_TIMEOUT_MS
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Label shown to clients.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Front-end kind advertised in the descriptor.
    #[serde(default)]
    pub origin: Origin,
    /// Registry directory override.
    #[serde(default)]
    pub registry_dir: Option<PathBuf>,
    /// Socket base directory; the `AGENT_BEACON_SOCKET_DIR` env var wins.
    #[serde(default)]
    pub socket_dir: Option<PathBuf>,
    /// Heartbeat cadence.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Heartbeat age past which a session counts as dead.
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,
    /// Client handshake deadline.
    #[serde(default = "default_attach_timeout_ms")]
    pub attach_timeout_ms: u64,
    /// Authorization settings.
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            origin: Origin::default(),
            registry_dir: None,
            socket_dir: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            stale_threshold_ms: default_stale_threshold_ms(),
            attach_timeout_ms: default_attach_timeout_ms(),
            security: SecurityConfig::default(),
        }
    }
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

    /// Load from `path` when given, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Same as [`load_from_path`](Self::load_from_path).
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
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

    /// Effective registry directory.
    #[must_use]
    pub fn registry_dir(&self) -> PathBuf {
        self.registry_dir
            .clone()
            .unwrap_or_else(paths::default_registry_dir)
    }

    /// Effective socket base directory.
    #[must_use]
    pub fn socket_dir(&self) -> PathBuf {
        paths::resolve_socket_dir(self.socket_dir.as_deref())
    }

    /// Heartbeat cadence as a duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Staleness threshold as a duration.
    #[must_use]
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    /// Attach deadline as a duration.
    #[must_use]
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(AppError::Config(
                "heartbeat_interval_ms must be greater than zero".into(),
            ));
        }

        if self.stale_threshold_ms < self.heartbeat_interval_ms {
            return Err(AppError::Config(
                "stale_threshold_ms must be at least heartbeat_interval_ms".into(),
            ));
        }

        if self.attach_timeout_ms == 0 {
            return Err(AppError::Config(
                "attach_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.display_name.trim().is_empty() {
            return Err(AppError::Config("display_name must not be empty".into()));
        }

        Ok(())
    }
}

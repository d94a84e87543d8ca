//! Session descriptor model and derived discovery view.
//!
//! A [`SessionDescriptor`] is the persisted record a running session
//! publishes into the registry directory. Every field carries a serde
//! default so a partially-written or hand-edited file still deserializes;
//! the scanner relies on this to degrade a bad file to an empty record.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::deserialize_lenient_timestamp;
use crate::attach::protocol::PROTOCOL_VERSION;

/// Default heartbeat cadence in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2000;

/// Kind of front-end that started the session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Terminal front-end.
    #[default]
    Cli,
    /// Desktop front-end.
    Gui,
    /// Anything else, including values written by newer versions.
    #[serde(other)]
    Other,
}

/// Lifecycle status advertised in the descriptor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is up and accepting attaches.
    Running,
    /// Session is working on a task.
    Busy,
    /// Session is waiting for input.
    Idle,
    /// Session is shutting down.
    Stopping,
    /// Status missing or not understood.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Transport used to reach the attach server.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachTransport {
    /// Filesystem-domain socket.
    #[default]
    UnixSocket,
    /// Transport not understood by this version.
    #[serde(other)]
    Unknown,
}

/// Where a client connects to attach.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AttachEndpoint {
    /// Transport kind.
    pub transport: AttachTransport,
    /// Socket path.
    pub path: PathBuf,
}

/// Security hints advertised to clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityHints {
    /// The session asks its user before the first attach from a new client.
    pub require_user_confirm_on_first_attach: bool,
}

/// Heartbeat cadence and most recent refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeartbeatInfo {
    /// Interval between refreshes.
    pub interval_ms: u64,
    /// Time of the most recent refresh; `None` when missing or unparseable.
    #[serde(deserialize_with = "deserialize_lenient_timestamp")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Persisted discovery record, one file per session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionDescriptor {
    /// Stable identifier for the session's lifetime.
    pub session_id: String,
    /// Human-readable label.
    pub display_name: String,
    /// Front-end kind.
    pub origin: Origin,
    /// Owning process id.
    pub pid: u32,
    /// Session start time.
    #[serde(deserialize_with = "deserialize_lenient_timestamp")]
    pub start_time: Option<DateTime<Utc>>,
    /// Attach protocol version spoken by the session.
    pub protocol_version: String,
    /// Reserved for future negotiation.
    pub capabilities: serde_json::Map<String, serde_json::Value>,
    /// Attach address.
    pub attach: AttachEndpoint,
    /// Security hints.
    pub security: SecurityHints,
    /// Liveness information.
    pub heartbeat: HeartbeatInfo,
    /// Lifecycle status.
    pub status: SessionStatus,
}

impl SessionDescriptor {
    /// Build a fresh descriptor for the current process.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        display_name: impl Into<String>,
        origin: Origin,
        socket_path: PathBuf,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            display_name: display_name.into(),
            origin,
            pid: std::process::id(),
            start_time: Some(now),
            protocol_version: PROTOCOL_VERSION.to_owned(),
            capabilities: serde_json::Map::new(),
            attach: AttachEndpoint {
                transport: AttachTransport::UnixSocket,
                path: socket_path,
            },
            security: SecurityHints::default(),
            heartbeat: HeartbeatInfo {
                interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
                last_heartbeat: Some(now),
            },
            status: SessionStatus::Running,
        }
    }

    /// Heartbeat age at `now` in milliseconds.
    ///
    /// A missing timestamp is treated as infinitely old. A timestamp in the
    /// future (clock skew) counts as age zero.
    #[must_use]
    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        self.heartbeat.last_heartbeat.map_or(u64::MAX, |last| {
            u64::try_from((now - last).num_milliseconds()).unwrap_or(0)
        })
    }
}

/// A descriptor enriched with liveness computed at scan time. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscoveredSession {
    /// Descriptor as read from disk.
    #[serde(flatten)]
    pub descriptor: SessionDescriptor,
    /// Milliseconds since the last heartbeat; `u64::MAX` when unknown.
    pub age_ms: u64,
    /// `age_ms <= stale threshold`.
    pub healthy: bool,
    /// File the descriptor was read from.
    #[serde(skip)]
    pub source: PathBuf,
}

impl DiscoveredSession {
    /// Classify `descriptor` against `stale_threshold_ms` at `now`.
    #[must_use]
    pub fn classify(
        descriptor: SessionDescriptor,
        source: PathBuf,
        now: DateTime<Utc>,
        stale_threshold_ms: u64,
    ) -> Self {
        let age_ms = descriptor.age_ms(now);
        Self {
            descriptor,
            age_ms,
            healthy: age_ms <= stale_threshold_ms,
            source,
        }
    }

    /// Session identifier shortcut.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.descriptor.session_id
    }
}

//! Heartbeat publisher: owns a running session's descriptor.
//!
//! [`start`] writes the initial descriptor and spawns a background task
//! that rewrites it every heartbeat interval with a fresh timestamp (and
//! immediately whenever [`PublisherHandle::set_status`] changes the status).
//! A failed rewrite is counted and logged; the loop keeps going.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::store::DescriptorStore;
use crate::attach::auth::SessionAuthToken;
use crate::clock::{Clock, SystemClock};
use crate::models::descriptor::{
    Origin, SessionDescriptor, SessionStatus, DEFAULT_HEARTBEAT_INTERVAL_MS,
};
use crate::paths::{self, ensure_private_dir, validate_session_id};
use crate::{AppError, Result};

/// Settings for [`start`].
#[derive(Clone)]
pub struct PublisherConfig {
    /// Registry directory for the descriptor file.
    pub registry_dir: PathBuf,
    /// Socket base directory used when `socket_path` is not set.
    pub socket_dir: PathBuf,
    /// Explicit socket path, overriding the derived one.
    pub socket_path: Option<PathBuf>,
    /// Session id; a random UUID is generated when absent.
    pub session_id: Option<String>,
    /// Human-readable label.
    pub display_name: String,
    /// Front-end kind.
    pub origin: Origin,
    /// Reserved negotiation map copied into the descriptor.
    pub capabilities: serde_json::Map<String, serde_json::Value>,
    /// Advertised in the descriptor's security block.
    pub require_user_confirm_on_first_attach: bool,
    /// Refresh cadence.
    pub heartbeat_interval: Duration,
    /// Session secret; generated when absent.
    pub token: Option<SessionAuthToken>,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
}

impl PublisherConfig {
    /// Defaults rooted at the given directories.
    #[must_use]
    pub fn new(registry_dir: impl Into<PathBuf>, socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry_dir: registry_dir.into(),
            socket_dir: socket_dir.into(),
            socket_path: None,
            session_id: None,
            display_name: "agent".to_owned(),
            origin: Origin::Cli,
            capabilities: serde_json::Map::new(),
            require_user_confirm_on_first_attach: false,
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            token: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for PublisherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherConfig")
            .field("registry_dir", &self.registry_dir)
            .field("socket_dir", &self.socket_dir)
            .field("socket_path", &self.socket_path)
            .field("session_id", &self.session_id)
            .field("display_name", &self.display_name)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

/// Counters describing heartbeat health.
#[derive(Debug, Default)]
pub struct HeartbeatStats {
    published: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl HeartbeatStats {
    fn record_success(&self) {
        self.published.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self, message: String) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = Some(message);
        }
    }
}

/// Owned handle to a running publisher.
///
/// Returned by [`start`] once the initial descriptor is on disk. The
/// heartbeat task republishes it every interval until the handle is
/// stopped or dropped.
///
/// # Lifecycle
///
/// - [`set_status`](Self::set_status) republishes immediately with the new
///   status; later heartbeats keep it.
/// - [`stop`](Self::stop) cancels the heartbeat, waits for the task, and
///   removes the descriptor. A second call is a no-op.
/// - Dropping the handle cancels the heartbeat but leaves the descriptor
///   on disk, as a crash would. Scanners then see it go stale.
///
/// # Statistics
///
/// [`published_count`](Self::published_count),
/// [`failed_writes`](Self::failed_writes) and
/// [`last_error`](Self::last_error) report heartbeat health. A failed
/// write is counted and retried on the next tick; it never stops the loop.
///
/// # Examples
///
/// ```rust,ignore
/// let mut handle = publisher::start(PublisherConfig::new(&registry, &sockets))?;
/// handle.set_status(SessionStatus::Busy);
/// // ...
/// handle.stop().await;
/// ```
#[derive(Debug)]
pub struct PublisherHandle {
    session_id: String,
    socket_path: PathBuf,
    token: SessionAuthToken,
    store: DescriptorStore,
    stats: Arc<HeartbeatStats>,
    status_tx: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PublisherHandle {
    /// Session id written in the descriptor.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Socket path advertised in the descriptor.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Descriptor file path.
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.store.path_for(&self.session_id)
    }

    /// In-memory session secret. Never written to the descriptor.
    #[must_use]
    pub fn token(&self) -> &SessionAuthToken {
        &self.token
    }

    /// Successful rewrites since start (the initial write is not counted).
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.stats.published.load(Ordering::SeqCst)
    }

    /// Failed rewrites since start.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.stats.failed.load(Ordering::SeqCst)
    }

    /// Message of the most recent failed rewrite.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.stats
            .last_error
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Change the advertised status; republished right away.
    pub fn set_status(&self, status: SessionStatus) {
        self.status_tx.send_replace(status);
    }

    /// `true` after [`stop`](Self::stop) has run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.task.is_none()
    }

    /// Cancel the heartbeat and remove the descriptor file.
    ///
    /// Idempotent; a descriptor that is already gone is not an error.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(err) = task.await {
            warn!(%err, "heartbeat task ended abnormally");
        }
        match self.store.remove(&self.session_id) {
            Ok(true) => info!(session_id = %self.session_id, "descriptor removed"),
            Ok(false) => debug!(session_id = %self.session_id, "descriptor already absent"),
            Err(err) => warn!(%err, "failed to remove descriptor"),
        }
    }
}

impl Drop for PublisherHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Publish the initial descriptor and start the heartbeat loop.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `AppError::Config` for an unusable session id or a zero
/// heartbeat interval, `AppError::Io` if the registry or socket directory
/// cannot be created, and
/// `AppError::Registry` if the initial descriptor cannot be written.
pub fn start(config: PublisherConfig) -> Result<PublisherHandle> {
    let session_id = config
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    validate_session_id(&session_id)?;
    if config.heartbeat_interval.is_zero() {
        return Err(AppError::Config(
            "heartbeat interval must be greater than zero".into(),
        ));
    }

    let socket_path = config
        .socket_path
        .clone()
        .unwrap_or_else(|| paths::socket_path(&config.socket_dir, &session_id));

    let store = DescriptorStore::new(&config.registry_dir);
    store.ensure_dir()?;
    if let Some(parent) = socket_path.parent() {
        ensure_private_dir(parent)?;
    }

    let now = config.clock.now();
    let mut descriptor = SessionDescriptor::new(
        session_id.clone(),
        config.display_name.clone(),
        config.origin,
        socket_path.clone(),
        now,
    );
    descriptor.capabilities = config.capabilities.clone();
    descriptor.security.require_user_confirm_on_first_attach =
        config.require_user_confirm_on_first_attach;
    descriptor.heartbeat.interval_ms =
        u64::try_from(config.heartbeat_interval.as_millis()).unwrap_or(u64::MAX);
    store.publish(&descriptor)?;

    info!(
        %session_id,
        socket = %socket_path.display(),
        interval_ms = descriptor.heartbeat.interval_ms,
        "session descriptor published"
    );

    let (status_tx, status_rx) = watch::channel(descriptor.status);
    let stats = Arc::new(HeartbeatStats::default());
    let cancel = CancellationToken::new();

    let task = tokio::spawn(
        run_heartbeat(
            store.clone(),
            descriptor,
            config.heartbeat_interval,
            Arc::clone(&config.clock),
            status_rx,
            Arc::clone(&stats),
            cancel.clone(),
        )
        .instrument(info_span!("heartbeat", session_id = %session_id)),
    );

    Ok(PublisherHandle {
        session_id,
        socket_path,
        token: config.token.unwrap_or_else(SessionAuthToken::generate),
        store,
        stats,
        status_tx,
        cancel,
        task: Some(task),
    })
}

async fn run_heartbeat(
    store: DescriptorStore,
    mut descriptor: SessionDescriptor,
    period: Duration,
    clock: Arc<dyn Clock>,
    mut status_rx: watch::Receiver<SessionStatus>,
    stats: Arc<HeartbeatStats>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut status_open = true;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("heartbeat cancelled");
                return;
            }
            _ = interval.tick() => {}
            changed = status_rx.changed(), if status_open => {
                if changed.is_err() {
                    status_open = false;
                    continue;
                }
            }
        }

        descriptor.status = *status_rx.borrow_and_update();
        descriptor.heartbeat.last_heartbeat = Some(next_heartbeat(
            descriptor.heartbeat.last_heartbeat,
            clock.now(),
        ));

        match store.publish(&descriptor) {
            Ok(_) => stats.record_success(),
            Err(err) => {
                warn!(%err, "heartbeat write failed; will retry next tick");
                stats.record_failure(err.to_string());
            }
        }
    }
}

/// Next heartbeat timestamp, strictly after `previous` even if the clock
/// stalls or steps backwards.
#[must_use]
pub fn next_heartbeat(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + chrono::Duration::milliseconds(1),
        _ => now,
    }
}

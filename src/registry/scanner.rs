//! Discovery scanner: reads every descriptor in the registry directory and
//! ranks sessions by heartbeat freshness.
//!
//! Scanning is read-only and stateless, so any number of callers may run
//! it concurrently. It never fails: a missing directory yields no sessions
//! and a corrupt file yields an empty record that sorts last.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::store::{read_descriptor_lenient, DescriptorStore};
use crate::clock::Clock;
use crate::models::descriptor::DiscoveredSession;

/// List sessions in `registry_dir`, freshest first.
///
/// `healthy` is `age_ms <= stale_threshold`. Entries with equal age keep
/// file-name order.
#[must_use]
pub fn discover(
    registry_dir: &Path,
    stale_threshold: Duration,
    clock: &dyn Clock,
) -> Vec<DiscoveredSession> {
    let store = DescriptorStore::new(registry_dir);
    let files = match store.list_files() {
        Ok(files) => files,
        Err(err) => {
            warn!(%err, "registry scan failed");
            return Vec::new();
        }
    };

    let threshold_ms = u64::try_from(stale_threshold.as_millis()).unwrap_or(u64::MAX);
    let now = clock.now();

    let mut sessions: Vec<DiscoveredSession> = files
        .into_iter()
        .map(|path| {
            let descriptor = read_descriptor_lenient(&path);
            DiscoveredSession::classify(descriptor, path, now, threshold_ms)
        })
        .collect();
    sessions.sort_by_key(|s| s.age_ms);

    debug!(
        count = sessions.len(),
        healthy = sessions.iter().filter(|s| s.healthy).count(),
        "registry scanned"
    );
    sessions
}

/// Pick a session from a [`discover`] result.
///
/// With a query: an exact session-id match, otherwise the only session
/// whose id starts with the query. Without a query: the freshest healthy
/// session.
#[must_use]
pub fn select_session<'a>(
    sessions: &'a [DiscoveredSession],
    query: Option<&str>,
) -> Option<&'a DiscoveredSession> {
    let Some(query) = query else {
        return sessions.iter().find(|s| s.healthy);
    };
    if let Some(exact) = sessions.iter().find(|s| s.session_id() == query) {
        return Some(exact);
    }
    let mut prefixed = sessions
        .iter()
        .filter(|s| !query.is_empty() && s.session_id().starts_with(query));
    match (prefixed.next(), prefixed.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Remove descriptors that are stale and whose process is gone.
///
/// A descriptor is removed only when it is unhealthy at `stale_threshold`
/// AND its `pid` no longer names a live process (or is missing). Its socket
/// file is removed too when the advertised path is an actual socket.
/// Returns the removed descriptor paths.
#[must_use]
pub fn reap_stale(
    registry_dir: &Path,
    stale_threshold: Duration,
    clock: &dyn Clock,
) -> Vec<std::path::PathBuf> {
    let mut removed = Vec::new();

    for session in discover(registry_dir, stale_threshold, clock) {
        if session.healthy {
            continue;
        }
        let pid = session.descriptor.pid;
        if pid != 0 && process_alive(pid) {
            debug!(pid, session_id = session.session_id(), "stale but process alive; keeping");
            continue;
        }

        match std::fs::remove_file(&session.source) {
            Ok(()) => {
                info!(
                    path = %session.source.display(),
                    age_ms = session.age_ms,
                    "reaped stale descriptor"
                );
                remove_orphan_socket(&session.descriptor.attach.path);
                removed.push(session.source);
            }
            Err(err) => warn!(path = %session.source.display(), %err, "failed to reap descriptor"),
        }
    }

    removed
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(unix)]
fn remove_orphan_socket(path: &Path) {
    use std::os::unix::fs::FileTypeExt;

    let is_socket = std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_socket())
        .unwrap_or(false);
    if is_socket {
        if let Err(err) = std::fs::remove_file(path) {
            warn!(path = %path.display(), %err, "failed to remove orphaned socket");
        }
    }
}

#[cfg(not(unix))]
fn remove_orphan_socket(_path: &Path) {}

//! Filesystem layout for the registry and attach sockets.
//!
//! - Registry directory: `$HOME/.agent-beacon/sessions`, one
//!   `<session_id>.json` descriptor per session.
//! - Socket base directory: `AGENT_BEACON_SOCKET_DIR` when set, otherwise
//!   `$XDG_RUNTIME_DIR/agent-beacon`, otherwise `<tmp>/agent-beacon-<uid>`.
//!   Each session listens on `<session_id>.sock`.
//!
//! Both directories are created owner-only (`0700`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{AppError, Result};

/// Environment variable overriding the socket base directory.
pub const SOCKET_DIR_ENV: &str = "AGENT_BEACON_SOCKET_DIR";

/// File extension used for descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = "json";

/// File extension used for attach sockets.
pub const SOCKET_EXTENSION: &str = "sock";

const APP_DIR: &str = ".agent-beacon";

/// Default per-user registry directory.
#[must_use]
pub fn default_registry_dir() -> PathBuf {
    home_dir().join(APP_DIR).join("sessions")
}

/// Resolve the socket base directory.
///
/// The environment override wins over `configured`, which wins over the
/// platform default.
#[must_use]
pub fn resolve_socket_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = env::var_os(SOCKET_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    default_socket_dir()
}

/// Platform default socket base directory (ignores the env override).
#[must_use]
pub fn default_socket_dir() -> PathBuf {
    if let Some(runtime) = env::var_os("XDG_RUNTIME_DIR").filter(|v| !v.is_empty()) {
        return PathBuf::from(runtime).join("agent-beacon");
    }
    env::temp_dir().join(format!("agent-beacon-{}", current_uid()))
}

/// Descriptor file path for `session_id` inside `registry_dir`.
#[must_use]
pub fn descriptor_path(registry_dir: &Path, session_id: &str) -> PathBuf {
    registry_dir.join(format!("{session_id}.{DESCRIPTOR_EXTENSION}"))
}

/// Socket path for `session_id` inside `socket_dir`.
#[must_use]
pub fn socket_path(socket_dir: &Path, session_id: &str) -> PathBuf {
    socket_dir.join(format!("{session_id}.{SOCKET_EXTENSION}"))
}

/// Check that `session_id` is safe to embed in a file name.
///
/// # Errors
///
/// Returns `AppError::Config` if the id is empty or contains characters
/// other than ASCII alphanumerics, `-` and `_`.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "invalid session id '{session_id}': only [A-Za-z0-9_-] allowed"
        )))
    }
}

/// Create `dir` (and any missing parents) restricted to the owner.
///
/// A directory that already exists is used as-is: its permissions belong
/// to whoever created it.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory cannot be created or its
/// permissions cannot be set.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    private_dir_builder().create(dir).map_err(|err| {
        AppError::Io(format!("failed to create directory {}: {err}", dir.display()))
    })?;
    // Exact mode regardless of umask.
    set_owner_only(dir, 0o700)
}

#[cfg(unix)]
fn private_dir_builder() -> fs::DirBuilder {
    use std::os::unix::fs::DirBuilderExt;

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(0o700);
    builder
}

#[cfg(not(unix))]
fn private_dir_builder() -> fs::DirBuilder {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    builder
}

/// Restrict `path` to the given unix mode (no-op elsewhere).
///
/// # Errors
///
/// Returns `AppError::Io` if the permissions cannot be applied.
#[cfg(unix)]
pub fn set_owner_only(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|err| {
        AppError::Io(format!(
            "failed to set permissions on {}: {err}",
            path.display()
        ))
    })
}

/// Restrict `path` to the given unix mode (no-op elsewhere).
///
/// # Errors
///
/// Never fails on non-unix platforms.
#[cfg(not(unix))]
pub fn set_owner_only(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map_or_else(env::temp_dir, PathBuf::from)
}

#[cfg(unix)]
fn current_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}

//! Descriptor store: one pretty-printed JSON file per session.
//!
//! Writes go to a hidden temp file in the registry directory which is then
//! renamed over `<session_id>.json`, so a concurrent reader sees either the
//! previous complete document or the new one, never a truncated file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::descriptor::SessionDescriptor;
use crate::paths::{
    descriptor_path, ensure_private_dir, set_owner_only, validate_session_id, DESCRIPTOR_EXTENSION,
};
use crate::{AppError, Result};

/// File-backed descriptor registry rooted at one directory.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    dir: PathBuf,
}

impl DescriptorStore {
    /// Store rooted at `dir`. Nothing is created until [`ensure_dir`](Self::ensure_dir)
    /// or [`publish`](Self::publish).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Registry directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Descriptor path for `session_id`.
    #[must_use]
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        descriptor_path(&self.dir, session_id)
    }

    /// Create the registry directory owner-only.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<()> {
        ensure_private_dir(&self.dir)
    }

    /// Atomically write `descriptor` to its file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an unusable session id and
    /// `AppError::Registry` if serialization, the temp write, or the rename
    /// fails.
    pub fn publish(&self, descriptor: &SessionDescriptor) -> Result<PathBuf> {
        validate_session_id(&descriptor.session_id)?;
        let target = self.path_for(&descriptor.session_id);

        let body = serde_json::to_string_pretty(descriptor).map_err(|err| {
            AppError::Registry(format!("failed to serialize descriptor: {err}"))
        })?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|err| {
                AppError::Registry(format!(
                    "failed to create temporary file in {}: {err}",
                    self.dir.display()
                ))
            })?;
        tmp.write_all(body.as_bytes())
            .and_then(|()| tmp.write_all(b"\n"))
            .and_then(|()| tmp.flush())
            .map_err(|err| AppError::Registry(format!("failed to write descriptor: {err}")))?;
        set_owner_only(tmp.path(), 0o600)?;

        tmp.persist(&target).map_err(|err| {
            AppError::Registry(format!(
                "failed to persist descriptor to {}: {err}",
                target.display()
            ))
        })?;

        debug!(path = %target.display(), "descriptor published");
        Ok(target)
    }

    /// Load and strictly parse the descriptor for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the file is missing, unreadable, not
    /// a JSON object, or not a valid descriptor document.
    pub fn load(&self, session_id: &str) -> Result<SessionDescriptor> {
        let path = self.path_for(session_id);
        let raw = fs::read_to_string(&path).map_err(|err| {
            AppError::Registry(format!("failed to read {}: {err}", path.display()))
        })?;
        let invalid = |detail: String| {
            AppError::Registry(format!("invalid descriptor {}: {detail}", path.display()))
        };
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|err| invalid(err.to_string()))?;
        if !value.is_object() {
            return Err(invalid("expected a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|err| invalid(err.to_string()))
    }

    /// Delete the descriptor for `session_id`.
    ///
    /// Returns `Ok(false)` if the file was already absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` for any failure other than a missing file.
    pub fn remove(&self, session_id: &str) -> Result<bool> {
        let path = self.path_for(session_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AppError::Registry(format!(
                "failed to remove {}: {err}",
                path.display()
            ))),
        }
    }

    /// Descriptor files in the directory, sorted by name.
    ///
    /// Returns an empty list when the directory does not exist. Temp files
    /// from in-progress writes are excluded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the directory exists but cannot be
    /// listed.
    pub fn list_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Registry(format!(
                    "failed to list {}: {err}",
                    self.dir.display()
                )))
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_descriptor_file(path))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Read a descriptor file, degrading any failure to an empty record.
#[must_use]
pub fn read_descriptor_lenient(path: &Path) -> SessionDescriptor {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "unreadable descriptor");
            return SessionDescriptor::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), %err, "malformed descriptor");
        SessionDescriptor::default()
    })
}

fn is_descriptor_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| !name.starts_with('.'));
    visible
        && path
            .extension()
            .is_some_and(|ext| ext == DESCRIPTOR_EXTENSION)
        && path.is_file()
}

//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Crate error enumeration covering setup and I/O failure modes.
///
/// Handshake outcomes are not errors: the attach client reports them as an
/// [`AttachOutcome`](crate::attach::client::AttachOutcome). Only failures a
/// caller cannot recover from (creating directories, binding the socket)
/// surface as `AppError`.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Descriptor registry read/write failure.
    Registry(String),
    /// Attach protocol violation or encoding failure.
    Protocol(String),
    /// Socket-level failure (bind, connect, read, write).
    Transport(String),
    /// Operation did not complete within its deadline.
    Timeout(String),
    /// Caller is not authorized to perform the requested action.
    Unauthorized(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Registry(msg) => write!(f, "registry: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

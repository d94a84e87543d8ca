#![forbid(unsafe_code)]

//! Local agent-session discovery and attach.
//!
//! A running session publishes a descriptor file into a per-user registry
//! directory and refreshes its heartbeat on a fixed cadence. Clients scan
//! the registry, rank sessions by freshness, and attach over the session's
//! filesystem socket with a line-delimited JSON handshake.

pub mod attach;
pub mod clock;
pub mod config;
pub mod errors;
pub mod models;
pub mod paths;
pub mod registry;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use session::{SessionHost, SessionOptions};

//! File-based session discovery registry.
//!
//! - `store`: deterministic file naming and atomic descriptor writes.
//! - `publisher`: per-session heartbeat loop owning the descriptor.
//! - `scanner`: freshness-ranked discovery and optional stale reaping.

pub mod publisher;
pub mod scanner;
pub mod store;

pub use scanner::{discover, reap_stale, select_session};
pub use store::DescriptorStore;

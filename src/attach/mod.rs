//! Attach handshake over a session's filesystem socket.
//!
//! - `protocol`: the five handshake message kinds as one tagged enum.
//! - `codec`: newline-delimited framing with a line-length cap.
//! - `auth`: session secret, nonces, client identity.
//! - `consent` / `verify`: pluggable authorization hooks.
//! - `handshake`: IO-free per-connection server state machine.
//! - `server`: socket listener spawning one handshake per connection.
//! - `client`: the client side, bounded by a single deadline.

pub mod auth;
pub mod client;
pub mod codec;
pub mod consent;
pub mod handshake;
pub mod protocol;
pub mod server;
pub mod verify;

//! Attach handshake wire messages.
//!
//! Each message is one JSON object on its own line, discriminated by a
//! `type` field:
//!
//! | `type`             | direction       | fields                                                 |
//! |--------------------|-----------------|--------------------------------------------------------|
//! | `attach_request`   | client → server | `protocol_version`, `session_id`, `client_fp`, `client_pubkey` |
//! | `attach_challenge` | server → client | `session_id`, `nonce`, `encrypted_auth_token`          |
//! | `attach_proof`     | client → server | `session_id`, `signed_nonce`                           |
//! | `attach_ok`        | server → client | `session_id`, `server_info: {pid, version}`            |
//! | `attach_error`     | server → client | `session_id`, `code`, `message`                        |

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Attach protocol version spoken by this build.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Identity of the attached server process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server process id.
    pub pid: u32,
    /// Server software version.
    pub version: String,
}

impl ServerInfo {
    /// Info describing the current process.
    #[must_use]
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Reason codes carried by `attach_error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttachErrorCode {
    /// Client and server protocol versions differ.
    Incompatible,
    /// Consent was denied.
    Unauthorized,
    /// A proof arrived before any challenge was issued.
    NoChallenge,
    /// The proof did not verify.
    InvalidProof,
    /// A well-formed message arrived that is illegal in the current state.
    UnexpectedMessage,
    /// Code not understood by this version.
    #[serde(other)]
    Unknown,
}

impl AttachErrorCode {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incompatible => "incompatible",
            Self::Unauthorized => "unauthorized",
            Self::NoChallenge => "no_challenge",
            Self::InvalidProof => "invalid_proof",
            Self::UnexpectedMessage => "unexpected_message",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for AttachErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of handshake messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttachMessage {
    /// Client asks to attach.
    AttachRequest {
        /// Client protocol version.
        protocol_version: String,
        /// Target session.
        #[serde(default)]
        session_id: String,
        /// Client fingerprint used for consent.
        client_fp: String,
        /// Client public key.
        #[serde(default)]
        client_pubkey: String,
    },
    /// Server challenges the client.
    AttachChallenge {
        /// Issuing session.
        #[serde(default)]
        session_id: String,
        /// Hex-encoded random nonce.
        nonce: String,
        /// Token bound to the client fingerprint.
        encrypted_auth_token: String,
    },
    /// Client answers the challenge.
    AttachProof {
        /// Target session.
        #[serde(default)]
        session_id: String,
        /// Proof computed over the nonce.
        signed_nonce: String,
    },
    /// Handshake succeeded.
    AttachOk {
        /// Attached session.
        #[serde(default)]
        session_id: String,
        /// Server identity.
        server_info: ServerInfo,
    },
    /// Handshake failed; the server closes the connection after sending it.
    AttachError {
        /// Rejecting session.
        #[serde(default)]
        session_id: String,
        /// Machine-readable reason.
        code: AttachErrorCode,
        /// Human-readable detail.
        #[serde(default)]
        message: String,
    },
}

impl AttachMessage {
    /// Wire `type` tag of this message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AttachRequest { .. } => "attach_request",
            Self::AttachChallenge { .. } => "attach_challenge",
            Self::AttachProof { .. } => "attach_proof",
            Self::AttachOk { .. } => "attach_ok",
            Self::AttachError { .. } => "attach_error",
        }
    }

    /// Build an `attach_error`.
    #[must_use]
    pub fn error(session_id: &str, code: AttachErrorCode, message: impl Into<String>) -> Self {
        Self::AttachError {
            session_id: session_id.to_owned(),
            code,
            message: message.into(),
        }
    }

    /// Serialize to a single JSON line without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| AppError::Protocol(format!("failed to encode {}: {err}", self.kind())))
    }

    /// Parse one framed line.
    ///
    /// Accepts raw bytes so framing never has to validate UTF-8. Returns
    /// `None` for blank lines, invalid UTF-8, invalid JSON, unknown `type`
    /// tags and messages missing required fields. Malformed input is dropped
    /// by the caller, never surfaced as an error.
    #[must_use]
    pub fn parse_line(line: impl AsRef<[u8]>) -> Option<Self> {
        let line = line.as_ref();
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        serde_json::from_slice(line).ok()
    }
}

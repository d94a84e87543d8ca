//! Attach client: connects to a discovered session and drives the client
//! side of the handshake.
//!
//! The whole exchange (connect, request, challenge, proof, verdict) runs
//! as one future under a single deadline. Whichever terminal event happens
//! first (`attach_ok`, `attach_error`, a socket failure, or the deadline)
//! produces the only result; on timeout the in-flight future is dropped,
//! which closes the socket, and nothing it would have produced later is
//! observable.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use interprocess::local_socket::tokio::Stream;
use interprocess::local_socket::{tokio::prelude::*, GenericFilePath, ToFsName};
use serde_json::{json, Value};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, info_span, Instrument};

use super::auth::ClientIdentity;
use super::codec::{write_message, AttachCodec};
use super::protocol::{AttachErrorCode, AttachMessage, ServerInfo, PROTOCOL_VERSION};
use super::verify::{PlaceholderSigner, ProofSigner};
use crate::models::descriptor::SessionDescriptor;

/// Default handshake deadline in milliseconds.
pub const DEFAULT_ATTACH_TIMEOUT_MS: u64 = 1500;

/// Client-side attach settings.
#[derive(Clone)]
pub struct AttachOptions {
    /// Deadline for the whole handshake, starting at the connect attempt.
    pub timeout: Duration,
    /// Identity presented in `attach_request`.
    pub identity: ClientIdentity,
    /// Computes the proof over the server's nonce.
    pub signer: Arc<dyn ProofSigner>,
    /// Version announced in `attach_request`.
    pub protocol_version: String,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_ATTACH_TIMEOUT_MS),
            identity: ClientIdentity::ephemeral(),
            signer: Arc::new(PlaceholderSigner),
            protocol_version: PROTOCOL_VERSION.to_owned(),
        }
    }
}

impl std::fmt::Debug for AttachOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachOptions")
            .field("timeout", &self.timeout)
            .field("identity", &self.identity)
            .field("protocol_version", &self.protocol_version)
            .finish_non_exhaustive()
    }
}

/// Why an attach did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachFailure {
    /// No terminal outcome before the deadline.
    Timeout,
    /// The server answered with `attach_error`.
    Rejected {
        /// Server reason code.
        code: AttachErrorCode,
        /// Server detail, if any.
        message: Option<String>,
    },
    /// Connect, read or write failed, or the server hung up early.
    Transport(String),
}

/// Result of one [`attach`] call.
///
/// Every variant is a normal return; callers treat anything but
/// [`AttachOutcome::Attached`] as "try another session".
///
/// Exactly one outcome is produced per call: whichever of `attach_ok`,
/// `attach_error`, a socket failure or the deadline happens first. The
/// connection is closed when the outcome is returned, so later server
/// messages are never observed.
///
/// # JSON
///
/// [`to_json`](Self::to_json) renders the result for tools:
///
/// | Outcome | JSON |
/// |---|---|
/// | `Attached(info)` | `{"ok": true, "info": {"pid": …, "version": …}}` |
/// | `Failed(Timeout)` | `{"ok": false, "error": "timeout"}` |
/// | `Failed(Rejected{code, message})` | `{"ok": false, "error": code}`, plus `"message"` when present |
/// | `Failed(Transport(message))` | `{"ok": false, "error": "transport", "message": message}` |
///
/// # Examples
///
/// ```rust,ignore
/// match attach(&session.descriptor, &AttachOptions::default()).await {
///     AttachOutcome::Attached(info) => println!("attached to pid {}", info.pid),
///     AttachOutcome::Failed(reason) => eprintln!("attach failed: {reason:?}"),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Handshake completed.
    Attached(ServerInfo),
    /// Handshake did not complete.
    Failed(AttachFailure),
}

impl AttachOutcome {
    /// `true` for [`AttachOutcome::Attached`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Attached(_))
    }

    /// Server identity on success.
    #[must_use]
    pub fn server_info(&self) -> Option<&ServerInfo> {
        match self {
            Self::Attached(info) => Some(info),
            Self::Failed(_) => None,
        }
    }

    /// Short error code: `timeout`, `transport`, or the server's code.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Attached(_) => None,
            Self::Failed(AttachFailure::Timeout) => Some("timeout"),
            Self::Failed(AttachFailure::Transport(_)) => Some("transport"),
            Self::Failed(AttachFailure::Rejected { code, .. }) => Some(code.as_str()),
        }
    }

    /// Human-readable detail accompanying an error.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed(AttachFailure::Transport(message)) => Some(message),
            Self::Failed(AttachFailure::Rejected { message, .. }) => message.as_deref(),
            Self::Attached(_) | Self::Failed(AttachFailure::Timeout) => None,
        }
    }

    /// `{ok, info}` / `{ok, error, message?}` report object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Attached(info) => json!({ "ok": true, "info": info }),
            Self::Failed(_) => {
                let mut report = json!({ "ok": false, "error": self.error() });
                if let Some(message) = self.message() {
                    report["message"] = Value::String(message.to_owned());
                }
                report
            }
        }
    }
}

/// Attach to a discovered session at `session.attach.path`.
pub async fn attach(session: &SessionDescriptor, options: &AttachOptions) -> AttachOutcome {
    attach_to_path(&session.attach.path, &session.session_id, options).await
}

/// Attach to the server listening on `socket_path`.
pub async fn attach_to_path(
    socket_path: &Path,
    session_id: &str,
    options: &AttachOptions,
) -> AttachOutcome {
    let span = info_span!("attach", session_id, socket = %socket_path.display());
    async move {
        match tokio::time::timeout(
            options.timeout,
            run_handshake(socket_path, session_id, options),
        )
        .await
        {
            Ok(outcome) => {
                info!(ok = outcome.is_ok(), error = outcome.error(), "attach finished");
                outcome
            }
            Err(_) => {
                info!(timeout_ms = options.timeout.as_millis(), "attach timed out");
                AttachOutcome::Failed(AttachFailure::Timeout)
            }
        }
    }
    .instrument(span)
    .await
}

async fn run_handshake(
    socket_path: &Path,
    session_id: &str,
    options: &AttachOptions,
) -> AttachOutcome {
    let stream = match connect(socket_path).await {
        Ok(stream) => stream,
        Err(message) => return transport_failure(message),
    };
    let (reader, mut writer) = stream.split();
    let mut lines = FramedRead::new(reader, AttachCodec::new());

    let request = AttachMessage::AttachRequest {
        protocol_version: options.protocol_version.clone(),
        session_id: session_id.to_owned(),
        client_fp: options.identity.fingerprint.clone(),
        client_pubkey: options.identity.public_key.clone(),
    };
    if let Err(err) = write_message(&mut writer, &request).await {
        return transport_failure(err.to_string());
    }

    loop {
        let line = match lines.next().await {
            None => return transport_failure("connection closed before handshake completed"),
            Some(Err(err)) => return transport_failure(err.to_string()),
            Some(Ok(line)) => line,
        };
        let Some(message) = AttachMessage::parse_line(&line) else {
            debug!(len = line.len(), "discarding malformed line");
            continue;
        };

        match message {
            AttachMessage::AttachChallenge { nonce, .. } => {
                let proof = AttachMessage::AttachProof {
                    session_id: session_id.to_owned(),
                    signed_nonce: options.signer.sign(&nonce),
                };
                if let Err(err) = write_message(&mut writer, &proof).await {
                    return transport_failure(err.to_string());
                }
            }
            AttachMessage::AttachOk { server_info, .. } => {
                return AttachOutcome::Attached(server_info);
            }
            AttachMessage::AttachError { code, message, .. } => {
                return AttachOutcome::Failed(AttachFailure::Rejected {
                    code,
                    message: (!message.is_empty()).then_some(message),
                });
            }
            other @ (AttachMessage::AttachRequest { .. } | AttachMessage::AttachProof { .. }) => {
                debug!(kind = other.kind(), "ignoring server-bound message from server");
            }
        }
    }
}

async fn connect(socket_path: &Path) -> Result<Stream, String> {
    let name = socket_path
        .to_fs_name::<GenericFilePath>()
        .map_err(|err| format!("invalid socket path {}: {err}", socket_path.display()))?;
    Stream::connect(name)
        .await
        .map_err(|err| format!("failed to connect to {}: {err}", socket_path.display()))
}

fn transport_failure(message: impl Into<String>) -> AttachOutcome {
    AttachOutcome::Failed(AttachFailure::Transport(message.into()))
}

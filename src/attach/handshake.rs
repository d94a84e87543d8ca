//! Server side of the attach handshake, one instance per connection.
//!
//! ```text
//! AwaitRequest ──attach_request──▶ ChallengeSent ──attach_proof──▶ Authorized
//!      │                               │
//!      └──────── any violation ────────┴──────────▶ Failed
//! ```
//!
//! [`ServerHandshake`] performs no I/O: the server feeds it decoded
//! messages and writes whatever reply it returns. All per-connection state
//! (pending nonce, authorized flag, client identity) lives here and is never
//! shared between connections; the [`HandshakeContext`] is read-only.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::auth::{generate_nonce, SessionAuthToken};
use super::consent::{ConsentDecision, ConsentPolicy, ConsentRequest};
use super::protocol::{AttachErrorCode, AttachMessage, ServerInfo};
use super::verify::{ProofContext, ProofVerifier};

/// Read-only material shared by every connection of one server.
pub struct HandshakeContext {
    /// Session this server fronts.
    pub session_id: String,
    /// Protocol version clients must match exactly.
    pub protocol_version: String,
    /// In-memory session secret.
    pub secret: SessionAuthToken,
    /// Consent decision hook.
    pub consent: Arc<dyn ConsentPolicy>,
    /// Proof verification hook.
    pub verifier: Arc<dyn ProofVerifier>,
    /// Returned in `attach_ok`.
    pub server_info: ServerInfo,
}

impl std::fmt::Debug for HandshakeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeContext")
            .field("session_id", &self.session_id)
            .field("protocol_version", &self.protocol_version)
            .field("server_info", &self.server_info)
            .finish_non_exhaustive()
    }
}

/// Handshake phase of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Waiting for `attach_request`.
    AwaitRequest,
    /// Challenge issued, waiting for `attach_proof`.
    ChallengeSent,
    /// Terminal success.
    Authorized,
    /// Terminal failure; an `attach_error` was emitted.
    Failed,
}

/// Per-connection handshake state machine.
///
/// Feed every decoded inbound message to [`handle`](Self::handle) and send
/// back the reply it returns. Stop reading once
/// [`is_finished`](Self::is_finished) reports a terminal phase.
///
/// # Transitions
///
/// | Phase | Input | Reply | Next phase |
/// |---|---|---|---|
/// | `AwaitRequest` | `attach_request`, version mismatch | `attach_error{incompatible}` | `Failed` |
/// | `AwaitRequest` | `attach_request`, consent denied | `attach_error{unauthorized}` | `Failed` |
/// | `AwaitRequest` | `attach_request` | `attach_challenge` | `ChallengeSent` |
/// | `AwaitRequest` | `attach_proof` | `attach_error{no_challenge}` | `Failed` |
/// | `ChallengeSent` | `attach_proof`, verifier rejects | `attach_error{invalid_proof}` | `Failed` |
/// | `ChallengeSent` | `attach_proof` | `attach_ok` | `Authorized` |
/// | `ChallengeSent` | second `attach_request` | `attach_error{unexpected_message}` | `Failed` |
/// | any live phase | a server-to-client kind | `attach_error{unexpected_message}` | `Failed` |
/// | terminal | anything | none | unchanged |
///
/// The version check runs before consent, so an incompatible client is
/// never shown to the consent hook.
///
/// # Examples
///
/// ```rust,ignore
/// let mut handshake = ServerHandshake::new(Arc::clone(&context));
/// while !handshake.is_finished() {
///     let Some(message) = next_message().await else { break };
///     if let Some(reply) = handshake.handle(message).await {
///         write_message(&mut writer, &reply).await?;
///     }
/// }
/// ```
#[derive(Debug)]
pub struct ServerHandshake {
    ctx: Arc<HandshakeContext>,
    phase: HandshakePhase,
    nonce: Option<String>,
    authorized: bool,
    client_fp: Option<String>,
    client_pubkey: Option<String>,
}

impl ServerHandshake {
    /// Fresh state in [`HandshakePhase::AwaitRequest`].
    #[must_use]
    pub fn new(ctx: Arc<HandshakeContext>) -> Self {
        Self {
            ctx,
            phase: HandshakePhase::AwaitRequest,
            nonce: None,
            authorized: false,
            client_fp: None,
            client_pubkey: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// `true` once a valid proof was accepted.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    /// `true` in either terminal phase.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            HandshakePhase::Authorized | HandshakePhase::Failed
        )
    }

    /// Fingerprint from the accepted request, if any.
    #[must_use]
    pub fn client_fp(&self) -> Option<&str> {
        self.client_fp.as_deref()
    }

    /// `true` while a challenge nonce is outstanding.
    #[must_use]
    pub fn has_pending_nonce(&self) -> bool {
        self.nonce.is_some()
    }

    /// Advance the state machine with one inbound message.
    ///
    /// Returns the reply to send, or `None` once the handshake has already
    /// reached a terminal phase (further input is ignored).
    pub async fn handle(&mut self, message: AttachMessage) -> Option<AttachMessage> {
        if self.is_finished() {
            debug!(kind = message.kind(), "ignoring message after handshake end");
            return None;
        }

        let reply = match message {
            AttachMessage::AttachRequest {
                protocol_version,
                session_id,
                client_fp,
                client_pubkey,
            } => {
                self.on_request(&protocol_version, &session_id, client_fp, client_pubkey)
                    .await
            }
            AttachMessage::AttachProof { signed_nonce, .. } => self.on_proof(&signed_nonce),
            other @ (AttachMessage::AttachChallenge { .. }
            | AttachMessage::AttachOk { .. }
            | AttachMessage::AttachError { .. }) => self.fail(
                AttachErrorCode::UnexpectedMessage,
                format!("{} is not a client message", other.kind()),
            ),
        };
        Some(reply)
    }

    async fn on_request(
        &mut self,
        protocol_version: &str,
        requested_session: &str,
        client_fp: String,
        client_pubkey: String,
    ) -> AttachMessage {
        if protocol_version != self.ctx.protocol_version {
            return self.fail(
                AttachErrorCode::Incompatible,
                format!(
                    "client protocol {protocol_version} does not match server protocol {}",
                    self.ctx.protocol_version
                ),
            );
        }

        if self.phase != HandshakePhase::AwaitRequest {
            return self.fail(
                AttachErrorCode::UnexpectedMessage,
                "attach_request already received",
            );
        }

        if !requested_session.is_empty() && requested_session != self.ctx.session_id {
            warn!(
                requested_session,
                session_id = %self.ctx.session_id,
                "attach_request names a different session"
            );
        }

        let consent_request = ConsentRequest {
            session_id: self.ctx.session_id.clone(),
            client_fp: client_fp.clone(),
        };
        let decision = self.ctx.consent.decide(&consent_request).await;
        if decision == ConsentDecision::Deny {
            info!(client_fp = %client_fp, "attach denied by consent policy");
            return self.fail(AttachErrorCode::Unauthorized, "attach denied");
        }

        let nonce = generate_nonce();
        let encrypted_auth_token = self.ctx.secret.derive_client_token(&client_fp);
        self.nonce = Some(nonce.clone());
        self.client_fp = Some(client_fp);
        self.client_pubkey = Some(client_pubkey);
        self.phase = HandshakePhase::ChallengeSent;
        debug!(?decision, "challenge issued");

        AttachMessage::AttachChallenge {
            session_id: self.ctx.session_id.clone(),
            nonce,
            encrypted_auth_token,
        }
    }

    fn on_proof(&mut self, signed_nonce: &str) -> AttachMessage {
        let Some(nonce) = self.nonce.take() else {
            return self.fail(
                AttachErrorCode::NoChallenge,
                "attach_proof received before a challenge was issued",
            );
        };

        let proof = ProofContext {
            session_id: &self.ctx.session_id,
            client_fp: self.client_fp.as_deref().unwrap_or_default(),
            client_pubkey: self.client_pubkey.as_deref().unwrap_or_default(),
            nonce: &nonce,
            signed_nonce,
        };
        if !self.ctx.verifier.verify(&proof) {
            return self.fail(AttachErrorCode::InvalidProof, "proof verification failed");
        }

        self.phase = HandshakePhase::Authorized;
        self.authorized = true;
        info!(client_fp = self.client_fp.as_deref().unwrap_or_default(), "client attached");

        AttachMessage::AttachOk {
            session_id: self.ctx.session_id.clone(),
            server_info: self.ctx.server_info.clone(),
        }
    }

    fn fail(&mut self, code: AttachErrorCode, message: impl Into<String>) -> AttachMessage {
        let message = message.into();
        warn!(%code, %message, "attach handshake failed");
        self.phase = HandshakePhase::Failed;
        self.nonce = None;
        AttachMessage::error(&self.ctx.session_id, code, message)
    }
}

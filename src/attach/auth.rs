//! Session secret, challenge nonces and client identity.
//!
//! The [`SessionAuthToken`] is generated once per session and lives only in
//! process memory. It deliberately implements neither `Serialize` nor
//! `Display`, and its `Debug` output is redacted, so it cannot end up in a
//! descriptor file or a log line by accident.

use std::fmt::{Debug, Formatter};

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of challenge nonces in bytes.
pub const NONCE_LEN: usize = 32;

const TOKEN_LEN: usize = 32;

/// Per-session secret used to derive client-bound tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionAuthToken(String);

impl SessionAuthToken {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_hex(TOKEN_LEN))
    }

    /// Wrap an existing secret (tests, embedding hosts).
    #[must_use]
    pub fn from_secret(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Token bound to `client_fp`, sent as `encrypted_auth_token`.
    ///
    /// SHA-256 over the secret and the fingerprint. This is a placeholder
    /// binding, not encryption: a client cannot recover the secret from it,
    /// but nothing stops a client from replaying it either.
    #[must_use]
    pub fn derive_client_token(&self, client_fp: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hasher.update(b":");
        hasher.update(client_fp.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl Debug for SessionAuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionAuthToken(<redacted>)")
    }
}

/// Fresh hex-encoded [`NONCE_LEN`]-byte nonce from the OS CSPRNG.
#[must_use]
pub fn generate_nonce() -> String {
    random_hex(NONCE_LEN)
}

/// Identity a client presents in `attach_request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Opaque identifier used for consent decisions.
    pub fingerprint: String,
    /// Public key sent alongside the fingerprint.
    pub public_key: String,
}

impl ClientIdentity {
    /// Identity from an explicit key; the fingerprint is derived from it.
    #[must_use]
    pub fn from_public_key(public_key: impl Into<String>) -> Self {
        let public_key = public_key.into();
        Self {
            fingerprint: fingerprint_of(&public_key),
            public_key,
        }
    }

    /// Throwaway identity with a random placeholder key.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self::from_public_key(format!("placeholder-{}", uuid::Uuid::new_v4()))
    }
}

/// Short fingerprint of a public key: first 16 bytes of its SHA-256, hex.
#[must_use]
pub fn fingerprint_of(public_key: &str) -> String {
    let digest = Sha256::digest(public_key.as_bytes());
    hex::encode(&digest[..16])
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0_u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

//! Proof signing (client) and verification (server).
//!
//! The handshake's proof step is a seam: the shipped implementations are
//! placeholders ([`PlaceholderSigner`] echoes the nonce, [`AcceptAnyProof`]
//! accepts anything) and a host that needs real authentication plugs in a
//! signature scheme through these traits.

use tracing::warn;

/// Everything the server knows when checking a proof.
#[derive(Debug, Clone, Copy)]
pub struct ProofContext<'a> {
    /// Session being attached to.
    pub session_id: &'a str,
    /// Fingerprint from the request.
    pub client_fp: &'a str,
    /// Public key from the request.
    pub client_pubkey: &'a str,
    /// Nonce issued in the challenge.
    pub nonce: &'a str,
    /// Proof sent by the client.
    pub signed_nonce: &'a str,
}

/// Server-side proof check.
pub trait ProofVerifier: Send + Sync {
    /// `true` if `proof` is acceptable.
    fn verify(&self, proof: &ProofContext<'_>) -> bool;
}

/// Client-side proof computation.
pub trait ProofSigner: Send + Sync {
    /// Compute `signed_nonce` for the challenge `nonce`.
    fn sign(&self, nonce: &str) -> String;
}

/// Accepts every proof. Provides no authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAnyProof;

impl ProofVerifier for AcceptAnyProof {
    fn verify(&self, proof: &ProofContext<'_>) -> bool {
        if proof.signed_nonce.is_empty() {
            warn!(client_fp = proof.client_fp, "accepting empty proof");
        }
        true
    }
}

/// Returns the nonce unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderSigner;

impl ProofSigner for PlaceholderSigner {
    fn sign(&self, nonce: &str) -> String {
        nonce.to_owned()
    }
}

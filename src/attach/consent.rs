//! Pluggable consent decision for incoming attach requests.
//!
//! The attach server asks a [`ConsentPolicy`] before issuing a challenge.
//! A [`ConsentDecision::Deny`] ends the handshake with `unauthorized`; any
//! other decision lets it proceed. Policies may be asynchronous so a host
//! can prompt its user.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use tracing::debug;

/// Outcome of a consent check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    /// Attach may proceed.
    Allow,
    /// Attach is refused.
    Deny,
    /// The policy has no opinion; the handshake proceeds.
    Undecided,
}

/// Inputs available to a consent decision.
#[derive(Debug, Clone)]
pub struct ConsentRequest {
    /// Session being attached to.
    pub session_id: String,
    /// Fingerprint presented by the client.
    pub client_fp: String,
}

/// Decides whether a client may attach.
pub trait ConsentPolicy: Send + Sync {
    /// Decide on `request`.
    fn decide<'a>(
        &'a self,
        request: &'a ConsentRequest,
    ) -> Pin<Box<dyn Future<Output = ConsentDecision> + Send + 'a>>;
}

/// Allows every client.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl ConsentPolicy for AllowAll {
    fn decide<'a>(
        &'a self,
        _request: &'a ConsentRequest,
    ) -> Pin<Box<dyn Future<Output = ConsentDecision> + Send + 'a>> {
        Box::pin(async { ConsentDecision::Allow })
    }
}

/// Denies every client.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl ConsentPolicy for DenyAll {
    fn decide<'a>(
        &'a self,
        _request: &'a ConsentRequest,
    ) -> Pin<Box<dyn Future<Output = ConsentDecision> + Send + 'a>> {
        Box::pin(async { ConsentDecision::Deny })
    }
}

/// Allows only a fixed set of fingerprints.
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    fingerprints: HashSet<String>,
}

impl AllowList {
    /// Build from an iterator of fingerprints.
    #[must_use]
    pub fn new<I, S>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fingerprints: fingerprints.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConsentPolicy for AllowList {
    fn decide<'a>(
        &'a self,
        request: &'a ConsentRequest,
    ) -> Pin<Box<dyn Future<Output = ConsentDecision> + Send + 'a>> {
        Box::pin(async move {
            if self.fingerprints.contains(&request.client_fp) {
                ConsentDecision::Allow
            } else {
                debug!(client_fp = %request.client_fp, "fingerprint not on allow list");
                ConsentDecision::Deny
            }
        })
    }
}

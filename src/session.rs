//! Session host: one discoverable, attachable session.
//!
//! Binds the attach server first, then publishes the descriptor, so the
//! advertised socket is listening by the time any scanner can see it.
//! Shutdown runs in the opposite order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::attach::auth::SessionAuthToken;
use crate::attach::consent::ConsentPolicy;
use crate::attach::handshake::HandshakeContext;
use crate::attach::protocol::{ServerInfo, PROTOCOL_VERSION};
use crate::attach::server::{
    spawn_attach_server, AttachServerConfig, AttachServerHandle, AttachedClient,
};
use crate::attach::verify::{AcceptAnyProof, ProofVerifier};
use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::models::descriptor::SessionStatus;
use crate::paths::{self, validate_session_id};
use crate::registry::publisher::{self, PublisherConfig, PublisherHandle};
use crate::Result;

/// Everything needed to start a [`SessionHost`].
pub struct SessionOptions {
    /// Session id; a random UUID is generated when absent.
    pub session_id: Option<String>,
    /// Registry directory.
    pub registry_dir: PathBuf,
    /// Socket base directory.
    pub socket_dir: PathBuf,
    /// Base publisher settings; ids, paths and token are filled in by the host.
    pub publisher: PublisherConfig,
    /// Consent hook for incoming attach requests.
    pub consent: Arc<dyn ConsentPolicy>,
    /// Proof verification hook.
    pub verifier: Arc<dyn ProofVerifier>,
    /// Receives authorized connections.
    pub attached_tx: Option<mpsc::Sender<AttachedClient>>,
}

impl SessionOptions {
    /// Options derived from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        let registry_dir = config.registry_dir();
        let socket_dir = config.socket_dir();
        let mut publisher = PublisherConfig::new(&registry_dir, &socket_dir);
        publisher.display_name.clone_from(&config.display_name);
        publisher.origin = config.origin;
        publisher.require_user_confirm_on_first_attach =
            config.security.require_user_confirm_on_first_attach;
        publisher.heartbeat_interval = config.heartbeat_interval();

        Self {
            session_id: None,
            registry_dir,
            socket_dir,
            publisher,
            consent: config.security.consent_policy(),
            verifier: Arc::new(AcceptAnyProof),
            attached_tx: None,
        }
    }

    /// Replace the timestamp source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.publisher.clock = clock;
        self
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("session_id", &self.session_id)
            .field("registry_dir", &self.registry_dir)
            .field("socket_dir", &self.socket_dir)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

/// A running session: attach server plus heartbeat publisher.
#[derive(Debug)]
pub struct SessionHost {
    server: AttachServerHandle,
    publisher: PublisherHandle,
}

impl SessionHost {
    /// Bind the attach socket and publish the session.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an unusable session id,
    /// `AppError::Transport` if the socket cannot be bound, and
    /// `AppError::Registry`/`AppError::Io` if the descriptor cannot be
    /// published. A server that was already bound is closed again.
    pub async fn start(options: SessionOptions) -> Result<Self> {
        let SessionOptions {
            session_id,
            registry_dir,
            socket_dir,
            publisher: mut publisher_config,
            consent,
            verifier,
            attached_tx,
        } = options;

        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        validate_session_id(&session_id)?;
        let socket_path = publisher_config
            .socket_path
            .clone()
            .unwrap_or_else(|| paths::socket_path(&socket_dir, &session_id));
        let token = SessionAuthToken::generate();

        let context = Arc::new(HandshakeContext {
            session_id: session_id.clone(),
            protocol_version: PROTOCOL_VERSION.to_owned(),
            secret: token.clone(),
            consent,
            verifier,
            server_info: ServerInfo::current(),
        });
        let mut server = spawn_attach_server(AttachServerConfig {
            socket_path: socket_path.clone(),
            context,
            attached_tx,
        })?;

        publisher_config.registry_dir = registry_dir;
        publisher_config.socket_dir = socket_dir;
        publisher_config.socket_path = Some(socket_path);
        publisher_config.session_id = Some(session_id);
        publisher_config.token = Some(token);

        let publisher = match publisher::start(publisher_config) {
            Ok(handle) => handle,
            Err(err) => {
                server.close().await;
                return Err(err);
            }
        };

        info!(session_id = %publisher.session_id(), "session host started");
        Ok(Self { server, publisher })
    }

    /// Start with options derived from `config`.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn start_from_config(
        config: &GlobalConfig,
        session_id: Option<String>,
    ) -> Result<Self> {
        let mut options = SessionOptions::from_config(config);
        options.session_id = session_id;
        Self::start(options).await
    }

    /// Session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.publisher.session_id()
    }

    /// Attach socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        self.publisher.socket_path()
    }

    /// Descriptor file path.
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.publisher.descriptor_path()
    }

    /// Heartbeat publisher.
    #[must_use]
    pub fn publisher(&self) -> &PublisherHandle {
        &self.publisher
    }

    /// Change the advertised status.
    pub fn set_status(&self, status: SessionStatus) {
        self.publisher.set_status(status);
    }

    /// `true` once [`stop`](Self::stop) has completed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.server.is_closed() && self.publisher.is_stopped()
    }

    /// Advertise `stopping`, close the attach server, then withdraw the
    /// descriptor. Idempotent.
    pub async fn stop(&mut self) {
        if self.is_stopped() {
            return;
        }
        if !self.publisher.is_stopped() {
            self.publisher.set_status(SessionStatus::Stopping);
        }
        self.server.close().await;
        self.publisher.stop().await;
        if self.publisher.failed_writes() > 0 {
            warn!(
                failed = self.publisher.failed_writes(),
                "session stopped after failed heartbeat writes"
            );
        }
        info!(session_id = %self.publisher.session_id(), "session host stopped");
    }
}

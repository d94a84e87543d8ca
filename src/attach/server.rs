//! Attach server: accepts connections on a session's socket path and runs
//! one [`ServerHandshake`] per connection.
//!
//! Listens on a filesystem-domain socket through the `interprocess` crate.
//! Inbound bytes are framed by [`AttachCodec`]; lines that are not valid
//! handshake messages are dropped without closing the connection. After a
//! terminal `attach_error` the connection is closed. After `attach_ok` the
//! connection is handed to the session over an optional channel, or held
//! open until the peer disconnects.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use interprocess::local_socket::tokio::{RecvHalf, SendHalf, Stream};
use interprocess::local_socket::{tokio::prelude::*, GenericFilePath, ListenerOptions, ToFsName};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::codec::{write_message, AttachCodec};
use super::handshake::{HandshakeContext, ServerHandshake};
use super::protocol::AttachMessage;
use crate::paths::{ensure_private_dir, set_owner_only};
use crate::{AppError, Result};

/// Connection that completed the handshake, handed to the owning session.
pub struct AttachedClient {
    /// Session the client attached to.
    pub session_id: String,
    /// Fingerprint the client presented.
    pub client_fp: String,
    /// Framed inbound half; may already hold buffered bytes.
    pub reader: FramedRead<RecvHalf, AttachCodec>,
    /// Outbound half.
    pub writer: SendHalf,
}

impl std::fmt::Debug for AttachedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedClient")
            .field("session_id", &self.session_id)
            .field("client_fp", &self.client_fp)
            .finish_non_exhaustive()
    }
}

/// Settings for [`spawn_attach_server`].
pub struct AttachServerConfig {
    /// Socket path to bind.
    pub socket_path: PathBuf,
    /// Shared handshake material.
    pub context: Arc<HandshakeContext>,
    /// Receives authorized connections; `None` holds them until EOF.
    pub attached_tx: Option<mpsc::Sender<AttachedClient>>,
}

/// Owned handle to a running attach server.
///
/// [`close`](Self::close) stops accepting, tears down in-flight handshakes
/// and removes the socket file. Dropping the handle without closing it
/// stops the accept loop but skips the explicit cleanup.
#[derive(Debug)]
pub struct AttachServerHandle {
    socket_path: PathBuf,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AttachServerHandle {
    /// Bound socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// `true` after [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Stop the server. Safe to call any number of times.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(err) = task.await {
            warn!(%err, "attach server task ended abnormally");
        }
        if let Err(err) = remove_socket_file(&self.socket_path) {
            warn!(%err, "failed to remove attach socket");
        }
        info!(socket = %self.socket_path.display(), "attach server closed");
    }
}

impl Drop for AttachServerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Bind the socket and spawn the accept loop.
///
/// Creates the socket directory owner-only, removes a stale socket file
/// left at the same path by a crashed process, binds, and restricts the new
/// socket to the owner. Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory cannot be prepared and
/// `AppError::Transport` if the stale file cannot be removed or the
/// listener cannot be bound.
pub fn spawn_attach_server(config: AttachServerConfig) -> Result<AttachServerHandle> {
    let AttachServerConfig {
        socket_path,
        context,
        attached_tx,
    } = config;

    if let Some(parent) = socket_path.parent() {
        ensure_private_dir(parent)?;
    }
    remove_socket_file(&socket_path)?;

    let name = socket_path
        .as_path()
        .to_fs_name::<GenericFilePath>()
        .map_err(|err| {
            AppError::Transport(format!(
                "invalid socket path {}: {err}",
                socket_path.display()
            ))
        })?;
    let listener = ListenerOptions::new()
        .name(name)
        .create_tokio()
        .map_err(|err| {
            AppError::Transport(format!(
                "failed to bind attach socket {}: {err}",
                socket_path.display()
            ))
        })?;
    set_owner_only(&socket_path, 0o600)?;

    info!(
        socket = %socket_path.display(),
        session_id = %context.session_id,
        "attach server listening"
    );

    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let span = info_span!("attach_server", session_id = %context.session_id);
    let task = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = loop_cancel.cancelled() => {
                        debug!("attach server shutting down");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok(stream) => {
                            tokio::spawn(handle_connection(
                                stream,
                                Arc::clone(&context),
                                attached_tx.clone(),
                                loop_cancel.child_token(),
                            ));
                        }
                        Err(err) => warn!(%err, "attach accept failed"),
                    },
                }
            }
        }
        .instrument(span),
    );

    Ok(AttachServerHandle {
        socket_path,
        cancel,
        task: Some(task),
    })
}

/// Drive one connection through the handshake.
async fn handle_connection(
    stream: Stream,
    context: Arc<HandshakeContext>,
    attached_tx: Option<mpsc::Sender<AttachedClient>>,
    cancel: CancellationToken,
) {
    let span = info_span!("attach_conn");
    async move {
        let session_id = context.session_id.clone();
        let (reader, mut writer) = stream.split();
        let mut lines = FramedRead::new(reader, AttachCodec::new());
        let mut handshake = ServerHandshake::new(context);

        while !handshake.is_finished() {
            let next = tokio::select! {
                () = cancel.cancelled() => return,
                next = lines.next() => next,
            };
            let line = match next {
                None => {
                    debug!("peer closed before handshake finished");
                    return;
                }
                Some(Err(err)) => {
                    warn!(%err, "attach read failed");
                    return;
                }
                Some(Ok(line)) => line,
            };

            let Some(message) = AttachMessage::parse_line(&line) else {
                debug!(len = line.len(), "discarding malformed line");
                continue;
            };
            debug!(kind = message.kind(), "handshake message received");

            if let Some(reply) = handshake.handle(message).await {
                if let Err(err) = write_message(&mut writer, &reply).await {
                    warn!(%err, "attach write failed");
                    return;
                }
            }
        }

        if !handshake.is_authorized() {
            return;
        }
        let client_fp = handshake.client_fp().unwrap_or_default().to_owned();

        match attached_tx {
            Some(tx) => {
                let client = AttachedClient {
                    session_id,
                    client_fp,
                    reader: lines,
                    writer,
                };
                if tx.send(client).await.is_err() {
                    debug!("attached-client receiver dropped; closing connection");
                }
            }
            None => {
                // Hold the connection open until the peer goes away.
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        next = lines.next() => match next {
                            Some(Ok(_)) => {}
                            Some(Err(_)) | None => break,
                        },
                    }
                }
                debug!(%client_fp, "attached client disconnected");
            }
        }
    }
    .instrument(span)
    .await;
}

/// Remove a socket file, treating an already-missing file as success.
fn remove_socket_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed socket file");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Transport(format!(
            "failed to remove socket {}: {err}",
            path.display()
        ))),
    }
}

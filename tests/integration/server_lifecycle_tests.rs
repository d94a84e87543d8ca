//! Integration tests for attach server bind and shutdown behavior.

use std::time::Duration;

use agent_beacon::attach::client::{attach_to_path, AttachOptions};

use super::test_helpers::{layout, start_open_server, RawClient};

#[tokio::test]
async fn stale_socket_file_is_replaced() {
    let l = layout();
    std::fs::create_dir_all(&l.socket_dir).unwrap();
    let socket = l.socket_dir.join("stale.sock");
    std::fs::write(&socket, b"left over by a crash").unwrap();

    let mut server = start_open_server(&socket);
    assert!(attach_to_path(&socket, "sess-it", &AttachOptions::default())
        .await
        .is_ok());
    server.close().await;
}

#[cfg(unix)]
#[tokio::test]
async fn socket_and_directory_are_owner_only() {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    let l = layout();
    let socket = l.socket_dir.join("perm.sock");
    let mut server = start_open_server(&socket);

    let meta = std::fs::symlink_metadata(&socket).unwrap();
    assert!(meta.file_type().is_socket());
    assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    let dir_mode = std::fs::metadata(&l.socket_dir).unwrap().permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);
    server.close().await;
}

#[tokio::test]
async fn close_is_idempotent_and_removes_socket() {
    let l = layout();
    let socket = l.socket_dir.join("close.sock");
    let mut server = start_open_server(&socket);
    assert_eq!(server.socket_path(), socket.as_path());
    assert!(!server.is_closed());

    server.close().await;
    assert!(server.is_closed());
    assert!(!socket.exists());

    server.close().await;
    assert!(server.is_closed());

    let outcome = attach_to_path(&socket, "sess-it", &AttachOptions::default()).await;
    assert_eq!(outcome.error(), Some("transport"));
}

#[tokio::test]
async fn close_tears_down_in_flight_handshakes() {
    let l = layout();
    let socket = l.socket_dir.join("inflight.sock");
    let mut server = start_open_server(&socket);

    let mut raw = RawClient::connect(&socket).await;
    // Let the accept loop pick the connection up.
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.close().await;
    assert_eq!(raw.recv_line().await, None);
}

#[tokio::test]
async fn close_tolerates_externally_removed_socket() {
    let l = layout();
    let socket = l.socket_dir.join("gone.sock");
    let mut server = start_open_server(&socket);
    std::fs::remove_file(&socket).unwrap();

    server.close().await;
    assert!(server.is_closed());
}

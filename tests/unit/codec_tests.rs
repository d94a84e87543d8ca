//! Unit tests for newline framing of attach connections.

use agent_beacon::attach::codec::{write_message, AttachCodec, MAX_LINE_BYTES};
use agent_beacon::attach::protocol::{AttachMessage, PROTOCOL_VERSION};
use agent_beacon::AppError;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = AttachCodec::new();
    let mut buf = BytesMut::from(&b"{\"type\":\"attach_"[..]);

    assert_eq!(codec.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b"proof\",\"signed_nonce\":\"n\"}\n");
    let line = codec.decode(&mut buf).unwrap().expect("complete line");
    assert_eq!(&line[..], br#"{"type":"attach_proof","signed_nonce":"n"}"#);
    assert!(buf.is_empty());
}

#[test]
fn several_lines_in_one_read_decode_in_order() {
    let mut codec = AttachCodec::new();
    let mut buf = BytesMut::from(&b"one\ntwo\nthr"[..]);

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"one"[..]));
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"two"[..]));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b"ee\n");
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"three"[..]));
}

#[test]
fn crlf_terminator_is_stripped() {
    let mut codec = AttachCodec::new();
    let mut buf = BytesMut::from(&b"hello\r\n"[..]);
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"hello"[..]));
}

#[test]
fn invalid_utf8_is_framed_not_rejected() {
    let mut codec = AttachCodec::new();
    let mut buf = BytesMut::from(&b"\xff\xfe garbage\n{}\n"[..]);

    let line = codec.decode(&mut buf).unwrap().expect("raw line");
    assert_eq!(&line[..], b"\xff\xfe garbage");
    assert_eq!(AttachMessage::parse_line(&line), None);
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"{}"[..]));
}

#[test]
fn trailing_fragment_is_yielded_at_eof() {
    let mut codec = AttachCodec::new();
    let mut buf = BytesMut::from(&b"tail"[..]);
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
    assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some(&b"tail"[..]));
}

#[test]
fn oversized_line_is_a_transport_error() {
    let mut codec = AttachCodec::with_max_length(16);
    let mut buf = BytesMut::from(&[b'x'; 32][..]);

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, AppError::Transport(_)));
    assert!(err.to_string().contains("16 bytes"));
}

#[test]
fn default_limit_is_64_kib() {
    assert_eq!(MAX_LINE_BYTES, 65_536);
}

#[tokio::test]
async fn write_message_emits_one_terminated_line() {
    let message = AttachMessage::AttachRequest {
        protocol_version: PROTOCOL_VERSION.to_owned(),
        session_id: "s1".into(),
        client_fp: "fp".into(),
        client_pubkey: "pk".into(),
    };
    let mut out: Vec<u8> = Vec::new();
    write_message(&mut out, &message).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with('\n'));
    assert_eq!(text.matches('\n').count(), 1);
    assert_eq!(AttachMessage::parse_line(&text), Some(message));
}

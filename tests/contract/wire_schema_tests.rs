//! Contract tests for the attach handshake wire format.
//!
//! Each message is a single-line JSON object discriminated by `type`; these
//! tests pin the exact field names both ends rely on.

use serde_json::{json, Value};

use agent_beacon::attach::client::{AttachFailure, AttachOutcome};
use agent_beacon::attach::protocol::{AttachErrorCode, AttachMessage, ServerInfo};

fn to_value(message: &AttachMessage) -> Value {
    serde_json::from_str(&message.to_line().unwrap()).unwrap()
}

#[test]
fn attach_request_shape() {
    let msg = AttachMessage::AttachRequest {
        protocol_version: "1.0".into(),
        session_id: "s".into(),
        client_fp: "fp".into(),
        client_pubkey: "pk".into(),
    };
    assert_eq!(
        to_value(&msg),
        json!({
            "type": "attach_request",
            "protocol_version": "1.0",
            "session_id": "s",
            "client_fp": "fp",
            "client_pubkey": "pk"
        })
    );
}

#[test]
fn attach_challenge_shape() {
    let msg = AttachMessage::AttachChallenge {
        session_id: "s".into(),
        nonce: "ab".into(),
        encrypted_auth_token: "tok".into(),
    };
    assert_eq!(
        to_value(&msg),
        json!({
            "type": "attach_challenge",
            "session_id": "s",
            "nonce": "ab",
            "encrypted_auth_token": "tok"
        })
    );
}

#[test]
fn attach_proof_shape() {
    let msg = AttachMessage::AttachProof {
        session_id: "s".into(),
        signed_nonce: "sig".into(),
    };
    assert_eq!(
        to_value(&msg),
        json!({"type": "attach_proof", "session_id": "s", "signed_nonce": "sig"})
    );
}

#[test]
fn attach_ok_shape() {
    let msg = AttachMessage::AttachOk {
        session_id: "s".into(),
        server_info: ServerInfo {
            pid: 7,
            version: "0.1.0".into(),
        },
    };
    assert_eq!(
        to_value(&msg),
        json!({
            "type": "attach_ok",
            "session_id": "s",
            "server_info": {"pid": 7, "version": "0.1.0"}
        })
    );
}

#[test]
fn attach_error_codes_are_snake_case() {
    let codes = [
        (AttachErrorCode::Incompatible, "incompatible"),
        (AttachErrorCode::Unauthorized, "unauthorized"),
        (AttachErrorCode::NoChallenge, "no_challenge"),
        (AttachErrorCode::InvalidProof, "invalid_proof"),
        (AttachErrorCode::UnexpectedMessage, "unexpected_message"),
    ];
    for (code, wire) in codes {
        let value = to_value(&AttachMessage::error("s", code, "why"));
        assert_eq!(
            value,
            json!({"type": "attach_error", "session_id": "s", "code": wire, "message": "why"})
        );
        assert_eq!(code.as_str(), wire);
    }
}

#[test]
fn to_line_is_single_line() {
    let msg = AttachMessage::error("s", AttachErrorCode::Incompatible, "multi\nline");
    assert!(!msg.to_line().unwrap().contains('\n'));
}

#[test]
fn parse_line_drops_malformed_input() {
    assert_eq!(AttachMessage::parse_line(""), None);
    assert_eq!(AttachMessage::parse_line("   "), None);
    assert_eq!(AttachMessage::parse_line("not json"), None);
    assert_eq!(AttachMessage::parse_line(r#"{"type":"attach_bogus"}"#), None);
    assert_eq!(AttachMessage::parse_line(r#"{"type":"attach_proof"}"#), None);
    assert_eq!(AttachMessage::parse_line("[1,2,3]"), None);
}

#[test]
fn parse_line_tolerates_missing_optional_fields_and_extras() {
    let parsed = AttachMessage::parse_line(
        r#"{"type":"attach_request","protocol_version":"1.0","client_fp":"fp","extra":true}"#,
    );
    assert_eq!(
        parsed,
        Some(AttachMessage::AttachRequest {
            protocol_version: "1.0".into(),
            session_id: String::new(),
            client_fp: "fp".into(),
            client_pubkey: String::new(),
        })
    );
}

#[test]
fn unknown_error_code_parses_as_unknown() {
    let parsed = AttachMessage::parse_line(r#"{"type":"attach_error","code":"rate_limited"}"#);
    assert!(matches!(
        parsed,
        Some(AttachMessage::AttachError {
            code: AttachErrorCode::Unknown,
            ..
        })
    ));
}

#[test]
fn outcome_report_shapes() {
    let ok = AttachOutcome::Attached(ServerInfo {
        pid: 3,
        version: "v".into(),
    });
    assert_eq!(
        ok.to_json(),
        json!({"ok": true, "info": {"pid": 3, "version": "v"}})
    );

    let timeout = AttachOutcome::Failed(AttachFailure::Timeout);
    assert_eq!(timeout.to_json(), json!({"ok": false, "error": "timeout"}));

    let rejected = AttachOutcome::Failed(AttachFailure::Rejected {
        code: AttachErrorCode::Incompatible,
        message: Some("version".into()),
    });
    assert_eq!(
        rejected.to_json(),
        json!({"ok": false, "error": "incompatible", "message": "version"})
    );

    let transport = AttachOutcome::Failed(AttachFailure::Transport("reset".into()));
    assert_eq!(
        transport.to_json(),
        json!({"ok": false, "error": "transport", "message": "reset"})
    );
}

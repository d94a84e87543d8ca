//! Unit tests for the session descriptor model and its liveness view.

use std::path::PathBuf;

use chrono::{Duration, TimeZone, Utc};

use agent_beacon::models::descriptor::{
    AttachTransport, DiscoveredSession, Origin, SessionDescriptor, SessionStatus,
};
use agent_beacon::models::parse_timestamp;

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

#[test]
fn new_descriptor_describes_current_process() {
    let d = SessionDescriptor::new("s1", "agent", Origin::Cli, PathBuf::from("/tmp/s1.sock"), t0());

    assert_eq!(d.pid, std::process::id());
    assert_eq!(d.protocol_version, "1.0");
    assert_eq!(d.status, SessionStatus::Running);
    assert_eq!(d.attach.transport, AttachTransport::UnixSocket);
    assert_eq!(d.start_time, Some(t0()));
    assert_eq!(d.heartbeat.last_heartbeat, Some(t0()));
    assert_eq!(d.heartbeat.interval_ms, 2000);
}

#[test]
fn age_is_elapsed_milliseconds() {
    let d = SessionDescriptor::new("s1", "agent", Origin::Cli, PathBuf::new(), t0());
    assert_eq!(d.age_ms(t0()), 0);
    assert_eq!(d.age_ms(t0() + Duration::milliseconds(2500)), 2500);
}

#[test]
fn future_heartbeat_counts_as_zero_age() {
    let d = SessionDescriptor::new("s1", "agent", Origin::Cli, PathBuf::new(), t0());
    assert_eq!(d.age_ms(t0() - Duration::seconds(10)), 0);
}

#[test]
fn missing_heartbeat_is_infinitely_old() {
    let d = SessionDescriptor::default();
    assert_eq!(d.age_ms(t0()), u64::MAX);
}

#[test]
fn healthy_iff_age_within_threshold() {
    let d = SessionDescriptor::new("s1", "agent", Origin::Cli, PathBuf::new(), t0());

    let at_limit =
        DiscoveredSession::classify(d.clone(), PathBuf::new(), t0() + Duration::seconds(6), 6000);
    assert!(at_limit.healthy);
    assert_eq!(at_limit.age_ms, 6000);

    let past_limit = DiscoveredSession::classify(
        d,
        PathBuf::new(),
        t0() + Duration::milliseconds(6001),
        6000,
    );
    assert!(!past_limit.healthy);
}

#[test]
fn partial_document_fills_defaults() {
    let raw = r#"{"session_id":"abc","heartbeat":{"last_heartbeat":"2025-06-01T12:00:00Z"}}"#;
    let d: SessionDescriptor = serde_json::from_str(raw).unwrap();

    assert_eq!(d.session_id, "abc");
    assert_eq!(d.pid, 0);
    assert_eq!(d.status, SessionStatus::Unknown);
    assert_eq!(d.heartbeat.last_heartbeat, Some(t0()));
}

#[test]
fn unparseable_timestamp_becomes_none_without_failing_record() {
    let raw = r#"{"session_id":"abc","start_time":"yesterday","heartbeat":{"last_heartbeat":"not a time"}}"#;
    let d: SessionDescriptor = serde_json::from_str(raw).unwrap();

    assert_eq!(d.session_id, "abc");
    assert_eq!(d.start_time, None);
    assert_eq!(d.heartbeat.last_heartbeat, None);
}

#[test]
fn epoch_millis_timestamp_is_accepted() {
    let millis = t0().timestamp_millis();
    let raw = format!(r#"{{"heartbeat":{{"last_heartbeat":{millis}}}}}"#);
    let d: SessionDescriptor = serde_json::from_str(&raw).unwrap();
    assert_eq!(d.heartbeat.last_heartbeat, Some(t0()));
}

#[test]
fn unknown_enum_values_do_not_fail() {
    let raw = r#"{"origin":"vscode","status":"hibernating","attach":{"transport":"tcp","path":"x"}}"#;
    let d: SessionDescriptor = serde_json::from_str(raw).unwrap();

    assert_eq!(d.origin, Origin::Other);
    assert_eq!(d.status, SessionStatus::Unknown);
    assert_eq!(d.attach.transport, AttachTransport::Unknown);
}

#[test]
fn parse_timestamp_rejects_other_json_types() {
    assert_eq!(parse_timestamp(&serde_json::json!(true)), None);
    assert_eq!(parse_timestamp(&serde_json::json!(null)), None);
    assert_eq!(parse_timestamp(&serde_json::json!({"t": 1})), None);
}

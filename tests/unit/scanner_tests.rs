//! Unit tests for registry discovery ranking and health classification.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use agent_beacon::clock::ManualClock;
use agent_beacon::models::descriptor::{Origin, SessionDescriptor};
use agent_beacon::registry::{discover, DescriptorStore};

const THRESHOLD: Duration = Duration::from_millis(6000);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn publish_at(store: &DescriptorStore, id: &str, heartbeat: DateTime<Utc>) {
    let d = SessionDescriptor::new(id, id, Origin::Cli, PathBuf::from(format!("/tmp/{id}.sock")), heartbeat);
    store.publish(&d).expect("publish");
}

#[test]
fn missing_directory_yields_no_sessions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(t0());
    let sessions = discover(&temp.path().join("nope"), THRESHOLD, &clock);
    assert!(sessions.is_empty());
}

#[test]
fn sessions_sorted_freshest_first() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = DescriptorStore::new(temp.path());
    publish_at(&store, "old", t0() - chrono::Duration::seconds(5));
    publish_at(&store, "new", t0() - chrono::Duration::seconds(1));
    publish_at(&store, "mid", t0() - chrono::Duration::seconds(3));

    let clock = ManualClock::new(t0());
    let ids: Vec<String> = discover(temp.path(), THRESHOLD, &clock)
        .iter()
        .map(|s| s.session_id().to_owned())
        .collect();
    assert_eq!(ids, ["new", "mid", "old"]);
}

#[test]
fn healthy_flag_tracks_threshold() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = DescriptorStore::new(temp.path());
    publish_at(&store, "fresh", t0());
    publish_at(&store, "stale", t0() - chrono::Duration::seconds(10));

    let clock = ManualClock::new(t0());
    let sessions = discover(temp.path(), THRESHOLD, &clock);
    assert_eq!(sessions.len(), 2);
    for s in &sessions {
        assert_eq!(s.healthy, s.age_ms <= 6000, "{}", s.session_id());
    }
    assert!(sessions[0].healthy);
    assert!(!sessions[1].healthy);
}

#[test]
fn advancing_clock_turns_session_stale() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = DescriptorStore::new(temp.path());
    publish_at(&store, "s1", t0());

    let clock = ManualClock::new(t0());
    assert!(discover(temp.path(), THRESHOLD, &clock)[0].healthy);

    clock.advance(chrono::Duration::milliseconds(6001));
    let sessions = discover(temp.path(), THRESHOLD, &clock);
    assert!(!sessions[0].healthy);
    assert_eq!(sessions[0].age_ms, 6001);
}

#[test]
fn malformed_file_participates_as_empty_record_sorted_last() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = DescriptorStore::new(temp.path());
    publish_at(&store, "good", t0());
    std::fs::write(temp.path().join("broken.json"), "{ not json").expect("write");

    let clock = ManualClock::new(t0());
    let sessions = discover(temp.path(), THRESHOLD, &clock);

    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].session_id(), "good");
    let broken = &sessions[1];
    assert_eq!(broken.session_id(), "");
    assert_eq!(broken.age_ms, u64::MAX);
    assert!(!broken.healthy);
    assert!(broken.source.ends_with("broken.json"));
}

#[test]
fn non_descriptor_files_are_ignored() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = DescriptorStore::new(temp.path());
    publish_at(&store, "only", t0());
    std::fs::write(temp.path().join("notes.txt"), "hello").expect("write");
    std::fs::write(temp.path().join(".partial.tmp"), "{").expect("write");
    std::fs::write(temp.path().join(".hidden.json"), "{}").expect("write");

    let clock = ManualClock::new(t0());
    let sessions = discover(temp.path(), THRESHOLD, &clock);
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id(), "only");
}

#[test]
fn equal_ages_keep_file_name_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = DescriptorStore::new(temp.path());
    publish_at(&store, "b", t0());
    publish_at(&store, "a", t0());
    publish_at(&store, "c", t0());

    let clock = ManualClock::new(t0());
    let ids: Vec<String> = discover(temp.path(), THRESHOLD, &clock)
        .iter()
        .map(|s| s.session_id().to_owned())
        .collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

// Integration tests for the SQLite snapshot ledger

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use timemachine_core::ledger::SnapshotLedger;
use timemachine_core::model::{BackendStatus, ManifestRef, SnapshotRecord, TextRef};
use timemachine_core::tag::parse_tag;
use timemachine_store::{db, SqliteLedger};

fn record(tag: &str, secs: i64) -> SnapshotRecord {
    SnapshotRecord {
        tag: parse_tag(tag).unwrap(),
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 250_000).unwrap(),
        reason: format!("reason for {}", tag),
        risk_level: "high".to_string(),
        text_ref: TextRef::new("a".repeat(40)),
        large_object_manifest_ref: ManifestRef::new("b".repeat(64)),
        backend_status: BackendStatus::BothCommitted,
    }
}

fn ledger() -> SqliteLedger {
    SqliteLedger::new(db::open_in_memory_migrated().unwrap())
}

#[test]
fn test_insert_and_get_preserves_every_field() {
    let ledger = ledger();
    let rec = record("stable/20240301-120000-abcd", 0);

    ledger.insert(&rec).unwrap();

    assert_eq!(ledger.get(&rec.tag).unwrap(), Some(rec.clone()));
    assert!(ledger.exists(&rec.tag).unwrap());
}

#[test]
fn test_get_unknown_tag_is_none() {
    let ledger = ledger();
    let tag = parse_tag("stable/20240301-120000-abcd").unwrap();
    assert_eq!(ledger.get(&tag).unwrap(), None);
    assert!(!ledger.exists(&tag).unwrap());
}

#[test]
fn test_duplicate_insert_fails() {
    let ledger = ledger();
    let rec = record("stable/20240301-120000-abcd", 0);
    ledger.insert(&rec).unwrap();

    let err = ledger.insert(&rec).unwrap_err();
    assert_eq!(err.code(), "ERR_PERSISTENCE");
}

#[test]
fn test_remove_drops_record_and_tolerates_absent_tag() {
    let ledger = ledger();
    let rec = record("stable/20240301-120000-abcd", 0);
    ledger.insert(&rec).unwrap();

    ledger.remove(&rec.tag).unwrap();
    assert!(!ledger.exists(&rec.tag).unwrap());
    ledger.remove(&rec.tag).unwrap();
    ledger.insert(&rec).unwrap();
}

#[test]
fn test_update_status() {
    let ledger = ledger();
    let rec = record("pre-change/20240301-120000-abcd", 0);
    ledger.insert(&rec).unwrap();

    ledger
        .update_status(&rec.tag, BackendStatus::Inconsistent)
        .unwrap();
    assert_eq!(
        ledger.get(&rec.tag).unwrap().unwrap().backend_status,
        BackendStatus::Inconsistent
    );

    let missing = parse_tag("pre-change/20240301-120001-abcd").unwrap();
    let err = ledger
        .update_status(&missing, BackendStatus::TextOnly)
        .unwrap_err();
    assert_eq!(err.code(), "ERR_UNKNOWN_VERSION");
}

#[test]
fn test_list_newest_first_with_category_filter() {
    let ledger = ledger();
    ledger.insert(&record("stable/20240301-120000-abcd", 0)).unwrap();
    ledger.insert(&record("experiment/20240301-120001-abcd", 1)).unwrap();
    ledger.insert(&record("stable/20240301-120002-abcd", 2)).unwrap();

    let all: Vec<String> = ledger
        .list(None)
        .unwrap()
        .into_iter()
        .map(|r| r.tag.to_string())
        .collect();
    assert_eq!(
        all,
        vec![
            "stable/20240301-120002-abcd",
            "experiment/20240301-120001-abcd",
            "stable/20240301-120000-abcd",
        ]
    );

    let stable = ledger.list(Some("stable")).unwrap();
    assert_eq!(stable.len(), 2);
    assert!(stable.iter().all(|r| r.tag.category() == "stable"));
    assert!(ledger.list(Some("pre-change")).unwrap().is_empty());
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");
    let rec = record("stable/20240301-120000-abcd", 0);
    {
        let ledger = SqliteLedger::new(db::open_migrated(&path).unwrap());
        ledger.insert(&rec).unwrap();
    }

    let reopened = SqliteLedger::new(db::open_migrated(&path).unwrap());
    assert_eq!(reopened.get(&rec.tag).unwrap(), Some(rec));
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use timemachine_core::errors::{ExError, ExErrorKind, TimeMachineError};
use timemachine_core::model::{BackendStatus, CheckResult, ManifestRef, SnapshotRecord, TextRef, VerificationResult};
use timemachine_core::tag::parse_tag;

fn record() -> SnapshotRecord {
    SnapshotRecord {
        tag: parse_tag("stable/20240301-120000-abcd").unwrap(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        reason: "upgrade config".to_string(),
        risk_level: "high".to_string(),
        text_ref: TextRef::new("abc123"),
        large_object_manifest_ref: ManifestRef::new("def456"),
        backend_status: BackendStatus::Inconsistent,
    }
}

#[test]
fn test_partial_commit_carries_record_and_requires_operator() {
    let err = ExError::new(ExErrorKind::PartialCommit)
        .with_op("snapshot")
        .with_tag("stable/20240301-120000-abcd")
        .with_audit_seq(7)
        .with_record(record());

    assert!(err.requires_operator());
    assert_eq!(err.code(), "ERR_PARTIAL_COMMIT");
    assert_eq!(
        err.record().map(|r| r.backend_status),
        Some(BackendStatus::Inconsistent)
    );
    let shown = err.to_string();
    assert!(shown.contains("stable/20240301-120000-abcd"));
    assert!(shown.contains("audit_seq: 7"));
}

#[test]
fn test_verification_failed_carries_result() {
    let tag = parse_tag("stable/20240301-120000-abcd").unwrap();
    let result = VerificationResult::from_checks(tag, vec![CheckResult::fail("healthcheck", "exit 1")]);
    let err = ExError::new(ExErrorKind::VerificationFailed).with_verification(result.clone());
    assert!(!err.requires_operator());
    assert_eq!(err.verification(), Some(&result));
}

#[test]
fn test_validation_errors_convert_with_stable_codes() {
    let cases: Vec<(TimeMachineError, &str)> = vec![
        (
            TimeMachineError::InvalidCategory {
                category: "x".into(),
                known: vec!["stable".into()],
            },
            "ERR_INVALID_CATEGORY",
        ),
        (
            TimeMachineError::MalformedTag {
                input: "x".into(),
                reason: "r".into(),
            },
            "ERR_MALFORMED_TAG",
        ),
        (
            TimeMachineError::ProtectedPathViolation {
                overlaps: vec!["a <-> a/b".into()],
            },
            "ERR_PROTECTED_PATH_VIOLATION",
        ),
        (
            TimeMachineError::InvalidConfig { reason: "r".into() },
            "ERR_INVALID_CONFIG",
        ),
    ];
    for (err, code) in cases {
        let ex: ExError = err.into();
        assert_eq!(ex.code(), code);
        assert!(ex.kind().is_validation());
    }
}

#[test]
fn test_source_chain_is_exposed() {
    let inner = ExError::new(ExErrorKind::BackendTimeout).with_backend("git");
    let outer = ExError::new(ExErrorKind::StagingFailed).with_source(inner);
    let source = std::error::Error::source(&outer).unwrap();
    assert!(source.to_string().contains("ERR_BACKEND_TIMEOUT"));
}

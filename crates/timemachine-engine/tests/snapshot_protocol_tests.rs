// Snapshot orchestration: two-phase commit, compensation, validation.

mod common;

use chrono::{TimeZone, Utc};
use common::{harness, harness_with, try_harness};
use std::collections::HashSet;
use std::sync::Arc;
use timemachine_core::audit::{AuditLogger, AuditOperation, AuditOutcome, MemoryAuditSink};
use timemachine_core::backend::{
    FailureMode, IntegrityReport, LargeObjectBackend, ManifestRef, MemoryLargeObjectBackend,
    MemoryOp, MemoryTextBackend, TextBackend,
};
use timemachine_core::config::TimeMachineConfig;
use timemachine_core::context::{CancelToken, OperationContext};
use timemachine_core::errors::{ExErrorKind, ExResult};
use timemachine_core::ledger::{MemoryLedger, SnapshotLedger};
use timemachine_core::model::{BackendStatus, ObjectChange, TextRef};
use timemachine_core::tag::{FixedClock, VersionTag};
use timemachine_engine::{TimeMachine, TimeMachineParts};

#[test]
fn test_snapshot_commits_both_backends_with_one_tag() {
    let h = harness();

    let record = h.tm.snapshot(&h.ctx(), "upgrade config", "high").unwrap();

    assert_eq!(record.tag.category(), "stable");
    assert!(record
        .tag
        .to_string()
        .starts_with("stable/20240301-120000-"));
    assert_eq!(record.backend_status, BackendStatus::BothCommitted);
    assert_eq!(record.reason, "upgrade config");
    assert_eq!(record.risk_level, "high");
    assert_eq!(h.text.tag_names(), vec![record.tag.to_string()]);
    assert_eq!(h.large.tag_names(), vec![record.tag.to_string()]);
    assert_eq!(h.ledger.get(&record.tag).unwrap(), Some(record.clone()));

    assert_eq!(
        h.audit_trail(),
        vec![
            (AuditOperation::Snapshot, AuditOutcome::Attempted),
            (AuditOperation::Snapshot, AuditOutcome::Committed),
        ]
    );
    assert!(h.tm.audit().verify_chain().unwrap());
}

#[test]
fn test_snapshot_commit_message_names_tag_and_risk() {
    let h = harness();
    let record = h.tm.snapshot(&h.ctx(), "nightly", "normal").unwrap();

    let message = h.text.commit_message(&record.text_ref).unwrap();
    assert!(message.starts_with(&format!("TimeMachine snapshot {} [normal]", record.tag)));
    assert!(message.contains("\"reason\":\"nightly\""));
}

#[test]
fn test_risk_levels_map_to_categories() {
    let h = harness();
    let ctx = h.ctx();
    assert_eq!(h.tm.snapshot(&ctx, "r", "low").unwrap().tag.category(), "experiment");
    assert_eq!(h.tm.snapshot(&ctx, "r", "normal").unwrap().tag.category(), "pre-change");
    assert_eq!(h.tm.snapshot(&ctx, "r", "critical").unwrap().tag.category(), "stable");
    assert_eq!(h.tm.snapshot(&ctx, "r", "experiment").unwrap().tag.category(), "experiment");
}

#[test]
fn test_unknown_risk_level_is_rejected_before_any_write() {
    let h = harness();

    let err = h.tm.snapshot(&h.ctx(), "r", "yolo").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::InvalidCategory);
    assert_eq!(h.text.calls(MemoryOp::StageCommit), 0);
    assert!(h.sink.is_empty());
}

#[test]
fn test_protected_path_overlap_is_rejected() {
    let mut config = TimeMachineConfig::default();
    config.tracked_paths.push("secrets/api/".to_string());

    let err = try_harness(config).err().expect("overlap must be refused");

    assert_eq!(err.kind(), ExErrorKind::ProtectedPathViolation);
    assert!(err.message().contains("secrets/"));
}

#[test]
fn test_large_paths_may_not_overlap_protected_paths() {
    let mut config = TimeMachineConfig::default();
    config.large_paths.push("secrets/*.bin".to_string());

    let err = try_harness(config).err().expect("overlap must be refused");

    assert_eq!(err.kind(), ExErrorKind::ProtectedPathViolation);
}

#[test]
fn test_same_second_snapshots_never_collide() {
    let h = harness();
    let ctx = h.ctx();
    let mut seen = HashSet::new();
    for _ in 0..50 {
        let record = h.tm.snapshot(&ctx, "burst", "high").unwrap();
        assert!(seen.insert(record.tag.to_string()), "duplicate tag {}", record.tag);
    }
    assert_eq!(h.text.tag_names().len(), 50);
}

#[test]
fn test_text_staging_failure_aborts_without_record() {
    let h = harness();
    h.text.fail(MemoryOp::StageCommit, FailureMode::Unavailable);

    let err = h.tm.snapshot(&h.ctx(), "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::StagingFailed);
    assert_eq!(err.tags().len(), 1);
    assert_eq!(err.audit_seqs(), &[1, 2]);
    assert!(h.ledger.list(None).unwrap().is_empty());
    assert!(h.text.tag_names().is_empty());
    assert!(h.large.tag_names().is_empty());
    assert_eq!(h.large.calls(MemoryOp::StageManifest), 1);
    assert_eq!(
        h.audit_trail(),
        vec![
            (AuditOperation::Snapshot, AuditOutcome::Attempted),
            (AuditOperation::Snapshot, AuditOutcome::Failed),
        ]
    );
}

#[test]
fn test_large_object_staging_timeout_is_a_staging_failure() {
    let h = harness();
    h.large.fail(MemoryOp::StageManifest, FailureMode::Timeout);

    let err = h.tm.snapshot(&h.ctx(), "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::StagingFailed);
    assert_eq!(
        err.source_error().map(|s| s.kind()),
        Some(ExErrorKind::BackendTimeout)
    );
    assert_eq!(h.text.calls(MemoryOp::StageCommit), 0);
    assert!(h.text.tag_names().is_empty());
    assert!(h.large.tag_names().is_empty());
    assert!(h.ledger.list(None).unwrap().is_empty());
}

#[test]
fn test_large_object_tag_failure_is_compensated() {
    let h = harness();
    h.large.fail(MemoryOp::Tag, FailureMode::Unavailable);

    let err = h.tm.snapshot(&h.ctx(), "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::BackendUnavailable);
    assert!(!err.requires_operator());
    assert!(h.text.tag_names().is_empty(), "text tag must be removed");
    assert!(h.large.tag_names().is_empty());
    assert!(h.ledger.list(None).unwrap().is_empty());
    assert_eq!(
        h.audit_trail().last(),
        Some(&(AuditOperation::Snapshot, AuditOutcome::Failed))
    );
}

#[test]
fn test_failed_compensation_reports_partial_commit() {
    let h = harness();
    h.large.fail(MemoryOp::Tag, FailureMode::Unavailable);
    h.text.fail(MemoryOp::RemoveTag, FailureMode::Unavailable);

    let err = h.tm.snapshot(&h.ctx(), "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::PartialCommit);
    assert!(err.requires_operator());
    let record = err.record().expect("partial commit carries the record");
    assert_eq!(record.backend_status, BackendStatus::Inconsistent);
    assert!(h.text.has_tag(&record.tag).unwrap());
    assert_eq!(
        h.ledger.get(&record.tag).unwrap().map(|r| r.backend_status),
        Some(BackendStatus::Inconsistent)
    );
    assert_eq!(err.audit_seqs().len(), 2);

    let entries = h.tm.audit().entries().unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.outcome, AuditOutcome::Failed);
    assert_eq!(last.detail.as_ref().unwrap()["compensated"], false);
}

#[test]
fn test_compensation_retries_up_to_configured_attempts() {
    let mut config = TimeMachineConfig::default();
    config.compensation_attempts = 3;
    let h = harness_with(config);
    h.large.fail(MemoryOp::Tag, FailureMode::Unavailable);
    h.text.fail_times(MemoryOp::RemoveTag, FailureMode::Timeout, 2);

    let err = h.tm.snapshot(&h.ctx(), "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::BackendUnavailable);
    assert_eq!(h.text.calls(MemoryOp::RemoveTag), 3);
    assert!(h.text.tag_names().is_empty());
}

#[test]
fn test_ledger_failure_takes_both_tags_down() {
    let h = harness();
    h.ledger.fail_inserts(true);

    let err = h.tm.snapshot(&h.ctx(), "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Persistence);
    assert!(h.text.tag_names().is_empty());
    assert!(h.large.tag_names().is_empty());
}

#[test]
fn test_cancelled_snapshot_is_audited_as_failed() {
    let h = harness();
    let token = CancelToken::new();
    token.cancel();
    let ctx = h.ctx().with_cancel(token);

    let err = h.tm.snapshot(&ctx, "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Cancelled);
    assert_eq!(h.text.calls(MemoryOp::StageCommit), 0);
    assert_eq!(
        h.audit_trail(),
        vec![
            (AuditOperation::Snapshot, AuditOutcome::Attempted),
            (AuditOperation::Snapshot, AuditOutcome::Failed),
        ]
    );
}

#[test]
fn test_untracked_files_stay_out_of_the_commit() {
    let h = harness();
    h.text.write_file("README.md", "edited\n");
    h.text.write_file("config/app.yaml", "mode: b\n");

    let record = h.tm.snapshot(&h.ctx(), "r", "high").unwrap();
    h.text.write_file("README.md", "not tracked\n");
    let base = timemachine_core::model::TextRef::new("mem-0");
    let changes = h.text.diff(&base, &record.text_ref).unwrap();

    let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(paths, vec!["config/app.yaml"]);
}

#[test]
fn test_refused_committed_entry_takes_the_snapshot_down() {
    let h = harness();
    h.sink.fail_after(1, 1);

    let err = h.tm.snapshot(&h.ctx(), "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Persistence);
    assert!(!err.requires_operator());
    assert!(h.text.tag_names().is_empty());
    assert!(h.large.tag_names().is_empty());
    assert!(h.ledger.list(None).unwrap().is_empty());
    assert_eq!(
        h.audit_trail(),
        vec![
            (AuditOperation::Snapshot, AuditOutcome::Attempted),
            (AuditOperation::Snapshot, AuditOutcome::Failed),
        ]
    );
    assert!(h.tm.audit().verify_chain().unwrap());
}

#[test]
fn test_refused_committed_entry_with_stuck_tag_is_partial_commit() {
    let h = harness();
    h.sink.fail_after(1, 1);
    h.text.fail(MemoryOp::RemoveTag, FailureMode::Unavailable);

    let err = h.tm.snapshot(&h.ctx(), "r", "high").unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::PartialCommit);
    assert!(err.requires_operator());
    assert_eq!(
        err.source_error().map(|e| e.kind()),
        Some(ExErrorKind::Persistence)
    );
    let record = err.record().expect("partial commit carries the record");
    assert_eq!(
        h.ledger.get(&record.tag).unwrap().map(|r| r.backend_status),
        Some(BackendStatus::Inconsistent)
    );
    let entries = h.tm.audit().entries().unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.outcome, AuditOutcome::Failed);
    assert_eq!(last.detail.as_ref().unwrap()["step"], "audit-committed");
}

/// Large-object backend that drops a pointer file into the text worktree
/// when it stages, the way `dvc add` writes `.dvc` files.
struct PointerWritingObjects {
    inner: MemoryLargeObjectBackend,
    text: Arc<MemoryTextBackend>,
}

const POINTER: &str = "models.dvc";

impl LargeObjectBackend for PointerWritingObjects {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn stage_manifest(&self, large_paths: &[String]) -> ExResult<ManifestRef> {
        let manifest = self.inner.stage_manifest(large_paths)?;
        self.text
            .write_file(POINTER, &format!("manifest: {}\n", manifest));
        Ok(manifest)
    }

    fn checkpoint(&self, large_paths: &[String]) -> ExResult<ManifestRef> {
        self.inner.checkpoint(large_paths)
    }

    fn pointer_files(&self, _manifest: &ManifestRef) -> ExResult<Vec<String>> {
        Ok(vec![POINTER.to_string()])
    }

    fn tag(&self, manifest: &ManifestRef, tag: &VersionTag) -> ExResult<()> {
        self.inner.tag(manifest, tag)
    }

    fn remove_tag(&self, tag: &VersionTag) -> ExResult<()> {
        self.inner.remove_tag(tag)
    }

    fn has_tag(&self, tag: &VersionTag) -> ExResult<bool> {
        self.inner.has_tag(tag)
    }

    fn diff(&self, from: &ManifestRef, to: &ManifestRef) -> ExResult<Vec<ObjectChange>> {
        self.inner.diff(from, to)
    }

    fn checkout(&self, manifest: &ManifestRef) -> ExResult<()> {
        self.inner.checkout(manifest)
    }

    fn check_integrity(&self, manifest: &ManifestRef) -> ExResult<IntegrityReport> {
        self.inner.check_integrity(manifest)
    }
}

#[test]
fn test_text_commit_carries_pointer_files_of_the_staged_manifest() {
    let text = Arc::new(MemoryTextBackend::with_files(common::default_files()));
    let large = Arc::new(PointerWritingObjects {
        inner: MemoryLargeObjectBackend::with_objects([("models/classifier.bin", b"w".to_vec())]),
        text: text.clone(),
    });
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ));
    let tm = TimeMachine::new(TimeMachineParts {
        config: TimeMachineConfig::default(),
        text: text.clone(),
        large,
        ledger: Arc::new(MemoryLedger::new()),
        audit: AuditLogger::new(Arc::new(MemoryAuditSink::new())).with_clock(clock.clone()),
        clock,
        workdir: None,
    })
    .unwrap();

    let record = tm
        .snapshot(&OperationContext::new("tester"), "r", "high")
        .unwrap();

    let changes = text.diff(&TextRef::new("mem-0"), &record.text_ref).unwrap();
    let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(paths, vec![POINTER]);
    assert!(changes[0]
        .text_delta
        .contains(record.large_object_manifest_ref.as_str()));
    assert!(!text.is_dirty().unwrap());
}

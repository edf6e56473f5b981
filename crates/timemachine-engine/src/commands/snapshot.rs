//! Snapshot orchestration: one logical version across two backends.
//!
//! ## Protocol (strictly sequential, text backend first):
//! 1. Validate tracked and large paths against protected paths (no writes)
//! 2. Map the risk level to a category and allocate a unique tag
//! 3. Audit `attempted`
//! 4. Phase 1, stage: large-object manifest, then a text commit that
//!    carries the manifest's pointer files
//! 5. Phase 2, commit: tag the text commit, then the manifest
//! 6. Write the Snapshot Record, audit `committed`
//!
//! A large-object tag failure after the text tag succeeded is compensated by
//! removing the text tag. A record or `committed` entry that cannot be
//! written takes both tags (and the record) down again. If any of that
//! cleanup fails, the record is persisted as `inconsistent` and surfaced as
//! `PartialCommit`.

use crate::commands::{audit_failure, elapsed_ms, with_context};
use crate::machine::TimeMachine;
use serde_json::json;
use std::time::Instant;
use timemachine_core::audit::{AuditEvent, AuditOperation, AuditOutcome};
use timemachine_core::context::OperationContext;
use timemachine_core::errors::{ExError, ExErrorKind, ExResult};
use timemachine_core::model::{BackendStatus, SnapshotRecord};
use timemachine_core::paths;
use timemachine_core::tag::VersionTag;
use timemachine_core::{log_op_end, log_op_error, log_op_start};

const OP: &str = "snapshot";

/// Upper bound on disambiguator regeneration before giving up
const MAX_TAG_ATTEMPTS: usize = 16;

/// Record a new logical version.
///
/// # Errors
///
/// - `ProtectedPathViolation`, `InvalidCategory`: rejected before any
///   backend is touched, no audit entry
/// - `StagingFailed`: a backend failed or timed out while staging
/// - `Cancelled`: the context was cancelled between phases
/// - `BackendUnavailable`/`BackendTimeout`: a tag step failed and was
///   fully compensated
/// - `Persistence`: the record or the `committed` entry could not be
///   written; both tags were taken down
/// - `PartialCommit`: compensation failed; carries the `inconsistent` record
pub fn snapshot(
    tm: &TimeMachine,
    ctx: &OperationContext,
    reason: &str,
    risk_level: &str,
) -> ExResult<SnapshotRecord> {
    log_op_start!(OP, risk_level = risk_level, request_id = %ctx.request_id);
    let start = Instant::now();

    let record = snapshot_impl(tm, ctx, reason, risk_level).map_err(|e| {
        let e = with_context(e, ctx);
        log_op_error!(OP, e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!(
        OP,
        duration_ms = elapsed_ms(start),
        tag = %record.tag
    );
    Ok(record)
}

fn snapshot_impl(
    tm: &TimeMachine,
    ctx: &OperationContext,
    reason: &str,
    risk_level: &str,
) -> ExResult<SnapshotRecord> {
    let config = &tm.config;
    let large_paths = config.effective_large_paths();

    paths::ensure_disjoint(&config.tracked_paths, &config.protected_paths)?;
    paths::ensure_disjoint(large_paths, &config.protected_paths)?;
    let category = config.category_for_risk(risk_level)?.to_string();
    let tag = allocate_tag(tm, &category)?;

    let attempted = tm.audit.append(
        event(ctx, AuditOutcome::Attempted, &tag)
            .with_detail(json!({ "reason": reason, "risk_level": risk_level })),
    )?;
    let fail = |err: ExError, detail: serde_json::Value| -> ExError {
        let err = err.with_tag(tag.to_string()).with_audit_seq(attempted.seq);
        let detail = json!({ "error": err.to_string(), "step": detail });
        audit_failure(tm, event(ctx, AuditOutcome::Failed, &tag).with_detail(detail), err)
    };

    // Phase 1: stage
    ctx.cancel
        .check(OP)
        .map_err(|e| fail(e, json!("before-stage")))?;

    // Large objects stage first: their pointer files belong in the text commit.
    let staged = tm.large.stage_manifest(large_paths).and_then(|manifest_ref| {
        tm.large
            .pointer_files(&manifest_ref)
            .map(|pointers| (manifest_ref, pointers))
    });
    let (manifest_ref, pointers) = staged
        .map_err(|e| fail(staging_failed(tm.large.name(), e), json!("stage-large-objects")))?;

    let mut text_paths = config.tracked_paths.clone();
    text_paths.extend(pointers);
    let message = commit_message(&tag, reason, risk_level, &config.tracked_paths);
    let text_ref = tm
        .text
        .stage_commit(&text_paths, &message)
        .map_err(|e| fail(staging_failed(tm.text.name(), e), json!("stage-text")))?;
    tracing::debug!(tag = %tag, text_ref = %text_ref, manifest_ref = %manifest_ref, "snapshot staged");

    ctx.cancel
        .check(OP)
        .map_err(|e| fail(e, json!("before-commit")))?;

    // Phase 2: commit, text backend first
    tm.text
        .tag(&text_ref, &tag)
        .map_err(|e| fail(e, json!("tag-text")))?;

    let record = SnapshotRecord {
        tag: tag.clone(),
        created_at: tm.clock.now(),
        reason: reason.to_string(),
        risk_level: risk_level.to_string(),
        text_ref,
        large_object_manifest_ref: manifest_ref,
        backend_status: BackendStatus::BothCommitted,
    };

    if let Err(tag_err) = tm.large.tag(&record.large_object_manifest_ref, &tag) {
        return Err(compensate_text_tag(tm, ctx, record, tag_err, attempted.seq));
    }

    if let Err(ledger_err) = tm.ledger.insert(&record) {
        let undo = Undo {
            step: "write-record",
            record_written: false,
        };
        return Err(undo.run(tm, ctx, record, ledger_err, attempted.seq));
    }

    let committed = tm.audit.append(event(ctx, AuditOutcome::Committed, &tag).with_detail(json!({
        "text_ref": record.text_ref.as_str(),
        "manifest_ref": record.large_object_manifest_ref.as_str(),
    })));
    let committed = match committed {
        Ok(entry) => entry,
        Err(audit_err) => {
            let undo = Undo {
                step: "audit-committed",
                record_written: true,
            };
            return Err(undo.run(tm, ctx, record, audit_err, attempted.seq));
        }
    };
    tracing::debug!(tag = %tag, audit_seq = committed.seq, "snapshot committed");

    Ok(record)
}

/// Generate tags until one is unused in the ledger and in both backends.
fn allocate_tag(tm: &TimeMachine, category: &str) -> ExResult<VersionTag> {
    let scheme = tm.config.tag_scheme();
    for _ in 0..MAX_TAG_ATTEMPTS {
        let tag = scheme.make_tag(category, tm.clock.as_ref())?;
        if !tm.ledger.exists(&tag)? && !tm.text.has_tag(&tag)? && !tm.large.has_tag(&tag)? {
            return Ok(tag);
        }
        tracing::debug!(tag = %tag, "tag already taken, regenerating disambiguator");
    }
    Err(ExError::new(ExErrorKind::Internal)
        .with_op(OP)
        .with_message(format!(
            "no unused tag for category '{}' after {} attempts",
            category, MAX_TAG_ATTEMPTS
        )))
}

/// The large-object tag failed after the text tag succeeded: remove the
/// text tag, up to `compensation_attempts` times.
fn compensate_text_tag(
    tm: &TimeMachine,
    ctx: &OperationContext,
    mut record: SnapshotRecord,
    tag_err: ExError,
    attempted_seq: u64,
) -> ExError {
    let tag = record.tag.clone();
    let attempts = tm.config.compensation_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match tm.text.remove_tag(&tag) {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(e) => {
                tracing::warn!(tag = %tag, attempt, error = %e, "text tag compensation failed");
                last_err = Some(e);
            }
        }
    }

    let tag_err = tag_err
        .with_tag(tag.to_string())
        .with_audit_seq(attempted_seq);

    let Some(compensation_err) = last_err else {
        let message = format!("large-object tag failed, text tag removed: {}", tag_err.message());
        let err = tag_err.with_message(message);
        let detail = json!({
            "error": err.to_string(),
            "step": "tag-large-objects",
            "compensated": true,
        });
        return audit_failure(tm, event(ctx, AuditOutcome::Failed, &tag).with_detail(detail), err);
    };

    record.backend_status = BackendStatus::Inconsistent;
    persist_inconsistent(tm, &record, false);
    let err = ExError::new(ExErrorKind::PartialCommit)
        .with_op(OP)
        .with_tag(tag.to_string())
        .with_audit_seq(attempted_seq)
        .with_message(format!(
            "text tag {} exists in {} but the large-object tag failed ({}) and could not be compensated ({})",
            tag,
            tm.text.name(),
            tag_err.message(),
            compensation_err.message()
        ))
        .with_source(tag_err)
        .with_record(record);
    let detail = json!({
        "error": err.to_string(),
        "step": "tag-large-objects",
        "compensated": false,
        "backend_status": BackendStatus::Inconsistent.as_str(),
    });
    audit_failure(tm, event(ctx, AuditOutcome::Failed, &tag).with_detail(detail), err)
}

/// Both tags exist but the snapshot cannot stand because the record or its
/// `committed` entry was not written. Takes both tags down, then the record.
struct Undo {
    /// Audit detail naming the step that failed
    step: &'static str,
    /// Whether the ledger already holds the record
    record_written: bool,
}

impl Undo {
    fn run(
        &self,
        tm: &TimeMachine,
        ctx: &OperationContext,
        mut record: SnapshotRecord,
        cause: ExError,
        attempted_seq: u64,
    ) -> ExError {
        let tag = record.tag.clone();
        let mut leftovers: Vec<String> = [
            tm.large.remove_tag(&tag).err(),
            tm.text.remove_tag(&tag).err(),
        ]
        .into_iter()
        .flatten()
        .map(|e| e.to_string())
        .collect();
        if leftovers.is_empty() && self.record_written {
            if let Err(e) = tm.ledger.remove(&tag) {
                leftovers.push(e.to_string());
            }
        }
        let cause = cause.with_tag(tag.to_string()).with_audit_seq(attempted_seq);

        let err = if leftovers.is_empty() {
            cause
        } else {
            record.backend_status = BackendStatus::Inconsistent;
            persist_inconsistent(tm, &record, self.record_written);
            ExError::new(ExErrorKind::PartialCommit)
                .with_op(OP)
                .with_tag(tag.to_string())
                .with_audit_seq(attempted_seq)
                .with_message(format!(
                    "{} failed ({}) and the snapshot could not be taken down: {}",
                    self.step,
                    cause.message(),
                    leftovers.join("; ")
                ))
                .with_source(cause)
                .with_record(record)
        };
        let detail = json!({ "error": err.to_string(), "step": self.step });
        audit_failure(tm, event(ctx, AuditOutcome::Failed, &tag).with_detail(detail), err)
    }
}

/// Leave an `inconsistent` record in the ledger so listings surface it
fn persist_inconsistent(tm: &TimeMachine, record: &SnapshotRecord, record_written: bool) {
    let persisted = if record_written {
        tm.ledger.update_status(&record.tag, BackendStatus::Inconsistent)
    } else {
        tm.ledger.insert(record)
    };
    if let Err(e) = persisted {
        tracing::error!(tag = %record.tag, error = %e, "could not persist inconsistent snapshot record");
    }
}

fn staging_failed(backend: &str, source: ExError) -> ExError {
    ExError::new(ExErrorKind::StagingFailed)
        .with_op(OP)
        .with_backend(backend)
        .with_message(format!("{} staging failed: {}", backend, source.message()))
        .with_source(source)
}

fn event(ctx: &OperationContext, outcome: AuditOutcome, tag: &VersionTag) -> AuditEvent {
    AuditEvent::new(AuditOperation::Snapshot, ctx.actor.clone(), outcome).with_tag(tag)
}

/// `TimeMachine snapshot <tag> [<risk>]` followed by a JSON body
pub fn commit_message(
    tag: &VersionTag,
    reason: &str,
    risk_level: &str,
    tracked_paths: &[String],
) -> String {
    let body = json!({
        "reason": reason,
        "risk": risk_level,
        "tracked_paths": tracked_paths,
    });
    format!("TimeMachine snapshot {} [{}]\n\n{}", tag, risk_level, body)
}

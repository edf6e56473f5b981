//! Restore orchestration with verification and rollback.
//!
//! ## State machine
//! `Idle -> Staged -> Verifying -> {Committed | RolledBack}`
//!
//! 1. Resolve the tag to a `both-committed` record; refuse a dirty
//!    workspace unless forced (no writes, no audit)
//! 2. Audit `attempted`, capture a rollback checkpoint of both backends
//! 3. `Idle -> Staged`: check out text, then large objects
//! 4. `Staged -> Verifying` when verification is requested or the
//!    record's category demands it
//! 5. Pass: audit `restore/committed`, then `Committed`. An audit sink
//!    that refuses the entry rolls the checkout back like a failed check.
//! 6. Fail: check out the checkpoint, audit `restore-verify-fail` then
//!    `restore-rollback`, return `VerificationFailed`
//!
//! A rollback that itself fails is `RollbackFailed` and needs an operator.

use crate::commands::{audit_failure, detail_or, elapsed_ms, with_context};
use crate::machine::TimeMachine;
use serde_json::json;
use std::time::Instant;
use timemachine_core::audit::{AuditEvent, AuditOperation, AuditOutcome};
use timemachine_core::context::OperationContext;
use timemachine_core::errors::{ExError, ExErrorKind, ExResult};
use timemachine_core::model::{
    RestoreCheckpoint, RestoreResult, RestoreState, SnapshotRecord, VerificationResult,
};
use timemachine_core::tag::{parse_tag, VersionTag};
use timemachine_core::verify::{checks_for, verify, VerifyContext};
use timemachine_core::{log_op_end, log_op_error, log_op_start};

const OP: &str = "restore";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Verify even when the record's category does not require it
    pub require_verify: bool,
    /// Restore over uncommitted changes in the text backend
    pub force: bool,
}

/// Check out `tag` in both backends.
///
/// # Errors
///
/// - `MalformedTag`, `UnknownVersion`, `DirtyWorkspace`: nothing touched
/// - `VerificationFailed`: rolled back; carries the Verification Result
/// - `Cancelled`: rolled back after staging
/// - backend errors during checkpoint or checkout (rolled back)
/// - `Persistence`: the `committed` entry could not be written (rolled back)
/// - `RollbackFailed`: the workspace is in an unknown state
pub fn restore(
    tm: &TimeMachine,
    ctx: &OperationContext,
    tag: &str,
    options: RestoreOptions,
) -> ExResult<RestoreResult> {
    log_op_start!(
        OP,
        tag = tag,
        require_verify = options.require_verify,
        force = options.force,
        request_id = %ctx.request_id
    );
    let start = Instant::now();

    let result = restore_impl(tm, ctx, tag, options).map_err(|e| {
        let e = with_context(e, ctx);
        log_op_error!(OP, e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!(
        OP,
        duration_ms = elapsed_ms(start),
        state = result.state.as_str()
    );
    Ok(result)
}

/// Tracks the current state and the audit entries written so far
struct Run<'a> {
    tm: &'a TimeMachine,
    ctx: &'a OperationContext,
    tag: VersionTag,
    state: RestoreState,
    audit_seqs: Vec<u64>,
}

impl<'a> Run<'a> {
    fn transition(&mut self, next: RestoreState) {
        debug_assert!(self.state.can_transition_to(next));
        tracing::debug!(
            tag = %self.tag,
            from = self.state.as_str(),
            to = next.as_str(),
            "restore state transition"
        );
        self.state = next;
    }

    fn event(&self, operation: AuditOperation, outcome: AuditOutcome) -> AuditEvent {
        AuditEvent::new(operation, self.ctx.actor.clone(), outcome).with_tag(&self.tag)
    }

    fn append(&mut self, event: AuditEvent) -> ExResult<()> {
        let entry = self.tm.audit.append(event)?;
        self.audit_seqs.push(entry.seq);
        Ok(())
    }

    fn decorate(&self, err: ExError) -> ExError {
        self.audit_seqs
            .iter()
            .fold(err.with_tag(self.tag.to_string()), |e, seq| e.with_audit_seq(*seq))
    }

    /// Audit `restore/failed` on a path where nothing was changed
    fn fail(&mut self, err: ExError) -> ExError {
        let err = self.decorate(err);
        let detail = json!({ "error": err.to_string() });
        let event = self.event(AuditOperation::Restore, AuditOutcome::Failed).with_detail(detail);
        audit_failure(self.tm, event, err)
    }

    /// Check out the checkpoint in both backends and audit the rollback.
    /// Returns `cause` on success, `RollbackFailed` otherwise.
    fn roll_back(&mut self, checkpoint: &RestoreCheckpoint, cause: ExError) -> ExError {
        let text = self.tm.text.checkout(&checkpoint.text_ref);
        let large = text
            .as_ref()
            .ok()
            .map(|_| self.tm.large.checkout(&checkpoint.manifest_ref));

        match (text, large) {
            (Ok(()), Some(Ok(()))) => {
                self.transition(RestoreState::RolledBack);
                let event = self
                    .event(AuditOperation::RestoreRollback, AuditOutcome::RolledBack)
                    .with_detail(json!({
                        "text_ref": checkpoint.text_ref.as_str(),
                        "manifest_ref": checkpoint.manifest_ref.as_str(),
                        "cause": cause.code(),
                    }));
                if let Err(e) = self.append(event) {
                    tracing::error!(error = %e, "audit append failed after rollback");
                }
                self.decorate(cause)
            }
            (text, large) => {
                let rollback_err = match (text, large) {
                    (Err(e), _) | (_, Some(Err(e))) => e,
                    _ => ExError::new(ExErrorKind::Internal),
                };
                let err = ExError::new(ExErrorKind::RollbackFailed)
                    .with_op(OP)
                    .with_message(format!(
                        "rollback to text {} / manifest {} failed after {}: {}; workspace state is unknown",
                        checkpoint.text_ref,
                        checkpoint.manifest_ref,
                        cause.code(),
                        rollback_err.message()
                    ))
                    .with_source(cause);
                let err = self.decorate(err);
                let detail = json!({ "error": err.to_string(), "rollback_failed": true });
                let event = self
                    .event(AuditOperation::RestoreRollback, AuditOutcome::Failed)
                    .with_detail(detail);
                audit_failure(self.tm, event, err)
            }
        }
    }
}

fn restore_impl(
    tm: &TimeMachine,
    ctx: &OperationContext,
    tag: &str,
    options: RestoreOptions,
) -> ExResult<RestoreResult> {
    let tag = parse_tag(tag)?;
    let record = resolve_restorable(tm, &tag)?;

    if !options.force && tm.text.is_dirty()? {
        return Err(ExError::new(ExErrorKind::DirtyWorkspace)
            .with_op(OP)
            .with_tag(tag.to_string())
            .with_message("uncommitted changes in tracked paths; commit them or use force"));
    }

    let verify_required =
        options.require_verify || tm.config.verify_required(record.tag.category());

    let mut run = Run {
        tm,
        ctx,
        tag: tag.clone(),
        state: RestoreState::Idle,
        audit_seqs: Vec::new(),
    };
    run.append(
        run.event(AuditOperation::Restore, AuditOutcome::Attempted)
            .with_detail(json!({
                "require_verify": verify_required,
                "force": options.force,
            })),
    )?;

    let checkpoint = match capture_checkpoint(tm) {
        Ok(checkpoint) => checkpoint,
        Err(e) => return Err(run.fail(e)),
    };
    tracing::debug!(
        tag = %tag,
        text_ref = %checkpoint.text_ref,
        manifest_ref = %checkpoint.manifest_ref,
        "rollback checkpoint captured"
    );

    // Idle -> Staged
    let staged = tm
        .text
        .checkout(&record.text_ref)
        .and_then(|_| tm.large.checkout(&record.large_object_manifest_ref));
    run.transition(RestoreState::Staged);
    if let Err(e) = staged {
        return Err(run.roll_back(&checkpoint, e));
    }

    if let Err(e) = ctx.cancel.check(OP) {
        return Err(run.roll_back(&checkpoint, e));
    }

    let verification = if verify_required {
        run.transition(RestoreState::Verifying);
        let result = run_verification(tm, &record);
        if !result.passed() {
            return Err(verification_failed(&mut run, &checkpoint, result));
        }
        Some(result)
    } else {
        None
    };

    let detail = json!({
        "verified": verification.is_some(),
        "text_ref": record.text_ref.as_str(),
        "manifest_ref": record.large_object_manifest_ref.as_str(),
    });
    let committed = run
        .event(AuditOperation::Restore, AuditOutcome::Committed)
        .with_detail(detail);
    if let Err(audit_err) = run.append(committed) {
        return Err(run.roll_back(&checkpoint, audit_err));
    }
    run.transition(RestoreState::Committed);

    Ok(RestoreResult {
        tag,
        state: run.state,
        verification,
        audit_seqs: run.audit_seqs,
    })
}

fn verification_failed(
    run: &mut Run<'_>,
    checkpoint: &RestoreCheckpoint,
    result: VerificationResult,
) -> ExError {
    let failed: Vec<String> = result
        .failures()
        .map(|c| format!("{}: {}", c.name, c.detail))
        .collect();
    let detail = detail_or(&result, |e| {
        json!({ "overall": "fail", "failures": failed, "serialization_error": e.to_string() })
    });
    let event = run
        .event(AuditOperation::RestoreVerifyFail, AuditOutcome::Failed)
        .with_detail(detail);
    if let Err(e) = run.append(event) {
        tracing::error!(error = %e, "audit append failed for verification failure");
    }

    let err = ExError::new(ExErrorKind::VerificationFailed)
        .with_op(OP)
        .with_message(format!("verification failed: {}", failed.join("; ")))
        .with_verification(result);
    run.roll_back(checkpoint, err)
}

fn capture_checkpoint(tm: &TimeMachine) -> ExResult<RestoreCheckpoint> {
    Ok(RestoreCheckpoint {
        text_ref: tm.text.head()?,
        manifest_ref: tm.large.checkpoint(tm.config.effective_large_paths())?,
    })
}

fn run_verification(tm: &TimeMachine, record: &SnapshotRecord) -> VerificationResult {
    let checks = checks_for(&tm.config, record.tag.category());
    let ctx = VerifyContext {
        tag: &record.tag,
        text: tm.text.as_ref(),
        large: tm.large.as_ref(),
        manifest: &record.large_object_manifest_ref,
        workdir: tm.workdir.as_deref(),
    };
    verify(&checks, &ctx)
}

fn resolve_restorable(tm: &TimeMachine, tag: &VersionTag) -> ExResult<SnapshotRecord> {
    let record = tm.ledger.get(tag)?.ok_or_else(|| {
        ExError::new(ExErrorKind::UnknownVersion)
            .with_op(OP)
            .with_tag(tag.to_string())
            .with_message(format!("No snapshot named {}", tag))
    })?;
    if !record.is_complete() {
        return Err(ExError::new(ExErrorKind::UnknownVersion)
            .with_op(OP)
            .with_tag(tag.to_string())
            .with_message(format!(
                "Snapshot {} is {} and cannot be restored",
                tag, record.backend_status
            )));
    }
    Ok(record)
}

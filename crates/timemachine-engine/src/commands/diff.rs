//! Cross-backend diff between two logical versions.
//!
//! Read-only: no staging, no backend writes. The only side effect is one
//! `diff` audit entry for traceability.

use crate::commands::{audit_failure, elapsed_ms, with_context};
use crate::machine::TimeMachine;
use serde_json::json;
use std::time::Instant;
use timemachine_core::audit::{AuditEvent, AuditOperation, AuditOutcome};
use timemachine_core::context::OperationContext;
use timemachine_core::diff::merge;
use timemachine_core::errors::{ExError, ExErrorKind, ExResult};
use timemachine_core::model::{DiffReport, SnapshotRecord};
use timemachine_core::tag::{parse_tag, VersionTag};
use timemachine_core::{log_op_end, log_op_error, log_op_start};

const OP: &str = "diff";

/// Merged text and large-object change report from `tag_a` to `tag_b`.
///
/// # Errors
///
/// - `MalformedTag` for an unparsable tag
/// - `UnknownVersion` when a tag has no Snapshot Record
/// - `IncompleteVersion` when a record is not `both-committed`
/// - backend errors from either diff query (audited as `failed`)
pub fn diff(
    tm: &TimeMachine,
    ctx: &OperationContext,
    tag_a: &str,
    tag_b: &str,
) -> ExResult<DiffReport> {
    log_op_start!(OP, from_tag = tag_a, to_tag = tag_b, request_id = %ctx.request_id);
    let start = Instant::now();

    let report = diff_impl(tm, ctx, tag_a, tag_b).map_err(|e| {
        let e = with_context(e, ctx);
        log_op_error!(OP, e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!(
        OP,
        duration_ms = elapsed_ms(start),
        text_changes = report.text_changes.len(),
        object_changes = report.large_object_changes.len()
    );
    Ok(report)
}

fn diff_impl(
    tm: &TimeMachine,
    ctx: &OperationContext,
    tag_a: &str,
    tag_b: &str,
) -> ExResult<DiffReport> {
    let from_tag = parse_tag(tag_a)?;
    let to_tag = parse_tag(tag_b)?;
    let from = resolve_complete(tm, &from_tag)?;
    let to = resolve_complete(tm, &to_tag)?;

    let event = |outcome: AuditOutcome| {
        AuditEvent::new(AuditOperation::Diff, ctx.actor.clone(), outcome)
            .with_tag(&from_tag)
            .with_tag(&to_tag)
    };

    let changes = tm
        .text
        .diff(&from.text_ref, &to.text_ref)
        .and_then(|text| {
            tm.large
                .diff(&from.large_object_manifest_ref, &to.large_object_manifest_ref)
                .map(|objects| (text, objects))
        });
    let (text_changes, object_changes) = match changes {
        Ok(changes) => changes,
        Err(e) => {
            let e = e.with_tag(from_tag.to_string()).with_tag(to_tag.to_string());
            let detail = json!({ "error": e.to_string() });
            return Err(audit_failure(tm, event(AuditOutcome::Failed).with_detail(detail), e));
        }
    };

    let report = merge(
        &from_tag,
        &to_tag,
        text_changes,
        object_changes,
        &tm.config.key_prefixes,
    );

    tm.audit.append(event(AuditOutcome::Completed).with_detail(json!({
        "text_changes": report.text_changes.len(),
        "large_object_changes": report.large_object_changes.len(),
    })))?;
    Ok(report)
}

fn resolve_complete(tm: &TimeMachine, tag: &VersionTag) -> ExResult<SnapshotRecord> {
    let record = tm.ledger.get(tag)?.ok_or_else(|| {
        ExError::new(ExErrorKind::UnknownVersion)
            .with_op(OP)
            .with_tag(tag.to_string())
            .with_message(format!("No snapshot named {}", tag))
    })?;
    if !record.is_complete() {
        return Err(ExError::new(ExErrorKind::IncompleteVersion)
            .with_op(OP)
            .with_tag(tag.to_string())
            .with_message(format!(
                "Snapshot {} is {}, not both-committed",
                tag, record.backend_status
            )));
    }
    Ok(record)
}

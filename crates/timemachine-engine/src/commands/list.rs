//! Listing snapshot records.

use crate::commands::{audit_failure, elapsed_ms, with_context};
use crate::machine::TimeMachine;
use serde_json::json;
use std::time::Instant;
use timemachine_core::audit::{AuditEvent, AuditOperation, AuditOutcome};
use timemachine_core::context::OperationContext;
use timemachine_core::errors::{ExError, ExErrorKind, ExResult};
use timemachine_core::model::SnapshotRecord;
use timemachine_core::{log_op_end, log_op_error, log_op_start};

const OP: &str = "list";

/// Snapshot records newest first, at most `list_limit` of them.
///
/// Records of every status are listed, `inconsistent` ones included, so
/// partial commits stay visible.
///
/// # Errors
///
/// `InvalidCategory` for a filter naming an unconfigured category, and
/// persistence errors from the ledger.
pub fn list(
    tm: &TimeMachine,
    ctx: &OperationContext,
    category: Option<&str>,
) -> ExResult<Vec<SnapshotRecord>> {
    log_op_start!(OP, request_id = %ctx.request_id);
    let start = Instant::now();

    let records = list_impl(tm, ctx, category).map_err(|e| {
        let e = with_context(e, ctx);
        log_op_error!(OP, e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!(OP, duration_ms = elapsed_ms(start), count = records.len());
    Ok(records)
}

fn list_impl(
    tm: &TimeMachine,
    ctx: &OperationContext,
    category: Option<&str>,
) -> ExResult<Vec<SnapshotRecord>> {
    if let Some(name) = category {
        if tm.config.category(name).is_none() {
            return Err(ExError::new(ExErrorKind::InvalidCategory)
                .with_op(OP)
                .with_message(format!("Category '{}' is not configured", name)));
        }
    }

    let mut records = match tm.ledger.list(category) {
        Ok(records) => records,
        Err(e) => {
            let event = AuditEvent::new(AuditOperation::List, ctx.actor.clone(), AuditOutcome::Failed)
                .with_detail(json!({ "filter": category, "error": e.to_string() }));
            return Err(audit_failure(tm, event, e));
        }
    };
    records.truncate(tm.config.list_limit);

    tm.audit.append(
        AuditEvent::new(AuditOperation::List, ctx.actor.clone(), AuditOutcome::Completed)
            .with_detail(json!({ "filter": category, "count": records.len() })),
    )?;
    Ok(records)
}

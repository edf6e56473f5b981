//! Command orchestration layer.
//!
//! One module per public operation. Each owns exactly one
//! `log_op_start!` / `log_op_end!` (or `log_op_error!`) boundary; backends,
//! ledger and audit sink below only log at debug level.

pub mod diff;
pub mod engine_command;
pub mod list;
pub mod restore;
pub mod snapshot;

use crate::machine::TimeMachine;
use serde::Serialize;
use std::time::Instant;
use timemachine_core::audit::AuditEvent;
use timemachine_core::context::OperationContext;
use timemachine_core::errors::ExError;

/// Append an audit entry on a failure path and attach its seq to `err`.
///
/// An audit sink that refuses the entry must not hide the original
/// failure, so that refusal is logged and `err` is returned as is.
pub(crate) fn audit_failure(tm: &TimeMachine, event: AuditEvent, err: ExError) -> ExError {
    match tm.audit.append(event) {
        Ok(entry) => err.with_audit_seq(entry.seq),
        Err(audit_err) => {
            tracing::error!(error = %audit_err, "audit append failed on error path");
            err
        }
    }
}

/// The request id is attached to every error leaving an operation
pub(crate) fn with_context(err: ExError, ctx: &OperationContext) -> ExError {
    err.with_request_id(ctx.request_id)
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// `value` as audit detail. A value that does not serialize is logged and
/// replaced by what `fallback` builds from the error.
pub(crate) fn detail_or<T: Serialize>(
    value: &T,
    fallback: impl FnOnce(&serde_json::Error) -> serde_json::Value,
) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "audit detail could not be serialized");
        fallback(&e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_detail_or_serializes_plain_values() {
        let detail = detail_or(&json!({ "checks": 3 }), |_| json!(null));
        assert_eq!(detail["checks"], 3);
    }

    #[test]
    fn test_detail_or_keeps_a_fallback_when_serialization_fails() {
        let mut unserializable = BTreeMap::new();
        unserializable.insert((1u8, 2u8), "tuple keys are not JSON keys");

        let detail = detail_or(&unserializable, |e| {
            json!({ "failures": ["healthcheck: exit 1"], "serialization_error": e.to_string() })
        });

        assert_eq!(detail["failures"][0], "healthcheck: exit 1");
        assert!(detail["serialization_error"].as_str().unwrap().contains("key must be a string"));
    }
}

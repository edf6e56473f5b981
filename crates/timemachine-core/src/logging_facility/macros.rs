//! Operation boundary macros
//!
//! Each public time machine operation logs exactly one `start` event and
//! exactly one terminal event (`end` or `end_error`). All three carry the
//! emitting module as `component` and the operation name as `op`; extra
//! `tracing` fields may follow.

/// Log the start of an operation
///
/// ```
/// # use timemachine_core::log_op_start;
/// log_op_start!("snapshot");
/// log_op_start!("snapshot", risk_level = "high");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
            $($($field)+)?
        )
    };
}

/// Log the successful end of an operation. `duration_ms` is mandatory.
///
/// ```
/// # use timemachine_core::log_op_end;
/// log_op_end!("diff", duration_ms = 42, text_changes = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($($field)+)?
        )
    };
}

/// Log the failed end of an operation
///
/// Anything convertible into [`ExError`](crate::errors::ExError) is
/// accepted; the stable kind and code, the tags involved and whether an
/// operator has to step in are always recorded.
///
/// ```
/// # use timemachine_core::log_op_error;
/// # use timemachine_core::errors::{ExError, ExErrorKind};
/// let err = ExError::new(ExErrorKind::UnknownVersion).with_tag("stable/20240301-120000-abcd");
/// log_op_error!("restore", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)+)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            err_tags = %ex_err.tags().join(","),
            requires_operator = ex_err.requires_operator(),
            $($($field)+)?
        )
    }};
}

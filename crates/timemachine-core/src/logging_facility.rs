//! Structured logging for the time machine crates
//!
//! - [`init`] installs the subscriber for a binary (`tm --log dev|json`)
//! - `log_op_start!` / `log_op_end!` / `log_op_error!` mark operation
//!   boundaries with a fixed field vocabulary
//!   (see [`core_types::schema`](crate::core_types::schema))
//! - [`test_capture`] records events in memory for assertions
//!
//! Everything below an operation boundary (backend calls, restore state
//! transitions, tag allocation retries) logs at `debug` without the `event`
//! field, so boundary counts stay exact.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile, LOG_FILTER_ENV};
pub use test_capture::{init_test_capture, Boundary, CapturedEvent, TestCapture};

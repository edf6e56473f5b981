//! Types shared by the error and logging facilities of every TimeMachine
//! crate: the per-call `RequestId` and the structured-logging vocabulary.

pub mod correlation;
pub mod schema;

pub use correlation::RequestId;

//! Data model shared by every component.
//!
//! - [`SnapshotRecord`]: one logical version tying a tag to both backends
//! - [`DiffReport`]: derived change set between two records
//! - [`VerificationResult`]: outcome of post-restore checks
//! - [`RestoreResult`]: terminal state of a restore

pub mod diff;
pub mod record;
pub mod restore;
pub mod verification;

pub use diff::{ChangeKind, DiffReport, FileChange, ObjectChange, PathChange};
pub use record::{BackendStatus, ManifestRef, SnapshotRecord, TextRef};
pub use restore::{RestoreCheckpoint, RestoreResult, RestoreState};
pub use verification::{CheckOutcome, CheckResult, Overall, VerificationResult};

//! Backend Abstraction.
//!
//! Two capability interfaces rather than a shared base: the text backend
//! versions small diffable files, the large-object backend versions
//! content-hash pointers to big binaries. Their operation sets only partly
//! overlap (integrity checking exists for large objects only).
//!
//! Every failure surfaces as `BackendUnavailable` or `BackendTimeout`.

pub mod memory;

pub use crate::model::{ManifestRef, TextRef};
pub use memory::{FailureMode, MemoryLargeObjectBackend, MemoryOp, MemoryTextBackend};

use crate::errors::ExResult;
use crate::model::{FileChange, ObjectChange};
use crate::tag::VersionTag;
use serde::{Deserialize, Serialize};

/// Text-diffable substrate (git in production)
pub trait TextBackend: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Record the current content of `tracked_paths` as a new, untagged
    /// commit and return its ref.
    fn stage_commit(&self, tracked_paths: &[String], message: &str) -> ExResult<TextRef>;

    fn tag(&self, reference: &TextRef, tag: &VersionTag) -> ExResult<()>;

    fn remove_tag(&self, tag: &VersionTag) -> ExResult<()>;

    fn has_tag(&self, tag: &VersionTag) -> ExResult<bool>;

    /// Path-level change set between two refs, in lexical path order
    fn diff(&self, from: &TextRef, to: &TextRef) -> ExResult<Vec<FileChange>>;

    fn checkout(&self, reference: &TextRef) -> ExResult<()>;

    /// Ref of what is currently checked out, usable as a rollback point
    fn head(&self) -> ExResult<TextRef>;

    /// Uncommitted changes in the working tree
    fn is_dirty(&self) -> ExResult<bool>;

    /// Whether `path` is present in the checked-out state
    fn exists(&self, path: &str) -> ExResult<bool>;
}

/// Content-hash-addressed substrate for large binaries (DVC in production)
pub trait LargeObjectBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Start tracking the current content of `large_paths` and record a
    /// manifest of their hashes. The manifest remembers `large_paths` as its
    /// scope.
    fn stage_manifest(&self, large_paths: &[String]) -> ExResult<ManifestRef>;

    /// Capture the current pointer state of `large_paths` without adding
    /// anything to tracking.
    fn checkpoint(&self, large_paths: &[String]) -> ExResult<ManifestRef>;

    /// Files the text backend has to commit next to `manifest` so that a
    /// text checkout carries the matching pointers (DVC `.dvc` files and
    /// the ignore lists that keep the tracked bytes out of git).
    fn pointer_files(&self, _manifest: &ManifestRef) -> ExResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn tag(&self, manifest: &ManifestRef, tag: &VersionTag) -> ExResult<()>;

    fn remove_tag(&self, tag: &VersionTag) -> ExResult<()>;

    fn has_tag(&self, tag: &VersionTag) -> ExResult<bool>;

    /// Per-path hash delta between two manifests, in lexical path order
    fn diff(&self, from: &ManifestRef, to: &ManifestRef) -> ExResult<Vec<ObjectChange>>;

    /// Make the checked-out objects within the manifest's scope match it
    /// exactly: listed paths get their recorded content back, paths in
    /// scope that the manifest does not list are removed.
    fn checkout(&self, manifest: &ManifestRef) -> ExResult<()>;

    /// Compare every path of `manifest` with its checked-out content
    fn check_integrity(&self, manifest: &ManifestRef) -> ExResult<IntegrityReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityProblem {
    Missing,
    Corrupt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub path: String,
    pub problem: IntegrityProblem,
}

/// Result of an integrity pass over one manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Manifest entries compared; zero means there was nothing to check
    pub checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let problem = match self.problem {
            IntegrityProblem::Missing => "missing",
            IntegrityProblem::Corrupt => "corrupt",
        };
        write!(f, "{} ({})", self.path, problem)
    }
}

//! In-process substrates.
//!
//! Both backends keep their whole state behind one mutex and support
//! per-operation failure injection, so the snapshot and restore protocols
//! can be driven through every failure edge without a real git or DVC.

use crate::backend::{
    IntegrityIssue, IntegrityProblem, IntegrityReport, LargeObjectBackend, TextBackend,
};
use crate::diff::manifest_delta;
use crate::digest::{combine, sha256_hex};
use crate::errors::{ExError, ExErrorKind, ExResult};
use crate::model::{ChangeKind, FileChange, ManifestRef, ObjectChange, TextRef};
use crate::paths;
use crate::tag::VersionTag;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    StageCommit,
    StageManifest,
    Checkpoint,
    Tag,
    RemoveTag,
    HasTag,
    Diff,
    Checkout,
    Head,
    IsDirty,
    Exists,
    CheckIntegrity,
}

impl MemoryOp {
    fn as_str(&self) -> &'static str {
        match self {
            MemoryOp::StageCommit => "stage_commit",
            MemoryOp::StageManifest => "stage_manifest",
            MemoryOp::Checkpoint => "checkpoint",
            MemoryOp::Tag => "tag",
            MemoryOp::RemoveTag => "remove_tag",
            MemoryOp::HasTag => "has_tag",
            MemoryOp::Diff => "diff",
            MemoryOp::Checkout => "checkout",
            MemoryOp::Head => "head",
            MemoryOp::IsDirty => "is_dirty",
            MemoryOp::Exists => "exists",
            MemoryOp::CheckIntegrity => "check_integrity",
        }
    }
}

/// How an injected failure presents itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Unavailable,
    Timeout,
}

#[derive(Debug, Clone, Copy)]
struct Injection {
    mode: FailureMode,
    skip: u32,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct Faults {
    plans: HashMap<MemoryOp, Injection>,
    calls: HashMap<MemoryOp, usize>,
}

impl Faults {
    fn enter(&mut self, backend: &str, op: MemoryOp) -> ExResult<()> {
        *self.calls.entry(op).or_default() += 1;

        let Some(plan) = self.plans.get_mut(&op) else {
            return Ok(());
        };
        if plan.skip > 0 {
            plan.skip -= 1;
            return Ok(());
        }
        let mode = plan.mode;
        match plan.remaining {
            Some(0) => return Ok(()),
            Some(ref mut n) => *n -= 1,
            None => {}
        }

        let kind = match mode {
            FailureMode::Unavailable => ExErrorKind::BackendUnavailable,
            FailureMode::Timeout => ExErrorKind::BackendTimeout,
        };
        Err(ExError::new(kind)
            .with_backend(backend)
            .with_op(op.as_str())
            .with_message("injected failure"))
    }

    fn inject(&mut self, op: MemoryOp, mode: FailureMode, skip: u32, remaining: Option<u32>) {
        self.plans.insert(
            op,
            Injection {
                mode,
                skip,
                remaining,
            },
        );
    }
}

fn unavailable(backend: &str, op: MemoryOp, message: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::BackendUnavailable)
        .with_backend(backend)
        .with_op(op.as_str())
        .with_message(message)
}

fn poisoned(backend: &str) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_backend(backend)
        .with_message("backend state lock poisoned")
}

macro_rules! failure_injection_api {
    () => {
        /// Fail every call to `op` from now on
        pub fn fail(&self, op: MemoryOp, mode: FailureMode) {
            self.with_faults(|f| f.inject(op, mode, 0, None));
        }

        /// Let `skip` calls to `op` succeed, then fail every later one
        pub fn fail_after(&self, op: MemoryOp, mode: FailureMode, skip: u32) {
            self.with_faults(|f| f.inject(op, mode, skip, None));
        }

        /// Fail the next `times` calls to `op`, then recover
        pub fn fail_times(&self, op: MemoryOp, mode: FailureMode, times: u32) {
            self.with_faults(|f| f.inject(op, mode, 0, Some(times)));
        }

        pub fn clear_failures(&self) {
            self.with_faults(|f| f.plans.clear());
        }

        /// Number of calls made to `op`, failed ones included
        pub fn calls(&self, op: MemoryOp) -> usize {
            self.inner
                .lock()
                .map(|g| g.faults.calls.get(&op).copied().unwrap_or(0))
                .unwrap_or(0)
        }

        fn with_faults(&self, f: impl FnOnce(&mut Faults)) {
            if let Ok(mut guard) = self.inner.lock() {
                f(&mut guard.faults);
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Text backend
// ---------------------------------------------------------------------------

type Tree = BTreeMap<String, String>;

#[derive(Debug)]
struct TextInner {
    worktree: Tree,
    commits: BTreeMap<String, Tree>,
    messages: BTreeMap<String, String>,
    tags: BTreeMap<String, String>,
    head: String,
    next_commit: u64,
    faults: Faults,
}

impl TextInner {
    fn resolve(&self, reference: &str) -> Option<&Tree> {
        self.commits
            .get(reference)
            .or_else(|| self.tags.get(reference).and_then(|id| self.commits.get(id)))
    }
}

/// In-memory text backend. Commit ids are `mem-<n>`; `mem-0` holds the
/// initial working tree.
#[derive(Debug)]
pub struct MemoryTextBackend {
    inner: Mutex<TextInner>,
}

const TEXT: &str = "memory-text";

impl Default for MemoryTextBackend {
    fn default() -> Self {
        Self::with_files(std::iter::empty::<(String, String)>())
    }
}

impl MemoryTextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an initial committed working tree
    pub fn with_files<K: Into<String>, V: Into<String>>(
        files: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let worktree: Tree = files
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut commits = BTreeMap::new();
        commits.insert("mem-0".to_string(), worktree.clone());
        Self {
            inner: Mutex::new(TextInner {
                worktree,
                commits,
                messages: BTreeMap::new(),
                tags: BTreeMap::new(),
                head: "mem-0".to_string(),
                next_commit: 1,
                faults: Faults::default(),
            }),
        }
    }

    failure_injection_api!();

    fn lock(&self) -> ExResult<MutexGuard<'_, TextInner>> {
        self.inner.lock().map_err(|_| poisoned(TEXT))
    }

    pub fn write_file(&self, path: &str, content: &str) {
        if let Ok(mut g) = self.inner.lock() {
            g.worktree.insert(path.to_string(), content.to_string());
        }
    }

    pub fn remove_file(&self, path: &str) {
        if let Ok(mut g) = self.inner.lock() {
            g.worktree.remove(path);
        }
    }

    pub fn read_file(&self, path: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.worktree.get(path).cloned())
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|g| g.tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn commit_message(&self, reference: &TextRef) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.messages.get(reference.as_str()).cloned())
    }

    /// Content hash of the working tree
    pub fn workspace_digest(&self) -> String {
        self.inner
            .lock()
            .map(|g| {
                let hashed: Vec<(String, String)> = g
                    .worktree
                    .iter()
                    .map(|(p, c)| (p.clone(), sha256_hex(c.as_bytes())))
                    .collect();
                combine(hashed.iter().map(|(p, h)| (p.as_str(), h.as_str())))
            })
            .unwrap_or_default()
    }
}

impl TextBackend for MemoryTextBackend {
    fn name(&self) -> &str {
        TEXT
    }

    fn stage_commit(&self, tracked_paths: &[String], message: &str) -> ExResult<TextRef> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::StageCommit)?;

        let mut tree = g
            .resolve(&g.head)
            .cloned()
            .unwrap_or_default();
        tree.retain(|path, _| !paths::matches_any(tracked_paths, path));
        for (path, content) in &g.worktree {
            if paths::matches_any(tracked_paths, path) {
                tree.insert(path.clone(), content.clone());
            }
        }

        let id = format!("mem-{}", g.next_commit);
        g.next_commit += 1;
        g.commits.insert(id.clone(), tree);
        g.messages.insert(id.clone(), message.to_string());
        g.head = id.clone();
        Ok(TextRef(id))
    }

    fn tag(&self, reference: &TextRef, tag: &VersionTag) -> ExResult<()> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::Tag)?;
        let name = tag.to_string();
        if g.tags.contains_key(&name) {
            return Err(unavailable(TEXT, MemoryOp::Tag, format!("tag '{}' already exists", name)));
        }
        if !g.commits.contains_key(reference.as_str()) {
            return Err(unavailable(TEXT, MemoryOp::Tag, format!("unknown ref '{}'", reference)));
        }
        g.tags.insert(name, reference.0.clone());
        Ok(())
    }

    fn remove_tag(&self, tag: &VersionTag) -> ExResult<()> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::RemoveTag)?;
        g.tags.remove(&tag.to_string());
        Ok(())
    }

    fn has_tag(&self, tag: &VersionTag) -> ExResult<bool> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::HasTag)?;
        Ok(g.tags.contains_key(&tag.to_string()))
    }

    fn diff(&self, from: &TextRef, to: &TextRef) -> ExResult<Vec<FileChange>> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::Diff)?;
        let old = g
            .resolve(from.as_str())
            .ok_or_else(|| unavailable(TEXT, MemoryOp::Diff, format!("unknown ref '{}'", from)))?;
        let new = g
            .resolve(to.as_str())
            .ok_or_else(|| unavailable(TEXT, MemoryOp::Diff, format!("unknown ref '{}'", to)))?;
        Ok(tree_delta(old, new))
    }

    fn checkout(&self, reference: &TextRef) -> ExResult<()> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::Checkout)?;
        let tree = g.resolve(reference.as_str()).cloned().ok_or_else(|| {
            unavailable(TEXT, MemoryOp::Checkout, format!("unknown ref '{}'", reference))
        })?;
        g.worktree = tree;
        g.head = reference.0.clone();
        Ok(())
    }

    fn head(&self) -> ExResult<TextRef> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::Head)?;
        Ok(TextRef(g.head.clone()))
    }

    fn is_dirty(&self) -> ExResult<bool> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::IsDirty)?;
        Ok(g.resolve(&g.head) != Some(&g.worktree))
    }

    fn exists(&self, path: &str) -> ExResult<bool> {
        let mut g = self.lock()?;
        g.faults.enter(TEXT, MemoryOp::Exists)?;
        let wanted = paths::normalize(path);
        Ok(g.worktree.keys().any(|p| paths::matches(&wanted, p)))
    }
}

fn tree_delta(old: &Tree, new: &Tree) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for (path, before) in old {
        match new.get(path) {
            None => changes.push(file_change(path, ChangeKind::Removed, Some(before), None)),
            Some(after) if after != before => {
                changes.push(file_change(path, ChangeKind::Modified, Some(before), Some(after)))
            }
            Some(_) => {}
        }
    }
    for (path, after) in new {
        if !old.contains_key(path) {
            changes.push(file_change(path, ChangeKind::Added, None, Some(after)));
        }
    }
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

fn file_change(path: &str, kind: ChangeKind, before: Option<&String>, after: Option<&String>) -> FileChange {
    let binary = before.is_some_and(|c| c.contains('\0')) || after.is_some_and(|c| c.contains('\0'));
    let text_delta = if binary {
        String::new()
    } else {
        let mut delta = format!("--- a/{}\n+++ b/{}\n", path, path);
        for line in before.map(|c| c.lines().collect::<Vec<_>>()).unwrap_or_default() {
            delta.push_str(&format!("-{}\n", line));
        }
        for line in after.map(|c| c.lines().collect::<Vec<_>>()).unwrap_or_default() {
            delta.push_str(&format!("+{}\n", line));
        }
        delta
    };
    FileChange {
        path: path.to_string(),
        kind,
        text_delta,
        binary,
    }
}

// ---------------------------------------------------------------------------
// Large-object backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Manifest {
    /// Large-path patterns the manifest was captured over
    scope: Vec<String>,
    /// `path -> content hash`
    entries: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct ObjectInner {
    worktree: BTreeMap<String, Vec<u8>>,
    cache: HashMap<String, Vec<u8>>,
    manifests: HashMap<String, Manifest>,
    tags: BTreeMap<String, String>,
    faults: Faults,
}

impl ObjectInner {
    fn capture(&mut self, large_paths: &[String], populate_cache: bool) -> ManifestRef {
        let mut entries = BTreeMap::new();
        for (path, bytes) in &self.worktree {
            if paths::matches_any(large_paths, path) {
                let hash = sha256_hex(bytes);
                if populate_cache {
                    self.cache.insert(hash.clone(), bytes.clone());
                }
                entries.insert(path.clone(), hash);
            }
        }
        let scope: Vec<(String, &str)> = large_paths
            .iter()
            .map(|p| (format!("scope:{}", p), ""))
            .collect();
        let reference = combine(
            entries
                .iter()
                .map(|(p, h)| (p.as_str(), h.as_str()))
                .chain(scope.iter().map(|(p, h)| (p.as_str(), *h))),
        );
        let manifest = Manifest {
            scope: large_paths.to_vec(),
            entries,
        };
        self.manifests.insert(reference.clone(), manifest);
        ManifestRef(reference)
    }

    fn manifest(&self, op: MemoryOp, reference: &ManifestRef) -> ExResult<&Manifest> {
        self.manifests
            .get(reference.as_str())
            .ok_or_else(|| unavailable(OBJECTS, op, format!("unknown manifest '{}'", reference)))
    }
}

/// In-memory large-object backend. Manifest refs are content digests of the
/// `path -> hash` map.
#[derive(Debug, Default)]
pub struct MemoryLargeObjectBackend {
    inner: Mutex<ObjectInner>,
}

const OBJECTS: &str = "memory-large-object";

impl MemoryLargeObjectBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<K: Into<String>, V: Into<Vec<u8>>>(
        objects: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let backend = Self::default();
        for (k, v) in objects {
            backend.write_object(&k.into(), v.into());
        }
        backend
    }

    failure_injection_api!();

    fn lock(&self) -> ExResult<MutexGuard<'_, ObjectInner>> {
        self.inner.lock().map_err(|_| poisoned(OBJECTS))
    }

    pub fn write_object(&self, path: &str, bytes: Vec<u8>) {
        if let Ok(mut g) = self.inner.lock() {
            g.worktree.insert(path.to_string(), bytes);
        }
    }

    pub fn remove_object(&self, path: &str) {
        if let Ok(mut g) = self.inner.lock() {
            g.worktree.remove(path);
        }
    }

    /// Flip the content of a checked-out object so its hash no longer matches
    pub fn corrupt(&self, path: &str) {
        if let Ok(mut g) = self.inner.lock() {
            if let Some(bytes) = g.worktree.get_mut(path) {
                bytes.push(0xff);
            }
        }
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|g| g.tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Checked-out object paths in lexical order
    pub fn object_paths(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|g| g.worktree.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Content hash of the checked-out objects
    pub fn workspace_digest(&self) -> String {
        self.inner
            .lock()
            .map(|g| {
                let hashed: Vec<(String, String)> = g
                    .worktree
                    .iter()
                    .map(|(p, b)| (p.clone(), sha256_hex(b)))
                    .collect();
                combine(hashed.iter().map(|(p, h)| (p.as_str(), h.as_str())))
            })
            .unwrap_or_default()
    }
}

impl LargeObjectBackend for MemoryLargeObjectBackend {
    fn name(&self) -> &str {
        OBJECTS
    }

    fn stage_manifest(&self, large_paths: &[String]) -> ExResult<ManifestRef> {
        let mut g = self.lock()?;
        g.faults.enter(OBJECTS, MemoryOp::StageManifest)?;
        Ok(g.capture(large_paths, true))
    }

    fn checkpoint(&self, large_paths: &[String]) -> ExResult<ManifestRef> {
        let mut g = self.lock()?;
        g.faults.enter(OBJECTS, MemoryOp::Checkpoint)?;
        // Rolling back must be able to bring these bytes back.
        Ok(g.capture(large_paths, true))
    }

    fn tag(&self, manifest: &ManifestRef, tag: &VersionTag) -> ExResult<()> {
        let mut g = self.lock()?;
        g.faults.enter(OBJECTS, MemoryOp::Tag)?;
        g.manifest(MemoryOp::Tag, manifest)?;
        let name = tag.to_string();
        if g.tags.contains_key(&name) {
            return Err(unavailable(OBJECTS, MemoryOp::Tag, format!("tag '{}' already exists", name)));
        }
        g.tags.insert(name, manifest.0.clone());
        Ok(())
    }

    fn remove_tag(&self, tag: &VersionTag) -> ExResult<()> {
        let mut g = self.lock()?;
        g.faults.enter(OBJECTS, MemoryOp::RemoveTag)?;
        g.tags.remove(&tag.to_string());
        Ok(())
    }

    fn has_tag(&self, tag: &VersionTag) -> ExResult<bool> {
        let mut g = self.lock()?;
        g.faults.enter(OBJECTS, MemoryOp::HasTag)?;
        Ok(g.tags.contains_key(&tag.to_string()))
    }

    fn diff(&self, from: &ManifestRef, to: &ManifestRef) -> ExResult<Vec<ObjectChange>> {
        let mut g = self.lock()?;
        g.faults.enter(OBJECTS, MemoryOp::Diff)?;
        let old = g.manifest(MemoryOp::Diff, from)?;
        let new = g.manifest(MemoryOp::Diff, to)?;
        Ok(manifest_delta(&old.entries, &new.entries))
    }

    fn checkout(&self, manifest: &ManifestRef) -> ExResult<()> {
        let mut g = self.lock()?;
        g.faults.enter(OBJECTS, MemoryOp::Checkout)?;
        let Manifest { scope, entries } = g.manifest(MemoryOp::Checkout, manifest)?.clone();
        let mut restored = Vec::with_capacity(entries.len());
        for (path, hash) in &entries {
            let bytes = g.cache.get(hash).cloned().ok_or_else(|| {
                unavailable(
                    OBJECTS,
                    MemoryOp::Checkout,
                    format!("object {} for '{}' not in cache", hash, path),
                )
            })?;
            restored.push((path.clone(), bytes));
        }
        g.worktree
            .retain(|path, _| entries.contains_key(path) || !paths::matches_any(&scope, path));
        g.worktree.extend(restored);
        Ok(())
    }

    fn check_integrity(&self, manifest: &ManifestRef) -> ExResult<IntegrityReport> {
        let mut g = self.lock()?;
        g.faults.enter(OBJECTS, MemoryOp::CheckIntegrity)?;
        let entries = &g.manifest(MemoryOp::CheckIntegrity, manifest)?.entries;
        let mut issues = Vec::new();
        for (path, hash) in entries {
            let problem = match g.worktree.get(path) {
                None => Some(IntegrityProblem::Missing),
                Some(bytes) if &sha256_hex(bytes) != hash => Some(IntegrityProblem::Corrupt),
                Some(_) => None,
            };
            if let Some(problem) = problem {
                issues.push(IntegrityIssue {
                    path: path.clone(),
                    problem,
                });
            }
        }
        Ok(IntegrityReport {
            checked: entries.len(),
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::parse_tag;

    fn tracked() -> Vec<String> {
        vec!["config/".to_string()]
    }

    #[test]
    fn test_stage_commit_only_takes_tracked_paths() {
        let text = MemoryTextBackend::with_files([("config/a.yaml", "v1"), ("notes.txt", "x")]);
        text.write_file("config/a.yaml", "v2");
        text.write_file("notes.txt", "y");
        let r = text.stage_commit(&tracked(), "msg").unwrap();
        let changes = text.diff(&TextRef::new("mem-0"), &r).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "config/a.yaml");
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert!(changes[0].text_delta.contains("+v2"));
    }

    #[test]
    fn test_checkout_restores_tree() {
        let text = MemoryTextBackend::with_files([("config/a.yaml", "v1")]);
        let before = text.workspace_digest();
        let base = text.head().unwrap();
        text.write_file("config/a.yaml", "v2");
        text.stage_commit(&tracked(), "msg").unwrap();
        assert_ne!(text.workspace_digest(), before);
        text.checkout(&base).unwrap();
        assert_eq!(text.workspace_digest(), before);
        assert!(!text.is_dirty().unwrap());
    }

    #[test]
    fn test_failure_injection_counts_and_recovers() {
        let text = MemoryTextBackend::new();
        text.fail_times(MemoryOp::Head, FailureMode::Timeout, 1);
        let err = text.head().unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::BackendTimeout);
        assert!(text.head().is_ok());
        assert_eq!(text.calls(MemoryOp::Head), 2);
    }

    #[test]
    fn test_fail_after_skips_first_calls() {
        let objects = MemoryLargeObjectBackend::new();
        let m = objects.stage_manifest(&[]).unwrap();
        objects.fail_after(MemoryOp::Checkout, FailureMode::Unavailable, 1);
        assert!(objects.checkout(&m).is_ok());
        assert!(objects.checkout(&m).is_err());
        assert!(objects.checkout(&m).is_err());
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let text = MemoryTextBackend::new();
        let tag = parse_tag("stable/20240301-120000-abcd").unwrap();
        let head = text.head().unwrap();
        text.tag(&head, &tag).unwrap();
        assert!(text.tag(&head, &tag).is_err());
        assert!(text.has_tag(&tag).unwrap());
        text.remove_tag(&tag).unwrap();
        assert!(!text.has_tag(&tag).unwrap());
    }

    #[test]
    fn test_integrity_reports_missing_and_corrupt() {
        let objects = MemoryLargeObjectBackend::with_objects([
            ("models/a.bin", vec![1u8, 2, 3]),
            ("models/b.bin", vec![4u8, 5, 6]),
        ]);
        let m = objects.stage_manifest(&["models/".to_string()]).unwrap();
        let report = objects.check_integrity(&m).unwrap();
        assert_eq!(report.checked, 2);
        assert!(report.is_clean());

        objects.corrupt("models/a.bin");
        objects.remove_object("models/b.bin");
        let report = objects.check_integrity(&m).unwrap();
        assert_eq!(
            report.issues,
            vec![
                IntegrityIssue {
                    path: "models/a.bin".to_string(),
                    problem: IntegrityProblem::Corrupt
                },
                IntegrityIssue {
                    path: "models/b.bin".to_string(),
                    problem: IntegrityProblem::Missing
                },
            ]
        );

        objects.checkout(&m).unwrap();
        assert!(objects.check_integrity(&m).unwrap().is_clean());
    }

    #[test]
    fn test_checkout_removes_objects_the_manifest_lacks() {
        let large = vec!["models/".to_string()];
        let objects = MemoryLargeObjectBackend::with_objects([
            ("models/a.bin", b"a".to_vec()),
            ("data/keep.parquet", b"k".to_vec()),
        ]);
        let m1 = objects.stage_manifest(&large).unwrap();
        let before = objects.workspace_digest();

        objects.write_object("models/extra.bin", b"e".to_vec());
        objects.write_object("models/a.bin", b"a2".to_vec());
        objects.checkout(&m1).unwrap();

        assert_eq!(objects.workspace_digest(), before);
        assert_eq!(objects.object_paths(), vec!["data/keep.parquet", "models/a.bin"]);
    }

    #[test]
    fn test_same_content_in_different_scopes_gets_distinct_refs() {
        let objects = MemoryLargeObjectBackend::new();
        let models = objects.stage_manifest(&["models/".to_string()]).unwrap();
        let data = objects.stage_manifest(&["data/".to_string()]).unwrap();
        assert_ne!(models, data);
    }

    #[test]
    fn test_manifest_diff() {
        let objects = MemoryLargeObjectBackend::with_objects([("data/x.parquet", b"one".to_vec())]);
        let large = vec!["data/".to_string()];
        let m1 = objects.stage_manifest(&large).unwrap();
        objects.write_object("data/x.parquet", b"two".to_vec());
        objects.write_object("data/y.parquet", b"new".to_vec());
        let m2 = objects.stage_manifest(&large).unwrap();
        let delta = objects.diff(&m1, &m2).unwrap();
        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0].kind, ChangeKind::Modified);
        assert_eq!(delta[1].kind, ChangeKind::Added);
        assert!(delta[1].old_hash.is_none());
    }
}

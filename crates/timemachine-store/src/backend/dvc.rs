//! DVC large-object backend
//!
//! `dvc` owns the object cache; this backend owns the manifests. Staging
//! runs `dvc add` on the tracked targets and records their hashes and
//! pointer files; checkout removes targets the manifest does not list,
//! writes the pointer files back and lets `dvc checkout` fetch the bytes
//! from cache.
//!
//! When the backend is disabled, or no large path exists on disk, no `dvc`
//! process is started and the manifest is empty. A disabled backend records
//! no scope, so its checkouts never remove anything.

use crate::backend::manifest::{content_hash, LargeObjectManifest, ManifestEntry};
use crate::cas::{atomic_write, FsStore};
use crate::errors::Result;
use crate::layout::StateLayout;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use timemachine_core::backend::{
    IntegrityIssue, IntegrityProblem, IntegrityReport, LargeObjectBackend,
};
use timemachine_core::diff::manifest_delta;
use timemachine_core::errors::{ExError, ExErrorKind};
use timemachine_core::model::{ManifestRef, ObjectChange};
use timemachine_core::paths;
use timemachine_core::process::run_backend_checked;
use timemachine_core::tag::VersionTag;

const BACKEND: &str = "dvc";
const POINTER_SUFFIX: &str = ".dvc";

#[derive(Debug)]
pub struct DvcBackend {
    root: PathBuf,
    manifests: FsStore,
    tags_dir: PathBuf,
    timeout: Duration,
    enabled: bool,
}

impl DvcBackend {
    pub fn new(layout: &StateLayout, timeout: Duration, enabled: bool) -> Self {
        Self {
            root: layout.root().to_path_buf(),
            manifests: FsStore::new(layout.manifests()),
            tags_dir: layout.manifest_tags(),
            timeout,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn load_manifest(&self, reference: &ManifestRef) -> Result<LargeObjectManifest> {
        LargeObjectManifest::load(&self.manifests, reference)
            .map_err(|e| unavailable("load_manifest", e).with_message(format!("cannot load manifest {}", reference)))
    }

    /// Existing on-disk targets selected by `large_paths`, relative and sorted
    fn expand_targets(&self, large_paths: &[String]) -> Result<Vec<String>> {
        let mut targets = BTreeSet::new();
        for pattern in large_paths {
            let normalized = paths::normalize(pattern);
            if !paths::is_glob(&normalized) {
                if self.root.join(&normalized).exists() {
                    targets.insert(normalized);
                }
                continue;
            }
            let absolute = self.root.join(&normalized);
            let matches = glob::glob(&absolute.to_string_lossy()).map_err(|e| {
                ExError::new(ExErrorKind::InvalidConfig)
                    .with_backend(BACKEND)
                    .with_message(format!("bad large path pattern '{}': {}", pattern, e))
            })?;
            for path in matches.flatten() {
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    targets.insert(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(targets
            .into_iter()
            .filter(|t| !t.ends_with(POINTER_SUFFIX) && !t.ends_with(".gitignore"))
            .collect())
    }

    fn record(&self, large_paths: &[String], targets: &[String]) -> Result<ManifestRef> {
        let mut manifest = LargeObjectManifest::with_scope(large_paths);
        for target in targets {
            let absolute = self.root.join(target);
            let (hash, size) = content_hash(&absolute).map_err(|e| self.io(target, e))?;
            let pointer_path = pointer_path(&absolute);
            let pointer = match std::fs::read_to_string(&pointer_path) {
                Ok(text) => Some(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(self.io(target, e)),
            };
            manifest.entries.insert(target.clone(), ManifestEntry { hash, size, pointer });
        }
        manifest.store(&self.manifests)
    }

    /// Delete on-disk targets in the manifest's scope that it does not
    /// list, together with their pointer files
    fn prune(&self, manifest: &LargeObjectManifest) -> Result<()> {
        for target in self.expand_targets(&manifest.scope)? {
            if manifest.entries.contains_key(&target) {
                continue;
            }
            let absolute = self.root.join(&target);
            remove_path(&absolute).map_err(|e| self.io(&target, e).with_op("checkout"))?;
            remove_path(&pointer_path(&absolute))
                .map_err(|e| self.io(&target, e).with_op("checkout"))?;
            tracing::debug!(path = target.as_str(), "removed large object absent from manifest");
        }
        Ok(())
    }

    fn tag_file(&self, tag: &VersionTag) -> PathBuf {
        self.tags_dir.join(tag.category()).join(tag.snapshot_id())
    }

    fn dvc(&self, op: &str, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("dvc");
        cmd.args(args).current_dir(&self.root);
        run_backend_checked(BACKEND, op, cmd, self.timeout)
    }

    fn io(&self, path: &str, err: std::io::Error) -> ExError {
        ExError::new(ExErrorKind::BackendUnavailable)
            .with_backend(BACKEND)
            .with_message(format!("{}: {}", path, err))
    }
}

fn unavailable(op: &str, source: ExError) -> ExError {
    ExError::new(ExErrorKind::BackendUnavailable)
        .with_backend(BACKEND)
        .with_op(op.to_string())
        .with_message(source.message().to_string())
        .with_source(source)
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match removed {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// `.gitignore` that `dvc add` maintains for `target`
fn ignore_file(target: &str) -> String {
    match target.rsplit_once('/') {
        Some((parent, _)) => format!("{}/.gitignore", parent),
        None => ".gitignore".to_string(),
    }
}

fn pointer_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(POINTER_SUFFIX);
    PathBuf::from(name)
}

impl LargeObjectBackend for DvcBackend {
    fn name(&self) -> &str {
        BACKEND
    }

    fn stage_manifest(&self, large_paths: &[String]) -> Result<ManifestRef> {
        if !self.enabled {
            return LargeObjectManifest::default().store(&self.manifests);
        }
        let targets = self.expand_targets(large_paths)?;
        if !targets.is_empty() {
            let mut args = vec!["add", "--quiet"];
            args.extend(targets.iter().map(String::as_str));
            self.dvc("stage_manifest", &args)?;
        }
        let reference = self.record(large_paths, &targets)?;
        tracing::debug!(manifest = reference.as_str(), targets = targets.len(), "large-object manifest staged");
        Ok(reference)
    }

    fn checkpoint(&self, large_paths: &[String]) -> Result<ManifestRef> {
        if !self.enabled {
            return LargeObjectManifest::default().store(&self.manifests);
        }
        let targets = self.expand_targets(large_paths)?;
        self.record(large_paths, &targets)
    }

    fn pointer_files(&self, manifest: &ManifestRef) -> Result<Vec<String>> {
        let manifest = self.load_manifest(manifest)?;
        let mut files = BTreeSet::new();
        for (path, entry) in &manifest.entries {
            if entry.pointer.is_none() {
                continue;
            }
            files.insert(format!("{}{}", path, POINTER_SUFFIX));
            let ignore = ignore_file(path);
            if self.root.join(&ignore).is_file() {
                files.insert(ignore);
            }
        }
        Ok(files.into_iter().collect())
    }

    fn tag(&self, manifest: &ManifestRef, tag: &VersionTag) -> Result<()> {
        if !self.manifests.contains(manifest.as_str()) {
            return Err(ExError::new(ExErrorKind::BackendUnavailable)
                .with_backend(BACKEND)
                .with_op("tag")
                .with_tag(tag.to_string())
                .with_message(format!("unknown manifest {}", manifest)));
        }
        let path = self.tag_file(tag);
        if path.exists() {
            return Err(ExError::new(ExErrorKind::BackendUnavailable)
                .with_backend(BACKEND)
                .with_op("tag")
                .with_tag(tag.to_string())
                .with_message("tag already exists"));
        }
        atomic_write(&path, manifest.as_str().as_bytes())
            .map_err(|e| unavailable("tag", e).with_tag(tag.to_string()))
    }

    fn remove_tag(&self, tag: &VersionTag) -> Result<()> {
        match std::fs::remove_file(self.tag_file(tag)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io(&tag.to_string(), e).with_op("remove_tag")),
        }
    }

    fn has_tag(&self, tag: &VersionTag) -> Result<bool> {
        Ok(self.tag_file(tag).is_file())
    }

    fn diff(&self, from: &ManifestRef, to: &ManifestRef) -> Result<Vec<ObjectChange>> {
        let old = self.load_manifest(from)?;
        let new = self.load_manifest(to)?;
        Ok(manifest_delta(&old.hashes(), &new.hashes()))
    }

    fn checkout(&self, manifest: &ManifestRef) -> Result<()> {
        let manifest = self.load_manifest(manifest)?;
        self.prune(&manifest)?;
        let mut pointers = Vec::new();
        for (path, entry) in &manifest.entries {
            let Some(pointer) = &entry.pointer else {
                continue;
            };
            let pointer_file = pointer_path(&self.root.join(path));
            atomic_write(&pointer_file, pointer.as_bytes()).map_err(|e| unavailable("checkout", e))?;
            pointers.push(format!("{}{}", path, POINTER_SUFFIX));
        }
        if pointers.is_empty() {
            return Ok(());
        }
        let mut args = vec!["checkout", "--quiet", "--force"];
        args.extend(pointers.iter().map(String::as_str));
        self.dvc("checkout", &args).map(|_| ())
    }

    fn check_integrity(&self, manifest: &ManifestRef) -> Result<IntegrityReport> {
        let manifest = self.load_manifest(manifest)?;
        let mut issues = Vec::new();
        for (path, entry) in &manifest.entries {
            let absolute = self.root.join(path);
            let problem = if !absolute.exists() {
                Some(IntegrityProblem::Missing)
            } else {
                match content_hash(&absolute) {
                    Ok((hash, _)) if hash == entry.hash => None,
                    _ => Some(IntegrityProblem::Corrupt),
                }
            };
            if let Some(problem) = problem {
                issues.push(IntegrityIssue {
                    path: path.clone(),
                    problem,
                });
            }
        }
        Ok(IntegrityReport {
            checked: manifest.entries.len(),
            issues,
        })
    }
}

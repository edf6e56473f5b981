//! On-disk layout of a repository's state directory.

use std::path::{Path, PathBuf};

/// Paths under `<root>/<state_dir>`
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
    state_dir: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>, state_dir: &str) -> Self {
        let root = root.into();
        let state_dir = root.join(state_dir);
        Self { root, state_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn database(&self) -> PathBuf {
        self.state_dir.join("timemachine.db")
    }

    pub fn manifests(&self) -> PathBuf {
        self.state_dir.join("manifests")
    }

    pub fn manifest_tags(&self) -> PathBuf {
        self.state_dir.join("manifest-tags")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.state_dir.join("lock")
    }

    /// State dir relative to the root, `/`-separated, for ignore files
    pub fn relative_state_dir(&self) -> String {
        self.state_dir
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| self.state_dir.to_string_lossy().into_owned())
    }
}

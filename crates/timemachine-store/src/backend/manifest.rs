//! Large-object manifest format
//!
//! A manifest maps each tracked large path to the content hash it had when
//! the manifest was recorded, plus the DVC pointer text needed to bring that
//! content back. It also keeps the large-path patterns it was taken over, so
//! a checkout knows which on-disk targets it owns. Manifests are stored as
//! JSON in the CAS; their digest is the manifest ref.

use crate::cas::FsStore;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use timemachine_core::digest::combine;
use timemachine_core::errors::{ExError, ExErrorKind, TimeMachineError};
use timemachine_core::model::ManifestRef;
use walkdir::WalkDir;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// SHA-256 of the file, or of the sorted `(relative path, file hash)`
    /// list for a directory
    pub hash: String,
    pub size: u64,
    /// Contents of the `.dvc` pointer file, when DVC tracks the path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargeObjectManifest {
    pub version: u32,
    /// Large-path patterns the manifest was recorded over
    #[serde(default)]
    pub scope: Vec<String>,
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Default for LargeObjectManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            scope: Vec::new(),
            entries: BTreeMap::new(),
        }
    }
}

impl LargeObjectManifest {
    pub fn with_scope(scope: &[String]) -> Self {
        Self {
            scope: scope.to_vec(),
            ..Self::default()
        }
    }

    /// `path -> hash` view used for deltas
    pub fn hashes(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.hash.clone()))
            .collect()
    }

    pub fn store(&self, cas: &FsStore) -> Result<ManifestRef> {
        let bytes = serde_json::to_vec(self).map_err(TimeMachineError::from)?;
        cas.write(&bytes).map(ManifestRef)
    }

    pub fn load(cas: &FsStore, reference: &ManifestRef) -> Result<Self> {
        let bytes = cas.read(reference.as_str())?;
        let manifest: Self = serde_json::from_slice(&bytes).map_err(TimeMachineError::from)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ExError::new(ExErrorKind::Persistence)
                .with_op("manifest_load")
                .with_message(format!(
                    "manifest {} has unsupported version {}",
                    reference, manifest.version
                )));
        }
        Ok(manifest)
    }
}

/// Hash a file, or a directory as the combination of its files' hashes.
/// Returns `(hash, total size)`.
pub fn content_hash(path: &Path) -> std::io::Result<(String, u64)> {
    if path.is_file() {
        return hash_file(path);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(path)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            let (hash, size) = hash_file(entry.path())?;
            files.push((relative, hash, size));
        }
    }
    let total = files.iter().map(|(_, _, size)| size).sum();
    let hash = combine(files.iter().map(|(p, h, _)| (p.as_str(), h.as_str())));
    Ok((hash, total))
}

fn hash_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_hash_tracks_content_and_names() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("models");
        std::fs::create_dir_all(models.join("v1")).unwrap();
        std::fs::write(models.join("v1").join("w.bin"), b"weights").unwrap();
        std::fs::write(models.join("README"), b"hi").unwrap();

        let (first, size) = content_hash(&models).unwrap();
        assert_eq!(size, 9);
        assert_eq!(content_hash(&models).unwrap().0, first);

        std::fs::write(models.join("v1").join("w.bin"), b"weightz").unwrap();
        assert_ne!(content_hash(&models).unwrap().0, first);
    }

    #[test]
    fn test_manifest_store_load() {
        let dir = TempDir::new().unwrap();
        let cas = FsStore::new(dir.path());
        let mut manifest = LargeObjectManifest::with_scope(&["data/*.parquet".to_string()]);
        manifest.entries.insert(
            "data/train.parquet".to_string(),
            ManifestEntry {
                hash: "ab".repeat(32),
                size: 10,
                pointer: Some("outs:\n- md5: x\n".to_string()),
            },
        );
        let reference = manifest.store(&cas).unwrap();
        assert_eq!(LargeObjectManifest::load(&cas, &reference).unwrap(), manifest);
        assert_eq!(manifest.store(&cas).unwrap(), reference);
    }
}

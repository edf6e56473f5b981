use crate::cas::atomic::atomic_write;
use crate::errors::{cas_collision, cas_missing, io_error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use timemachine_core::digest::sha256_hex;

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/ab/abcdef….json`
    fn blob_path(&self, digest: &str) -> PathBuf {
        let shard = digest.get(..2).unwrap_or(digest);
        self.root.join(shard).join(format!("{}.json", digest))
    }

    /// Store `content` and return its digest. Storing the same bytes again
    /// is a no-op; different bytes already sitting under the digest are a
    /// collision.
    pub fn write(&self, content: &[u8]) -> Result<String> {
        let digest = sha256_hex(content);
        let path = self.blob_path(&digest);
        match fs::read(&path) {
            Ok(existing) if existing == content => Ok(digest),
            Ok(_) => Err(cas_collision(&digest)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                atomic_write(&path, content)?;
                Ok(digest)
            }
            Err(e) => Err(io_error("read_cas", e)),
        }
    }

    /// Bytes stored under `digest`, checked against it.
    pub fn read(&self, digest: &str) -> Result<Vec<u8>> {
        let bytes = match fs::read(self.blob_path(digest)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(cas_missing(digest)),
            Err(e) => return Err(io_error("read_cas", e)),
        };
        if sha256_hex(&bytes) != digest {
            return Err(cas_collision(digest));
        }
        Ok(bytes)
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.blob_path(digest).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blobs_are_sharded_by_prefix() {
        let store = FsStore::new("/state/manifests");
        assert_eq!(
            store.blob_path("abc123"),
            PathBuf::from("/state/manifests/ab/abc123.json")
        );
    }

    #[test]
    fn test_tampered_blob_fails_read() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let digest = store.write(b"original").unwrap();
        fs::write(store.blob_path(&digest), b"tampered").unwrap();

        let err = store.read(&digest).unwrap_err();
        assert!(err.message().contains("collision"));
        assert!(store.write(b"original").is_err());
    }
}

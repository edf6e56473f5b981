// Integration tests for the manifest CAS

use tempfile::TempDir;
use timemachine_store::cas::{atomic_write, FsStore};

#[test]
fn test_cas_write_read() {
    let dir = TempDir::new().unwrap();
    let cas = FsStore::new(dir.path());

    let digest = cas.write(b"{\"entries\":{}}").unwrap();

    assert_eq!(digest.len(), 64);
    assert!(cas.contains(&digest));
    assert_eq!(cas.read(&digest).unwrap(), b"{\"entries\":{}}");
}

#[test]
fn test_cas_write_idempotent() {
    let dir = TempDir::new().unwrap();
    let cas = FsStore::new(dir.path());

    let first = cas.write(b"same").unwrap();
    let second = cas.write(b"same").unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_cas_read_missing_blob() {
    let dir = TempDir::new().unwrap();
    let cas = FsStore::new(dir.path());

    let err = cas.read(&"0".repeat(64)).unwrap_err();
    assert_eq!(err.code(), "ERR_PERSISTENCE");
    assert!(!cas.contains(&"0".repeat(64)));
}

#[test]
fn test_cas_detects_collision() {
    let dir = TempDir::new().unwrap();
    let cas = FsStore::new(dir.path());
    let digest = cas.write(b"original").unwrap();

    let stored = walkdir::WalkDir::new(dir.path())
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file())
        .unwrap();
    atomic_write(stored.path(), b"overwritten").unwrap();

    assert!(cas.write(b"original").is_err());
    let err = cas.read(&digest).unwrap_err();
    assert_eq!(err.code(), "ERR_PERSISTENCE");
}

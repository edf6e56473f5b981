//! Advisory single-writer lock over a repository's state directory
//!
//! Snapshot and restore must not run concurrently against one root. The
//! lock is an OS-level exclusive lock on `<state_dir>/lock`, released when
//! the guard drops or the process dies; the file itself stays behind and
//! records the last holder for diagnostics.

use crate::errors::{io_error, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use timemachine_core::errors::{ExError, ExErrorKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub operation: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Take the lock or fail with `Locked` naming the current holder.
    pub fn acquire(lock_path: &Path, operation: &str) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error("create_state_dir", e))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| io_error("open_lock", e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                let holder = read_holder(&mut file)
                    .map(|h| format!("pid {} ({}) since {}", h.pid, h.operation, h.started_at))
                    .unwrap_or_else(|| "another process".to_string());
                return Err(ExError::new(ExErrorKind::Locked)
                    .with_op(operation)
                    .with_message(format!(
                        "repository is locked by {} ({})",
                        holder,
                        lock_path.display()
                    )));
            }
            return Err(io_error("lock", e));
        }

        let holder = LockHolder {
            pid: std::process::id(),
            operation: operation.to_string(),
            started_at: Utc::now(),
        };
        write_holder(&mut file, &holder).map_err(|e| io_error("write_lock", e))?;

        tracing::debug!(path = %lock_path.display(), operation, "repository lock acquired");
        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_holder(file: &mut File) -> Option<LockHolder> {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut text).ok()?;
    serde_json::from_str(&text).ok()
}

fn write_holder(file: &mut File, holder: &LockHolder) -> std::io::Result<()> {
    let json = serde_json::to_vec(holder).map_err(std::io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&json)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_locked_until_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("lock");

        let first = RepoLock::acquire(&path, "snapshot").unwrap();
        let err = RepoLock::acquire(&path, "restore").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Locked);
        assert!(err.message().contains("snapshot"));

        drop(first);
        RepoLock::acquire(&path, "restore").unwrap();
    }
}

//! Content-addressed blob store for large-object manifests
//!
//! Blobs are named by the SHA-256 of their bytes and sharded into
//! directories by the first two hex characters. Writes go through
//! [`atomic_write`]; reads re-hash, so a blob edited in place is reported
//! instead of being trusted.

mod atomic;
mod fs_store;

pub use atomic::atomic_write;
pub use fs_store::FsStore;

//! Concrete substrates behind the core backend traits
//!
//! - [`GitBackend`]: text backend over the `git` CLI
//! - [`DvcBackend`]: large-object backend over the `dvc` CLI plus a local
//!   manifest store

pub mod dvc;
pub mod git;
pub mod manifest;

pub use dvc::DvcBackend;
pub use git::GitBackend;
pub use manifest::{LargeObjectManifest, ManifestEntry};

//! Diff Engine kernel.
//!
//! The engine crate resolves tags and queries the backends; everything
//! after that is pure and lives here:
//!
//! - [`merge`]: combine the text and large-object change sets by path
//! - [`manifest_delta`]: hash comparison between two large-object manifests
//! - [`render_summary`]: human-readable rendering

pub mod merge;
pub mod summary;

pub use merge::{manifest_delta, merge};
pub use summary::render_summary;

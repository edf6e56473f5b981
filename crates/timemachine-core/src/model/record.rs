use crate::tag::VersionTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a commit in the text backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextRef(pub String);

/// Opaque handle to a manifest in the large-object backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestRef(pub String);

impl TextRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ManifestRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How far a snapshot got across the two backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendStatus {
    BothCommitted,
    TextOnly,
    Inconsistent,
}

impl BackendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendStatus::BothCommitted => "both-committed",
            BackendStatus::TextOnly => "text-only",
            BackendStatus::Inconsistent => "inconsistent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "both-committed" => Some(BackendStatus::BothCommitted),
            "text-only" => Some(BackendStatus::TextOnly),
            "inconsistent" => Some(BackendStatus::Inconsistent),
            _ => None,
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical version spanning both backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub tag: VersionTag,
    pub created_at: DateTime<Utc>,
    pub reason: String,
    pub risk_level: String,
    pub text_ref: TextRef,
    pub large_object_manifest_ref: ManifestRef,
    pub backend_status: BackendStatus,
}

impl SnapshotRecord {
    pub fn is_complete(&self) -> bool {
        self.backend_status == BackendStatus::BothCommitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_status_wire_names() {
        for status in [
            BackendStatus::BothCommitted,
            BackendStatus::TextOnly,
            BackendStatus::Inconsistent,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(BackendStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BackendStatus::parse("committed"), None);
    }
}

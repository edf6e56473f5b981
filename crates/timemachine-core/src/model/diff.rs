use crate::tag::VersionTag;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
        }
    }

    /// One-letter marker used in summaries
    pub fn marker(&self) -> char {
        match self {
            ChangeKind::Added => 'A',
            ChangeKind::Removed => 'D',
            ChangeKind::Modified => 'M',
        }
    }
}

/// Path-level change reported by the text backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
    /// Unified diff for the path; empty for binary files
    #[serde(default)]
    pub text_delta: String,
    #[serde(default)]
    pub binary: bool,
}

/// Hash-level change reported by the large-object backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub path: String,
    pub kind: ChangeKind,
    pub old_hash: Option<String>,
    pub new_hash: Option<String>,
}

/// One path of the merged view, carrying whichever deltas touched it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathChange {
    pub path: String,
    pub text: Option<FileChange>,
    pub object: Option<ObjectChange>,
}

/// Change set between two snapshot records. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub from_tag: VersionTag,
    pub to_tag: VersionTag,
    pub text_changes: Vec<FileChange>,
    pub large_object_changes: Vec<ObjectChange>,
    /// Both change sets merged by path, lexical order
    pub paths: Vec<PathChange>,
    /// Changed paths under the configured key prefixes
    pub key_changes: Vec<String>,
    /// Text changes the text backend flagged as binary
    pub binary_files: Vec<String>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.text_changes.is_empty() && self.large_object_changes.is_empty()
    }
}

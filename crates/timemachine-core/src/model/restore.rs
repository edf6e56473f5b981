use crate::model::record::{ManifestRef, TextRef};
use crate::model::verification::VerificationResult;
use crate::tag::VersionTag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Restore state machine: `Idle -> Staged -> Verifying -> {Committed | RolledBack}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreState {
    Idle,
    Staged,
    Verifying,
    Committed,
    RolledBack,
}

impl RestoreState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreState::Idle => "idle",
            RestoreState::Staged => "staged",
            RestoreState::Verifying => "verifying",
            RestoreState::Committed => "committed",
            RestoreState::RolledBack => "rolled-back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RestoreState::Committed | RestoreState::RolledBack)
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: RestoreState) -> bool {
        use RestoreState::*;
        matches!(
            (self, next),
            (Idle, Staged)
                | (Staged, Verifying)
                | (Staged, Committed)
                | (Staged, RolledBack)
                | (Verifying, Committed)
                | (Verifying, RolledBack)
        )
    }
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-restore state of both backends, not a tagged version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreCheckpoint {
    pub text_ref: TextRef,
    pub manifest_ref: ManifestRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub tag: VersionTag,
    pub state: RestoreState,
    pub verification: Option<VerificationResult>,
    pub audit_seqs: Vec<u64>,
}

use crate::digest::sha256_hex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `prev_entry_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditOperation {
    Snapshot,
    List,
    Diff,
    Restore,
    RestoreVerifyFail,
    RestoreRollback,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Snapshot => "snapshot",
            AuditOperation::List => "list",
            AuditOperation::Diff => "diff",
            AuditOperation::Restore => "restore",
            AuditOperation::RestoreVerifyFail => "restore-verify-fail",
            AuditOperation::RestoreRollback => "restore-rollback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            AuditOperation::Snapshot,
            AuditOperation::List,
            AuditOperation::Diff,
            AuditOperation::Restore,
            AuditOperation::RestoreVerifyFail,
            AuditOperation::RestoreRollback,
        ]
        .into_iter()
        .find(|op| op.as_str() == value)
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditOutcome {
    Attempted,
    Committed,
    Failed,
    RolledBack,
    Completed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Attempted => "attempted",
            AuditOutcome::Committed => "committed",
            AuditOutcome::Failed => "failed",
            AuditOutcome::RolledBack => "rolled-back",
            AuditOutcome::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            AuditOutcome::Attempted,
            AuditOutcome::Committed,
            AuditOutcome::Failed,
            AuditOutcome::RolledBack,
            AuditOutcome::Completed,
        ]
        .into_iter()
        .find(|o| o.as_str() == value)
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields supplied by the caller; the logger fills in the rest
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub operation: AuditOperation,
    pub actor: String,
    pub tags: Vec<String>,
    pub outcome: AuditOutcome,
    pub detail: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(operation: AuditOperation, actor: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            operation,
            actor: actor.into(),
            tags: Vec::new(),
            outcome,
            detail: None,
        }
    }

    pub fn with_tag(mut self, tag: impl ToString) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: String,
    pub operation: AuditOperation,
    pub actor: String,
    pub tags: Vec<String>,
    pub outcome: AuditOutcome,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    pub prev_entry_hash: String,
    pub entry_hash: String,
}

/// Field order here is the canonical hash layout.
#[derive(Serialize)]
struct HashInput<'a> {
    seq: u64,
    timestamp: &'a str,
    operation: AuditOperation,
    actor: &'a str,
    tags: &'a [String],
    outcome: AuditOutcome,
    detail: &'a Option<serde_json::Value>,
    prev_entry_hash: &'a str,
}

impl AuditEntry {
    /// Build an entry chained onto `prev_entry_hash`.
    pub fn chained(seq: u64, timestamp: String, event: AuditEvent, prev_entry_hash: &str) -> Self {
        let mut entry = AuditEntry {
            seq,
            timestamp,
            operation: event.operation,
            actor: event.actor,
            tags: event.tags,
            outcome: event.outcome,
            detail: event.detail,
            prev_entry_hash: prev_entry_hash.to_string(),
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();
        entry
    }

    /// Recompute the hash from the stored fields
    pub fn compute_hash(&self) -> String {
        let input = HashInput {
            seq: self.seq,
            timestamp: &self.timestamp,
            operation: self.operation,
            actor: &self.actor,
            tags: &self.tags,
            outcome: self.outcome,
            detail: &self.detail,
            prev_entry_hash: &self.prev_entry_hash,
        };
        // Serializing plain strings, integers and a Value cannot fail.
        let canonical = serde_json::to_vec(&input).unwrap_or_default();
        sha256_hex(&canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for op in [
            AuditOperation::Snapshot,
            AuditOperation::RestoreVerifyFail,
            AuditOperation::RestoreRollback,
        ] {
            assert_eq!(AuditOperation::parse(op.as_str()), Some(op));
            assert_eq!(serde_json::to_string(&op).unwrap(), format!("\"{}\"", op));
        }
        assert_eq!(AuditOutcome::parse("rolled-back"), Some(AuditOutcome::RolledBack));
        assert_eq!(AuditOutcome::parse("rolledback"), None);
    }

    #[test]
    fn test_hash_covers_detail() {
        let event = AuditEvent::new(AuditOperation::Snapshot, "ops", AuditOutcome::Committed)
            .with_detail(serde_json::json!({"reason": "upgrade"}));
        let mut entry = AuditEntry::chained(1, "2024-03-01T12:00:00.000Z".into(), event, GENESIS_HASH);
        assert_eq!(entry.compute_hash(), entry.entry_hash);
        entry.detail = Some(serde_json::json!({"reason": "downgrade"}));
        assert_ne!(entry.compute_hash(), entry.entry_hash);
    }
}

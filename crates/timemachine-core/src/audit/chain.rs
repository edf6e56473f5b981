use crate::audit::entry::{AuditEntry, GENESIS_HASH};
use serde::{Deserialize, Serialize};

/// Outcome of recomputing a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub entries_checked: usize,
    /// Sequence number of the first entry that does not check out
    pub broken_at: Option<u64>,
    pub reason: Option<String>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// Recompute the chain over `entries` in append order.
pub fn verify_entries(entries: &[AuditEntry]) -> ChainReport {
    let mut prev_hash = GENESIS_HASH;
    for (index, entry) in entries.iter().enumerate() {
        let expected_seq = index as u64 + 1;
        let problem = if entry.seq != expected_seq {
            Some(format!("expected seq {}, found {}", expected_seq, entry.seq))
        } else if entry.prev_entry_hash != prev_hash {
            Some("prev_entry_hash does not match previous entry".to_string())
        } else if entry.compute_hash() != entry.entry_hash {
            Some("entry_hash does not match entry fields".to_string())
        } else {
            None
        };

        if let Some(reason) = problem {
            return ChainReport {
                entries_checked: index + 1,
                broken_at: Some(entry.seq),
                reason: Some(format!("chain break at sequence {}: {}", entry.seq, reason)),
            };
        }
        prev_hash = &entry.entry_hash;
    }
    ChainReport {
        entries_checked: entries.len(),
        broken_at: None,
        reason: None,
    }
}

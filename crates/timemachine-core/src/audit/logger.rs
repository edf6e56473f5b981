use crate::audit::chain::{verify_entries, ChainReport};
use crate::audit::entry::{AuditEntry, AuditEvent, GENESIS_HASH};
use crate::audit::sink::AuditSink;
use crate::errors::{ExError, ExErrorKind, ExResult};
use crate::tag::{Clock, SystemClock};
use chrono::SecondsFormat;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct ChainHead {
    seq: u64,
    hash: String,
}

/// Owned, injectable audit logger.
///
/// The chain head is read from the sink on first append and tracked in
/// memory afterwards; the mutex serializes appends so sequence numbers stay
/// dense.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    head: Mutex<Option<ChainHead>>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            clock: Arc::new(SystemClock),
            head: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }

    /// Assign the next seq, chain, persist and return the stored entry.
    ///
    /// # Errors
    ///
    /// Whatever the sink reports; the chain head only advances once the
    /// sink has accepted the entry.
    pub fn append(&self, event: AuditEvent) -> ExResult<AuditEntry> {
        let mut head = self.head.lock().map_err(|_| {
            ExError::new(ExErrorKind::Internal).with_message("audit chain lock poisoned")
        })?;

        let current = match head.as_ref() {
            Some(h) => h.clone(),
            None => match self.sink.last()? {
                Some(last) => ChainHead {
                    seq: last.seq,
                    hash: last.entry_hash,
                },
                None => ChainHead {
                    seq: 0,
                    hash: GENESIS_HASH.to_string(),
                },
            },
        };

        let timestamp = self
            .clock
            .now()
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let entry = AuditEntry::chained(current.seq + 1, timestamp, event, &current.hash);
        self.sink.append(&entry)?;

        tracing::debug!(
            audit_seq = entry.seq,
            operation = entry.operation.as_str(),
            outcome = entry.outcome.as_str(),
            "audit entry appended"
        );

        *head = Some(ChainHead {
            seq: entry.seq,
            hash: entry.entry_hash.clone(),
        });
        Ok(entry)
    }

    pub fn entries(&self) -> ExResult<Vec<AuditEntry>> {
        self.sink.entries()
    }

    /// True when every stored entry recomputes and links correctly.
    pub fn verify_chain(&self) -> ExResult<bool> {
        Ok(self.chain_report()?.is_intact())
    }

    /// Like [`verify_chain`](Self::verify_chain), naming the first break.
    pub fn chain_report(&self) -> ExResult<ChainReport> {
        let entries = self.sink.entries()?;
        let report = verify_entries(&entries);
        if let Some(reason) = &report.reason {
            tracing::warn!(broken_at = ?report.broken_at, reason = reason.as_str(), "audit chain broken");
        }
        Ok(report)
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

use crate::audit::entry::AuditEntry;
use crate::errors::{ExError, ExErrorKind, ExResult};
use std::sync::Mutex;

/// Where audit entries are persisted.
///
/// Implementations must hand entries back in append order with every
/// hashed field intact.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> ExResult<()>;

    fn entries(&self) -> ExResult<Vec<AuditEntry>>;

    fn last(&self) -> ExResult<Option<AuditEntry>>;
}

/// Process-local sink for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    /// `(appends still accepted, appends then refused)`
    refusals: Mutex<(usize, usize)>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite a stored entry in place, bypassing the logger. Exists to
    /// simulate tampering.
    pub fn tamper(&self, seq: u64, f: impl FnOnce(&mut AuditEntry)) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.iter_mut().find(|e| e.seq == seq) {
                f(entry);
            }
        }
    }

    /// Accept the next `accepted` appends, then refuse `refused` of them
    /// with a persistence error.
    pub fn fail_after(&self, accepted: usize, refused: usize) {
        if let Ok(mut plan) = self.refusals.lock() {
            *plan = (accepted, refused);
        }
    }

    fn refuse_next(&self) -> ExResult<bool> {
        let mut plan = self.refusals.lock().map_err(|_| Self::poisoned())?;
        let (accepted, refused) = &mut *plan;
        if *accepted > 0 {
            *accepted -= 1;
            Ok(false)
        } else if *refused > 0 {
            *refused -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn poisoned() -> ExError {
        ExError::new(ExErrorKind::Internal).with_message("audit sink lock poisoned")
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &AuditEntry) -> ExResult<()> {
        if self.refuse_next()? {
            return Err(ExError::new(ExErrorKind::Persistence)
                .with_op("audit_append")
                .with_audit_seq(entry.seq)
                .with_message("injected audit sink failure"));
        }
        self.entries
            .lock()
            .map_err(|_| Self::poisoned())?
            .push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> ExResult<Vec<AuditEntry>> {
        Ok(self.entries.lock().map_err(|_| Self::poisoned())?.clone())
    }

    fn last(&self) -> ExResult<Option<AuditEntry>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| Self::poisoned())?
            .last()
            .cloned())
    }
}

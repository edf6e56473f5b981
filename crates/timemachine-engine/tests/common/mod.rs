// Shared harness: a TimeMachine over in-memory backends, ledger and audit
// sink, with a pinned clock.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use timemachine_core::audit::{AuditLogger, AuditOperation, AuditOutcome, MemoryAuditSink};
use timemachine_core::backend::{MemoryLargeObjectBackend, MemoryTextBackend};
use timemachine_core::config::TimeMachineConfig;
use timemachine_core::context::OperationContext;
use timemachine_core::errors::ExResult;
use timemachine_core::ledger::MemoryLedger;
use timemachine_core::tag::FixedClock;
use timemachine_engine::{TimeMachine, TimeMachineParts};

pub struct Harness {
    pub tm: TimeMachine,
    pub text: Arc<MemoryTextBackend>,
    pub large: Arc<MemoryLargeObjectBackend>,
    pub ledger: Arc<MemoryLedger>,
    pub sink: Arc<MemoryAuditSink>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn ctx(&self) -> OperationContext {
        OperationContext::new("tester")
    }

    /// `(operation, outcome)` of every audit entry, in append order
    pub fn audit_trail(&self) -> Vec<(AuditOperation, AuditOutcome)> {
        self.tm
            .audit()
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| (e.operation, e.outcome))
            .collect()
    }

    /// Content digest of both backends' checked-out state
    pub fn workspace_digest(&self) -> (String, String) {
        (self.text.workspace_digest(), self.large.workspace_digest())
    }
}

pub fn default_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("config/app.yaml", "mode: a\n"),
        ("scripts/deploy.sh", "#!/bin/sh\necho deploy\n"),
        ("README.md", "not tracked\n"),
    ]
}

pub fn harness() -> Harness {
    harness_with(TimeMachineConfig::default())
}

pub fn harness_with(config: TimeMachineConfig) -> Harness {
    try_harness(config).unwrap()
}

pub fn try_harness(config: TimeMachineConfig) -> ExResult<Harness> {
    let text = Arc::new(MemoryTextBackend::with_files(default_files()));
    let large = Arc::new(MemoryLargeObjectBackend::with_objects([
        ("models/classifier.bin", b"weights-v1".to_vec()),
        ("data/train.parquet", b"rows-v1".to_vec()),
    ]));
    let ledger = Arc::new(MemoryLedger::new());
    let sink = Arc::new(MemoryAuditSink::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ));

    let tm = TimeMachine::new(TimeMachineParts {
        config,
        text: text.clone(),
        large: large.clone(),
        ledger: ledger.clone(),
        audit: AuditLogger::new(sink.clone()).with_clock(clock.clone()),
        clock: clock.clone(),
        workdir: None,
    })?;

    Ok(Harness {
        tm,
        text,
        large,
        ledger,
        sink,
        clock,
    })
}

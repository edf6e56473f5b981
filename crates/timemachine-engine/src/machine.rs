//! The `TimeMachine` facade.
//!
//! Owns one instance of every collaborator. Nothing here is global: tests
//! build a facade over in-memory backends and an in-memory audit sink,
//! production code calls [`TimeMachine::open`] on a repository root.

use crate::commands::{diff, list, restore, snapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use timemachine_core::audit::AuditLogger;
use timemachine_core::backend::{LargeObjectBackend, TextBackend};
use timemachine_core::config::TimeMachineConfig;
use timemachine_core::context::OperationContext;
use timemachine_core::errors::ExResult;
use timemachine_core::ledger::SnapshotLedger;
use timemachine_core::model::{DiffReport, RestoreResult, SnapshotRecord};
use timemachine_core::paths;
use timemachine_core::tag::{Clock, SystemClock};
use timemachine_store::config::load_config;
use timemachine_store::{db, DvcBackend, GitBackend, SqliteAuditSink, SqliteLedger, StateLayout};

/// Collaborators a [`TimeMachine`] is assembled from
pub struct TimeMachineParts {
    pub config: TimeMachineConfig,
    pub text: Arc<dyn TextBackend>,
    pub large: Arc<dyn LargeObjectBackend>,
    pub ledger: Arc<dyn SnapshotLedger>,
    pub audit: AuditLogger,
    pub clock: Arc<dyn Clock>,
    /// Directory external healthchecks run in
    pub workdir: Option<PathBuf>,
}

pub struct TimeMachine {
    pub(crate) config: TimeMachineConfig,
    pub(crate) text: Arc<dyn TextBackend>,
    pub(crate) large: Arc<dyn LargeObjectBackend>,
    pub(crate) ledger: Arc<dyn SnapshotLedger>,
    pub(crate) audit: AuditLogger,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) workdir: Option<PathBuf>,
}

impl TimeMachine {
    /// Assemble a facade, validating the configuration first.
    ///
    /// # Errors
    ///
    /// `ProtectedPathViolation` when tracked or large paths reach into
    /// protected paths, `InvalidConfig` for any other validation failure.
    pub fn new(parts: TimeMachineParts) -> ExResult<Self> {
        let config = &parts.config;
        paths::ensure_disjoint(&config.tracked_paths, &config.protected_paths)?;
        paths::ensure_disjoint(&config.large_paths, &config.protected_paths)?;
        config.validate()?;
        Ok(Self {
            config: parts.config,
            text: parts.text,
            large: parts.large,
            ledger: parts.ledger,
            audit: parts.audit,
            clock: parts.clock,
            workdir: parts.workdir,
        })
    }

    /// Open the repository at `root` with git, DVC and the SQLite state
    /// database under the configured state directory.
    ///
    /// # Errors
    ///
    /// Configuration errors, `BackendUnavailable` when `root` is not a git
    /// work tree, and persistence errors from the state database.
    pub fn open(root: &Path) -> ExResult<Self> {
        let config = load_config(root)?;
        let layout = StateLayout::new(root, &config.state_dir);

        let git = GitBackend::open(root, config.backend_timeout())?;
        git.exclude(&layout.relative_state_dir())?;
        let dvc = DvcBackend::new(
            &layout,
            config.backend_timeout(),
            config.large_objects.enabled,
        );

        let ledger = SqliteLedger::new(db::open_migrated(layout.database())?);
        let sink = SqliteAuditSink::new(db::open_migrated(layout.database())?);

        tracing::debug!(
            root = %root.display(),
            large_objects = dvc.is_enabled(),
            "time machine opened"
        );

        Self::new(TimeMachineParts {
            config,
            text: Arc::new(git),
            large: Arc::new(dvc),
            ledger: Arc::new(ledger),
            audit: AuditLogger::new(Arc::new(sink)),
            clock: Arc::new(SystemClock),
            workdir: Some(root.to_path_buf()),
        })
    }

    pub fn config(&self) -> &TimeMachineConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Record a new logical version across both backends.
    ///
    /// # Errors
    ///
    /// See [`snapshot::snapshot`].
    pub fn snapshot(
        &self,
        ctx: &OperationContext,
        reason: &str,
        risk_level: &str,
    ) -> ExResult<SnapshotRecord> {
        snapshot::snapshot(self, ctx, reason, risk_level)
    }

    /// Snapshot records, newest first, optionally of one category.
    ///
    /// # Errors
    ///
    /// See [`list::list`].
    pub fn list(
        &self,
        ctx: &OperationContext,
        category: Option<&str>,
    ) -> ExResult<Vec<SnapshotRecord>> {
        list::list(self, ctx, category)
    }

    /// Merged change report between two versions.
    ///
    /// # Errors
    ///
    /// See [`diff::diff`].
    pub fn diff(&self, ctx: &OperationContext, tag_a: &str, tag_b: &str) -> ExResult<DiffReport> {
        diff::diff(self, ctx, tag_a, tag_b)
    }

    /// Check out a version in both backends, verifying when required.
    ///
    /// # Errors
    ///
    /// See [`restore::restore`].
    pub fn restore(
        &self,
        ctx: &OperationContext,
        tag: &str,
        options: restore::RestoreOptions,
    ) -> ExResult<RestoreResult> {
        restore::restore(self, ctx, tag, options)
    }
}

impl std::fmt::Debug for TimeMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeMachine")
            .field("text", &self.text.name())
            .field("large", &self.large.name())
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

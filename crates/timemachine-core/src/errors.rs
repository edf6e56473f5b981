use crate::model::{SnapshotRecord, VerificationResult};
use thiserror::Error;
use timemachine_core_types::RequestId;

/// Result type alias using TimeMachineError
pub type Result<T> = std::result::Result<T, TimeMachineError>;

/// Result type alias using the structured error facility
pub type ExResult<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that callers can match on without
/// parsing messages. Validation kinds are raised before any backend mutation;
/// `PartialCommit` and `RollbackFailed` are the two kinds that require an
/// operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation (rejected before any backend mutation)
    InvalidCategory,
    MalformedTag,
    ProtectedPathViolation,
    InvalidConfig,
    DirtyWorkspace,

    // Resolution
    UnknownVersion,
    IncompleteVersion,

    // Protocol outcomes
    StagingFailed,
    PartialCommit,
    VerificationFailed,
    RollbackFailed,
    Cancelled,

    // Backend-surfaced
    BackendUnavailable,
    BackendTimeout,

    // Host coordination
    Locked,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidCategory => "ERR_INVALID_CATEGORY",
            ExErrorKind::MalformedTag => "ERR_MALFORMED_TAG",
            ExErrorKind::ProtectedPathViolation => "ERR_PROTECTED_PATH_VIOLATION",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::DirtyWorkspace => "ERR_DIRTY_WORKSPACE",
            ExErrorKind::UnknownVersion => "ERR_UNKNOWN_VERSION",
            ExErrorKind::IncompleteVersion => "ERR_INCOMPLETE_VERSION",
            ExErrorKind::StagingFailed => "ERR_STAGING_FAILED",
            ExErrorKind::PartialCommit => "ERR_PARTIAL_COMMIT",
            ExErrorKind::VerificationFailed => "ERR_VERIFICATION_FAILED",
            ExErrorKind::RollbackFailed => "ERR_ROLLBACK_FAILED",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::BackendUnavailable => "ERR_BACKEND_UNAVAILABLE",
            ExErrorKind::BackendTimeout => "ERR_BACKEND_TIMEOUT",
            ExErrorKind::Locked => "ERR_LOCKED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether this kind is a validation rejection (nothing was attempted)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExErrorKind::InvalidCategory
                | ExErrorKind::MalformedTag
                | ExErrorKind::ProtectedPathViolation
                | ExErrorKind::InvalidConfig
                | ExErrorKind::DirtyWorkspace
        )
    }

    /// Whether this kind is raised by a backend call
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            ExErrorKind::BackendUnavailable | ExErrorKind::BackendTimeout
        )
    }
}

/// Canonical structured error type
///
/// Every surfaced failure names the Version Tag(s) involved and the audit
/// sequence number(s) written for it, so it can be traced end-to-end
/// without re-deriving backend state.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    backend: Option<String>,
    tags: Vec<String>,
    audit_seqs: Vec<u64>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
    record: Option<Box<SnapshotRecord>>,
    verification: Option<Box<VerificationResult>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            backend: None,
            tags: Vec::new(),
            audit_seqs: Vec::new(),
            request_id: None,
            message: String::new(),
            source: None,
            record: None,
            verification: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Name the backend that raised the error
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Add a Version Tag involved in the failure (duplicates are ignored)
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Add the sequence number of an audit entry written for this failure
    pub fn with_audit_seq(mut self, seq: u64) -> Self {
        if !self.audit_seqs.contains(&seq) {
            self.audit_seqs.push(seq);
        }
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach the Snapshot Record left behind by a partial commit
    pub fn with_record(mut self, record: SnapshotRecord) -> Self {
        self.record = Some(Box::new(record));
        self
    }

    /// Attach the Verification Result that caused a rollback
    pub fn with_verification(mut self, result: VerificationResult) -> Self {
        self.verification = Some(Box::new(result));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the backend name, if any
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    /// Version Tags involved in the failure
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Audit sequence numbers of the entries written for the failure
    pub fn audit_seqs(&self) -> &[u64] {
        &self.audit_seqs
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Snapshot Record carried by a `PartialCommit` error
    pub fn record(&self) -> Option<&SnapshotRecord> {
        self.record.as_deref()
    }

    /// Verification Result carried by a `VerificationFailed` error
    pub fn verification(&self) -> Option<&VerificationResult> {
        self.verification.as_deref()
    }

    /// True for outcomes that cannot self-heal and need manual remediation
    pub fn requires_operator(&self) -> bool {
        matches!(
            self.kind,
            ExErrorKind::PartialCommit | ExErrorKind::RollbackFailed
        )
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(backend) = &self.backend {
            write!(f, " (backend: {})", backend)?;
        }
        if !self.tags.is_empty() {
            write!(f, " (tags: {})", self.tags.join(", "))?;
        }
        if !self.audit_seqs.is_empty() {
            let seqs: Vec<String> = self.audit_seqs.iter().map(|s| s.to_string()).collect();
            write!(f, " (audit_seq: {})", seqs.join(", "))?;
        }
        if let Some(source) = &self.source {
            write!(f, " <- {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for the pure parts of the kernel
///
/// These are raised by tag parsing, configuration and path validation,
/// before anything touches a backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeMachineError {
    /// Category is not in the configured set
    #[error("Invalid category '{category}' (known: {known:?})")]
    InvalidCategory { category: String, known: Vec<String> },

    /// Risk level is not mapped to any category
    #[error("Unknown risk level '{risk_level}'")]
    UnknownRiskLevel { risk_level: String },

    /// Tag string does not follow `{category}/{timestamp}-{disambiguator}`
    #[error("Malformed tag '{input}': {reason}")]
    MalformedTag { input: String, reason: String },

    /// Tracked paths overlap protected paths
    #[error("Tracked paths overlap protected paths: {}", overlaps.join(", "))]
    ProtectedPathViolation { overlaps: Vec<String> },

    /// Configuration is invalid
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Glob pattern does not parse
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Serialization failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl From<TimeMachineError> for ExError {
    fn from(err: TimeMachineError) -> Self {
        match err {
            TimeMachineError::InvalidCategory { category, known } => {
                ExError::new(ExErrorKind::InvalidCategory).with_message(format!(
                    "Category '{}' is not configured (known: {})",
                    category,
                    known.join(", ")
                ))
            }

            TimeMachineError::UnknownRiskLevel { risk_level } => {
                ExError::new(ExErrorKind::InvalidCategory)
                    .with_message(format!("Risk level '{}' maps to no category", risk_level))
            }

            TimeMachineError::MalformedTag { input, reason } => {
                ExError::new(ExErrorKind::MalformedTag)
                    .with_tag(input)
                    .with_message(reason)
            }

            TimeMachineError::ProtectedPathViolation { overlaps } => {
                ExError::new(ExErrorKind::ProtectedPathViolation)
                    .with_message(format!("Overlapping patterns: {}", overlaps.join(", ")))
            }

            TimeMachineError::InvalidConfig { reason } => {
                ExError::new(ExErrorKind::InvalidConfig).with_message(reason)
            }

            TimeMachineError::InvalidPattern { pattern, reason } => {
                ExError::new(ExErrorKind::InvalidConfig)
                    .with_message(format!("Invalid path pattern '{}': {}", pattern, reason))
            }

            TimeMachineError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
        }
    }
}

/// Conversion from serde_json::Error to TimeMachineError
impl From<serde_json::Error> for TimeMachineError {
    fn from(err: serde_json::Error) -> Self {
        TimeMachineError::Serialization {
            message: err.to_string(),
        }
    }
}

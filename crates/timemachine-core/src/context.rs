//! Per-operation context: who is acting, correlation id, cancellation.

use crate::errors::{ExError, ExErrorKind, ExResult};
use timemachine_core_types::RequestId;
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation shared between a caller and an operation;
/// clones observe the same cancellation
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// `Cancelled` if the token has fired.
    ///
    /// # Errors
    ///
    /// `ExErrorKind::Cancelled` once `cancel` has been called.
    pub fn check(&self, op: &str) -> ExResult<()> {
        if self.is_cancelled() {
            Err(ExError::new(ExErrorKind::Cancelled)
                .with_op(op)
                .with_message("operation cancelled"))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationContext {
    pub actor: String,
    pub request_id: RequestId,
    pub cancel: CancelToken,
}

impl OperationContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            request_id: RequestId::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reuse a correlation id handed over by the caller
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_across_clones() {
        let token = CancelToken::new();
        let ctx = OperationContext::new("tester").with_cancel(token.clone());
        assert!(ctx.cancel.check("snapshot").is_ok());
        token.cancel();
        let err = ctx.cancel.check("snapshot").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Cancelled);
    }

    #[test]
    fn test_request_id_can_be_supplied() {
        let id: RequestId = "0190f5a2-7b3c-7def-8123-456789abcdef".parse().unwrap();
        let ctx = OperationContext::new("tester").with_request_id(id);
        assert_eq!(ctx.request_id, id);
    }
}

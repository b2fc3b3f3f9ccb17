//! Error types for the per-class concurrency limiter.

/// Errors raised by [`ClassLimiter::run`](crate::ClassLimiter::run).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConcurrencyError<E> {
    /// The operation exceeded its per-task timeout while running.
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The wrapped operation itself returned an error.
    #[error("operation failed: {0}")]
    Inner(#[from] E),
}

impl<E> ConcurrencyError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConcurrencyError::Timeout { .. })
    }
}

//! The error taxonomy shared across every streamvault crate (spec §7).
//!
//! [`ExportError<E>`] wraps an application-specific error `E` the way the
//! teacher workspace's `ResilienceError<E>` wraps layer-rejection reasons:
//! callers get one error type to match on regardless of which component
//! raised it, and no manual `From` boilerplate is needed to compose
//! components together.
//!
//! # Taxonomy
//!
//! - [`ExportError::Transient`] — retryable (network, 5xx, rate-limited).
//!   Handled entirely inside [`streamvault-retry`](https://docs.rs/streamvault-retry)
//!   and never surfaces above the paginated source.
//! - [`ExportError::SoftItem`] — scoped to one item (transform error, 404).
//!   Logged to the checkpoint and the item is skipped; the export continues.
//! - [`ExportError::Fatal`] — unrecoverable for the run (auth failure, disk
//!   write failure). Propagates to the orchestrator, which cancels and stops
//!   gracefully with the checkpoint preserved.
//! - [`ExportError::ParseError`] — header parse failure. Never propagates;
//!   increments an internal counter and may trigger fallback mode.
//! - [`ExportError::Cancelled`] — cooperative termination, not an error.

use std::fmt;

/// A unified error type wrapping every streamvault component's failures.
#[derive(Debug, Clone)]
pub enum ExportError<E> {
    /// Retryable failure; `attempt` is the 1-based attempt number that failed.
    Transient { attempt: usize, source: E },

    /// Failure scoped to a single item; the export continues past it.
    SoftItem {
        object_id: Option<String>,
        source: E,
    },

    /// Unrecoverable failure that aborts the current run.
    Fatal { source: E },

    /// A rate-limit header failed to parse. Carries the raw header value
    /// that could not be interpreted.
    ParseError { header: &'static str, raw: String },

    /// Cooperative cancellation; not a failure.
    Cancelled,
}

impl<E> fmt::Display for ExportError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Transient { attempt, source } => {
                write!(f, "transient error on attempt {attempt}: {source}")
            }
            ExportError::SoftItem { object_id, source } => match object_id {
                Some(id) => write!(f, "item {id} failed: {source}"),
                None => write!(f, "item failed: {source}"),
            },
            ExportError::Fatal { source } => write!(f, "fatal error: {source}"),
            ExportError::ParseError { header, raw } => {
                write!(f, "failed to parse header {header:?} (value {raw:?})")
            }
            ExportError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl<E> std::error::Error for ExportError<E> where E: std::error::Error {}

impl<E> ExportError<E> {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExportError::Transient { .. })
    }

    pub fn is_soft_item(&self) -> bool {
        matches!(self, ExportError::SoftItem { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExportError::Fatal { .. })
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, ExportError::ParseError { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }

    /// Extracts the wrapped application error, if any (`ParseError` and
    /// `Cancelled` carry no application error).
    pub fn into_source(self) -> Option<E> {
        match self {
            ExportError::Transient { source, .. } => Some(source),
            ExportError::SoftItem { source, .. } => Some(source),
            ExportError::Fatal { source } => Some(source),
            ExportError::ParseError { .. } | ExportError::Cancelled => None,
        }
    }

    /// Maps the wrapped application error using `f`.
    pub fn map_source<F, T>(self, f: F) -> ExportError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            ExportError::Transient { attempt, source } => ExportError::Transient {
                attempt,
                source: f(source),
            },
            ExportError::SoftItem { object_id, source } => ExportError::SoftItem {
                object_id,
                source: f(source),
            },
            ExportError::Fatal { source } => ExportError::Fatal { source: f(source) },
            ExportError::ParseError { header, raw } => ExportError::ParseError { header, raw },
            ExportError::Cancelled => ExportError::Cancelled,
        }
    }
}

//! Errors raised by [`BoundedQueue`](crate::BoundedQueue).

use thiserror::Error;

/// The queue has been closed.
///
/// Returned by `enqueue` immediately, and by `dequeue` once the backlog
/// has fully drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is closed")]
pub struct Closed;

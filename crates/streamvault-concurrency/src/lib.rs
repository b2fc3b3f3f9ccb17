//! Per-operation-class concurrency limiting for the streamvault export
//! pipeline (component C4).
//!
//! [`ClassLimiter`] maps each [`OperationClass`](streamvault_core::model::OperationClass)
//! to its own counting semaphore so that, say, a burst of `Databases` calls
//! cannot starve `Pages` calls of their own budget.

pub mod error;
pub mod events;
pub mod limiter;

pub use error::ConcurrencyError;
pub use events::ConcurrencyEvent;
pub use limiter::{ClassLimiter, ClassLimiterStats};

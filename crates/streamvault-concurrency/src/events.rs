//! Events emitted by [`ClassLimiter`](crate::ClassLimiter).

use std::time::{Duration, Instant};
use streamvault_core::events::ExportEvent;
use streamvault_core::model::OperationClass;

#[derive(Debug, Clone)]
pub enum ConcurrencyEvent {
    /// A permit was granted for `class` after waiting `waited`.
    PermitGranted {
        timestamp: Instant,
        class: OperationClass,
        waited: Duration,
        active: usize,
    },
    /// An operation completed (successfully or not) and released its permit.
    PermitReleased {
        timestamp: Instant,
        class: OperationClass,
        duration: Duration,
        failed: bool,
    },
    /// An operation was aborted by its per-task timeout.
    TimedOut {
        timestamp: Instant,
        class: OperationClass,
        timeout: Duration,
    },
    /// `set_limit` changed a class's configured concurrency.
    LimitChanged {
        timestamp: Instant,
        class: OperationClass,
        from: usize,
        to: usize,
    },
}

impl ExportEvent for ConcurrencyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ConcurrencyEvent::PermitGranted { .. } => "permit_granted",
            ConcurrencyEvent::PermitReleased { .. } => "permit_released",
            ConcurrencyEvent::TimedOut { .. } => "timed_out",
            ConcurrencyEvent::LimitChanged { .. } => "limit_changed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ConcurrencyEvent::PermitGranted { timestamp, .. }
            | ConcurrencyEvent::PermitReleased { timestamp, .. }
            | ConcurrencyEvent::TimedOut { timestamp, .. }
            | ConcurrencyEvent::LimitChanged { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        "streamvault-concurrency"
    }
}

//! Shared infrastructure for the streamvault export pipeline.
//!
//! This crate has no opinion about HTTP, serialization, or any particular
//! remote API. It provides the data model, event system, and error taxonomy
//! that every other streamvault crate builds on.

pub mod clock;
pub mod error;
pub mod events;
pub mod model;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::ExportError;
pub use events::{EventListener, EventListeners, ExportEvent, FnListener};
pub use model::{ExportItem, OperationClass};

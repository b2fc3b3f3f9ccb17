//! Adaptive request admission control for the streamvault export pipeline.
//!
//! [`AdaptiveController`] combines a sliding-window sample ring and
//! rate-limit header tracker (from `streamvault-ratewindow`) with an
//! AIMD-style backoff multiplier to decide when the pipeline may issue its
//! next request, and how many requests it should keep in flight.

mod config;
mod controller;
mod events;

pub use config::{ControllerConfig, ControllerConfigBuilder, ErrorSeverity};
pub use controller::{AdaptiveController, ControllerStats};
pub use events::ControllerEvent;

//! Sliding-window request sampling (C1) and rate-limit header tracking (C2)
//! for the streamvault export pipeline.
//!
//! Both components are plain, externally-synchronized state: neither owns a
//! lock or a background task. `streamvault-controller` composes them behind
//! a `Mutex` and drives the wait-time and concurrency adjustment formulas on
//! top.

pub mod error;
pub mod rate_limit_state;
pub mod sample_ring;

pub use error::HeaderParseError;
pub use rate_limit_state::{RateLimitState, RateLimitTracker, ResetInterpretation};
pub use sample_ring::SampleRing;

//! Wires the adaptive controller, per-class limiter, checkpoint tracker,
//! and a fixed, ordered list of sections into one resumable export run
//! (component C11).
//!
//! [`Orchestrator::run`] drives spec §4.11 end to end: it resumes from a
//! checkpoint if one exists, runs each not-yet-completed [`Section`] in the
//! order it was given, and finalizes by removing the checkpoint on success
//! or preserving it on interruption or fatal error.

mod error;
mod orchestrator;
mod section;

pub use error::{BoxError, OrchestratorError};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunOutcome, SectionState};
pub use section::{PaginatedSection, Section, SectionConfig, SectionError};

//! The orchestrator's own error type, composing section and checkpoint
//! failures into the run-level outcome described in spec §7.

use thiserror::Error;

use streamvault_checkpoint::CheckpointError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failure that aborts the whole run (spec's `Fatal` class, §7).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A section propagated a fatal error; the run stops with the
    /// checkpoint preserved so the next invocation can resume.
    #[error("section {section:?} failed fatally: {source}")]
    Fatal { section: String, source: BoxError },

    /// The checkpoint tracker itself failed to load, save, or remove its
    /// file. Always fatal: without a working checkpoint there is no safe
    /// way to resume or to finalize.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

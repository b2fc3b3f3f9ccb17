use thiserror::Error;

/// Failures raised by [`crate::tracker::CheckpointTracker`].
///
/// All of these are `Fatal` in the taxonomy terms used by the rest of the
/// workspace (spec §7): a checkpoint write failure aborts the run.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write checkpoint file: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to rename checkpoint temp file into place: {0}")]
    Rename(#[source] std::io::Error),

    #[error("failed to remove checkpoint file: {0}")]
    Remove(#[source] std::io::Error),

    #[error("failed to parse checkpoint JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to serialize checkpoint JSON: {0}")]
    Serialize(#[source] serde_json::Error),
}

//! The persisted checkpoint document (spec §3).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded failure, kept for post-mortem/debugging.
///
/// The owning [`Checkpoint`]'s `errors` list is capped at
/// [`Checkpoint::MAX_ERRORS`] (default 100); the oldest record is dropped on
/// overflow so the file never grows unbounded across a long run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub object_id: Option<String>,
    pub message: String,
    pub retry_count: u32,
}

/// Durable progress record for one export run.
///
/// Serialized as UTF-8 JSON at `<output_dir>/.<export_id>.checkpoint.json`
/// (spec §6). Mutated only by [`crate::tracker::CheckpointTracker`], which
/// enforces the single-writer discipline the orchestrator relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub export_id: String,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub last_processed_id: Option<String>,
    pub processed_count: u64,
    pub total_estimate: u64,
    pub completed_sections: Vec<String>,
    pub current_section: String,
    pub output_path: String,
    pub errors: VecDeque<ErrorRecord>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Checkpoint {
    /// Default cap on the `errors` ring; overridable via
    /// [`crate::tracker::CheckpointConfig::max_errors`].
    pub const DEFAULT_MAX_ERRORS: usize = 100;

    pub fn new(export_id: impl Into<String>, output_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            export_id: export_id.into(),
            start_time: now,
            last_update: now,
            last_processed_id: None,
            processed_count: 0,
            total_estimate: 0,
            completed_sections: Vec::new(),
            current_section: String::new(),
            output_path: output_path.into(),
            errors: VecDeque::new(),
            metadata: HashMap::new(),
        }
    }
}

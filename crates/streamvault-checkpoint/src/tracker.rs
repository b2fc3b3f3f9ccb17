//! Durable checkpoint tracker (component C8).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::CheckpointError;
use crate::model::{Checkpoint, ErrorRecord};

/// Tunables for [`CheckpointTracker`].
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub auto_save_interval: Duration,
    pub max_errors: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            auto_save_interval: Duration::from_millis(30_000),
            max_errors: Checkpoint::DEFAULT_MAX_ERRORS,
        }
    }
}

struct State {
    checkpoint: Checkpoint,
    dirty: bool,
    ever_saved: bool,
}

/// Single-writer checkpoint tracker (spec §4.8).
///
/// Every mutator marks the in-memory document dirty; [`save`](Self::save)
/// only touches disk when there is something new to persist, or on the very
/// first call. Persistence goes through a sibling `<path>.tmp` file and an
/// atomic rename so a reader never observes a half-written document.
pub struct CheckpointTracker {
    path: PathBuf,
    max_errors: usize,
    state: Mutex<State>,
    auto_save_interval: Duration,
    auto_save_task: RwLock<Option<JoinHandle<()>>>,
}

impl CheckpointTracker {
    pub fn new(
        path: impl Into<PathBuf>,
        export_id: impl Into<String>,
        output_path: impl Into<String>,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            path: path.into(),
            max_errors: config.max_errors,
            state: Mutex::new(State {
                checkpoint: Checkpoint::new(export_id, output_path),
                dirty: false,
                ever_saved: false,
            }),
            auto_save_interval: config.auto_save_interval,
            auto_save_task: RwLock::new(None),
        }
    }

    /// Loads an existing checkpoint if present and parses cleanly; otherwise
    /// writes a fresh one. Returns whether an existing run is being resumed.
    pub async fn initialize(&self) -> Result<bool, CheckpointError> {
        match self.load().await? {
            Some(checkpoint) => {
                let mut state = self.state.lock().expect("checkpoint mutex poisoned");
                state.checkpoint = checkpoint;
                state.dirty = false;
                state.ever_saved = true;
                Ok(true)
            }
            None => {
                self.save().await?;
                Ok(false)
            }
        }
    }

    /// Records progress within the current section. Marks the document
    /// dirty; does not itself touch disk (spec §4.8).
    ///
    /// `last_id` is one worker's high-water mark; since worker pool members
    /// complete items out of enqueue order, the checkpoint keeps the max of
    /// every reported id rather than last-write-wins, so a slower worker's
    /// report can never regress the resume point a faster worker already
    /// established.
    pub fn update_progress(&self, section: &str, count_in_section: u64, last_id: Option<String>) {
        let mut state = self.state.lock().expect("checkpoint mutex poisoned");
        state.checkpoint.current_section = section.to_string();
        state.checkpoint.processed_count = count_in_section;
        if let Some(id) = last_id {
            state.checkpoint.last_processed_id = Some(match state.checkpoint.last_processed_id.take() {
                Some(current) => current.max(id),
                None => id,
            });
        }
        state.checkpoint.last_update = Utc::now();
        state.dirty = true;
    }

    /// Marks `name` completed (idempotent) and commits immediately.
    pub async fn complete_section(&self, name: &str) -> Result<(), CheckpointError> {
        {
            let mut state = self.state.lock().expect("checkpoint mutex poisoned");
            if !state.checkpoint.completed_sections.iter().any(|s| s == name) {
                state.checkpoint.completed_sections.push(name.to_string());
                state.checkpoint.last_update = Utc::now();
                state.dirty = true;
            }
        }
        self.save().await
    }

    /// Appends an [`ErrorRecord`], evicting the oldest once the ring exceeds
    /// `max_errors`.
    pub fn record_error(
        &self,
        operation: &str,
        message: &str,
        object_id: Option<String>,
        retry_count: u32,
    ) {
        let mut state = self.state.lock().expect("checkpoint mutex poisoned");
        state.checkpoint.errors.push_back(ErrorRecord {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            object_id,
            message: message.to_string(),
            retry_count,
        });
        while state.checkpoint.errors.len() > self.max_errors {
            state.checkpoint.errors.pop_front();
        }
        state.dirty = true;
    }

    pub fn set_total_estimate(&self, total: u64) {
        let mut state = self.state.lock().expect("checkpoint mutex poisoned");
        state.checkpoint.total_estimate = total;
        state.dirty = true;
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        let mut state = self.state.lock().expect("checkpoint mutex poisoned");
        state.checkpoint.metadata.insert(key.into(), value);
        state.dirty = true;
    }

    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.state
            .lock()
            .expect("checkpoint mutex poisoned")
            .checkpoint
            .metadata
            .get(key)
            .cloned()
    }

    /// A read-only snapshot of the current document. Never suspends.
    pub fn snapshot(&self) -> Checkpoint {
        self.state.lock().expect("checkpoint mutex poisoned").checkpoint.clone()
    }

    /// Persists the document if dirty, or unconditionally on first call.
    /// Writes `<path>.tmp` then renames it into place so readers never see a
    /// truncated file.
    pub async fn save(&self) -> Result<(), CheckpointError> {
        let (should_write, serialized) = {
            let mut state = self.state.lock().expect("checkpoint mutex poisoned");
            if !state.dirty && state.ever_saved {
                (false, String::new())
            } else {
                let serialized =
                    serde_json::to_string_pretty(&state.checkpoint).map_err(CheckpointError::Serialize)?;
                state.dirty = false;
                state.ever_saved = true;
                (true, serialized)
            }
        };

        if !should_write {
            return Ok(());
        }

        let tmp_path = tmp_path_for(&self.path);
        tokio::fs::write(&tmp_path, serialized.as_bytes())
            .await
            .map_err(CheckpointError::Write)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(CheckpointError::Rename)?;
        Ok(())
    }

    /// Loads and parses the checkpoint file, or `None` if it does not exist.
    pub async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                serde_json::from_str(&contents).map(Some).map_err(CheckpointError::Parse)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CheckpointError::Read(err)),
        }
    }

    /// Deletes the checkpoint file. A missing file is not an error.
    pub async fn remove(&self) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CheckpointError::Remove(err)),
        }
    }

    /// Starts the background auto-save timer. A second call while one is
    /// already running is a no-op.
    pub async fn start_auto_save(self: &Arc<Self>) {
        let mut task_lock = self.auto_save_task.write().await;
        if task_lock.is_some() {
            return;
        }

        let tracker = Arc::clone(self);
        let mut interval = tokio::time::interval(self.auto_save_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let handle = tokio::spawn(async move {
            loop {
                interval.tick().await;
                if let Err(_err) = tracker.save().await {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %_err, "checkpoint auto-save failed");
                }
            }
        });
        *task_lock = Some(handle);
    }

    /// Stops the auto-save timer, then performs one final [`save`](Self::save).
    pub async fn cleanup(&self) -> Result<(), CheckpointError> {
        let mut task_lock = self.auto_save_task.write().await;
        if let Some(task) = task_lock.take() {
            task.abort();
        }
        drop(task_lock);
        self.save().await
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_checkpoint_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join(".export-1.checkpoint.json")
    }

    #[tokio::test]
    async fn initialize_writes_a_fresh_file_when_none_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let tracker = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());

        let resumed = tracker.initialize().await.unwrap();
        assert!(!resumed);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn initialize_loads_an_existing_checkpoint_and_reports_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);

        let first = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());
        first.initialize().await.unwrap();
        first.update_progress("pages", 10, Some("page-10".to_string()));
        first.save().await.unwrap();

        let second = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());
        let resumed = second.initialize().await.unwrap();
        assert!(resumed);
        assert_eq!(second.snapshot().processed_count, 10);
        assert_eq!(second.snapshot().last_processed_id.as_deref(), Some("page-10"));
    }

    #[tokio::test]
    async fn save_is_a_no_op_when_not_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let tracker = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());
        tracker.initialize().await.unwrap();

        let modified_before = tokio::fs::metadata(&path).await.unwrap().modified().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.save().await.unwrap();
        let modified_after = tokio::fs::metadata(&path).await.unwrap().modified().unwrap();
        assert_eq!(modified_before, modified_after);
    }

    #[tokio::test]
    async fn update_progress_keeps_the_max_last_processed_id_across_out_of_order_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let tracker = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());
        tracker.initialize().await.unwrap();

        // A fast worker reports item-000050 first, then a slower worker
        // that was already in flight reports item-000010 afterward.
        tracker.update_progress("pages", 2, Some("item-000050".to_string()));
        tracker.update_progress("pages", 2, Some("item-000010".to_string()));

        assert_eq!(tracker.snapshot().last_processed_id.as_deref(), Some("item-000050"));
    }

    #[tokio::test]
    async fn complete_section_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let tracker = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());
        tracker.initialize().await.unwrap();

        tracker.complete_section("pages").await.unwrap();
        tracker.complete_section("pages").await.unwrap();
        assert_eq!(tracker.snapshot().completed_sections, vec!["pages".to_string()]);
    }

    #[tokio::test]
    async fn record_error_evicts_the_oldest_past_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let config = CheckpointConfig {
            max_errors: 3,
            ..CheckpointConfig::default()
        };
        let tracker = CheckpointTracker::new(&path, "export-1", "/out", config);
        tracker.initialize().await.unwrap();

        for i in 0..5 {
            tracker.record_error("fetch", &format!("err-{i}"), None, 0);
        }

        let errors = tracker.snapshot().errors;
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.front().unwrap().message, "err-2");
        assert_eq!(errors.back().unwrap().message, "err-4");
    }

    #[tokio::test]
    async fn remove_is_not_an_error_when_the_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let tracker = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());
        tracker.remove().await.unwrap();
    }

    #[tokio::test]
    async fn remove_deletes_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let tracker = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());
        tracker.initialize().await.unwrap();
        assert!(path.exists());

        tracker.remove().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn auto_save_persists_dirty_progress_on_a_timer() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let config = CheckpointConfig {
            auto_save_interval: Duration::from_millis(20),
            ..CheckpointConfig::default()
        };
        let tracker = Arc::new(CheckpointTracker::new(&path, "export-1", "/out", config));
        tracker.initialize().await.unwrap();
        tracker.update_progress("pages", 1, None);

        tracker.start_auto_save().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        tracker.cleanup().await.unwrap();

        let persisted = tracker.load().await.unwrap().unwrap();
        assert_eq!(persisted.processed_count, 1);
    }

    #[tokio::test]
    async fn cleanup_performs_a_final_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_checkpoint_path(&dir);
        let tracker = Arc::new(CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default()));
        tracker.initialize().await.unwrap();
        tracker.update_progress("pages", 7, None);

        tracker.cleanup().await.unwrap();
        let persisted = tracker.load().await.unwrap().unwrap();
        assert_eq!(persisted.processed_count, 7);
    }
}

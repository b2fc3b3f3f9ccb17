//! Worker pool draining the bounded queue into transform + sink (component C7).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use streamvault_checkpoint::CheckpointTracker;
use streamvault_concurrency::ClassLimiter;
use streamvault_core::model::{ExportItem, OperationClass};
use streamvault_queue::BoundedQueue;

use crate::executor::Executor;
use crate::traits::{Sink, Transform};

/// A failure that should abort the whole run, raised by a sink write.
///
/// Transform failures never reach this type: they are scoped to one item
/// and recorded on the checkpoint instead (spec's `SoftItem` class).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sink write failed: {0}")]
    Sink(String),
}

/// Tunables for a [`WorkerPool`] run.
pub struct WorkerPoolConfig {
    /// Number of long-lived worker loops; normally
    /// `controller.recommended_concurrency()`.
    pub worker_count: usize,
    /// Per-item timeout raced against the transform call.
    pub timeout: Option<Duration>,
}

/// `N` long-lived workers draining one [`BoundedQueue`], each looping
/// dequeue → transform (under a [`ClassLimiter`] permit) → sink write →
/// checkpoint progress update.
///
/// Generalizes the one-shot "spawn this unit of work on an executor" pattern
/// into "drain a shared queue with N worker loops spawned on an executor",
/// so callers can still swap in a dedicated runtime via a custom
/// [`Executor`] impl.
pub struct WorkerPool<E> {
    executor: E,
}

impl<E: Executor> WorkerPool<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Spawns `config.worker_count` workers and returns immediately; join
    /// the returned handles to wait for the pool to drain and exit.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<P, T, S>(
        &self,
        config: WorkerPoolConfig,
        queue: Arc<BoundedQueue<ExportItem<P>>>,
        limiter: Arc<ClassLimiter>,
        transform: Arc<T>,
        sink: Arc<S>,
        checkpoint: Arc<CheckpointTracker>,
        section: String,
        class_of: impl Fn(&ExportItem<P>) -> OperationClass + Send + Sync + 'static,
        cancellation: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<Result<(), PipelineError>>>
    where
        P: Send + Sync + 'static,
        T: Transform<P> + 'static,
        S: Sink + 'static,
    {
        let processed = Arc::new(AtomicU64::new(0));
        let class_of = Arc::new(class_of);

        (0..config.worker_count)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let limiter = Arc::clone(&limiter);
                let transform = Arc::clone(&transform);
                let sink = Arc::clone(&sink);
                let checkpoint = Arc::clone(&checkpoint);
                let section = section.clone();
                let class_of = Arc::clone(&class_of);
                let cancellation = cancellation.clone();
                let processed = Arc::clone(&processed);
                let timeout = config.timeout;

                self.executor.spawn(async move {
                    worker_loop(
                        queue,
                        limiter,
                        transform,
                        sink,
                        checkpoint,
                        section,
                        class_of,
                        timeout,
                        cancellation,
                        processed,
                    )
                    .await
                })
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop<P, T, S>(
    queue: Arc<BoundedQueue<ExportItem<P>>>,
    limiter: Arc<ClassLimiter>,
    transform: Arc<T>,
    sink: Arc<S>,
    checkpoint: Arc<CheckpointTracker>,
    section: String,
    class_of: Arc<impl Fn(&ExportItem<P>) -> OperationClass + Send + Sync>,
    timeout: Option<Duration>,
    cancellation: CancellationToken,
    processed: Arc<AtomicU64>,
) -> Result<(), PipelineError>
where
    P: Send + Sync,
    T: Transform<P>,
    S: Sink,
{
    loop {
        let item = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Ok(()),
            dequeued = queue.dequeue() => match dequeued {
                Ok(item) => item,
                Err(_closed) => return Ok(()),
            },
        };

        let class = class_of(&item);
        let result = limiter
            .run(class, || transform.transform(&item), timeout)
            .await;

        match result {
            Ok(bytes) => match sink.write_line(&section, &bytes).await {
                Ok(()) => {
                    let count = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    checkpoint.update_progress(&section, count, Some(item.id.clone()));
                }
                Err(err) => {
                    cancellation.cancel();
                    return Err(PipelineError::Sink(err.to_string()));
                }
            },
            Err(concurrency_err) => {
                checkpoint.record_error(
                    "transform",
                    &concurrency_err.to_string(),
                    Some(item.id.clone()),
                    0,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use streamvault_checkpoint::CheckpointConfig;
    use streamvault_core::model::OperationClass;

    struct RecordingSink {
        lines: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                lines: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Sink for RecordingSink {
        async fn write_line(&self, section: &str, line: &[u8]) -> Result<(), BoxError> {
            self.lines
                .lock()
                .unwrap()
                .push((section.to_string(), line.to_vec()));
            Ok(())
        }
    }

    struct FailOn {
        id: &'static str,
    }

    #[async_trait::async_trait]
    impl Transform<String> for FailOn {
        async fn transform(&self, item: &ExportItem<String>) -> Result<Vec<u8>, BoxError> {
            if item.id == self.id {
                return Err("transform exploded".into());
            }
            Ok(item.payload.clone().into_bytes())
        }
    }

    async fn new_checkpoint(dir: &tempfile::TempDir) -> Arc<CheckpointTracker> {
        let path = dir.path().join("checkpoint.json");
        let tracker = CheckpointTracker::new(&path, "export-1", "/out", CheckpointConfig::default());
        tracker.initialize().await.unwrap();
        Arc::new(tracker)
    }

    #[tokio::test]
    async fn a_small_run_delivers_every_item_to_the_sink_in_some_order() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(BoundedQueue::new(4));
        for (id, payload) in [("a", "A"), ("b", "B"), ("c", "C")] {
            queue
                .enqueue(ExportItem::new(id, "page", payload.to_string()))
                .await
                .unwrap();
        }
        queue.close();

        let limiter = Arc::new(ClassLimiter::new());
        let sink = Arc::new(RecordingSink::new());
        let checkpoint = new_checkpoint(&dir).await;
        let pool = WorkerPool::new(CurrentRuntime::new());

        let handles = pool.spawn(
            WorkerPoolConfig {
                worker_count: 2,
                timeout: None,
            },
            Arc::clone(&queue),
            limiter,
            Arc::new(FailOn { id: "__never__" }),
            Arc::clone(&sink),
            checkpoint,
            "pages".to_string(),
            |_: &ExportItem<String>| OperationClass::Pages,
            CancellationToken::new(),
        );
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let lines = sink.lines.lock().unwrap();
        let mut ids: Vec<&str> = lines
            .iter()
            .map(|(_, bytes)| std::str::from_utf8(bytes).unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn a_transform_error_is_recorded_and_the_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(BoundedQueue::new(4));
        for (id, payload) in [("a", "A"), ("b", "B"), ("c", "C")] {
            queue
                .enqueue(ExportItem::new(id, "page", payload.to_string()))
                .await
                .unwrap();
        }
        queue.close();

        let limiter = Arc::new(ClassLimiter::new());
        let sink = Arc::new(RecordingSink::new());
        let checkpoint = new_checkpoint(&dir).await;
        let pool = WorkerPool::new(CurrentRuntime::new());

        let handles = pool.spawn(
            WorkerPoolConfig {
                worker_count: 1,
                timeout: None,
            },
            Arc::clone(&queue),
            limiter,
            Arc::new(FailOn { id: "b" }),
            Arc::clone(&sink),
            Arc::clone(&checkpoint),
            "pages".to_string(),
            |_: &ExportItem<String>| OperationClass::Pages,
            CancellationToken::new(),
        );
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let lines = sink.lines.lock().unwrap();
        let ids: Vec<&str> = lines
            .iter()
            .map(|(_, bytes)| std::str::from_utf8(bytes).unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"B"));

        let snapshot = checkpoint.snapshot();
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].object_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn a_sink_failure_is_fatal_and_cancels_sibling_workers() {
        struct AlwaysFailsSink;

        #[async_trait::async_trait]
        impl Sink for AlwaysFailsSink {
            async fn write_line(&self, _section: &str, _line: &[u8]) -> Result<(), BoxError> {
                Err("disk full".into())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(BoundedQueue::new(4));
        queue
            .enqueue(ExportItem::new("a", "page", "A".to_string()))
            .await
            .unwrap();
        queue.close();

        let limiter = Arc::new(ClassLimiter::new());
        let checkpoint = new_checkpoint(&dir).await;
        let pool = WorkerPool::new(CurrentRuntime::new());
        let cancellation = CancellationToken::new();

        let handles = pool.spawn(
            WorkerPoolConfig {
                worker_count: 1,
                timeout: None,
            },
            queue,
            limiter,
            Arc::new(FailOn { id: "__never__" }),
            Arc::new(AlwaysFailsSink),
            checkpoint,
            "pages".to_string(),
            |_: &ExportItem<String>| OperationClass::Pages,
            cancellation.clone(),
        );

        let mut saw_fatal = false;
        for handle in handles {
            if handle.await.unwrap().is_err() {
                saw_fatal = true;
            }
        }
        assert!(saw_fatal);
        assert!(cancellation.is_cancelled());
    }
}

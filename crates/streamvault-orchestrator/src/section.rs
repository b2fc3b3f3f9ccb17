//! A section couples one paginated source to one worker pool (spec §4.11,
//! "construct source(s), queue, workers" per section).

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_service::Service;

use streamvault_checkpoint::CheckpointTracker;
use streamvault_concurrency::ClassLimiter;
use streamvault_controller::AdaptiveController;
use streamvault_core::model::{ExportItem, OperationClass};
use streamvault_pagination::{paginated_stream, PageRequest, PageResponse};
use streamvault_pipeline::{
    CurrentRuntime, Executor, PipelineError, Sink, Transform, WorkerPool, WorkerPoolConfig,
};
use streamvault_queue::BoundedQueue;
use streamvault_retry::{Classify, RetryPolicy};

/// A section-scoped failure: either the paginated source gave up, or the
/// worker pool hit a fatal sink error. Either way the orchestrator treats
/// this as spec's `Fatal` class.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("paginated source failed: {0}")]
    Source(String),
    #[error("worker pool failed: {0}")]
    Pool(#[from] PipelineError),
    #[error("a worker task panicked or was aborted")]
    WorkerJoin,
}

/// Tunables shared by every [`PaginatedSection`]; analogous to
/// `QueueProcessingOptions` in a batch-download engine, but for one
/// pagination + worker-pool pair instead of one flat queue.
#[derive(Debug, Clone)]
pub struct SectionConfig {
    pub page_size: usize,
    pub max_memory_items: usize,
    pub queue_capacity: usize,
    pub worker_timeout: Option<Duration>,
    /// Governs retries of a failed page fetch (component C10).
    pub retry_policy: Arc<RetryPolicy>,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_memory_items: 500,
            queue_capacity: 256,
            worker_timeout: None,
            retry_policy: Arc::new(RetryPolicy::default()),
        }
    }
}

/// One logical export section (pages, databases, users, ...): a paginated
/// source feeding a bounded queue feeding a worker pool.
///
/// Object-safe so [`crate::Orchestrator`] can hold a fixed, ordered list of
/// sections with distinct payload/source/transform/sink types behind
/// `Arc<dyn Section>` — each section is built once with its own concrete
/// generics, then erased.
#[async_trait]
pub trait Section: Send + Sync {
    fn name(&self) -> &str;
    fn class(&self) -> OperationClass;

    /// Runs this section to completion, cancellation, or a fatal error.
    ///
    /// `resume_after_id` is the checkpoint's `lastProcessedId` when this is
    /// the section the previous run was interrupted in; items up to and
    /// including that id are skipped (spec §4.11 step 1).
    async fn run(
        &self,
        controller: Arc<AdaptiveController>,
        limiter: Arc<ClassLimiter>,
        checkpoint: Arc<CheckpointTracker>,
        resume_after_id: Option<String>,
        shutdown_deadline: Duration,
        cancellation: CancellationToken,
    ) -> Result<(), SectionError>;
}

/// A [`Section`] backed by a `tower::Service<PageRequest>` source, a
/// transform, and a sink — the concrete wiring spec §4.11 describes.
pub struct PaginatedSection<P, Src, Xf, Snk, Ex = CurrentRuntime> {
    name: String,
    class: OperationClass,
    source: Mutex<Option<Src>>,
    transform: Arc<Xf>,
    sink: Arc<Snk>,
    executor: Ex,
    config: SectionConfig,
    _payload: PhantomData<fn() -> P>,
}

impl<P, Src, Xf, Snk> PaginatedSection<P, Src, Xf, Snk, CurrentRuntime> {
    pub fn new(
        name: impl Into<String>,
        class: OperationClass,
        source: Src,
        transform: Xf,
        sink: Snk,
        config: SectionConfig,
    ) -> Self {
        Self::with_executor(name, class, source, transform, sink, config, CurrentRuntime::new())
    }
}

impl<P, Src, Xf, Snk, Ex> PaginatedSection<P, Src, Xf, Snk, Ex> {
    pub fn with_executor(
        name: impl Into<String>,
        class: OperationClass,
        source: Src,
        transform: Xf,
        sink: Snk,
        config: SectionConfig,
        executor: Ex,
    ) -> Self {
        Self {
            name: name.into(),
            class,
            source: Mutex::new(Some(source)),
            transform: Arc::new(transform),
            sink: Arc::new(sink),
            executor,
            config,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<P, Src, Xf, Snk, Ex> Section for PaginatedSection<P, Src, Xf, Snk, Ex>
where
    P: Send + Sync + 'static,
    Src: Service<PageRequest, Response = PageResponse<ExportItem<P>>> + Send + 'static,
    Src::Error: std::fmt::Display + Classify + Send + Sync + 'static,
    Src::Future: Send,
    Xf: Transform<P> + 'static,
    Snk: Sink + 'static,
    Ex: Executor + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> OperationClass {
        self.class
    }

    async fn run(
        &self,
        controller: Arc<AdaptiveController>,
        limiter: Arc<ClassLimiter>,
        checkpoint: Arc<CheckpointTracker>,
        resume_after_id: Option<String>,
        shutdown_deadline: Duration,
        cancellation: CancellationToken,
    ) -> Result<(), SectionError> {
        let source = self
            .source
            .lock()
            .expect("section source mutex poisoned")
            .take()
            .expect("PaginatedSection::run called more than once");

        let queue = Arc::new(BoundedQueue::new(self.config.queue_capacity));
        let worker_count = controller.recommended_concurrency().max(1);
        let class = self.class;

        let pool = WorkerPool::new(self.executor.clone());
        let handles = pool.spawn(
            WorkerPoolConfig {
                worker_count,
                timeout: self.config.worker_timeout,
            },
            Arc::clone(&queue),
            Arc::clone(&limiter),
            Arc::clone(&self.transform),
            Arc::clone(&self.sink),
            Arc::clone(&checkpoint),
            self.name.clone(),
            move |_: &ExportItem<P>| class,
            cancellation.clone(),
        );

        let stream = paginated_stream(
            source,
            Arc::clone(&controller),
            Arc::clone(&self.config.retry_policy),
            None,
            self.config.page_size,
            self.config.max_memory_items,
            Default::default(),
        );
        tokio::pin!(stream);

        let mut skip_active = resume_after_id.is_some();
        let marker = resume_after_id;

        let producer_result: Result<(), SectionError> = 'produce: loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break 'produce Ok(()),
                next = stream.next() => match next {
                    None => break 'produce Ok(()),
                    Some(Ok(item)) => {
                        if skip_active {
                            if marker.as_deref() == Some(item.id.as_str()) {
                                skip_active = false;
                            }
                            continue;
                        }
                        if queue.enqueue(item).await.is_err() {
                            break 'produce Ok(());
                        }
                    }
                    Some(Err(err)) => break 'produce Err(SectionError::Source(err.to_string())),
                },
            }
        };
        queue.close();

        let shutting_down = cancellation.is_cancelled();
        let mut pool_err = None;
        for mut handle in handles {
            let joined = if shutting_down {
                match tokio::time::timeout(shutdown_deadline, &mut handle).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        handle.abort();
                        continue;
                    }
                }
            } else {
                (&mut handle).await
            };

            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    pool_err.get_or_insert(SectionError::from(err));
                }
                Err(_join_err) => {
                    pool_err.get_or_insert(SectionError::WorkerJoin);
                }
            }
        }

        producer_result?;
        if let Some(err) = pool_err {
            return Err(err);
        }
        Ok(())
    }
}

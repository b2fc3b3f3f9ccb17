//! A resumable, memory-bounded, rate-limited export pipeline for paginated,
//! rate-limited APIs.
//!
//! `streamvault` exports a hierarchical workspace (pages, databases, users,
//! ...) page by page, adapting its concurrency to the remote API's own
//! rate-limit headers, persisting enough progress to resume after a crash
//! or an operator-requested shutdown without re-downloading everything.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! streamvault = "0.1"
//! ```
//!
//! The crates below are re-exported under short names so callers don't have
//! to depend on all eleven directly:
//!
//! - **[`ratewindow`]** — sliding-window call counter and rate-limit header
//!   parser (components C1, C2).
//! - **[`controller`]** — the AIMD-style adaptive controller that turns
//!   rate-limit headers and error signals into a recommended concurrency
//!   (component C3).
//! - **[`concurrency`]** — the per-[`OperationClass`](core::model::OperationClass)
//!   semaphore limiter workers acquire permits from before calling out
//!   (component C4).
//! - **[`queue`]** — the bounded async FIFO standing between the paginated
//!   source and the worker pool, bounding memory regardless of API speed
//!   (component C5).
//! - **[`pagination`]** — the adapter that turns a single-page `tower`
//!   service into a `Stream` of items, feeding the controller from response
//!   headers as it goes (component C6).
//! - **[`pipeline`]** — the worker pool that drains the queue: transform,
//!   write, checkpoint (component C7).
//! - **[`checkpoint`]** — the durable, atomically-written progress record a
//!   run resumes from (component C8).
//! - **[`eta`]** — the weighted-average-speed completion estimator
//!   (component C9).
//! - **[`retry`]** — error classification and exponential backoff with
//!   jitter (component C10).
//! - **[`orchestrator`]** — wires all of the above into one resumable,
//!   section-ordered run with graceful shutdown (component C11).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streamvault::checkpoint::CheckpointConfig;
//! use streamvault::concurrency::ClassLimiter;
//! use streamvault::controller::{AdaptiveController, ControllerConfig};
//! use streamvault::orchestrator::{Orchestrator, OrchestratorConfig, Section};
//!
//! # async fn example(sections: Vec<Arc<dyn Section>>) -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::new(
//!     OrchestratorConfig::new("export-2026-07-27", "./out"),
//!     AdaptiveController::new(ControllerConfig::default()),
//!     ClassLimiter::new(),
//!     CheckpointConfig::default(),
//!     sections,
//! );
//! orchestrator.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! See the `streamvault-export` binary in this crate's `src/bin/` for a
//! complete, runnable wiring of the pipeline against an in-memory mock
//! source.

pub use streamvault_checkpoint as checkpoint;
pub use streamvault_concurrency as concurrency;
pub use streamvault_controller as controller;
pub use streamvault_core as core;
pub use streamvault_eta as eta;
pub use streamvault_orchestrator as orchestrator;
pub use streamvault_pagination as pagination;
pub use streamvault_pipeline as pipeline;
pub use streamvault_queue as queue;
pub use streamvault_ratewindow as ratewindow;
pub use streamvault_retry as retry;

//! N-worker pool draining the bounded queue into a caller-supplied
//! transform and sink (component C7).
//!
//! Workers are spawned through the pluggable [`Executor`] abstraction
//! rather than hard-coded to `tokio::spawn`, so callers can isolate export
//! work on a dedicated runtime if the transform or sink does blocking work.

mod executor;
mod traits;
mod worker;

pub use executor::{BlockingExecutor, CurrentRuntime, Executor};
pub use traits::{BoxError, Sink, Transform};
pub use worker::{PipelineError, WorkerPool, WorkerPoolConfig};

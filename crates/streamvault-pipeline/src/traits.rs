//! The two caller-supplied seams a worker pool drives: turning a fetched
//! item into serialized bytes, and writing those bytes somewhere durable.

use async_trait::async_trait;
use streamvault_core::model::ExportItem;

/// Boxed so [`Transform`] and [`Sink`] stay object-safe without threading a
/// generic error type through [`crate::WorkerPool`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Turns a fetched item into the bytes that get written to the sink.
///
/// Transform failures are scoped to the single item (spec's `SoftItem`
/// class): the worker records the error and moves on to the next item.
#[async_trait]
pub trait Transform<P>: Send + Sync {
    async fn transform(&self, item: &ExportItem<P>) -> Result<Vec<u8>, BoxError>;
}

#[async_trait]
impl<P, F> Transform<P> for F
where
    P: Send + Sync,
    F: Fn(&ExportItem<P>) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    async fn transform(&self, item: &ExportItem<P>) -> Result<Vec<u8>, BoxError> {
        self(item)
    }
}

/// Durable output for one export run.
///
/// Implementations must be idempotent per `(section, id)` so that resuming
/// from a checkpoint and re-emitting already-written lines never corrupts
/// the output.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn open(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Writes one serialized record belonging to `section`.
    async fn write_line(&self, section: &str, line: &[u8]) -> Result<(), BoxError>;

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

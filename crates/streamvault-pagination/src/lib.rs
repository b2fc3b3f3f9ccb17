//! Cursor-based pagination wrapped as a lazy, memory-capped item stream
//! (component C6).
//!
//! [`paginated_stream`] drives a `tower::Service<PageRequest>` page by page,
//! routing each page's rate-limit headers into a shared
//! [`AdaptiveController`](streamvault_controller::AdaptiveController) before
//! fetching the next one, and yields items one at a time, never starting a
//! new page fetch while `max_memory_items` or more items are still buffered.
//! Page-fetch errors are routed through a
//! [`RetryPolicy`](streamvault_retry::RetryPolicy) (component C10): transient
//! classes are retried with backoff, fatal/give-up classes end the stream.

mod source;

pub use source::{paginated_stream, PageRequest, PageResponse};

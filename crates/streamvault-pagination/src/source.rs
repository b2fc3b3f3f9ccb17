//! Paginated source adapter (component C6).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, Stream};
use tower_service::Service;

use streamvault_controller::AdaptiveController;
use streamvault_retry::{Classify, RetryDecision, RetryPolicy};

/// One page request. `args` carries whatever opaque parameters the caller's
/// remote API needs; `start_cursor` and `page_size` are always added by the
/// pagination driver, never by the caller.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub start_cursor: Option<String>,
    pub page_size: usize,
    pub args: HashMap<String, String>,
}

/// One page of results from a `listFn`-shaped service.
#[derive(Debug, Clone)]
pub struct PageResponse<I> {
    pub results: Vec<I>,
    pub next_cursor: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

struct DriverState<S, I> {
    source: S,
    controller: Arc<AdaptiveController>,
    retry_policy: Arc<RetryPolicy>,
    buffer: VecDeque<I>,
    cursor: Option<String>,
    page_size: usize,
    max_memory_items: usize,
    base_args: HashMap<String, String>,
    attempt: u32,
    done: bool,
}

/// Drives a `tower::Service<PageRequest>` into a lazy item stream following
/// the protocol in spec §4.6: acquire a controller slot, fetch one page,
/// feed its headers back into the controller, then yield results before
/// fetching the next page.
///
/// A page-fetch error is routed through `retry_policy` (component C10): a
/// `Retry` decision backs off and retries the same page; a `Fatal` or
/// `GiveUp` decision ends the stream with that error.
///
/// The stream never initiates a new page fetch while `max_memory_items` or
/// more items from the current page are still buffered; a single page's
/// results are always delivered in full (callers should size `page_size`
/// accordingly to keep the transient spike small).
pub fn paginated_stream<S, I>(
    source: S,
    controller: Arc<AdaptiveController>,
    retry_policy: Arc<RetryPolicy>,
    start_cursor: Option<String>,
    page_size: usize,
    max_memory_items: usize,
    base_args: HashMap<String, String>,
) -> impl Stream<Item = Result<I, S::Error>>
where
    S: Service<PageRequest, Response = PageResponse<I>>,
    S::Error: Classify,
{
    let state = DriverState {
        source,
        controller,
        retry_policy,
        buffer: VecDeque::new(),
        cursor: start_cursor,
        page_size,
        max_memory_items,
        base_args,
        attempt: 0,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.buffer.pop_front() {
                return Some((Ok(item), state));
            }
            if state.done {
                return None;
            }
            // Buffer is empty at this point (the pop above drains it before
            // we ever reach here), so the memory cap never blocks a fetch
            // that's actually needed to make progress.
            debug_assert!(state.buffer.len() < state.max_memory_items);

            state.controller.slot().await;

            let request = PageRequest {
                start_cursor: state.cursor.clone(),
                page_size: state.page_size,
                args: state.base_args.clone(),
            };

            let call_start = Instant::now();
            let outcome = state.source.call(request).await;
            let elapsed = call_start.elapsed();

            match outcome {
                Ok(response) => {
                    if let Some(headers) = response.headers {
                        state.controller.on_response(headers, elapsed, false);
                    } else {
                        state.controller.on_response(std::iter::empty(), elapsed, false);
                    }

                    state.cursor = response.next_cursor;
                    state.done = state.cursor.is_none();
                    state.attempt = 0;
                    state.buffer.extend(response.results);

                    if state.buffer.is_empty() && state.done {
                        return None;
                    }
                    // Loop: either we just buffered items (yield next
                    // iteration) or the page was empty but more pages
                    // remain (fetch again).
                }
                Err(err) => {
                    state.controller.on_response(std::iter::empty(), elapsed, true);
                    let class = err.classify();
                    let retry_after = err.retry_after();
                    match state.retry_policy.decide(class, state.attempt, retry_after) {
                        RetryDecision::Retry { delay } => {
                            state.attempt += 1;
                            tokio::time::sleep(delay).await;
                            // Loop: retry the same page, cursor untouched.
                        }
                        RetryDecision::Fatal | RetryDecision::GiveUp => {
                            state.done = true;
                            return Some((Err(err), state));
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use streamvault_controller::ControllerConfig;
    use streamvault_retry::ErrorClass;

    /// A fake two-page source for stream-protocol tests.
    struct FakeSource;

    impl Service<PageRequest> for FakeSource {
        type Response = PageResponse<u32>;
        type Error = Infallible;
        type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: PageRequest) -> Self::Future {
            let page = match req.start_cursor.as_deref() {
                None => PageResponse {
                    results: vec![1, 2, 3],
                    next_cursor: Some("page2".to_string()),
                    headers: None,
                },
                Some("page2") => PageResponse {
                    results: vec![4, 5],
                    next_cursor: None,
                    headers: None,
                },
                Some(_) => PageResponse {
                    results: vec![],
                    next_cursor: None,
                    headers: None,
                },
            };
            Box::pin(async move { Ok(page) })
        }
    }

    fn controller() -> Arc<AdaptiveController> {
        Arc::new(AdaptiveController::new(ControllerConfig::default()))
    }

    fn retry_policy() -> Arc<RetryPolicy> {
        Arc::new(RetryPolicy::default())
    }

    #[tokio::test]
    async fn yields_every_item_across_two_pages_in_order() {
        let stream = paginated_stream(
            FakeSource,
            controller(),
            retry_policy(),
            None,
            10,
            100,
            HashMap::new(),
        );
        tokio::pin!(stream);

        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.unwrap());
        }
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn an_empty_first_page_with_no_cursor_yields_nothing() {
        struct EmptySource;
        impl Service<PageRequest> for EmptySource {
            type Response = PageResponse<u32>;
            type Error = Infallible;
            type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: PageRequest) -> Self::Future {
                std::future::ready(Ok(PageResponse {
                    results: vec![],
                    next_cursor: None,
                    headers: None,
                }))
            }
        }

        let stream = paginated_stream(
            EmptySource,
            controller(),
            retry_policy(),
            None,
            10,
            100,
            HashMap::new(),
        );
        tokio::pin!(stream);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn a_page_larger_than_max_memory_items_is_fully_delivered_without_loss() {
        struct BigPageSource {
            calls: AtomicUsize,
        }
        impl Service<PageRequest> for BigPageSource {
            type Response = PageResponse<u32>;
            type Error = Infallible;
            type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: PageRequest) -> Self::Future {
                let page = match self.calls.fetch_add(1, Ordering::SeqCst) {
                    0 => PageResponse {
                        results: (0..10).collect(),
                        next_cursor: Some("page2".to_string()),
                        headers: None,
                    },
                    _ => PageResponse {
                        results: vec![10, 11],
                        next_cursor: None,
                        headers: None,
                    },
                };
                std::future::ready(Ok(page))
            }
        }

        let stream = paginated_stream(
            BigPageSource { calls: AtomicUsize::new(0) },
            controller(),
            retry_policy(),
            None,
            10,
            3,
            HashMap::new(),
        );
        tokio::pin!(stream);
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.unwrap());
        }
        assert_eq!(items, (0..12).collect::<Vec<u32>>());
    }

    /// Fatal/give-up classes end the stream on the first failure, with no
    /// retry delay.
    #[derive(Debug)]
    struct UnauthorizedError;
    impl std::fmt::Display for UnauthorizedError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "unauthorized")
        }
    }
    impl Classify for UnauthorizedError {
        fn classify(&self) -> ErrorClass {
            ErrorClass::Unauthorized
        }
    }

    #[tokio::test]
    async fn a_fatal_source_error_ends_the_stream_without_retrying() {
        struct FailingSource;
        impl Service<PageRequest> for FailingSource {
            type Response = PageResponse<u32>;
            type Error = UnauthorizedError;
            type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: PageRequest) -> Self::Future {
                std::future::ready(Err(UnauthorizedError))
            }
        }

        let stream = paginated_stream(
            FailingSource,
            controller(),
            retry_policy(),
            None,
            10,
            100,
            HashMap::new(),
        );
        tokio::pin!(stream);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(UnauthorizedError)));
        assert!(stream.next().await.is_none());
    }

    #[derive(Debug)]
    struct FlakyError;
    impl std::fmt::Display for FlakyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transient failure")
        }
    }
    impl Classify for FlakyError {
        fn classify(&self) -> ErrorClass {
            ErrorClass::Network
        }
    }

    #[tokio::test]
    async fn a_transient_page_fetch_error_is_retried_and_recovers() {
        struct FlakySource {
            calls: AtomicUsize,
        }
        impl Service<PageRequest> for FlakySource {
            type Response = PageResponse<u32>;
            type Error = FlakyError;
            type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: PageRequest) -> Self::Future {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::future::ready(Err(FlakyError))
                } else {
                    std::future::ready(Ok(PageResponse {
                        results: vec![1, 2],
                        next_cursor: None,
                        headers: None,
                    }))
                }
            }
        }

        let fast_retry = Arc::new(RetryPolicy::builder().base_delay(Duration::from_millis(1)).build());
        let stream = paginated_stream(
            FlakySource { calls: AtomicUsize::new(0) },
            controller(),
            fast_retry,
            None,
            10,
            100,
            HashMap::new(),
        );
        tokio::pin!(stream);
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.unwrap());
        }
        assert_eq!(items, vec![1, 2]);
    }
}

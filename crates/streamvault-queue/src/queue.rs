//! Bounded FIFO queue (component C5).

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::Closed;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A FIFO queue with a fixed capacity `K`.
///
/// `enqueue` blocks while the queue holds `K` items; `dequeue` blocks while
/// it is empty. Neither holds a lock across its await point, so both are
/// safe to race inside a `tokio::select!` with a cancellation future —
/// dropping the call simply abandons the wait, losing nothing.
///
/// At most `K` items are ever resident, bounding the pipeline's memory use
/// regardless of producer/consumer speed mismatch.
pub struct BoundedQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_full: Notify,
    not_empty: Notify,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be > 0");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    /// Appends `item`, waiting for room if the queue is at capacity.
    ///
    /// Returns [`Closed`] immediately if the queue has already been closed;
    /// never blocks forever once [`close`](Self::close) is called.
    pub async fn enqueue(&self, item: T) -> Result<(), Closed> {
        let mut item = Some(item);
        loop {
            let notified;
            {
                let mut inner = self.inner.lock().expect("queue mutex poisoned");
                if inner.closed {
                    return Err(Closed);
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item.take().expect("item consumed exactly once"));
                    drop(inner);
                    self.not_empty.notify_one();
                    return Ok(());
                }
                notified = self.not_full.notified();
            }
            notified.await;
        }
    }

    /// Removes and returns the oldest item, waiting if the queue is empty.
    ///
    /// Once closed, any items still resident are returned first (FIFO
    /// order preserved); only after the backlog is exhausted does this
    /// return [`Closed`].
    pub async fn dequeue(&self) -> Result<T, Closed> {
        loop {
            let notified;
            {
                let mut inner = self.inner.lock().expect("queue mutex poisoned");
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.not_full.notify_one();
                    return Ok(item);
                }
                if inner.closed {
                    return Err(Closed);
                }
                notified = self.not_empty.notified();
            }
            notified.await;
        }
    }

    /// Closes the queue and wakes every waiter. Idempotent.
    ///
    /// Subsequent `enqueue` calls fail immediately; `dequeue` continues to
    /// drain whatever was already resident, then fails.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        if inner.closed {
            return;
        }
        inner.closed = true;
        drop(inner);
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("queue mutex poisoned").closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

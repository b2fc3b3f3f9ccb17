//! Per-operation-class concurrency limiter (component C4).

use std::collections::HashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use streamvault_core::events::{EventListener, EventListeners};
use streamvault_core::model::OperationClass;

use crate::error::ConcurrencyError;
use crate::events::ConcurrencyEvent;

const DURATION_HISTORY: usize = 100;

struct ClassStats {
    active: usize,
    queued: usize,
    completed: u64,
    failed: u64,
    durations: VecDeque<Duration>,
    last_executed_at: Option<Instant>,
}

impl ClassStats {
    fn new() -> Self {
        Self {
            active: 0,
            queued: 0,
            completed: 0,
            failed: 0,
            durations: VecDeque::with_capacity(DURATION_HISTORY),
            last_executed_at: None,
        }
    }

    fn push_duration(&mut self, d: Duration) {
        if self.durations.len() == DURATION_HISTORY {
            self.durations.pop_front();
        }
        self.durations.push_back(d);
    }

    fn avg_duration_ms(&self) -> Option<u64> {
        if self.durations.is_empty() {
            return None;
        }
        let sum: u128 = self.durations.iter().map(|d| d.as_millis()).sum();
        Some((sum / self.durations.len() as u128) as u64)
    }
}

/// Snapshot of one class's limiter state.
#[derive(Debug, Clone, Copy)]
pub struct ClassLimiterStats {
    pub limit: usize,
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
    pub avg_duration_ms: Option<u64>,
    pub last_executed_at: Option<Instant>,
}

struct ClassState {
    semaphore: Arc<Semaphore>,
    limit: Mutex<usize>,
    stats: Mutex<ClassStats>,
}

impl ClassState {
    fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit: Mutex::new(limit),
            stats: Mutex::new(ClassStats::new()),
        }
    }
}

/// A `OperationClass -> counting semaphore` map with FIFO admission,
/// per-task timeout racing, rolling duration stats, and a `set_limit` that
/// is safe to call while tasks are in flight (spec §4.4).
///
/// Unknown classes are never created implicitly: callers that want a class
/// outside [`OperationClass::ALL`] should route through
/// [`OperationClass::Default`].
pub struct ClassLimiter {
    classes: HashMap<OperationClass, ClassState>,
    events: EventListeners<ConcurrencyEvent>,
}

impl ClassLimiter {
    /// Creates a limiter with each class seeded at `OperationClass::default_limit()`.
    pub fn new() -> Self {
        let mut classes = HashMap::new();
        for class in OperationClass::ALL {
            classes.insert(class, ClassState::new(class.default_limit()));
        }
        classes.insert(OperationClass::Default, ClassState::new(OperationClass::Default.default_limit()));
        Self {
            classes,
            events: EventListeners::new(),
        }
    }

    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: EventListener<ConcurrencyEvent> + 'static,
    {
        self.events.add(listener);
    }

    fn state_for(&self, class: OperationClass) -> &ClassState {
        self.classes
            .get(&class)
            .unwrap_or_else(|| self.classes.get(&OperationClass::Default).expect("Default class always present"))
    }

    /// Runs `op` under a permit for `class`, racing it against `timeout` if
    /// given. The permit is released on every exit path, including timeout
    /// and cancellation.
    pub async fn run<F, Fut, T, E>(
        &self,
        class: OperationClass,
        op: F,
        timeout: Option<Duration>,
    ) -> Result<T, ConcurrencyError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let state = self.state_for(class);
        {
            let mut stats = state.stats.lock().expect("stats mutex poisoned");
            stats.queued += 1;
        }

        let wait_start = Instant::now();
        let permit = state
            .semaphore
            .acquire()
            .await
            .expect("limiter semaphore is never closed");
        let waited = wait_start.elapsed();

        {
            let mut stats = state.stats.lock().expect("stats mutex poisoned");
            stats.queued -= 1;
            stats.active += 1;
        }
        self.events.emit(&ConcurrencyEvent::PermitGranted {
            timestamp: Instant::now(),
            class,
            waited,
            active: state.stats.lock().expect("stats mutex poisoned").active,
        });

        let run_start = Instant::now();
        let outcome = match timeout {
            Some(d) => match tokio::time::timeout(d, op()).await {
                Ok(result) => result.map_err(ConcurrencyError::Inner),
                Err(_) => {
                    self.events.emit(&ConcurrencyEvent::TimedOut {
                        timestamp: Instant::now(),
                        class,
                        timeout: d,
                    });
                    Err(ConcurrencyError::Timeout { timeout_ms: d.as_millis() as u64 })
                }
            },
            None => op().await.map_err(ConcurrencyError::Inner),
        };
        let duration = run_start.elapsed();
        drop(permit);

        {
            let mut stats = state.stats.lock().expect("stats mutex poisoned");
            stats.active -= 1;
            stats.push_duration(duration);
            stats.last_executed_at = Some(Instant::now());
            if outcome.is_err() {
                stats.failed += 1;
            } else {
                stats.completed += 1;
            }
        }
        self.events.emit(&ConcurrencyEvent::PermitReleased {
            timestamp: Instant::now(),
            class,
            duration,
            failed: outcome.is_err(),
        });

        outcome
    }

    /// Changes `class`'s concurrency ceiling. Safe while tasks are in
    /// flight: increasing admits more immediately, decreasing only blocks
    /// new admissions until enough permits are returned, never preempting
    /// running tasks.
    pub fn set_limit(&self, class: OperationClass, new_limit: usize) {
        let state = self.state_for(class);
        let mut current = state.limit.lock().expect("limit mutex poisoned");
        if new_limit == *current {
            return;
        }
        if new_limit > *current {
            state.semaphore.add_permits(new_limit - *current);
        } else {
            state.semaphore.forget_permits(*current - new_limit);
        }
        let from = *current;
        *current = new_limit;
        self.events.emit(&ConcurrencyEvent::LimitChanged {
            timestamp: Instant::now(),
            class,
            from,
            to: new_limit,
        });
    }

    /// Snapshot of one class's current state.
    pub fn stats(&self, class: OperationClass) -> ClassLimiterStats {
        let state = self.state_for(class);
        let limit = *state.limit.lock().expect("limit mutex poisoned");
        let stats = state.stats.lock().expect("stats mutex poisoned");
        ClassLimiterStats {
            limit,
            active: stats.active,
            queued: stats.queued,
            completed: stats.completed,
            failed: stats.failed,
            avg_duration_ms: stats.avg_duration_ms(),
            last_executed_at: stats.last_executed_at,
        }
    }
}

impl Default for ClassLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_executes_the_operation_and_releases_the_permit() {
        let limiter = ClassLimiter::new();
        let result: Result<i32, ConcurrencyError<std::convert::Infallible>> = limiter
            .run(OperationClass::Pages, || async { Ok(42) }, None)
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(limiter.stats(OperationClass::Pages).active, 0);
        assert_eq!(limiter.stats(OperationClass::Pages).completed, 1);
    }

    #[tokio::test]
    async fn run_times_out_and_releases_the_permit() {
        let limiter = ClassLimiter::new();
        let result: Result<(), ConcurrencyError<std::convert::Infallible>> = limiter
            .run(
                OperationClass::Pages,
                || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(())
                },
                Some(Duration::from_millis(10)),
            )
            .await;
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(limiter.stats(OperationClass::Pages).active, 0);
    }

    #[tokio::test]
    async fn unknown_class_falls_back_to_default() {
        let limiter = ClassLimiter::new();
        let before = limiter.stats(OperationClass::Default).completed;
        let _: Result<(), ConcurrencyError<std::convert::Infallible>> = limiter
            .run(OperationClass::Default, || async { Ok(()) }, None)
            .await;
        assert_eq!(limiter.stats(OperationClass::Default).completed, before + 1);
    }

    #[tokio::test]
    async fn set_limit_increase_admits_more_concurrently() {
        let limiter = ClassLimiter::new();
        limiter.set_limit(OperationClass::Databases, 1);
        assert_eq!(limiter.stats(OperationClass::Databases).limit, 1);
        limiter.set_limit(OperationClass::Databases, 5);
        assert_eq!(limiter.stats(OperationClass::Databases).limit, 5);
    }

    #[tokio::test]
    async fn set_limit_decrease_does_not_preempt_in_flight_tasks() {
        let limiter = Arc::new(ClassLimiter::new());
        limiter.set_limit(OperationClass::Databases, 2);

        let l1 = Arc::clone(&limiter);
        let handle = tokio::spawn(async move {
            l1.run(
                OperationClass::Databases,
                || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, std::convert::Infallible>(())
                },
                None,
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        limiter.set_limit(OperationClass::Databases, 1);

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn completed_and_failed_counters_track_outcomes() {
        let limiter = ClassLimiter::new();
        let _: Result<(), ConcurrencyError<&str>> = limiter
            .run(OperationClass::Comments, || async { Err("boom") }, None)
            .await;
        let stats = limiter.stats(OperationClass::Comments);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }
}

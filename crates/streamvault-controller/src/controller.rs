//! The adaptive controller (component C3): combines a sliding-window sample
//! ring, rate-limit header state, and an AIMD-derived backoff multiplier
//! into one `await slot()`-gated admission contract.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use streamvault_core::clock::{Clock, SystemClock};
use streamvault_core::events::{EventListener, EventListeners};
use streamvault_ratewindow::{RateLimitTracker, SampleRing};

use crate::config::{ControllerConfig, ErrorSeverity};
use crate::events::ControllerEvent;

const MAX_BACKOFF_MULTIPLIER: f64 = 32.0;

struct Inner {
    ring: SampleRing,
    rate_limit: RateLimitTracker,
    backoff_multiplier: f64,
    consecutive_errors: usize,
    recommended_concurrency: usize,
    last_request_ms: u64,
    last_adjustment_ms: u64,
}

/// Snapshot of controller state for dashboards and tests.
#[derive(Debug, Clone, Copy)]
pub struct ControllerStats {
    pub recommended_concurrency: usize,
    pub backoff_multiplier: f64,
    pub consecutive_errors: usize,
    pub consecutive_successes: usize,
    pub remaining: u64,
    pub limit: u64,
    pub requests_in_last_minute: usize,
    pub average_response_time: Option<Duration>,
    pub in_fallback_mode: bool,
}

/// Adaptive request admission controller (spec component C3).
///
/// `slot()` is the sole admission gate: callers await it before issuing a
/// request, then report the outcome via [`on_response`](Self::on_response)
/// plus [`on_error`](Self::on_error) or [`on_success`](Self::on_success).
pub struct AdaptiveController {
    config: ControllerConfig,
    clock: Arc<dyn Clock>,
    start: Instant,
    inner: Mutex<Inner>,
    events: EventListeners<ControllerEvent>,
}

impl AdaptiveController {
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Builds a controller driven by `clock` instead of the real system
    /// monotonic clock, letting tests exercise spec §8's boundary scenarios
    /// (e.g. "remaining hits 0 before resetAtMs") without real sleeps.
    pub fn with_clock(config: ControllerConfig, clock: Arc<dyn Clock>) -> Self {
        let recommended_concurrency = config.initial_concurrency;
        let start = clock.now();
        Self {
            inner: Mutex::new(Inner {
                ring: SampleRing::new(config.sample_size),
                rate_limit: RateLimitTracker::new(config.default_rate_limit, config.max_header_errors),
                backoff_multiplier: 1.0,
                consecutive_errors: 0,
                recommended_concurrency,
                last_request_ms: 0,
                last_adjustment_ms: 0,
            }),
            clock,
            start,
            config,
            events: EventListeners::new(),
        }
    }

    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: EventListener<ControllerEvent> + 'static,
    {
        self.events.add(listener);
    }

    fn monotonic_ms(&self) -> u64 {
        self.clock.now().saturating_duration_since(self.start).as_millis() as u64
    }

    fn epoch_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Blocks until the caller may issue one request (spec §4.3 wait-time
    /// formula), then runs the cooldown-gated concurrency adjustment.
    pub async fn slot(&self) {
        let wait = {
            let inner = self.inner.lock().expect("controller mutex poisoned");
            self.compute_wait(&inner)
        };
        if wait > Duration::ZERO {
            tokio::time::sleep(wait).await;
        }

        let now = self.monotonic_ms();
        let mut inner = self.inner.lock().expect("controller mutex poisoned");
        let state = inner.rate_limit.state();
        if state.remaining == 0 && now >= state.reset_at_ms && state.reset_at_ms > 0 {
            inner.rate_limit.restore_remaining();
        }
        inner.last_request_ms = now;
        self.maybe_adjust(&mut inner, now);
    }

    fn compute_wait(&self, inner: &Inner) -> Duration {
        let now = self.monotonic_ms();
        let state = inner.rate_limit.state();

        if now < state.retry_after_at_ms {
            return Duration::from_millis(state.retry_after_at_ms - now);
        }

        if state.remaining == 0 && now < state.reset_at_ms {
            return Duration::from_millis(state.reset_at_ms - now + 100);
        }

        let dynamic_wait_ms = {
            let target = (self.config.base_interval.as_millis() as f64 * inner.backoff_multiplier) as u64;
            let elapsed = now.saturating_sub(inner.last_request_ms);
            target.saturating_sub(elapsed)
        };

        let window_wait_ms = if inner.ring.requests_in_last_minute(now) >= state.limit as usize {
            inner
                .ring
                .oldest_timestamp_ms()
                .map(|oldest| (oldest + 60_000).saturating_sub(now) + 100)
                .unwrap_or(0)
        } else {
            0
        };

        Duration::from_millis(dynamic_wait_ms.max(window_wait_ms))
    }

    /// Records the outcome of one request against C1/C2.
    pub fn on_response(
        &self,
        headers: impl IntoIterator<Item = (String, String)>,
        response_time: Duration,
        was_error: bool,
    ) {
        let now = self.monotonic_ms();
        let mut inner = self.inner.lock().expect("controller mutex poisoned");
        inner.ring.record(now, response_time, was_error);

        let was_in_fallback = inner.rate_limit.in_fallback_mode();
        let owned: Vec<(String, String)> = headers.into_iter().collect();
        let borrowed: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        inner
            .rate_limit
            .update(borrowed, Self::epoch_ms(), now);

        if was_in_fallback && !inner.rate_limit.in_fallback_mode() {
            self.events.emit(&ControllerEvent::FallbackModeExited {
                timestamp: Instant::now(),
            });
        } else if !was_in_fallback && inner.rate_limit.in_fallback_mode() {
            self.events.emit(&ControllerEvent::FallbackModeEntered {
                timestamp: Instant::now(),
            });
        }
    }

    /// Grows the backoff multiplier on a classified error (spec §4.3).
    pub fn on_error(&self, severity: ErrorSeverity) {
        let mut inner = self.inner.lock().expect("controller mutex poisoned");
        inner.consecutive_errors += 1;
        let base = 1.5f64.powi(inner.consecutive_errors as i32);
        inner.backoff_multiplier = (base * severity.factor()).min(MAX_BACKOFF_MULTIPLIER);

        if severity == ErrorSeverity::High {
            let from = inner.recommended_concurrency;
            let to = (from / 2).max(self.config.min_concurrency);
            if to != from {
                inner.recommended_concurrency = to;
                self.events.emit(&ControllerEvent::EmergencyHalved {
                    timestamp: Instant::now(),
                    from,
                    to,
                });
            }
        }
    }

    /// Decays the backoff multiplier toward 1 and resets the error streak.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().expect("controller mutex poisoned");
        inner.backoff_multiplier = (inner.backoff_multiplier * 0.9).max(1.0);
        inner.consecutive_errors = 0;
    }

    pub fn recommended_concurrency(&self) -> usize {
        self.inner
            .lock()
            .expect("controller mutex poisoned")
            .recommended_concurrency
    }

    pub fn stats(&self) -> ControllerStats {
        let inner = self.inner.lock().expect("controller mutex poisoned");
        let state = inner.rate_limit.state();
        let now = self.monotonic_ms();
        ControllerStats {
            recommended_concurrency: inner.recommended_concurrency,
            backoff_multiplier: inner.backoff_multiplier,
            consecutive_errors: inner.consecutive_errors,
            consecutive_successes: inner.ring.consecutive_successes(),
            remaining: state.remaining,
            limit: state.limit,
            requests_in_last_minute: inner.ring.requests_in_last_minute(now),
            average_response_time: inner.ring.average_response_time(),
            in_fallback_mode: inner.rate_limit.in_fallback_mode(),
        }
    }

    /// Cooldown-gated increase/decrease per spec §4.3. Decrease wins when
    /// both conditions hold in the same tick.
    fn maybe_adjust(&self, inner: &mut Inner, now: u64) {
        if now.saturating_sub(inner.last_adjustment_ms) < self.config.adjustment_cooldown.as_millis() as u64
        {
            return;
        }
        if inner.ring.len() < self.config.sample_size / 2 {
            return;
        }

        let state = inner.rate_limit.state();
        let error_rate = inner.ring.error_rate();
        let success_rate = inner.ring.success_rate();
        let consecutive_errors = inner.ring.consecutive_errors();
        let consecutive_successes = inner.ring.consecutive_successes();
        let avg_response_time_ms = inner
            .ring
            .average_response_time()
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let remaining = state.remaining as f64;
        let limit = state.limit.max(1) as f64;
        let current = inner.recommended_concurrency;

        let should_decrease = error_rate > self.config.error_rate_ceil
            || remaining < limit * 0.1
            || consecutive_errors >= 3
            || avg_response_time_ms > 5000;

        let should_increase = !should_decrease
            && error_rate < self.config.error_rate_ceil
            && success_rate > self.config.success_rate_floor
            && remaining > limit * 0.3
            && consecutive_successes >= 10
            && current < self.config.max_concurrency;

        if should_decrease {
            let step = ((current as f64 * self.config.decrease_threshold).floor() as usize).max(1);
            let new_value = current.saturating_sub(step).max(self.config.min_concurrency);
            if new_value != current {
                inner.recommended_concurrency = new_value;
                inner.last_adjustment_ms = now;
                self.events.emit(&ControllerEvent::ConcurrencyDecreased {
                    timestamp: Instant::now(),
                    from: current,
                    to: new_value,
                });
            }
        } else if should_increase {
            let step = ((current as f64 * self.config.increase_threshold).floor() as usize).max(1);
            let new_value = (current + step).min(self.config.max_concurrency);
            if new_value != current {
                inner.recommended_concurrency = new_value;
                inner.last_adjustment_ms = now;
                self.events.emit(&ControllerEvent::ConcurrencyIncreased {
                    timestamp: Instant::now(),
                    from: current,
                    to: new_value,
                });
            }
        }
    }
}

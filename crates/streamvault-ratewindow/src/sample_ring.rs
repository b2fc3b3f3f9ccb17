//! Sliding-window request counter (spec §4.1, component C1).
//!
//! A fixed-size ring of `(timestamp, response_time, was_error)` triples.
//! Callers serialize access themselves — this type has no internal locking,
//! the same confinement discipline `FixedWindowState`/`SlidingLogState` use
//! elsewhere in this workspace.

use std::time::Duration;

/// One sampled request.
#[derive(Debug, Clone, Copy)]
struct Sample {
    /// Milliseconds since the ring's epoch (an arbitrary monotonic origin).
    timestamp_ms: u64,
    response_time_ms: u32,
    was_error: bool,
}

/// Fixed-capacity ring buffer of recent request samples.
///
/// `record` overwrites the oldest entry once the ring is full; the count of
/// live entries saturates at `capacity` (spec invariant 5: the count is
/// monotone non-increasing over any span with no new `record` calls, which
/// holds trivially here since entries are only ever overwritten, not
/// individually evicted).
#[derive(Debug)]
pub struct SampleRing {
    capacity: usize,
    samples: Vec<Option<Sample>>,
    head: usize,
    filled: usize,
}

impl SampleRing {
    /// Creates a ring with room for `capacity` samples (spec default: 100).
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SampleRing capacity must be > 0");
        Self {
            capacity,
            samples: vec![None; capacity],
            head: 0,
            filled: 0,
        }
    }

    /// Records one sample. `now_ms` must be a monotonically non-decreasing
    /// millisecond counter from the caller's clock.
    pub fn record(&mut self, now_ms: u64, response_time: Duration, was_error: bool) {
        let response_time_ms = response_time.as_millis().min(u32::MAX as u128) as u32;
        self.samples[self.head] = Some(Sample {
            timestamp_ms: now_ms,
            response_time_ms,
            was_error,
        });
        self.head = (self.head + 1) % self.capacity;
        self.filled = (self.filled + 1).min(self.capacity);
    }

    /// Number of samples currently held (≤ capacity).
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn iter_samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter_map(|s| s.as_ref())
    }

    /// Count of samples with `timestamp_ms > now_ms.saturating_sub(60_000)`.
    pub fn requests_in_last_minute(&self, now_ms: u64) -> usize {
        let window_start = now_ms.saturating_sub(60_000);
        self.iter_samples()
            .filter(|s| s.timestamp_ms > window_start)
            .count()
    }

    /// Average response time across all non-zero-duration samples. `None`
    /// if there are no such samples.
    pub fn average_response_time(&self) -> Option<Duration> {
        let (sum, count) = self
            .iter_samples()
            .filter(|s| s.response_time_ms > 0)
            .fold((0u64, 0u64), |(sum, count), s| {
                (sum + s.response_time_ms as u64, count + 1)
            });
        if count == 0 {
            None
        } else {
            Some(Duration::from_millis(sum / count))
        }
    }

    /// Fraction of samples (0.0–1.0) flagged as errors. `0.0` when empty.
    pub fn error_rate(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        let errors = self.iter_samples().filter(|s| s.was_error).count();
        errors as f64 / self.filled as f64
    }

    /// Fraction of samples (0.0–1.0) that were successful. `0.0` when empty.
    pub fn success_rate(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        1.0 - self.error_rate()
    }

    /// Number of consecutive errors at the tail of recorded history, walking
    /// backward from the most recently recorded sample.
    pub fn consecutive_errors(&self) -> usize {
        self.consecutive_tail(|s| s.was_error)
    }

    /// Number of consecutive successes at the tail of recorded history.
    pub fn consecutive_successes(&self) -> usize {
        self.consecutive_tail(|s| !s.was_error)
    }

    fn consecutive_tail(&self, predicate: impl Fn(&Sample) -> bool) -> usize {
        if self.filled == 0 {
            return 0;
        }
        let mut count = 0;
        let mut idx = (self.head + self.capacity - 1) % self.capacity;
        for _ in 0..self.filled {
            match &self.samples[idx] {
                Some(s) if predicate(s) => {
                    count += 1;
                    idx = (idx + self.capacity - 1) % self.capacity;
                }
                _ => break,
            }
        }
        count
    }

    /// The oldest sample's timestamp still resident in the ring, if any.
    /// Used by the controller to compute how long to wait for the window to
    /// free a slot (spec §4.3, step 4).
    pub fn oldest_timestamp_ms(&self) -> Option<u64> {
        if self.filled == 0 {
            return None;
        }
        let oldest_idx = if self.filled < self.capacity {
            0
        } else {
            self.head
        };
        self.samples[oldest_idx].map(|s| s.timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_reports_zero() {
        let ring = SampleRing::new(4);
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.requests_in_last_minute(10_000), 0);
        assert!(ring.average_response_time().is_none());
        assert_eq!(ring.error_rate(), 0.0);
    }

    #[test]
    fn len_saturates_at_capacity() {
        let mut ring = SampleRing::new(3);
        for i in 0..10u64 {
            ring.record(i * 1000, Duration::from_millis(10), false);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.capacity(), 3);
    }

    #[test]
    fn requests_in_last_minute_excludes_old_samples() {
        let mut ring = SampleRing::new(10);
        ring.record(0, Duration::ZERO, false);
        ring.record(30_000, Duration::ZERO, false);
        ring.record(70_000, Duration::ZERO, false);

        // at t=90_000, window is (30_000, 90_000]
        assert_eq!(ring.requests_in_last_minute(90_000), 2);
    }

    #[test]
    fn average_response_time_ignores_zero_duration_samples() {
        let mut ring = SampleRing::new(10);
        ring.record(0, Duration::ZERO, false);
        ring.record(1, Duration::from_millis(100), false);
        ring.record(2, Duration::from_millis(300), false);

        assert_eq!(ring.average_response_time(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn error_and_success_rate_are_complementary() {
        let mut ring = SampleRing::new(10);
        ring.record(0, Duration::from_millis(1), true);
        ring.record(1, Duration::from_millis(1), false);
        ring.record(2, Duration::from_millis(1), false);
        ring.record(3, Duration::from_millis(1), false);

        assert!((ring.error_rate() - 0.25).abs() < f64::EPSILON);
        assert!((ring.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn consecutive_errors_counts_from_the_tail() {
        let mut ring = SampleRing::new(10);
        ring.record(0, Duration::from_millis(1), false);
        ring.record(1, Duration::from_millis(1), true);
        ring.record(2, Duration::from_millis(1), true);
        ring.record(3, Duration::from_millis(1), true);

        assert_eq!(ring.consecutive_errors(), 3);
        assert_eq!(ring.consecutive_successes(), 0);
    }

    #[test]
    fn consecutive_successes_resets_on_an_error() {
        let mut ring = SampleRing::new(10);
        ring.record(0, Duration::from_millis(1), true);
        ring.record(1, Duration::from_millis(1), false);
        ring.record(2, Duration::from_millis(1), false);

        assert_eq!(ring.consecutive_successes(), 2);
    }

    #[test]
    fn wraparound_overwrites_oldest_first() {
        let mut ring = SampleRing::new(2);
        ring.record(0, Duration::ZERO, false);
        ring.record(1000, Duration::ZERO, false);
        ring.record(2000, Duration::ZERO, false); // overwrites ts=0

        assert_eq!(ring.oldest_timestamp_ms(), Some(1000));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn monotone_non_increasing_count_with_no_new_records() {
        // invariant 5: count never grows without a record() call.
        let mut ring = SampleRing::new(5);
        ring.record(0, Duration::ZERO, false);
        let count_a = ring.requests_in_last_minute(100_000);
        let count_b = ring.requests_in_last_minute(200_000);
        assert!(count_b <= count_a);
    }
}

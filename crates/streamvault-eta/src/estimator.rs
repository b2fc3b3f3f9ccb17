//! Weighted-average-speed ETA estimator (component C9, spec §4.9).

use std::collections::VecDeque;
use std::time::Duration;

const RECENCY_HALF_LIFE_MS: f64 = 30_000.0;
const MAX_SAMPLE_AGE_MS: u64 = 60_000;
const DEFAULT_MAX_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    timestamp_ms: u64,
    items_per_sec: f64,
}

/// One `update()` result: how long until completion, and how much to trust it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaEstimate {
    /// `None` when no speed signal exists yet (first call, or zero throughput).
    pub eta: Option<Duration>,
    pub avg_speed_items_per_sec: f64,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
}

/// Tracks recent throughput samples and derives a weighted-average speed
/// and completion estimate from them.
///
/// Keeps at most `max_samples` entries (default 10), each dropped once
/// older than 60s. Each `update()` call computes the instantaneous speed
/// since the previous call, so the first call after construction only
/// seeds the baseline and reports no ETA.
#[derive(Debug)]
pub struct EtaEstimator {
    max_samples: usize,
    samples: VecDeque<SpeedSample>,
    prev_processed: Option<u64>,
    prev_timestamp_ms: Option<u64>,
}

impl EtaEstimator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SAMPLES)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        assert!(max_samples > 0, "EtaEstimator capacity must be > 0");
        Self {
            max_samples,
            samples: VecDeque::new(),
            prev_processed: None,
            prev_timestamp_ms: None,
        }
    }

    /// Records `processed` items done as of `now_ms` (monotonic) out of
    /// `total`, and returns a fresh estimate.
    pub fn update(&mut self, now_ms: u64, processed: u64, total: u64) -> EtaEstimate {
        if let (Some(prev_processed), Some(prev_ms)) = (self.prev_processed, self.prev_timestamp_ms) {
            let dt_sec = now_ms.saturating_sub(prev_ms) as f64 / 1000.0;
            if dt_sec > 0.0 {
                let instant_speed = processed.saturating_sub(prev_processed) as f64 / dt_sec;
                self.samples.push_back(SpeedSample {
                    timestamp_ms: now_ms,
                    items_per_sec: instant_speed,
                });
            }
        }
        self.prev_processed = Some(processed);
        self.prev_timestamp_ms = Some(now_ms);

        while let Some(oldest) = self.samples.front() {
            if now_ms.saturating_sub(oldest.timestamp_ms) > MAX_SAMPLE_AGE_MS {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }

        let avg_speed = self.weighted_average_speed(now_ms);
        let remaining = total.saturating_sub(processed);
        let eta = if avg_speed > 0.0 {
            Some(Duration::from_secs_f64(remaining as f64 / avg_speed))
        } else {
            None
        };

        let confidence = self.confidence_score(avg_speed, processed, total);

        EtaEstimate {
            eta,
            avg_speed_items_per_sec: avg_speed,
            confidence,
        }
    }

    fn weighted_average_speed(&self, now_ms: u64) -> f64 {
        let n = self.samples.len();
        if n == 0 {
            return 0.0;
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (index, sample) in self.samples.iter().enumerate() {
            let age_ms = now_ms.saturating_sub(sample.timestamp_ms) as f64;
            let recency_weight = (-age_ms / RECENCY_HALF_LIFE_MS).exp();
            let position_weight = (index + 1) as f64 / n as f64;
            let weight = recency_weight * position_weight;
            weighted_sum += sample.items_per_sec * weight;
            weight_total += weight;
        }
        if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        }
    }

    fn confidence_score(&self, avg_speed: f64, processed: u64, total: u64) -> f64 {
        let stability_term = if avg_speed > 0.0 {
            let mean = self.samples.iter().map(|s| s.items_per_sec).sum::<f64>() / self.samples.len() as f64;
            let variance = self
                .samples
                .iter()
                .map(|s| (s.items_per_sec - mean).powi(2))
                .sum::<f64>()
                / self.samples.len() as f64;
            let std_dev = variance.sqrt();
            0.4 * (1.0 - (std_dev / avg_speed).min(1.0))
        } else {
            0.0
        };

        let sample_count_term = 0.3 * (self.samples.len() as f64 / DEFAULT_MAX_SAMPLES as f64).min(1.0);

        let progress_term = if total > 0 {
            0.3 * (processed as f64 / total as f64)
        } else {
            0.0
        };

        (stability_term + sample_count_term + progress_term).clamp(0.0, 1.0)
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::new()
    }
}

//! Tunables for [`AdaptiveController`](crate::AdaptiveController).

use std::time::Duration;

/// Severity classification passed to [`AdaptiveController::on_error`](crate::AdaptiveController::on_error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl ErrorSeverity {
    pub(crate) fn factor(self) -> f64 {
        match self {
            ErrorSeverity::Low => 1.2,
            ErrorSeverity::Medium => 1.5,
            ErrorSeverity::High => 2.0,
        }
    }
}

/// Configuration for an [`AdaptiveController`](crate::AdaptiveController).
///
/// Defaults match a moderately rate-limited REST API: a starting
/// concurrency of 20, never dropping below 1 nor exceeding 50.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub(crate) initial_concurrency: usize,
    pub(crate) min_concurrency: usize,
    pub(crate) max_concurrency: usize,
    pub(crate) base_interval: Duration,
    pub(crate) sample_size: usize,
    pub(crate) max_header_errors: u64,
    pub(crate) error_rate_ceil: f64,
    pub(crate) success_rate_floor: f64,
    pub(crate) increase_threshold: f64,
    pub(crate) decrease_threshold: f64,
    pub(crate) adjustment_cooldown: Duration,
    pub(crate) default_rate_limit: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: 20,
            min_concurrency: 1,
            max_concurrency: 50,
            base_interval: Duration::from_millis(100),
            sample_size: 100,
            max_header_errors: 5,
            error_rate_ceil: 0.1,
            success_rate_floor: 0.95,
            increase_threshold: 0.1,
            decrease_threshold: 0.2,
            adjustment_cooldown: Duration::from_secs(5),
            default_rate_limit: 100,
        }
    }
}

impl ControllerConfig {
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }
}

/// Builder for [`ControllerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    pub fn initial_concurrency(mut self, value: usize) -> Self {
        self.config.initial_concurrency = value;
        self
    }

    pub fn min_concurrency(mut self, value: usize) -> Self {
        self.config.min_concurrency = value;
        self
    }

    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.config.max_concurrency = value;
        self
    }

    pub fn base_interval(mut self, value: Duration) -> Self {
        self.config.base_interval = value;
        self
    }

    pub fn sample_size(mut self, value: usize) -> Self {
        self.config.sample_size = value;
        self
    }

    pub fn max_header_errors(mut self, value: u64) -> Self {
        self.config.max_header_errors = value;
        self
    }

    pub fn error_rate_ceil(mut self, value: f64) -> Self {
        self.config.error_rate_ceil = value;
        self
    }

    pub fn success_rate_floor(mut self, value: f64) -> Self {
        self.config.success_rate_floor = value;
        self
    }

    pub fn increase_threshold(mut self, value: f64) -> Self {
        self.config.increase_threshold = value;
        self
    }

    pub fn decrease_threshold(mut self, value: f64) -> Self {
        self.config.decrease_threshold = value;
        self
    }

    pub fn adjustment_cooldown(mut self, value: Duration) -> Self {
        self.config.adjustment_cooldown = value;
        self
    }

    pub fn default_rate_limit(mut self, value: u64) -> Self {
        self.config.default_rate_limit = value;
        self
    }

    pub fn build(self) -> ControllerConfig {
        self.config
    }
}

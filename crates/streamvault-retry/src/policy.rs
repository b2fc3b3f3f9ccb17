//! Retry decision-making: combines [`crate::ErrorClass`] with a backoff
//! schedule and an optional [`crate::RetryBudget`].

use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{exponential_with_jitter, random_jitter};
use crate::budget::RetryBudget;
use crate::classify::ErrorClass;

/// Tunables for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts allowed, including the first. Default: 3.
    pub max_attempts: usize,
    /// Backoff base; doubled per attempt, capped at 60s. Default: 100ms.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryConfigBuilder {
    config: RetryConfig,
    budget: Option<Arc<dyn RetryBudget>>,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
            budget: None,
        }
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.config.base_delay = base_delay;
        self
    }

    /// Shares a budget across every [`ErrorClass::Other`] decision made by
    /// the built policy, per spec: "low severity, retry until budget
    /// exhausted".
    pub fn budget(mut self, budget: Arc<dyn RetryBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            config: self.config,
            budget: self.budget,
        }
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What the caller should do about a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Wait `delay`, then try again.
    Retry { delay: Duration },
    /// Do not retry; the whole export run should stop.
    Fatal,
    /// Do not retry; record the error and move on to the next item.
    GiveUp,
}

/// Classifies failures and decides whether/how long to wait before retrying.
pub struct RetryPolicy {
    config: RetryConfig,
    budget: Option<Arc<dyn RetryBudget>>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            budget: None,
        }
    }

    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }

    /// `attempt` is 0-based: the number of attempts already made before this
    /// failure. `retry_after`, when present, overrides the computed backoff
    /// for [`ErrorClass::RateLimited`].
    pub fn decide(
        &self,
        class: ErrorClass,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if class.is_fatal() {
            return RetryDecision::Fatal;
        }

        match class {
            ErrorClass::Unauthorized | ErrorClass::Forbidden => RetryDecision::Fatal,
            ErrorClass::NotFound | ErrorClass::ValidationError => RetryDecision::GiveUp,
            ErrorClass::RateLimited => {
                if self.exhausted(attempt) {
                    return RetryDecision::GiveUp;
                }
                RetryDecision::Retry {
                    delay: retry_after.unwrap_or_else(|| self.backoff_delay(attempt)),
                }
            }
            ErrorClass::Network => {
                if self.exhausted(attempt) {
                    return RetryDecision::GiveUp;
                }
                RetryDecision::Retry {
                    delay: self.backoff_delay(attempt),
                }
            }
            ErrorClass::Other => {
                if self.exhausted(attempt) {
                    return RetryDecision::GiveUp;
                }
                if let Some(budget) = &self.budget {
                    if !budget.try_withdraw() {
                        return RetryDecision::GiveUp;
                    }
                }
                RetryDecision::Retry {
                    delay: self.backoff_delay(attempt),
                }
            }
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        (attempt as usize + 1) >= self.config.max_attempts
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        exponential_with_jitter(self.config.base_delay, attempt, random_jitter())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("budget", &self.budget.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::RetryBudgetBuilder;

    fn in_backoff_bounds(delay: Duration, base: Duration, attempt: u32) {
        let min = base.mul_f64(2f64.powi(attempt as i32));
        let max = base.mul_f64(2f64.powi(attempt as i32) * 1.25);
        assert!(delay >= min && delay <= max, "{delay:?} not in [{min:?}, {max:?}]");
    }

    #[test]
    fn unauthorized_and_forbidden_are_always_fatal() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(ErrorClass::Unauthorized, 0, None), RetryDecision::Fatal);
        assert_eq!(policy.decide(ErrorClass::Forbidden, 2, None), RetryDecision::Fatal);
    }

    #[test]
    fn not_found_and_validation_error_give_up_without_retrying() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(ErrorClass::NotFound, 0, None), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(ErrorClass::ValidationError, 0, None),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn rate_limited_honors_an_explicit_retry_after() {
        let policy = RetryPolicy::default();
        let decision = policy.decide(ErrorClass::RateLimited, 0, Some(Duration::from_secs(2)));
        assert_eq!(decision, RetryDecision::Retry { delay: Duration::from_secs(2) });
    }

    #[test]
    fn rate_limited_falls_back_to_backoff_without_a_retry_after() {
        let policy = RetryPolicy::builder().base_delay(Duration::from_millis(100)).build();
        match policy.decide(ErrorClass::RateLimited, 1, None) {
            RetryDecision::Retry { delay } => in_backoff_bounds(delay, Duration::from_millis(100), 1),
            other => panic!("expected Retry, got {other:?}"),
        }
    }

    #[test]
    fn network_errors_retry_until_max_attempts_then_give_up() {
        let policy = RetryPolicy::builder().max_attempts(3).build();
        assert!(matches!(
            policy.decide(ErrorClass::Network, 0, None),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.decide(ErrorClass::Network, 1, None),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide(ErrorClass::Network, 2, None), RetryDecision::GiveUp);
    }

    #[test]
    fn other_errors_give_up_once_the_budget_is_exhausted() {
        let budget = RetryBudgetBuilder::new()
            .token_bucket()
            .max_tokens(1)
            .initial_tokens(1)
            .build();
        let policy = RetryPolicy::builder().max_attempts(10).budget(budget).build();

        assert!(matches!(
            policy.decide(ErrorClass::Other, 0, None),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide(ErrorClass::Other, 1, None), RetryDecision::GiveUp);
    }
}

//! Error classification and retry backoff for export operations
//! (component C10).
//!
//! [`RetryPolicy::decide`] is the single entry point: it takes an
//! [`ErrorClass`] plus how many attempts have already been made, and returns
//! a [`RetryDecision`] telling the caller to wait, give up on the item, or
//! abort the whole run.

mod backoff;
mod budget;
mod classify;
mod policy;

pub use backoff::{exponential_with_jitter, random_jitter};
pub use budget::{AimdBudget, RetryBudget, RetryBudgetBuilder, TokenBucketBudget};
pub use classify::{Classify, ErrorClass};
pub use policy::{RetryConfig, RetryConfigBuilder, RetryDecision, RetryPolicy};

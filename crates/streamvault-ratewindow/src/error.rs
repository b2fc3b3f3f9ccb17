//! Errors raised while parsing rate-limit response headers (spec §4.2).

use thiserror::Error;

/// A single rate-limit header could not be interpreted.
///
/// Parse failures never abort an export; callers record one of these,
/// retain the previous [`RateLimitState`](crate::rate_limit_state::RateLimitState),
/// and feed it into the fallback-mode counter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("header {header:?} had an unparseable value {raw:?}")]
pub struct HeaderParseError {
    pub header: &'static str,
    pub raw: String,
}

impl HeaderParseError {
    pub fn new(header: &'static str, raw: impl Into<String>) -> Self {
        Self {
            header,
            raw: raw.into(),
        }
    }
}

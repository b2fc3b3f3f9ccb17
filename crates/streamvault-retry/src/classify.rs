//! Error classification (component C10).

use std::time::Duration;

use streamvault_controller::ErrorSeverity;

/// Adapts a caller's own error type into the classification
/// [`crate::RetryPolicy::decide`] needs, so generic call sites (like C6's
/// page-fetch loop) can retry without knowing anything about the concrete
/// error type beyond this trait.
pub trait Classify {
    fn classify(&self) -> ErrorClass;

    /// A server-supplied override for how long to wait before retrying
    /// (e.g. a parsed `Retry-After` header), if any. Only consulted for
    /// [`ErrorClass::RateLimited`].
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Classify for std::convert::Infallible {
    fn classify(&self) -> ErrorClass {
        match *self {}
    }
}

/// The category an export operation's failure falls into.
///
/// Classification drives both the retry decision ([`crate::RetryPolicy::decide`])
/// and the severity fed back into the concurrency controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// HTTP 429 or an equivalent rate-limit response.
    RateLimited,
    /// HTTP 401 or equivalent.
    Unauthorized,
    /// HTTP 403 or equivalent.
    Forbidden,
    /// HTTP 404 or equivalent.
    NotFound,
    /// A request the server rejected as malformed (HTTP 400/422).
    ValidationError,
    /// Connection reset, timeout, DNS failure, and similar transport faults.
    Network,
    /// Anything not covered by the above.
    Other,
}

impl ErrorClass {
    /// Maps an HTTP-like status code onto a class.
    ///
    /// Codes outside the ranges below (2xx/3xx, unmapped 4xx) fall back to
    /// [`ErrorClass::Other`]; callers should only invoke this for response
    /// codes that already indicate failure.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            429 => ErrorClass::RateLimited,
            401 => ErrorClass::Unauthorized,
            403 => ErrorClass::Forbidden,
            404 => ErrorClass::NotFound,
            400 | 422 => ErrorClass::ValidationError,
            _ => ErrorClass::Other,
        }
    }

    /// The severity to report to [`streamvault_controller::AdaptiveController::on_error`].
    pub fn severity(self) -> ErrorSeverity {
        match self {
            ErrorClass::RateLimited | ErrorClass::Unauthorized | ErrorClass::Forbidden => {
                ErrorSeverity::High
            }
            ErrorClass::NotFound | ErrorClass::ValidationError | ErrorClass::Network => {
                ErrorSeverity::Medium
            }
            ErrorClass::Other => ErrorSeverity::Low,
        }
    }

    /// `true` for classes that should never be retried, regardless of
    /// attempts remaining.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorClass::Unauthorized | ErrorClass::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_the_documented_classes() {
        assert_eq!(ErrorClass::from_http_status(429), ErrorClass::RateLimited);
        assert_eq!(ErrorClass::from_http_status(401), ErrorClass::Unauthorized);
        assert_eq!(ErrorClass::from_http_status(403), ErrorClass::Forbidden);
        assert_eq!(ErrorClass::from_http_status(404), ErrorClass::NotFound);
        assert_eq!(ErrorClass::from_http_status(400), ErrorClass::ValidationError);
        assert_eq!(ErrorClass::from_http_status(422), ErrorClass::ValidationError);
        assert_eq!(ErrorClass::from_http_status(500), ErrorClass::Other);
    }

    #[test]
    fn only_unauthorized_and_forbidden_are_fatal() {
        assert!(ErrorClass::Unauthorized.is_fatal());
        assert!(ErrorClass::Forbidden.is_fatal());
        assert!(!ErrorClass::RateLimited.is_fatal());
        assert!(!ErrorClass::NotFound.is_fatal());
        assert!(!ErrorClass::ValidationError.is_fatal());
        assert!(!ErrorClass::Network.is_fatal());
        assert!(!ErrorClass::Other.is_fatal());
    }

    #[test]
    fn severity_matches_the_high_medium_low_split() {
        assert_eq!(ErrorClass::RateLimited.severity(), ErrorSeverity::High);
        assert_eq!(ErrorClass::Unauthorized.severity(), ErrorSeverity::High);
        assert_eq!(ErrorClass::Forbidden.severity(), ErrorSeverity::High);
        assert_eq!(ErrorClass::NotFound.severity(), ErrorSeverity::Medium);
        assert_eq!(ErrorClass::ValidationError.severity(), ErrorSeverity::Medium);
        assert_eq!(ErrorClass::Network.severity(), ErrorSeverity::Medium);
        assert_eq!(ErrorClass::Other.severity(), ErrorSeverity::Low);
    }
}

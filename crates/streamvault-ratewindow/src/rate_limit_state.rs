//! Rate-limit header state tracking (spec §4.2, component C2).

use crate::error::HeaderParseError;

/// How to interpret the `x-ratelimit-reset` header's numeric value.
///
/// The upstream API this system was distilled from mixes both conventions
/// in the wild and disambiguates using a magnitude heuristic (see
/// [`ResetInterpretation::Heuristic`]). Callers that know their source's
/// convention can pin it instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetInterpretation {
    /// `value > 1e9` is treated as absolute seconds-since-epoch, otherwise
    /// as seconds-from-now. Matches the observed source behavior.
    #[default]
    Heuristic,
    /// Always absolute seconds-since-epoch.
    AbsoluteEpoch,
    /// Always seconds-from-now.
    RelativeSeconds,
}

const EPOCH_HEURISTIC_THRESHOLD: f64 = 1e9;

impl ResetInterpretation {
    fn resolve(self, value: f64, now_epoch_ms: u64, now_monotonic_ms: u64) -> u64 {
        let is_absolute = match self {
            ResetInterpretation::Heuristic => value > EPOCH_HEURISTIC_THRESHOLD,
            ResetInterpretation::AbsoluteEpoch => true,
            ResetInterpretation::RelativeSeconds => false,
        };
        if is_absolute {
            let target_epoch_ms = (value * 1000.0) as u64;
            let delta_ms = target_epoch_ms.saturating_sub(now_epoch_ms);
            now_monotonic_ms.saturating_add(delta_ms)
        } else {
            now_monotonic_ms.saturating_add((value * 1000.0) as u64)
        }
    }
}

/// Snapshot of the most recently observed rate-limit headers, expressed on
/// the caller's monotonic millisecond clock.
///
/// Invariant: `0 ≤ remaining ≤ limit` holds after every successful header
/// update (spec §3). A parse failure never mutates this struct; the caller
/// retains the previous value and records the error separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: u64,
    pub limit: u64,
    pub reset_at_ms: u64,
    pub retry_after_at_ms: u64,
    pub last_header_update_ms: u64,
}

impl RateLimitState {
    /// An initial state with no observed headers: an effectively unlimited
    /// budget until the first real header arrives.
    pub fn unlimited(limit: u64) -> Self {
        Self {
            remaining: limit,
            limit,
            reset_at_ms: 0,
            retry_after_at_ms: 0,
            last_header_update_ms: 0,
        }
    }

    /// Restores `remaining` to `limit`, used when the window has elapsed
    /// without a fresh header update (spec §4.3 step 2's "optimistic
    /// restore").
    pub fn restore_remaining(&mut self) {
        self.remaining = self.limit;
    }
}

/// Parses rate-limit headers and maintains a [`RateLimitState`], with a
/// bounded error counter that drives fallback-mode entry (spec §4.2).
///
/// Header lookups are case-insensitive; callers normally pass the header
/// map as received from the transport layer without pre-lowercasing keys.
#[derive(Debug)]
pub struct RateLimitTracker {
    state: RateLimitState,
    reset_interpretation: ResetInterpretation,
    header_parsing_errors: u64,
    max_header_errors: u64,
    in_fallback_mode: bool,
}

impl RateLimitTracker {
    pub fn new(default_limit: u64, max_header_errors: u64) -> Self {
        Self {
            state: RateLimitState::unlimited(default_limit),
            reset_interpretation: ResetInterpretation::default(),
            header_parsing_errors: 0,
            max_header_errors,
            in_fallback_mode: false,
        }
    }

    pub fn with_reset_interpretation(mut self, interpretation: ResetInterpretation) -> Self {
        self.reset_interpretation = interpretation;
        self
    }

    pub fn state(&self) -> RateLimitState {
        self.state
    }

    /// Optimistically restores `remaining` to `limit`, used once the
    /// reset deadline has passed without a fresh header update.
    pub fn restore_remaining(&mut self) {
        self.state.restore_remaining();
    }

    pub fn header_parsing_errors(&self) -> u64 {
        self.header_parsing_errors
    }

    /// Whether the tracker has tripped into fallback mode (spec §4.2). Stays
    /// true until the next successful header update clears it.
    pub fn in_fallback_mode(&self) -> bool {
        self.in_fallback_mode
    }

    /// Parses one response's headers and updates state. `now_epoch_ms` and
    /// `now_monotonic_ms` must come from the same instant, observed on two
    /// different clocks (wall-clock for absolute reset interpretation,
    /// monotonic for scheduling).
    ///
    /// Returns the parse errors encountered; a partially-parseable header
    /// set still updates whichever fields parsed, but [`HeaderParseError`]s
    /// are reported for the rest and count toward the fallback threshold.
    pub fn update<'a>(
        &mut self,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
        now_epoch_ms: u64,
        now_monotonic_ms: u64,
    ) -> Vec<HeaderParseError> {
        let mut limit = None;
        let mut remaining = None;
        let mut reset_raw: Option<&str> = None;
        let mut retry_after_raw: Option<&str> = None;

        for (key, value) in headers {
            match key.to_ascii_lowercase().as_str() {
                "x-ratelimit-limit" => limit = Some(value),
                "x-ratelimit-remaining" => remaining = Some(value),
                "x-ratelimit-reset" => reset_raw = Some(value),
                "retry-after" => retry_after_raw = Some(value),
                _ => {}
            }
        }

        let mut errors = Vec::new();
        let mut any_parsed = false;

        let parsed_limit = limit.and_then(|v| {
            v.parse::<u64>()
                .inspect_err(|_| errors.push(HeaderParseError::new("x-ratelimit-limit", v)))
                .ok()
        });
        let parsed_remaining = remaining.and_then(|v| {
            v.parse::<u64>()
                .inspect_err(|_| errors.push(HeaderParseError::new("x-ratelimit-remaining", v)))
                .ok()
        });
        let parsed_reset = reset_raw.and_then(|v| {
            v.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .or_else(|| {
                    errors.push(HeaderParseError::new("x-ratelimit-reset", v));
                    None
                })
        });
        let parsed_retry_after = retry_after_raw.and_then(|v| {
            v.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .or_else(|| {
                    errors.push(HeaderParseError::new("retry-after", v));
                    None
                })
        });

        if let Some(limit) = parsed_limit {
            self.state.limit = limit;
            any_parsed = true;
        }
        if let Some(remaining) = parsed_remaining {
            self.state.remaining = remaining.min(self.state.limit);
            any_parsed = true;
        }
        if let Some(reset) = parsed_reset {
            self.state.reset_at_ms =
                self.reset_interpretation
                    .resolve(reset, now_epoch_ms, now_monotonic_ms);
            any_parsed = true;
        }
        if let Some(retry_after) = parsed_retry_after {
            self.state.retry_after_at_ms = now_monotonic_ms.saturating_add((retry_after * 1000.0) as u64);
            any_parsed = true;
        }

        if any_parsed {
            self.state.last_header_update_ms = now_monotonic_ms;
        }

        if errors.is_empty() {
            if any_parsed {
                self.header_parsing_errors = 0;
                self.in_fallback_mode = false;
            }
        } else {
            self.header_parsing_errors += errors.len() as u64;
            if self.header_parsing_errors >= self.max_header_errors {
                self.in_fallback_mode = true;
            }
        }

        errors
    }
}

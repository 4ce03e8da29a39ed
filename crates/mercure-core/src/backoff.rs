//! Retry delay computation for transient upstream failures.
//!
//! Pure policy: given the attempt number and the classified error, decide
//! how long to wait before the next try. Whether an error is retryable at
//! all is the error's own business ([`AppError::is_retryable`]).

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::AppError;

/// Exponential backoff with a floor honored against server hints.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay; attempt `n` waits `base × 2^n` (capped).
    pub base_delay: Duration,

    /// Ceiling on any single computed delay.
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay before retrying after `error`, on 0-indexed attempt `attempt`.
    ///
    /// A rate-limit error carrying a `Retry-After` hint never waits less
    /// than the hint: the effective delay is `max(hint, computed backoff)`.
    pub fn next_delay(&self, attempt: u32, error: &AppError) -> Duration {
        let computed = self.exponential(attempt);
        match error {
            AppError::RateLimited {
                retry_after: Some(hint),
            } => computed.max(*hint),
            _ => computed,
        }
    }

    fn exponential(&self, attempt: u32) -> Duration {
        // 2^16 already overshoots any realistic max_delay.
        let factor = 1u32 << attempt.min(16);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Parse an HTTP `Retry-After` header value.
///
/// Accepts either a whole-second count (`"2"`) or an HTTP date
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). A date in the past yields
/// `Duration::ZERO`; anything unparsable yields `None`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

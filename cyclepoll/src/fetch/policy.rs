//! Attempt budget and server-error delays for the fetch client.
//!
//! A 5xx response sleeps for [`RetryPolicy::delay_for_attempt`] before the
//! next attempt. A 429 waits for the rate-limit reset instead and only uses
//! the policy delay when the reset header is unusable. Both consume an
//! attempt.

use std::time::Duration;

/// Attempts per request, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay after a server error, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Longest delay a doubling policy reaches.
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(30);

/// Attempt budget and delays for retryable responses.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// One attempt, never retried.
    None,

    /// Same delay after every retryable response.
    Fixed { max_attempts: u32, delay: Duration },

    /// Delay doubles after each retryable response, up to `max_delay`.
    ExponentialBackoff {
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    /// Constant `delay` between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Starts at `initial_delay` and doubles, capped at 30 seconds.
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay,
            max_delay: MAX_BACKOFF_DELAY.max(initial_delay),
        }
    }

    /// Wait after attempt number `attempt` (1-based) failed retryably.
    ///
    /// `None` means `attempt` was the last one the budget allows.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            return None;
        }
        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                ..
            } => {
                let doublings = attempt.saturating_sub(1).min(31);
                let delay = initial_delay
                    .checked_mul(1u32 << doublings)
                    .unwrap_or(*max_delay);
                Some(delay.min(*max_delay))
            }
        }
    }

    /// Attempts per request; a zero budget still makes one attempt.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } | Self::ExponentialBackoff { max_attempts, .. } => {
                (*max_attempts).max(1)
            }
        }
    }
}

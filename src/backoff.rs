//! Exponential backoff with jitter for model-service retries.
//!
//! The delay before retry `n` (0-based) is
//!
//! ```text
//! min(cap, base × 2^n) + uniform(0, jitter_max)
//! ```
//!
//! With the defaults (1 s base, 300 s cap, 100 ms jitter) the waits run
//! 1 s → 2 s → 4 s → 8 s, and a long outage never waits more than five
//! minutes between attempts. The jitter keeps several clients that failed at
//! the same moment from retrying in lockstep.
//!
//! [`BackoffPolicy`] holds no mutable state, so one policy can be shared by
//! any number of concurrent callers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry timing and budget for calls to the model service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry. Default: 1 s.
    pub base_delay: Duration,

    /// Upper bound on the exponential term. Default: 300 s.
    pub cap: Duration,

    /// Exclusive upper bound of the random jitter added to each delay.
    /// Default: 100 ms. Zero disables jitter.
    pub jitter_max: Duration,

    /// Total attempts (first try included) before a call gives up. Default: 5.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            cap: Duration::from_secs(300),
            jitter_max: Duration::from_millis(100),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// The capped exponential term for `attempt`, without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        // 2^63 seconds already dwarfs any sane cap; clamping keeps powi finite.
        let factor = 2f64.powi(attempt.min(63) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.cap.as_secs_f64() {
            self.cap
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay to wait after failed attempt `attempt` (0-based).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        self.base_delay_for(attempt) + self.jitter()
    }

    /// True once `attempt` attempts have used up a budget of `max_attempts`.
    ///
    /// The policy only reports the condition; the caller decides how to fail.
    pub fn is_exhausted(attempt: u32, max_attempts: u32) -> bool {
        attempt >= max_attempts
    }

    fn jitter(&self) -> Duration {
        let max = self.jitter_max.as_secs_f64();
        if max <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rand::rng().random_range(0.0..max))
    }
}

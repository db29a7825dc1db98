use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::rate_limiter_core::RateLimiterCore;
use crate::rate_limiters::{TokenBucketCore, TokenBucketCoreConfig};
use crate::types::{ticks_to_duration, Uint};
use crate::{VerboseAcquireResult, VerboseRateLimitError};

/// A rate limiter core read against a clock.
///
/// This is the only path to the upstream budget: the queue worker calls
/// [`try_consume`](AdmissionGate::try_consume) before every upstream call,
/// retries included.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use statsync_core::clock::ManualClock;
/// use statsync_core::rate_limiters::{AdmissionGate, TokenBucketCoreConfig};
///
/// let clock = Arc::new(ManualClock::new(0));
/// let gate = AdmissionGate::token_bucket(
///     TokenBucketCoreConfig { capacity: 2, refill_interval: 1000, refill_amount: 1, initial_tokens: None },
///     clock.clone(),
/// );
/// assert!(gate.try_consume(2));
/// assert!(!gate.try_consume(1));
/// clock.advance(1000);
/// assert!(gate.try_consume(1));
/// ```
#[derive(Clone)]
pub struct AdmissionGate {
    core: Arc<dyn RateLimiterCore>,
    clock: Arc<dyn Clock>,
}

impl AdmissionGate {
    pub fn new(core: Arc<dyn RateLimiterCore>, clock: Arc<dyn Clock>) -> Self {
        AdmissionGate { core, clock }
    }

    /// Gate backed by a [`TokenBucketCore`] built from `config`.
    pub fn token_bucket(config: TokenBucketCoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(TokenBucketCore::from(config)), clock)
    }

    /// Takes `tokens` from the budget if available now.
    ///
    /// Returns `false` without changing the budget otherwise.
    pub fn try_consume(&self, tokens: Uint) -> bool {
        self.core.try_acquire_at(self.clock.now(), tokens).is_ok()
    }

    /// Like [`try_consume`](Self::try_consume), with the reason for a denial.
    pub fn try_consume_verbose(&self, tokens: Uint) -> VerboseAcquireResult {
        self.core.try_acquire_verbose_at(self.clock.now(), tokens)
    }

    /// Tokens available right now (0 if the bucket is contended).
    pub fn remaining(&self) -> Uint {
        self.core.capacity_remaining_or_0(self.clock.now())
    }
}

/// How long to wait after a denial before asking the gate again.
///
/// Insufficient capacity waits for the bucket's own estimate; every other
/// denial retries at the minimum. The result is clamped to `[min, max]`.
pub fn denial_backoff(err: &VerboseRateLimitError, min: Duration, max: Duration) -> Duration {
    let wait = match err {
        VerboseRateLimitError::InsufficientCapacity { retry_after_ticks, .. } => {
            ticks_to_duration(*retry_after_ticks)
        }
        VerboseRateLimitError::BeyondCapacity { .. } => max,
        VerboseRateLimitError::ExpiredTick { .. } | VerboseRateLimitError::ContentionFailure => min,
    };
    wait.clamp(min, max.max(min))
}

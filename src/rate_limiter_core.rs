//! Core trait for rate limiter algorithms.
//!
//! The admission gate talks to its bucket only through this trait, so the
//! bucket algorithm stays a pure tick-driven state machine.

pub use crate::types::Uint;
use crate::{SimpleAcquireResult, SimpleRateLimitError, VerboseAcquireResult};

/// The core trait for rate limiter algorithms.
///
/// Implementors of this trait provide the basic operations needed by the
/// admission gate. Time is supplied by the caller as ticks.
pub trait RateLimiterCore: Send + Sync {
    /// Attempts to acquire the specified number of tokens at the given tick.
    ///
    /// # Arguments
    /// * `tick` - Current time tick (from the application)
    /// * `tokens` - Number of tokens to acquire
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err(SimpleRateLimitError)` if denied or failed
    fn try_acquire_at(&self, tick: Uint, tokens: Uint) -> SimpleAcquireResult;

    /// Attempts to acquire tokens at the given tick, returning detailed diagnostics.
    ///
    /// The verbose error carries `retry_after_ticks`, which the queue worker
    /// uses to size its backoff.
    fn try_acquire_verbose_at(&self, tick: Uint, tokens: Uint) -> VerboseAcquireResult;

    /// Returns the number of tokens that can still be acquired at the given tick.
    fn capacity_remaining(&self, tick: Uint) -> Result<Uint, SimpleRateLimitError>;

    /// Like [`capacity_remaining`](Self::capacity_remaining), reporting 0 on error.
    fn capacity_remaining_or_0(&self, tick: Uint) -> Uint {
        self.capacity_remaining(tick).unwrap_or(0)
    }
}

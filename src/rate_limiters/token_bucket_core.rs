use std::sync::Mutex;
use crate::{SimpleAcquireResult, SimpleRateLimitError, Uint, VerboseAcquireResult, VerboseRateLimitError};
use crate::rate_limiter_core::RateLimiterCore;

/// Core implementation of the token bucket rate limiting algorithm.
///
/// The bucket holds the upstream request budget. It is refilled with
/// `refill_amount` tokens every `refill_interval` ticks, up to `capacity`.
/// Refill is computed lazily from the tick passed to each call, so no
/// background timer is needed.
///
/// # Algorithm Behavior
///
/// - The bucket starts full unless built with [`TokenBucketCore::with_tokens`]
/// - Tokens are added at whole refill intervals, capped at capacity
/// - The refill anchor only moves by whole intervals, so partial progress
///   towards the next token is never lost
/// - A request that cannot be satisfied leaves the token count untouched
///
/// # Example
///
/// ```rust
/// use statsync_core::rate_limiters::TokenBucketCore;
///
/// // Create a bucket with capacity 100, refilling 5 tokens every 10 ticks
/// let bucket = TokenBucketCore::new(100, 10, 5);
///
/// // Use all initial tokens
/// assert_eq!(bucket.try_acquire_at(0, 100), Ok(()));
///
/// // Should fail - no tokens left
/// assert!(bucket.try_acquire_at(0, 1).is_err());
///
/// // After refill interval, 5 tokens are added
/// assert_eq!(bucket.try_acquire_at(10, 5), Ok(()));
/// ```
pub struct TokenBucketCore {
    /// Maximum number of tokens the bucket can hold
    capacity: Uint,
    /// Number of ticks between each refill event
    refill_interval: Uint,
    /// Number of tokens added in each refill event
    refill_amount: Uint,
    /// Internal state protected by mutex for thread safety
    state: Mutex<TokenBucketCoreState>,
}

/// Internal state of the token bucket
struct TokenBucketCoreState {
    /// Current number of tokens available in the bucket
    available: Uint,
    /// Tick when the last refill occurred (used for calculating elapsed time)
    last_refill_tick: Uint,
}

impl TokenBucketCoreState {
    /// Adds every whole interval's worth of tokens elapsed since the last refill.
    #[inline(always)]
    fn refill(&mut self, tick: Uint, capacity: Uint, refill_interval: Uint, refill_amount: Uint) {
        let elapsed_ticks = tick - self.last_refill_tick;
        let refill_times = elapsed_ticks / refill_interval;
        let total_refilled = refill_times.saturating_mul(refill_amount);

        self.available = self.available.saturating_add(total_refilled).min(capacity);

        if refill_times > 0 {
            self.last_refill_tick += refill_times * refill_interval;
        }
    }
}

impl RateLimiterCore for TokenBucketCore {
    #[inline(always)]
    fn try_acquire_at(&self, tick: Uint, tokens: Uint) -> SimpleAcquireResult {
        self.try_acquire_at(tick, tokens)
    }

    #[inline(always)]
    fn try_acquire_verbose_at(&self, tick: Uint, tokens: Uint) -> VerboseAcquireResult {
        self.try_acquire_verbose_at(tick, tokens)
    }

    #[inline(always)]
    fn capacity_remaining(&self, tick: Uint) -> Result<Uint, SimpleRateLimitError> {
        self.capacity_remaining(tick)
    }
}

impl TokenBucketCore {
    /// Creates a new, full token bucket.
    ///
    /// # Parameters
    ///
    /// * `capacity` - Maximum number of tokens the bucket can hold
    /// * `refill_interval` - Number of ticks between refill events
    /// * `refill_amount` - Number of tokens added per refill interval
    ///
    /// # Panics
    ///
    /// Panics if any parameter is zero.
    pub fn new(capacity: Uint, refill_interval: Uint, refill_amount: Uint) -> Self {
        Self::with_tokens(capacity, refill_interval, refill_amount, capacity)
    }

    /// Creates a token bucket holding `initial` tokens at tick 0.
    ///
    /// # Panics
    ///
    /// Panics if `capacity`, `refill_interval` or `refill_amount` is zero, or if
    /// `initial` exceeds `capacity`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use statsync_core::rate_limiters::TokenBucketCore;
    ///
    /// // Empty bucket, one token per second (ticks are milliseconds)
    /// let bucket = TokenBucketCore::with_tokens(10, 1000, 1, 0);
    /// assert!(bucket.try_acquire_at(0, 1).is_err());
    /// assert_eq!(bucket.try_acquire_at(1000, 1), Ok(()));
    /// ```
    pub fn with_tokens(capacity: Uint, refill_interval: Uint, refill_amount: Uint, initial: Uint) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        assert!(refill_interval > 0, "refill_interval must be greater than 0");
        assert!(refill_amount > 0, "refill_amount must be greater than 0");
        assert!(initial <= capacity, "initial tokens must not exceed capacity");

        TokenBucketCore {
            capacity,
            refill_interval,
            refill_amount,
            state: Mutex::new(TokenBucketCoreState {
                available: initial,
                last_refill_tick: 0,
            }),
        }
    }

    /// Maximum number of tokens the bucket can hold.
    pub fn capacity(&self) -> Uint {
        self.capacity
    }

    /// Attempts to acquire the specified number of tokens at the given tick.
    ///
    /// This method first calculates how many tokens should have been added since the
    /// last operation, updates the bucket state accordingly, then checks if sufficient
    /// tokens are available for the request.
    ///
    /// # Returns
    /// * `Ok(())` - If the tokens were successfully acquired
    /// * `Err(SimpleRateLimitError::InsufficientCapacity)` - If insufficient tokens are available
    /// * `Err(SimpleRateLimitError::ContentionFailure)` - If unable to acquire the internal lock
    /// * `Err(SimpleRateLimitError::ExpiredTick)` - If the tick is older than the last refill
    #[inline(always)]
    pub fn try_acquire_at(&self, tick: Uint, tokens: Uint) -> SimpleAcquireResult {
        // Zero tokens always succeed
        if tokens == 0 {
            return Ok(());
        }

        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Err(SimpleRateLimitError::ContentionFailure),
        };

        // Prevent time from going backwards
        if tick < state.last_refill_tick {
            return Err(SimpleRateLimitError::ExpiredTick);
        }

        state.refill(tick, self.capacity, self.refill_interval, self.refill_amount);

        if tokens <= state.available {
            state.available -= tokens;
            Ok(())
        } else {
            Err(SimpleRateLimitError::InsufficientCapacity)
        }
    }

    /// Attempts to acquire the specified number of tokens at the given tick,
    /// returning detailed diagnostics on failure.
    ///
    /// # Behavior
    /// - Tokens are added to the bucket based on the elapsed time since the last refill.
    /// - If sufficient tokens are available, the request is allowed and tokens are deducted.
    /// - If not enough tokens are available, an error is returned with the number
    ///   of ticks until enough tokens will have been refilled.
    /// - If the requested tokens permanently exceed the configured capacity,
    ///   a `BeyondCapacity` error is returned.
    ///
    /// # Example
    /// ```
    /// use statsync_core::rate_limiters::TokenBucketCore;
    /// use statsync_core::VerboseRateLimitError;
    ///
    /// let bucket = TokenBucketCore::with_tokens(10, 1000, 1, 0);
    ///
    /// match bucket.try_acquire_verbose_at(250, 1) {
    ///     Err(VerboseRateLimitError::InsufficientCapacity { retry_after_ticks, .. }) => {
    ///         assert_eq!(retry_after_ticks, 750);
    ///     }
    ///     other => panic!("unexpected {:?}", other),
    /// }
    /// ```
    #[inline(always)]
    pub fn try_acquire_verbose_at(&self, tick: Uint, tokens: Uint) -> VerboseAcquireResult {
        if tokens == 0 {
            return Ok(());
        }

        let mut state = self.state.try_lock()
            .map_err(|_| VerboseRateLimitError::ContentionFailure)?;

        if tick < state.last_refill_tick {
            return Err(VerboseRateLimitError::ExpiredTick {
                min_acceptable_tick: state.last_refill_tick,
            });
        }

        if tokens > self.capacity {
            return Err(VerboseRateLimitError::BeyondCapacity {
                acquiring: tokens,
                capacity: self.capacity,
            });
        }

        state.refill(tick, self.capacity, self.refill_interval, self.refill_amount);

        if tokens <= state.available {
            state.available -= tokens;
            Ok(())
        } else {
            let needed_tokens = tokens - state.available;
            let refills_needed = needed_tokens.div_ceil(self.refill_amount);
            // Progress already made towards the next refill counts
            let into_interval = tick - state.last_refill_tick;
            let retry_after_ticks = self.refill_interval
                .saturating_mul(refills_needed)
                .saturating_sub(into_interval);

            Err(VerboseRateLimitError::InsufficientCapacity {
                acquiring: tokens,
                available: state.available,
                retry_after_ticks,
            })
        }
    }

    /// Gets the current remaining token capacity.
    ///
    /// This method updates the bucket state based on elapsed time (performs refill),
    /// then returns the current number of available tokens.
    ///
    /// # Returns
    /// * `Ok(available_tokens)` - Current number of available tokens
    /// * `Err(SimpleRateLimitError::ContentionFailure)` - Unable to acquire internal lock
    /// * `Err(SimpleRateLimitError::ExpiredTick)` - Time went backwards
    #[inline(always)]
    pub fn capacity_remaining(&self, tick: Uint) -> Result<Uint, SimpleRateLimitError> {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Err(SimpleRateLimitError::ContentionFailure),
        };

        if tick < state.last_refill_tick {
            return Err(SimpleRateLimitError::ExpiredTick);
        }

        state.refill(tick, self.capacity, self.refill_interval, self.refill_amount);

        Ok(state.available)
    }

    /// Gets the current token count without updating refill state.
    #[inline(always)]
    pub fn current_capacity(&self) -> Result<Uint, SimpleRateLimitError> {
        let state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Err(SimpleRateLimitError::ContentionFailure),
        };

        Ok(state.available)
    }
}

/// Configuration structure for creating a `TokenBucketCore` limiter.
#[derive(Debug, Clone)]
pub struct TokenBucketCoreConfig {
    /// Maximum number of tokens the bucket can hold.
    pub capacity: Uint,
    /// Number of ticks between each refill event.
    pub refill_interval: Uint,
    /// Number of tokens added per interval.
    pub refill_amount: Uint,
    /// Tokens in the bucket at tick 0. `None` starts full.
    pub initial_tokens: Option<Uint>,
}

impl TokenBucketCoreConfig {
    /// Creates a new configuration for a bucket that starts full.
    pub fn new(capacity: Uint, refill_interval: Uint, refill_amount: Uint) -> Self {
        Self {
            capacity,
            refill_interval,
            refill_amount,
            initial_tokens: None,
        }
    }
}

impl From<TokenBucketCoreConfig> for TokenBucketCore {
    /// Converts a `TokenBucketCoreConfig` into a `TokenBucketCore` instance.
    ///
    /// # Panics
    /// Panics under the same conditions as [`TokenBucketCore::with_tokens`].
    ///
    /// ```
    /// use statsync_core::rate_limiters::{TokenBucketCore, TokenBucketCoreConfig};
    ///
    /// let limiter: TokenBucketCore = TokenBucketCoreConfig {
    ///     capacity: 100,
    ///     refill_interval: 10,
    ///     refill_amount: 5,
    ///     initial_tokens: Some(0),
    /// }.into();
    /// assert_eq!(limiter.current_capacity(), Ok(0));
    /// ```
    #[inline(always)]
    fn from(config: TokenBucketCoreConfig) -> Self {
        TokenBucketCore::with_tokens(
            config.capacity,
            config.refill_interval,
            config.refill_amount,
            config.initial_tokens.unwrap_or(config.capacity),
        )
    }
}

//! Tick sources.
//!
//! Every time-dependent component reads time as abstract ticks (milliseconds)
//! through [`Clock`], so the same code runs on wall-clock time, on paused tokio
//! test time, or on a hand-driven clock.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

use crate::types::{duration_to_ticks, Uint};

/// A monotonic source of millisecond ticks.
pub trait Clock: Send + Sync {
    /// Current tick. Never decreases.
    fn now(&self) -> Uint;
}

/// Milliseconds elapsed since construction, measured with [`tokio::time::Instant`].
///
/// Follows tokio's paused clock under `#[tokio::test(start_paused = true)]`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Uint {
        duration_to_ticks(self.origin.elapsed())
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    tick: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        ManualClock { tick: AtomicU64::new(start) }
    }

    /// Moves the clock to `tick`. Earlier values are ignored.
    pub fn set(&self, tick: u64) {
        self.tick.fetch_max(tick, Ordering::SeqCst);
    }

    pub fn advance(&self, ticks: u64) {
        self.tick.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Uint {
        Uint::from(self.tick.load(Ordering::SeqCst))
    }
}

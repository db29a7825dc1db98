//! Rate-limited statistics acquisition and diff-based display surface
//! synchronization.
//!
//! Two cooperating subsystems make up this crate:
//!
//! - a **priority request queue** in front of a rate-limited upstream
//!   service, with token-bucket admission control and per-key request
//!   coalescing ([`queue`], [`rate_limiters`]);
//! - a **sync engine** that keeps a set of display surfaces showing the
//!   latest state of every tracked entity with the fewest surface calls
//!   ([`sync`]), driven on a fixed interval by the [`scheduler`].
//!
//! Everything outside these (the upstream client, the status probe, the
//! entity directory, surfaces, snapshot persistence and artifact rendering)
//! is a collaborator behind a trait in [`interfaces`].
//!
//! # Quick Start
//!
//! ```rust
//! use statsync_core::rate_limiters::TokenBucketCore;
//!
//! // Capacity 100, refilling 10 tokens every 5 ticks
//! let limiter = TokenBucketCore::new(100, 5, 10);
//!
//! // Try to acquire 20 tokens at tick 0
//! match limiter.try_acquire_at(0, 20) {
//!     Ok(()) => println!("Request allowed"),
//!     Err(e) => println!("Request denied: {}", e),
//! }
//! ```
//!
//! A full engine is started from an [`EngineConfig`] and a set of
//! [`Collaborators`] with [`Engine::start`]; interactive callers then go
//! through [`Engine::lookup`].
//!
//! # Core Concepts
//!
//! ## Time Representation
//! Time-dependent parts read abstract ticks (milliseconds) from a
//! [`Clock`](clock::Clock). [`MonotonicClock`](clock::MonotonicClock) follows
//! tokio's clock, so paused-time tests drive it too.
//!
//! ## Error Handling
//! Admission returns [`SimpleAcquireResult`] or [`VerboseAcquireResult`];
//! the verbose form carries how long to wait before retrying. Fetch outcomes
//! are [`FetchError`]s shared by every coalesced waiter. A failed scheduler
//! tick is an [`anyhow::Error`], logged and dropped.
//!
//! ## Thread Safety
//! The token bucket uses a non-blocking lock. If it cannot be acquired
//! immediately, `ContentionFailure` is returned rather than blocking.

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod lookup;
pub mod memory;
pub mod queue;
pub mod rate_limiter_core;
pub mod rate_limiters;
pub mod render;
pub mod resolve;
pub mod scheduler;
pub mod stats;
pub mod sync;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Collaborators, Engine};
pub use entity::{ResolvedEntity, ResolvedStats};
pub use error::{
    ArtifactError, DeltaError, FetchError, RenderError, ResolveError, SimpleAcquireResult, SimpleRateLimitError,
    SurfaceError, UpstreamError, VerboseAcquireResult, VerboseRateLimitError,
};
pub use types::{FetchKey, FetchTarget, Priority, SurfaceId, Uint};

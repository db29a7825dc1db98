//! error.rs
//! Error types for admission control, upstream fetching, surfaces and rendering.

use thiserror::Error;

use crate::types::Uint;

/// Error type for fast-path admission. No extra diagnostic information.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimpleRateLimitError {
    #[error("Insufficient capacity (fast path).")]
    InsufficientCapacity,
    #[error("Request exceeds maximum capacity (fast path).")]
    BeyondCapacity,
    #[error("Expired tick (fast path).")]
    ExpiredTick,
    #[error("Contention failure (fast path).")]
    ContentionFailure,
}

/// Result type for fast-path admission.
pub type SimpleAcquireResult = Result<(), SimpleRateLimitError>;

/// Error type for verbose admission. Contains diagnostic information.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerboseRateLimitError {
    /// Not enough tokens available.
    #[error("Insufficient capacity: tried to acquire {acquiring}, available {available}, retry after {retry_after_ticks} tick(s).")]
    InsufficientCapacity {
        acquiring: Uint,
        available: Uint,
        retry_after_ticks: Uint,
    },
    /// Request permanently exceeds the configured capacity.
    #[error("Request exceeds maximum capacity: tried to acquire {acquiring}, capacity {capacity}. This request cannot succeed.")]
    BeyondCapacity { acquiring: Uint, capacity: Uint },
    /// Provided tick is too old.
    #[error("Expired tick: minimum acceptable tick is {min_acceptable_tick}.")]
    ExpiredTick { min_acceptable_tick: Uint },
    /// Failed due to lock contention.
    #[error("Contention failure: resource is locked by another operation. Please retry.")]
    ContentionFailure,
}

/// Result type for verbose admission.
pub type VerboseAcquireResult = Result<(), VerboseRateLimitError>;

/// Failure reported by an upstream collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Network blip, 5xx, upstream throttling. Worth retrying.
    #[error("transient upstream failure: {0}")]
    Transient(String),
    /// Entity not found or malformed. Retrying cannot help.
    #[error("permanent upstream failure: {0}")]
    Permanent(String),
}

/// Outcome delivered to every waiter of a queued fetch.
///
/// `Clone` because one outcome fans out to all coalesced waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("entity unavailable upstream: {0}")]
    Permanent(String),
    #[error("upstream still failing after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("deadline exceeded while waiting for the upstream budget")]
    DeadlineExceeded,
    #[error("request queue is closed")]
    QueueClosed,
    #[error("upstream returned a {0} reply for a different endpoint")]
    UnexpectedReply(&'static str),
    /// The upstream collaborator panicked during the call.
    #[error("upstream call panicked: {0}")]
    Panicked(String),
}

impl FetchError {
    /// True when retrying the same key later cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::Permanent(_))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, FetchError::Panicked(_))
    }
}

/// A raw payload that cannot be turned into statistics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("payload for {key} is missing `{field}`")]
    Incomplete { key: String, field: &'static str },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ResolveError {
    pub fn is_permanent(&self) -> bool {
        match self {
            ResolveError::Incomplete { .. } => true,
            ResolveError::Fetch(err) => err.is_permanent(),
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, ResolveError::Fetch(err) if err.is_panic())
    }
}

/// Failure of a display surface operation.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The surface no longer exists; it should be forgotten.
    #[error("surface {0} not found")]
    NotFound(String),
    #[error("surface operation failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// Failure of the batch render pool.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer failed: {0}")]
    Renderer(#[from] anyhow::Error),
    #[error("renderer task panicked or was cancelled: {0}")]
    Join(String),
    #[error("render pool is shut down")]
    PoolClosed,
}

/// Why a statistics delta could not be produced.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("no statistics recorded for {0}")]
    NotTracked(String),
    #[error("{0} has no recorded activity inside the window")]
    NoRecentActivity(String),
    #[error("no statistics for {0} from before the window")]
    NoBaseline(String),
    #[error("history window of {0} reaches before the earliest representable time")]
    WindowOutOfRange(chrono::Duration),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Failure of an interactive artifact lookup.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

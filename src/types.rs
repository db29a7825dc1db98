//! Shared identifiers and the unsigned tick type.
//!
//! `Uint` is the integer type used for token counts and clock ticks. A tick is
//! one millisecond of [`Clock`](crate::clock::Clock) time. The actual type is
//! determined at compile time via feature flags.
//!
//! # Features
//! - `tick-u64` (default): uses [`u64`] as `Uint`
//! - `tick-u128`: uses [`u128`] as `Uint`
//!   (Both features cannot be enabled at the same time.)
//! - If neither feature is enabled, `u64` is used as the default type.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(all(feature = "tick-u64", feature = "tick-u128"))]
compile_error!("You cannot enable both `tick-u64` and `tick-u128` features at the same time");

/// Alias for the unsigned integer type used for capacities and ticks.
#[cfg(all(feature = "tick-u64", not(feature = "tick-u128")))]
pub type Uint = u64;

/// Alias for the unsigned integer type used for capacities and ticks.
#[cfg(all(feature = "tick-u128", not(feature = "tick-u64")))]
pub type Uint = u128;

/// Alias for the unsigned integer type used for capacities and ticks.
#[cfg(not(any(feature = "tick-u64", feature = "tick-u128")))]
pub type Uint = u64;

/// Converts a tick count into a [`std::time::Duration`] of milliseconds.
pub fn ticks_to_duration(ticks: Uint) -> std::time::Duration {
    std::time::Duration::from_millis(u64::try_from(ticks).unwrap_or(u64::MAX))
}

/// Converts a [`std::time::Duration`] into whole millisecond ticks.
pub fn duration_to_ticks(duration: std::time::Duration) -> Uint {
    Uint::try_from(duration.as_millis()).unwrap_or(Uint::MAX)
}

/// Opaque entity identifier.
///
/// Used as the coalescing key in the request queue and the cache key in the
/// artifact cache. Dashes are not significant and letters are lower-cased, so
/// `"069a79f4-44e9-4726-a5be-fca90e38aaf5"` and
/// `"069A79F444E94726A5BEFCA90E38AAF5"` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchKey(String);

impl FetchKey {
    pub fn new(id: impl AsRef<str>) -> Self {
        let normalized: String = id
            .as_ref()
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        FetchKey(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FetchKey {
    fn from(value: &str) -> Self {
        FetchKey::new(value)
    }
}

/// Identifier of a display surface (a channel, in the original deployment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        SurfaceId(id.into())
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduling class of a queued fetch.
///
/// Interactive callers use `High`; the refresh loop uses `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Normal,
    High,
}

/// Which upstream operation a queued request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Full player payload.
    Player,
    /// Live online status.
    Status,
}

/// The coalescing key of the request queue: one upstream operation on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTarget {
    pub endpoint: Endpoint,
    pub key: FetchKey,
}

impl FetchTarget {
    pub fn player(key: FetchKey) -> Self {
        FetchTarget { endpoint: Endpoint::Player, key }
    }

    pub fn status(key: FetchKey) -> Self {
        FetchTarget { endpoint: Endpoint::Status, key }
    }
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.endpoint {
            Endpoint::Player => write!(f, "player:{}", self.key),
            Endpoint::Status => write!(f, "status:{}", self.key),
        }
    }
}

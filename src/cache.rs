//! Time-bounded cache of rendered artifacts.
//!
//! One entry per key, overwritten in place. An entry is served while
//! `now - cached_at < ttl`; after that it counts as absent. Expired entries
//! are dropped by [`ImageCache::sweep_expired`], and inserting beyond
//! `max_entries` evicts the oldest entry, so memory stays bounded.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::clock::Clock;
use crate::types::{FetchKey, Uint};

/// A cached artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: FetchKey,
    pub bytes: Arc<[u8]>,
    pub cached_at: Uint,
}

pub struct ImageCache {
    entries: DashMap<FetchKey, CacheEntry>,
    ttl: Uint,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl ImageCache {
    /// # Panics
    ///
    /// Panics if `ttl` or `max_entries` is zero.
    pub fn new(ttl: Uint, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        assert!(ttl > 0, "ttl must be greater than 0");
        assert!(max_entries > 0, "max_entries must be greater than 0");
        ImageCache {
            entries: DashMap::new(),
            ttl,
            max_entries,
            clock,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Uint) -> bool {
        now.saturating_sub(entry.cached_at) < self.ttl
    }

    /// Cached bytes for `key`, if present and within the TTL.
    pub fn get(&self, key: &FetchKey) -> Option<Arc<[u8]>> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.bytes.clone())
    }

    /// Returns the cached bytes, or runs `render` and caches its output.
    ///
    /// `render` is not called on a fresh hit. If it fails, the cache is left as
    /// it was and the error is returned. Concurrent misses on the same key may
    /// each render; the last one to finish wins.
    pub async fn get_or_render<F, Fut, E>(&self, key: &FetchKey, render: F) -> Result<Arc<[u8]>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
    {
        if let Some(bytes) = self.get(key) {
            trace!(%key, "artifact cache hit");
            return Ok(bytes);
        }
        let bytes: Arc<[u8]> = render().await?.into();
        self.store(key.clone(), bytes.clone());
        Ok(bytes)
    }

    /// Stores `bytes` for `key` with a fresh timestamp.
    pub fn insert(&self, key: FetchKey, bytes: Vec<u8>) {
        self.store(key, bytes.into());
    }

    fn store(&self, key: FetchKey, bytes: Arc<[u8]>) {
        let entry = CacheEntry {
            key: key.clone(),
            bytes,
            cached_at: self.clock.now(),
        };
        self.entries.insert(key.clone(), entry);
        if self.entries.len() > self.max_entries {
            self.evict_oldest(&key);
        }
    }

    /// Evicts the oldest entry other than `keep`.
    fn evict_oldest(&self, keep: &FetchKey) {
        let oldest = self
            .entries
            .iter()
            .filter(|entry| entry.key != *keep)
            .min_by_key(|entry| entry.cached_at)
            .map(|entry| entry.key.clone());
        if let Some(key) = oldest {
            trace!(%key, "evicting oldest artifact");
            self.entries.remove(&key);
        }
    }

    /// Drops the entry for `key`, so the next comparison reports a change.
    pub fn invalidate(&self, key: &FetchKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Byte-exact comparison against a fresh cached entry.
    ///
    /// False when there is no entry or it has expired.
    pub fn bytes_equal(&self, key: &FetchKey, candidate: &[u8]) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|entry| self.is_fresh(&entry, now) && *entry.bytes == *candidate)
            .unwrap_or(false)
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now.saturating_sub(entry.cached_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

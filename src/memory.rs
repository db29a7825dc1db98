//! In-memory collaborators. Not durable; meant for tests, demos and embedders
//! that keep their state elsewhere.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SurfaceError;
use crate::interfaces::{
    EntityDirectory, Slot, SlotContent, SlotFingerprint, SlotHandle, SnapshotStore, Surface, SurfaceState,
};
use crate::stats::snapshot::StatisticsSnapshot;
use crate::types::{FetchKey, SurfaceId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Tracked {
    key: FetchKey,
    surfaces: BTreeSet<SurfaceId>,
    history: bool,
}

/// Tracked entities in insertion order, with their surfaces.
#[derive(Default)]
pub struct InMemoryDirectory {
    inner: Mutex<Vec<Tracked>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `key` on `surface`. Tracking the same key again adds the surface.
    pub fn track(&self, key: FetchKey, surface: SurfaceId) {
        let mut inner = lock(&self.inner);
        match inner.iter_mut().find(|t| t.key == key) {
            Some(tracked) => {
                tracked.surfaces.insert(surface);
            }
            None => inner.push(Tracked {
                key,
                surfaces: BTreeSet::from([surface]),
                history: true,
            }),
        }
    }

    pub fn untrack(&self, key: &FetchKey) {
        lock(&self.inner).retain(|t| t.key != *key);
    }

    pub fn set_history(&self, key: &FetchKey, enabled: bool) {
        if let Some(tracked) = lock(&self.inner).iter_mut().find(|t| t.key == *key) {
            tracked.history = enabled;
        }
    }
}

#[async_trait]
impl EntityDirectory for InMemoryDirectory {
    async fn list_tracked(&self) -> anyhow::Result<Vec<FetchKey>> {
        Ok(lock(&self.inner).iter().map(|t| t.key.clone()).collect())
    }

    async fn surfaces_for(&self, key: &FetchKey) -> anyhow::Result<BTreeSet<SurfaceId>> {
        Ok(lock(&self.inner)
            .iter()
            .find(|t| t.key == *key)
            .map(|t| t.surfaces.clone())
            .unwrap_or_default())
    }

    async fn records_history(&self, key: &FetchKey) -> anyhow::Result<bool> {
        Ok(lock(&self.inner).iter().any(|t| t.key == *key && t.history))
    }

    async fn forget_surface(&self, surface: &SurfaceId) -> anyhow::Result<()> {
        for tracked in lock(&self.inner).iter_mut() {
            tracked.surfaces.remove(surface);
        }
        Ok(())
    }
}

/// Calls made against an [`InMemorySurface`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceOps {
    pub reads: usize,
    pub purges: usize,
    pub creates: usize,
    pub edits: usize,
}

impl SurfaceOps {
    /// Mutating calls only.
    pub fn writes(&self) -> usize {
        self.purges + self.creates + self.edits
    }
}

#[derive(Debug, Clone)]
struct StoredSlot {
    handle: SlotHandle,
    fingerprint: Option<SlotFingerprint>,
    artifact: Vec<u8>,
}

#[derive(Default)]
struct SurfaceInner {
    surfaces: BTreeMap<SurfaceId, Vec<StoredSlot>>,
    ops: SurfaceOps,
    next_handle: u64,
    rejecting_edits: BTreeSet<SurfaceId>,
}

impl SurfaceInner {
    fn slots(&mut self, surface: &SurfaceId) -> Result<&mut Vec<StoredSlot>, SurfaceError> {
        self.surfaces
            .get_mut(surface)
            .ok_or_else(|| SurfaceError::NotFound(surface.to_string()))
    }

    fn handle(&mut self) -> SlotHandle {
        self.next_handle += 1;
        SlotHandle(self.next_handle.to_string())
    }
}

/// Surfaces held in memory. Operations on a surface that was never added
/// (or was removed) fail with [`SurfaceError::NotFound`].
#[derive(Default)]
pub struct InMemorySurface {
    inner: Mutex<SurfaceInner>,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_surface(&self, surface: SurfaceId) {
        lock(&self.inner).surfaces.entry(surface).or_default();
    }

    pub fn remove_surface(&self, surface: &SurfaceId) {
        lock(&self.inner).surfaces.remove(surface);
    }

    /// Appends a slot with no fingerprint, as left behind by a foreign writer.
    pub fn push_malformed_slot(&self, surface: &SurfaceId) {
        let mut inner = lock(&self.inner);
        let handle = inner.handle();
        if let Some(slots) = inner.surfaces.get_mut(surface) {
            slots.push(StoredSlot {
                handle,
                fingerprint: None,
                artifact: Vec::new(),
            });
        }
    }

    /// Entity ids shown on `surface`, top to bottom. Malformed slots are skipped.
    pub fn shown(&self, surface: &SurfaceId) -> Vec<FetchKey> {
        lock(&self.inner)
            .surfaces
            .get(surface)
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|slot| slot.fingerprint.as_ref().map(|f| f.entity_id.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Artifact bytes in each slot of `surface`, top to bottom.
    pub fn artifacts(&self, surface: &SurfaceId) -> Vec<Vec<u8>> {
        lock(&self.inner)
            .surfaces
            .get(surface)
            .map(|slots| slots.iter().map(|slot| slot.artifact.clone()).collect())
            .unwrap_or_default()
    }

    /// Makes every `edit_slot` on `surface` fail until turned off again.
    pub fn reject_edits(&self, surface: &SurfaceId, reject: bool) {
        let mut inner = lock(&self.inner);
        if reject {
            inner.rejecting_edits.insert(surface.clone());
        } else {
            inner.rejecting_edits.remove(surface);
        }
    }

    pub fn ops(&self) -> SurfaceOps {
        lock(&self.inner).ops
    }

    pub fn reset_ops(&self) {
        lock(&self.inner).ops = SurfaceOps::default();
    }
}

#[async_trait]
impl Surface for InMemorySurface {
    async fn read_state(&self, surface: &SurfaceId) -> Result<SurfaceState, SurfaceError> {
        let mut inner = lock(&self.inner);
        inner.ops.reads += 1;
        let slots = inner
            .slots(surface)?
            .iter()
            .map(|slot| Slot {
                handle: slot.handle.clone(),
                fingerprint: slot.fingerprint.clone(),
            })
            .collect();
        Ok(SurfaceState { slots })
    }

    async fn purge_all(&self, surface: &SurfaceId) -> Result<(), SurfaceError> {
        let mut inner = lock(&self.inner);
        inner.ops.purges += 1;
        inner.slots(surface)?.clear();
        Ok(())
    }

    async fn create_slot(&self, surface: &SurfaceId, content: &SlotContent) -> Result<SlotHandle, SurfaceError> {
        let mut inner = lock(&self.inner);
        inner.ops.creates += 1;
        let handle = inner.handle();
        inner.slots(surface)?.push(StoredSlot {
            handle: handle.clone(),
            fingerprint: Some(content.fingerprint.clone()),
            artifact: content.entity.artifact.clone(),
        });
        Ok(handle)
    }

    async fn edit_slot(
        &self,
        surface: &SurfaceId,
        slot: &SlotHandle,
        content: &SlotContent,
    ) -> Result<(), SurfaceError> {
        let mut inner = lock(&self.inner);
        inner.ops.edits += 1;
        if inner.rejecting_edits.contains(surface) {
            return Err(SurfaceError::Failed(anyhow::anyhow!("edit rejected on {surface}")));
        }
        let stored = inner
            .slots(surface)?
            .iter_mut()
            .find(|stored| stored.handle == *slot)
            .ok_or_else(|| SurfaceError::Failed(anyhow::anyhow!("slot {} not on {surface}", slot.0)))?;
        stored.fingerprint = Some(content.fingerprint.clone());
        stored.artifact = content.entity.artifact.clone();
        Ok(())
    }
}

/// Snapshot history per key, kept sorted by timestamp.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    inner: Mutex<HashMap<FetchKey, Vec<StatisticsSnapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot of `key`, oldest first.
    pub fn history(&self, key: &FetchKey) -> Vec<StatisticsSnapshot> {
        lock(&self.inner).get(key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn latest(&self, key: &FetchKey) -> anyhow::Result<Option<StatisticsSnapshot>> {
        Ok(lock(&self.inner).get(key).and_then(|list| list.last().cloned()))
    }

    async fn before(&self, key: &FetchKey, timestamp: DateTime<Utc>) -> anyhow::Result<Option<StatisticsSnapshot>> {
        Ok(lock(&self.inner)
            .get(key)
            .and_then(|list| list.iter().rev().find(|s| s.timestamp < timestamp).cloned()))
    }

    async fn append(&self, snapshot: StatisticsSnapshot) -> anyhow::Result<()> {
        let mut inner = lock(&self.inner);
        let list = inner.entry(snapshot.entity_id.clone()).or_default();
        let at = list.partition_point(|s| s.timestamp <= snapshot.timestamp);
        list.insert(at, snapshot);
        Ok(())
    }
}

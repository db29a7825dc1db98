//! Boundary contracts implemented by collaborators outside the core.
//!
//! The core mediates between these traits; it defines no wire formats of its
//! own. [`UpstreamClient`] and [`StatusProbe`] must only be driven by the
//! queue worker, so that every call passes the admission gate.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{ResolvedEntity, ResolvedStats};
use crate::error::{SurfaceError, UpstreamError};
use crate::stats::snapshot::StatisticsSnapshot;
use crate::stats::{ProbeStatus, RawPlayer};
use crate::types::{FetchKey, SurfaceId};

/// The rate-limited upstream statistics service.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(&self, key: &FetchKey) -> Result<RawPlayer, UpstreamError>;
}

/// Live online-status lookup on the same upstream service.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, key: &FetchKey) -> Result<ProbeStatus, UpstreamError>;
}

/// Which entities are tracked and where each one is displayed.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn list_tracked(&self) -> anyhow::Result<Vec<FetchKey>>;

    async fn surfaces_for(&self, key: &FetchKey) -> anyhow::Result<BTreeSet<SurfaceId>>;

    /// Whether statistics history is kept for `key`.
    async fn records_history(&self, _key: &FetchKey) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Drops a surface that no longer exists from every membership.
    async fn forget_surface(&self, _surface: &SurfaceId) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Surface-native handle of one slot (a message id, for a chat channel).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotHandle(pub String);

/// What was last rendered into a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotFingerprint {
    pub entity_id: FetchKey,
    pub display_name: String,
}

impl SlotFingerprint {
    pub fn of(entity: &ResolvedEntity) -> Self {
        SlotFingerprint {
            entity_id: entity.id.clone(),
            display_name: entity.display_name.clone(),
        }
    }
}

/// One materialized slot. A slot without a fingerprint is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub handle: SlotHandle,
    pub fingerprint: Option<SlotFingerprint>,
}

/// Ordered slots currently on a surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceState {
    pub slots: Vec<Slot>,
}

impl SurfaceState {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every slot carries a fingerprint.
    pub fn is_well_formed(&self) -> bool {
        self.slots.iter().all(|slot| slot.fingerprint.is_some())
    }
}

/// Content written into a slot.
#[derive(Debug, Clone)]
pub struct SlotContent {
    pub fingerprint: SlotFingerprint,
    pub entity: Arc<ResolvedEntity>,
}

impl SlotContent {
    pub fn new(entity: Arc<ResolvedEntity>) -> Self {
        SlotContent {
            fingerprint: SlotFingerprint::of(&entity),
            entity,
        }
    }
}

/// A rate-limited display surface.
#[async_trait]
pub trait Surface: Send + Sync {
    async fn read_state(&self, surface: &SurfaceId) -> Result<SurfaceState, SurfaceError>;

    async fn purge_all(&self, surface: &SurfaceId) -> Result<(), SurfaceError>;

    async fn create_slot(&self, surface: &SurfaceId, content: &SlotContent) -> Result<SlotHandle, SurfaceError>;

    async fn edit_slot(
        &self,
        surface: &SurfaceId,
        slot: &SlotHandle,
        content: &SlotContent,
    ) -> Result<(), SurfaceError>;
}

/// Append-only statistics history.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn latest(&self, key: &FetchKey) -> anyhow::Result<Option<StatisticsSnapshot>>;

    /// Most recent snapshot strictly before `timestamp`.
    async fn before(&self, key: &FetchKey, timestamp: DateTime<Utc>) -> anyhow::Result<Option<StatisticsSnapshot>>;

    async fn append(&self, snapshot: StatisticsSnapshot) -> anyhow::Result<()>;
}

/// Turns resolved statistics into the bytes shown on a surface.
///
/// Rendering is CPU-bound and runs on the batch render pool, never on the
/// async executor.
pub trait ArtifactRenderer: Send + Sync + 'static {
    fn render(&self, stats: &ResolvedStats) -> anyhow::Result<Vec<u8>>;
}

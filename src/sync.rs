//! Diff-based synchronization of one display surface.
//!
//! Every surface call costs quota, so the engine issues the fewest it can:
//! a surface whose shape still matches the target gets targeted edits only,
//! and a surface that drifted (wrong slot count, or a slot without a
//! fingerprint) is purged and rebuilt in target order.

use std::sync::Arc;

use tracing::{debug, info};

use crate::entity::ResolvedEntity;
use crate::error::SurfaceError;
use crate::interfaces::{SlotContent, SlotHandle, Surface, SurfaceState};
use crate::types::SurfaceId;

/// Operations needed to bring a surface up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Purge everything, then create one slot per target, in order.
    Rebuild,
    /// Edit the listed `(target index, slot)` pairs; leave the rest alone.
    Incremental {
        edits: Vec<(usize, SlotHandle)>,
        unchanged: usize,
    },
}

/// What one [`SyncEngine::sync`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub rebuilt: bool,
    pub created: usize,
    pub edited: usize,
    pub skipped: usize,
}

impl SyncReport {
    /// Surface calls issued, the read included.
    pub fn operations(&self) -> usize {
        1 + usize::from(self.rebuilt) + self.created + self.edited
    }
}

/// Display order: offline before online, each group ascending by composite
/// score, ties kept in input order.
pub fn order_for_surface(entities: &mut [Arc<ResolvedEntity>]) {
    entities.sort_by(|a, b| {
        a.online
            .cmp(&b.online)
            .then_with(|| a.composite_score().total_cmp(&b.composite_score()))
    });
}

/// Decides between a rebuild and targeted edits. `targets` must already be in
/// display order.
pub fn plan(targets: &[Arc<ResolvedEntity>], state: &SurfaceState) -> SyncPlan {
    if state.len() != targets.len() || !state.is_well_formed() {
        return SyncPlan::Rebuild;
    }

    let mut edits = Vec::new();
    let mut unchanged = 0;
    for (index, (target, slot)) in targets.iter().zip(&state.slots).enumerate() {
        let same_identity = slot
            .fingerprint
            .as_ref()
            .is_some_and(|fingerprint| fingerprint.entity_id == target.id);
        if same_identity && target.artifact_unchanged {
            unchanged += 1;
        } else {
            edits.push((index, slot.handle.clone()));
        }
    }
    SyncPlan::Incremental { edits, unchanged }
}

/// Applies plans against a [`Surface`].
#[derive(Clone)]
pub struct SyncEngine {
    surface: Arc<dyn Surface>,
}

impl SyncEngine {
    pub fn new(surface: Arc<dyn Surface>) -> Self {
        SyncEngine { surface }
    }

    /// Orders `entities`, reads the surface, and applies the minimal plan.
    ///
    /// The caller must not run two syncs of the same surface concurrently.
    pub async fn sync(
        &self,
        surface_id: &SurfaceId,
        mut entities: Vec<Arc<ResolvedEntity>>,
    ) -> Result<SyncReport, SurfaceError> {
        order_for_surface(&mut entities);
        let state = self.surface.read_state(surface_id).await?;

        let mut report = SyncReport::default();
        match plan(&entities, &state) {
            SyncPlan::Rebuild => {
                info!(
                    surface = %surface_id,
                    slots = state.len(),
                    targets = entities.len(),
                    "surface drifted, rebuilding"
                );
                self.surface.purge_all(surface_id).await?;
                report.rebuilt = true;
                for entity in &entities {
                    self.surface
                        .create_slot(surface_id, &SlotContent::new(entity.clone()))
                        .await?;
                    report.created += 1;
                }
            }
            SyncPlan::Incremental { edits, unchanged } => {
                report.skipped = unchanged;
                for (index, handle) in edits {
                    self.surface
                        .edit_slot(surface_id, &handle, &SlotContent::new(entities[index].clone()))
                        .await?;
                    report.edited += 1;
                }
                debug!(surface = %surface_id, edited = report.edited, skipped = report.skipped, "surface synced");
            }
        }
        Ok(report)
    }
}

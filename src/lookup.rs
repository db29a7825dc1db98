//! Interactive entry points. Every queued call here runs at High priority, so
//! it overtakes the refresh loop's backlog.

use std::sync::Arc;

use chrono::Utc;

use crate::cache::ImageCache;
use crate::entity::ResolvedStats;
use crate::error::{ArtifactError, DeltaError, ResolveError};
use crate::interfaces::{ArtifactRenderer, SnapshotStore};
use crate::render::RenderPool;
use crate::resolve::EntityResolver;
use crate::stats::snapshot::{delta_since, StatsDelta};
use crate::types::{FetchKey, Priority};

#[derive(Clone)]
pub struct Lookup {
    resolver: EntityResolver,
    renderer: Arc<dyn ArtifactRenderer>,
    artifacts: Arc<ImageCache>,
    snapshots: Arc<dyn SnapshotStore>,
    history_window: chrono::Duration,
}

impl Lookup {
    pub fn new(
        resolver: EntityResolver,
        renderer: Arc<dyn ArtifactRenderer>,
        artifacts: Arc<ImageCache>,
        snapshots: Arc<dyn SnapshotStore>,
        history_window: chrono::Duration,
    ) -> Self {
        Lookup {
            resolver,
            renderer,
            artifacts,
            snapshots,
            history_window,
        }
    }

    /// Current statistics of `key`.
    pub async fn player(&self, key: &FetchKey) -> Result<ResolvedStats, ResolveError> {
        self.resolver.resolve(key, Priority::High).await
    }

    /// Whether `key` names an entity upstream can describe.
    ///
    /// `Ok(false)` on a permanent failure; transient trouble is an error, since
    /// it says nothing about the key.
    pub async fn check_valid(&self, key: &FetchKey) -> Result<bool, ResolveError> {
        match self.player(key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_permanent() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Rendered artifact of `key`, from the cache while it is fresh.
    pub async fn artifact(&self, key: &FetchKey) -> Result<Arc<[u8]>, ArtifactError> {
        self.artifacts
            .get_or_render(key, || async {
                let stats = self.player(key).await?;
                let pool = RenderPool::for_batch(self.renderer.clone(), Some(1));
                Ok::<_, ArtifactError>(pool.render(stats).await?)
            })
            .await
    }

    /// Change in `key`'s statistics over the configured history window.
    pub async fn daily(&self, key: &FetchKey) -> Result<StatsDelta, DeltaError> {
        delta_since(self.snapshots.as_ref(), key, Utc::now(), self.history_window).await
    }
}

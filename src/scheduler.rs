//! The fixed-interval refresh loop.
//!
//! Each tick reads the tracked set, resolves every entity at Normal priority,
//! renders artifacts on a batch render pool, records history, and syncs every
//! surface. A failing tick is logged and abandoned; the next tick starts from
//! scratch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::{join_all, try_join_all};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::ImageCache;
use crate::config::EngineConfig;
use crate::entity::ResolvedEntity;
use crate::error::SurfaceError;
use crate::interfaces::{ArtifactRenderer, EntityDirectory, SnapshotStore, Surface};
use crate::render::RenderPool;
use crate::resolve::EntityResolver;
use crate::stats::snapshot::record_if_changed;
use crate::sync::SyncEngine;
use crate::types::{FetchKey, Priority, SurfaceId};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub rebuild_interval: Duration,
    pub tick_timeout: Duration,
    pub render_workers: Option<usize>,
}

impl From<&EngineConfig> for SchedulerSettings {
    fn from(config: &EngineConfig) -> Self {
        SchedulerSettings {
            tick_interval: config.tick_interval(),
            rebuild_interval: config.rebuild_interval(),
            tick_timeout: config.tick_timeout(),
            render_workers: config.scheduler.render_workers,
        }
    }
}

/// Summary of one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tracked: usize,
    pub resolved: usize,
    /// Entities dropped from this tick after a permanent failure.
    pub skipped: usize,
    pub forced_rebuild: bool,
    pub snapshots_recorded: usize,
    pub surfaces_synced: usize,
    pub surfaces_rebuilt: usize,
    pub surfaces_failed: usize,
    pub surfaces_forgotten: usize,
    pub slots_created: usize,
    pub slots_edited: usize,
    pub artifacts_evicted: usize,
}

enum Prepared {
    Ready {
        entity: Arc<ResolvedEntity>,
        surfaces: BTreeSet<SurfaceId>,
        recorded: bool,
    },
    Skipped,
}

pub struct UpdateScheduler {
    settings: SchedulerSettings,
    resolver: EntityResolver,
    directory: Arc<dyn EntityDirectory>,
    sync: SyncEngine,
    snapshots: Arc<dyn SnapshotStore>,
    renderer: Arc<dyn ArtifactRenderer>,
    artifacts: Arc<ImageCache>,
    last_rebuild: Mutex<Option<Instant>>,
}

impl UpdateScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: SchedulerSettings,
        resolver: EntityResolver,
        directory: Arc<dyn EntityDirectory>,
        surface: Arc<dyn Surface>,
        snapshots: Arc<dyn SnapshotStore>,
        renderer: Arc<dyn ArtifactRenderer>,
        artifacts: Arc<ImageCache>,
    ) -> Self {
        UpdateScheduler {
            settings,
            resolver,
            directory,
            sync: SyncEngine::new(surface),
            snapshots,
            renderer,
            artifacts,
            last_rebuild: Mutex::new(None),
        }
    }

    /// Runs ticks forever on a new task. Ticks never overlap: a slow tick
    /// delays the next one.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(self.settings.tick_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?self.settings.tick_interval, "update scheduler started");
            loop {
                tick.tick().await;
                match timeout(self.settings.tick_timeout, self.run_tick()).await {
                    Ok(Ok(report)) => debug!(?report, "tick finished"),
                    Ok(Err(e)) => error!("scheduler tick failed: {e:?}"),
                    Err(_) => error!(limit = ?self.settings.tick_timeout, "scheduler tick timed out"),
                }
            }
        })
    }

    /// True on the first tick and whenever `rebuild_interval` has passed since
    /// the last forced rebuild.
    fn take_rebuild_due(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        let due = last.map_or(true, |at| now.duration_since(at) >= self.settings.rebuild_interval);
        if due {
            *last = Some(now);
        }
        due
    }

    /// Runs one tick to completion.
    pub async fn run_tick(&self) -> anyhow::Result<TickReport> {
        let keys = self.directory.list_tracked().await.context("list tracked entities")?;
        let force = self.take_rebuild_due();
        let now = Utc::now();

        let mut report = TickReport {
            tracked: keys.len(),
            forced_rebuild: force,
            ..TickReport::default()
        };

        let pool = RenderPool::for_batch(self.renderer.clone(), self.settings.render_workers);
        let prepared = try_join_all(keys.iter().map(|key| self.prepare(key, &pool, force, now))).await?;
        drop(pool);

        let mut by_surface: BTreeMap<SurfaceId, Vec<Arc<ResolvedEntity>>> = BTreeMap::new();
        for item in prepared {
            match item {
                Prepared::Ready {
                    entity,
                    surfaces,
                    recorded,
                } => {
                    report.resolved += 1;
                    report.snapshots_recorded += usize::from(recorded);
                    for surface in surfaces {
                        by_surface.entry(surface).or_default().push(entity.clone());
                    }
                }
                Prepared::Skipped => report.skipped += 1,
            }
        }

        let syncs = by_surface.into_iter().map(|(surface, entities)| async move {
            let keys: Vec<FetchKey> = entities.iter().map(|entity| entity.id.clone()).collect();
            let result = self.sync.sync(&surface, entities).await;
            (surface, keys, result)
        });
        for (surface, keys, result) in join_all(syncs).await {
            match result {
                Ok(sync) => {
                    report.surfaces_synced += 1;
                    report.surfaces_rebuilt += usize::from(sync.rebuilt);
                    report.slots_created += sync.created;
                    report.slots_edited += sync.edited;
                }
                Err(SurfaceError::NotFound(_)) => {
                    warn!(%surface, "surface is gone, forgetting it");
                    if let Err(e) = self.directory.forget_surface(&surface).await {
                        warn!(%surface, "failed to forget surface: {e:?}");
                    }
                    report.surfaces_forgotten += 1;
                }
                Err(e) => {
                    warn!(%surface, "surface sync failed: {e}");
                    // Slots may be stale; re-edit them next tick.
                    for key in &keys {
                        self.artifacts.invalidate(key);
                    }
                    report.surfaces_failed += 1;
                }
            }
        }

        report.artifacts_evicted = self.artifacts.sweep_expired();
        info!(
            tracked = report.tracked,
            resolved = report.resolved,
            skipped = report.skipped,
            forced = report.forced_rebuild,
            surfaces = report.surfaces_synced,
            created = report.slots_created,
            edited = report.slots_edited,
            "tick complete"
        );
        Ok(report)
    }

    async fn prepare(
        &self,
        key: &FetchKey,
        pool: &RenderPool,
        force: bool,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Prepared> {
        let stats = match self.resolver.resolve(key, Priority::Normal).await {
            Ok(stats) => stats,
            Err(e) if e.is_permanent() || e.is_panic() => {
                warn!(%key, "skipping entity: {e}");
                return Ok(Prepared::Skipped);
            }
            Err(e) => return Err(e).with_context(|| format!("resolve {key}")),
        };

        let artifact = pool
            .render(stats.clone())
            .await
            .with_context(|| format!("render {key}"))?;
        let unchanged = !force && self.artifacts.bytes_equal(key, &artifact);
        self.artifacts.insert(key.clone(), artifact.clone());

        let recorded = if self.directory.records_history(key).await? {
            record_if_changed(self.snapshots.as_ref(), &stats, now)
                .await
                .with_context(|| format!("record history for {key}"))?
        } else {
            false
        };

        let surfaces = self.directory.surfaces_for(key).await?;
        Ok(Prepared::Ready {
            entity: Arc::new(ResolvedEntity::new(stats, artifact, unchanged)),
            surfaces,
            recorded,
        })
    }
}

//! Wiring of every component from an [`EngineConfig`].

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::ImageCache;
use crate::clock::{Clock, MonotonicClock};
use crate::config::EngineConfig;
use crate::interfaces::{ArtifactRenderer, EntityDirectory, SnapshotStore, StatusProbe, Surface, UpstreamClient};
use crate::lookup::Lookup;
use crate::queue::{QueueWorker, RequestQueue};
use crate::rate_limiters::AdmissionGate;
use crate::resolve::EntityResolver;
use crate::scheduler::{SchedulerSettings, UpdateScheduler};

/// The collaborators an engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub upstream: Arc<dyn UpstreamClient>,
    pub probe: Arc<dyn StatusProbe>,
    pub directory: Arc<dyn EntityDirectory>,
    pub surface: Arc<dyn Surface>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub renderer: Arc<dyn ArtifactRenderer>,
}

/// A running engine: the queue worker and the refresh loop, each on its own task.
pub struct Engine {
    queue: Arc<RequestQueue>,
    gate: AdmissionGate,
    artifacts: Arc<ImageCache>,
    scheduler: Arc<UpdateScheduler>,
    lookup: Lookup,
    worker: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl Engine {
    /// Validates `config` and starts the engine on the current tokio runtime.
    pub fn start(config: &EngineConfig, parts: Collaborators) -> Result<Self> {
        Self::start_with_clock(config, parts, Arc::new(MonotonicClock::new()))
    }

    pub fn start_with_clock(config: &EngineConfig, parts: Collaborators, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(RequestQueue::new(clock.clone()));
        let gate = AdmissionGate::token_bucket(config.token_bucket(), clock.clone());
        let artifacts = Arc::new(ImageCache::new(
            config.cache_ttl_ticks(),
            config.cache.max_entries,
            clock,
        ));

        let worker = QueueWorker::new(
            queue.clone(),
            gate.clone(),
            parts.upstream,
            parts.probe,
            config.worker_settings(),
        )
        .spawn();

        let scheduler = Arc::new(UpdateScheduler::new(
            SchedulerSettings::from(config),
            EntityResolver::new(queue.clone(), None),
            parts.directory,
            parts.surface,
            parts.snapshots.clone(),
            parts.renderer.clone(),
            artifacts.clone(),
        ));
        let ticker = scheduler.clone().spawn();

        let lookup = Lookup::new(
            EntityResolver::new(queue.clone(), config.interactive_timeout()),
            parts.renderer,
            artifacts.clone(),
            parts.snapshots,
            config.history_window(),
        );

        info!(capacity = config.budget.capacity, "engine started");
        Ok(Engine {
            queue,
            gate,
            artifacts,
            scheduler,
            lookup,
            worker,
            ticker,
        })
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn artifacts(&self) -> &Arc<ImageCache> {
        &self.artifacts
    }

    pub fn scheduler(&self) -> &Arc<UpdateScheduler> {
        &self.scheduler
    }

    /// Stops the refresh loop, closes the queue, and waits for the worker to exit.
    ///
    /// Fetches already in flight still finish and deliver to their waiters.
    pub async fn shutdown(self) {
        self.ticker.abort();
        let _ = self.ticker.await;
        self.queue.close();
        let _ = self.worker.await;
        info!("engine stopped");
    }
}

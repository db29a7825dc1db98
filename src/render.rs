//! Batch-scoped pool for CPU-bound artifact rendering.
//!
//! A pool is created for one batch (one scheduler tick, or one interactive
//! lookup) and dropped afterwards. Jobs run on tokio's blocking threads, at
//! most `workers` at a time. A renderer error or panic becomes a
//! [`RenderError`] for that job only.

use std::sync::Arc;
use std::thread;

use tokio::sync::Semaphore;

use crate::entity::ResolvedStats;
use crate::error::RenderError;
use crate::interfaces::ArtifactRenderer;

pub struct RenderPool {
    renderer: Arc<dyn ArtifactRenderer>,
    slots: Arc<Semaphore>,
}

impl RenderPool {
    /// Pool with `workers` concurrent jobs; `None` uses the host core count.
    pub fn for_batch(renderer: Arc<dyn ArtifactRenderer>, workers: Option<usize>) -> Self {
        let workers = workers
            .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);
        RenderPool {
            renderer,
            slots: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Renders one artifact off the async executor.
    pub async fn render(&self, stats: ResolvedStats) -> Result<Vec<u8>, RenderError> {
        let _slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::PoolClosed)?;
        let renderer = self.renderer.clone();
        tokio::task::spawn_blocking(move || renderer.render(&stats))
            .await
            .map_err(|err| RenderError::Join(err.to_string()))?
            .map_err(RenderError::Renderer)
    }

    /// Jobs that could start right now.
    pub fn idle_workers(&self) -> usize {
        self.slots.available_permits()
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        self.slots.close();
    }
}

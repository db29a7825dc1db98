//! Fetch → derive → reconcile, for one entity.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::entity::ResolvedStats;
use crate::error::ResolveError;
use crate::queue::RequestQueue;
use crate::stats::{self, Presence};
use crate::types::{FetchKey, Priority};

/// Resolves entities through the request queue.
///
/// Both the payload fetch and the status probe are queued at the caller's
/// priority, so neither bypasses the admission gate.
#[derive(Clone)]
pub struct EntityResolver {
    queue: Arc<RequestQueue>,
    timeout: Option<Duration>,
}

impl EntityResolver {
    /// `timeout` bounds each queued wait, not the whole resolution.
    pub fn new(queue: Arc<RequestQueue>, timeout: Option<Duration>) -> Self {
        EntityResolver { queue, timeout }
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    pub async fn resolve(&self, key: &FetchKey, priority: Priority) -> Result<ResolvedStats, ResolveError> {
        let player = self.queue.fetch_player(key, priority, self.timeout).await?;
        let window = stats::login_window(key, &player)?;
        let metrics = stats::derive_metrics(&player);

        let presence = if window.appears_online() {
            match self.queue.probe_status(key, priority, self.timeout).await {
                Ok(status) => stats::reconcile(true, Some(&status)),
                Err(err) => {
                    debug!(%key, %err, "status probe failed, treating as offline");
                    stats::reconcile(true, None)
                }
            }
        } else {
            Presence::default()
        };

        Ok(ResolvedStats {
            id: key.clone(),
            display_name: stats::display_name(key, &player),
            last_transition_time: window.last_transition(presence.online),
            presence,
            metrics,
        })
    }
}

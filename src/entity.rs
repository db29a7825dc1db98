use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::{DerivedMetrics, Presence, THREAT_INDEX};
use crate::types::FetchKey;

/// Statistics of one entity after fetching, deriving and presence reconciliation,
/// before an artifact is rendered for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStats {
    pub id: FetchKey,
    pub display_name: String,
    pub presence: Presence,
    pub metrics: DerivedMetrics,
    pub last_transition_time: DateTime<Utc>,
}

impl ResolvedStats {
    pub fn composite_score(&self) -> f64 {
        self.metrics.value(THREAT_INDEX)
    }
}

/// One entity as it should appear on a surface this tick.
///
/// Built once per tick, never mutated, dropped when the next tick supersedes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub id: FetchKey,
    pub display_name: String,
    pub online: bool,
    pub derived_metrics: DerivedMetrics,
    pub last_transition_time: DateTime<Utc>,
    /// Probe details (game, mode, map) when online.
    pub context: BTreeMap<String, String>,
    pub artifact: Vec<u8>,
    /// The artifact is byte-identical to the one distributed last time.
    pub artifact_unchanged: bool,
}

impl ResolvedEntity {
    pub fn new(stats: ResolvedStats, artifact: Vec<u8>, artifact_unchanged: bool) -> Self {
        ResolvedEntity {
            id: stats.id,
            display_name: stats.display_name,
            online: stats.presence.online,
            derived_metrics: stats.metrics,
            last_transition_time: stats.last_transition_time,
            context: stats.presence.context,
            artifact,
            artifact_unchanged,
        }
    }

    /// Ordering score on a surface (the threat index).
    pub fn composite_score(&self) -> f64 {
        self.derived_metrics.value(THREAT_INDEX)
    }
}

//! Statistics history: append-on-change recording and windowed deltas.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::ResolvedStats;
use crate::error::DeltaError;
use crate::interfaces::SnapshotStore;
use crate::stats::{DerivedMetrics, GAMES_PLAYED};
use crate::types::FetchKey;

/// One immutable history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub entity_id: FetchKey,
    pub derived_metrics: DerivedMetrics,
    pub timestamp: DateTime<Utc>,
}

/// Per-metric change between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsDelta {
    pub entity_id: FetchKey,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// `latest - baseline` for every metric present in both.
    pub changes: DerivedMetrics,
}

impl StatsDelta {
    pub fn between(baseline: &StatisticsSnapshot, latest: &StatisticsSnapshot) -> Self {
        let changes = latest
            .derived_metrics
            .iter()
            .filter_map(|(name, value)| {
                baseline
                    .derived_metrics
                    .get(name)
                    .map(|before| (name.to_string(), value - before))
            })
            .collect();
        StatsDelta {
            entity_id: latest.entity_id.clone(),
            from: baseline.timestamp,
            to: latest.timestamp,
            changes,
        }
    }
}

/// Appends a snapshot of `stats` unless the latest stored one has the same
/// games-played count. Returns whether a snapshot was appended.
pub async fn record_if_changed(
    store: &dyn SnapshotStore,
    stats: &ResolvedStats,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    if let Some(latest) = store.latest(&stats.id).await? {
        if latest.derived_metrics.get(GAMES_PLAYED) == stats.metrics.get(GAMES_PLAYED) {
            return Ok(false);
        }
    }
    store
        .append(StatisticsSnapshot {
            entity_id: stats.id.clone(),
            derived_metrics: stats.metrics.clone(),
            timestamp: now,
        })
        .await?;
    Ok(true)
}

/// Change in `key`'s statistics over the `window` ending at `now`.
pub async fn delta_since(
    store: &dyn SnapshotStore,
    key: &FetchKey,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<StatsDelta, DeltaError> {
    let cutoff = now
        .checked_sub_signed(window)
        .ok_or(DeltaError::WindowOutOfRange(window))?;
    let latest = store
        .latest(key)
        .await?
        .ok_or_else(|| DeltaError::NotTracked(key.to_string()))?;
    if latest.timestamp < cutoff {
        return Err(DeltaError::NoRecentActivity(key.to_string()));
    }
    let baseline = store
        .before(key, cutoff)
        .await?
        .ok_or_else(|| DeltaError::NoBaseline(key.to_string()))?;
    Ok(StatsDelta::between(&baseline, &latest))
}

/// [`delta_since`] over the last 24 hours.
pub async fn daily_delta(
    store: &dyn SnapshotStore,
    key: &FetchKey,
    now: DateTime<Utc>,
) -> Result<StatsDelta, DeltaError> {
    delta_since(store, key, now, Duration::hours(24)).await
}

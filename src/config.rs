//! Engine configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or `EngineConfig::default()`)
//! is a working configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::queue::WorkerSettings;
use crate::rate_limiters::TokenBucketCoreConfig;
use crate::types::{duration_to_ticks, Uint};

/// Longest accepted `scheduler.history_window_hours`: one leap year.
pub const MAX_HISTORY_WINDOW_HOURS: i64 = 24 * 366;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub budget: BudgetConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
}

/// Upstream request budget.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub capacity: Uint,
    pub refill_interval_ms: Uint,
    pub refill_amount: Uint,
    /// Tokens at startup; `None` starts full.
    pub initial_tokens: Option<Uint>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            capacity: 120,
            refill_interval_ms: 500,
            refill_amount: 1,
            initial_tokens: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_in_flight: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub admission_backoff_min_ms: u64,
    pub admission_backoff_max_ms: u64,
    /// Wait limit for interactive lookups; `None` waits indefinitely.
    pub interactive_timeout_ms: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            max_attempts: 3,
            retry_backoff_ms: 500,
            admission_backoff_min_ms: 25,
            admission_backoff_max_ms: 1000,
            interactive_timeout_ms: Some(30_000),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    /// Every this often, a tick ignores the unchanged-artifact shortcut.
    pub rebuild_interval_secs: u64,
    pub tick_timeout_secs: u64,
    /// Render pool size; `None` uses the host core count.
    pub render_workers: Option<usize>,
    pub history_window_hours: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 45,
            rebuild_interval_secs: 180,
            tick_timeout_secs: 120,
            render_workers: None,
            history_window_hours: 24,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 1024,
        }
    }
}

impl EngineConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_toml_str(&s).with_context(|| format!("load {}", path.display()))
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(s).context("parse engine config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let budget = &self.budget;
        if budget.capacity == 0 {
            bail!("budget.capacity must be greater than 0");
        }
        if budget.refill_interval_ms == 0 {
            bail!("budget.refill_interval_ms must be greater than 0");
        }
        if budget.refill_amount == 0 {
            bail!("budget.refill_amount must be greater than 0");
        }
        if let Some(initial) = budget.initial_tokens {
            if initial > budget.capacity {
                bail!(
                    "budget.initial_tokens ({initial}) must not exceed budget.capacity ({})",
                    budget.capacity
                );
            }
        }
        if self.worker.max_in_flight == 0 {
            bail!("worker.max_in_flight must be greater than 0");
        }
        if self.worker.max_attempts == 0 {
            bail!("worker.max_attempts must be greater than 0");
        }
        if self.scheduler.tick_interval_secs == 0 {
            bail!("scheduler.tick_interval_secs must be greater than 0");
        }
        if self.scheduler.tick_timeout_secs == 0 {
            bail!("scheduler.tick_timeout_secs must be greater than 0");
        }
        if self.scheduler.render_workers == Some(0) {
            bail!("scheduler.render_workers must be greater than 0 when set");
        }
        let window = self.scheduler.history_window_hours;
        if window <= 0 {
            bail!("scheduler.history_window_hours must be greater than 0");
        }
        if window > MAX_HISTORY_WINDOW_HOURS {
            bail!("scheduler.history_window_hours ({window}) must not exceed {MAX_HISTORY_WINDOW_HOURS}");
        }
        if self.cache.ttl_secs == 0 {
            bail!("cache.ttl_secs must be greater than 0");
        }
        if self.cache.max_entries == 0 {
            bail!("cache.max_entries must be greater than 0");
        }
        Ok(())
    }

    pub fn token_bucket(&self) -> TokenBucketCoreConfig {
        TokenBucketCoreConfig {
            capacity: self.budget.capacity,
            refill_interval: self.budget.refill_interval_ms,
            refill_amount: self.budget.refill_amount,
            initial_tokens: self.budget.initial_tokens,
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            max_in_flight: self.worker.max_in_flight,
            max_attempts: self.worker.max_attempts,
            retry_backoff: Duration::from_millis(self.worker.retry_backoff_ms),
            admission_backoff_min: Duration::from_millis(self.worker.admission_backoff_min_ms),
            admission_backoff_max: Duration::from_millis(self.worker.admission_backoff_max_ms),
        }
    }

    pub fn interactive_timeout(&self) -> Option<Duration> {
        self.worker.interactive_timeout_ms.map(Duration::from_millis)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_secs)
    }

    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.rebuild_interval_secs)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_timeout_secs)
    }

    /// Saturates at [`chrono::Duration::MAX`] for values `validate` rejects.
    pub fn history_window(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.scheduler.history_window_hours).unwrap_or(chrono::Duration::MAX)
    }

    /// Artifact TTL in clock ticks.
    pub fn cache_ttl_ticks(&self) -> Uint {
        duration_to_ticks(Duration::from_secs(self.cache.ttl_secs))
    }
}

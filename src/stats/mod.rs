//! Derived statistics.
//!
//! Pure, synchronous functions turning a [`RawPlayer`] into derived metrics and
//! an online/offline classification. Missing fields never fail metric
//! derivation: counts default to 0, and a ratio whose denominator is 0 (or
//! missing) is 0.

pub mod payload;
pub mod snapshot;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use payload::{BedwarsStats, PlayerStats, ProbeStatus, RawPlayer};

use crate::error::ResolveError;
use crate::types::FetchKey;

pub const LEVEL: &str = "level";
pub const FKDR: &str = "fkdr";
pub const WLR: &str = "wlr";
pub const BBLR: &str = "bblr";
pub const THREAT_INDEX: &str = "threat_index";
pub const WINSTREAK: &str = "winstreak";
pub const GAMES_PLAYED: &str = "games_played";
pub const WINS: &str = "wins";
pub const FINAL_KILLS: &str = "final_kills";
pub const FINAL_DEATHS: &str = "final_deaths";

/// Experience needed for one full prestige (100 levels).
const XP_PER_PRESTIGE: f64 = 487_000.0;
/// Cost of the first four levels of every prestige.
const EASY_LEVEL_XP: [f64; 4] = [500.0, 1000.0, 2000.0, 3500.0];
/// Cost of every later level in a prestige.
const LEVEL_XP: f64 = 5000.0;

/// Named numeric metrics derived from a payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedMetrics(BTreeMap<String, f64>);

impl DerivedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Value of `name`, or 0 when absent.
    pub fn value(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for DerivedMetrics {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        DerivedMetrics(iter.into_iter().collect())
    }
}

/// Reconciled online state of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub online: bool,
    /// Probe details, only when online.
    pub context: BTreeMap<String, String>,
}

/// Login/logout timestamps read from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginWindow {
    pub last_login: DateTime<Utc>,
    pub last_logout: DateTime<Utc>,
}

impl LoginWindow {
    /// Timestamp heuristic: online iff the last login is strictly after the last logout.
    pub fn appears_online(&self) -> bool {
        self.last_login > self.last_logout
    }

    /// When the entity last changed state, given its reconciled presence.
    pub fn last_transition(&self, online: bool) -> DateTime<Utc> {
        if online {
            self.last_login
        } else {
            self.last_logout
        }
    }
}

/// Bed Wars level for an experience total, with the fractional progress
/// towards the next level.
///
/// ```
/// use statsync_core::stats::bedwars_level;
///
/// assert_eq!(bedwars_level(0.0), 0.0);
/// assert_eq!(bedwars_level(500.0), 1.0);
/// assert_eq!(bedwars_level(7000.0), 4.0);
/// assert_eq!(bedwars_level(487_000.0), 100.0);
/// ```
pub fn bedwars_level(experience: f64) -> f64 {
    if !experience.is_finite() || experience <= 0.0 {
        return 0.0;
    }
    let prestiges = (experience / XP_PER_PRESTIGE).floor();
    let mut level = prestiges * 100.0;
    let mut remaining = experience - prestiges * XP_PER_PRESTIGE;

    for cost in EASY_LEVEL_XP {
        if remaining < cost {
            return level + remaining / cost;
        }
        level += 1.0;
        remaining -= cost;
    }
    level + remaining / LEVEL_XP
}

/// `numerator / denominator`, or 0 when the denominator is missing or zero.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> f64 {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => n / d,
        _ => 0.0,
    }
}

/// Composite score used for ordering: `level * fkdr² / 10`.
pub fn threat_index(level: f64, fkdr: f64) -> f64 {
    level * fkdr.powi(2) / 10.0
}

/// Derives every metric from the payload. Never fails.
pub fn derive_metrics(player: &RawPlayer) -> DerivedMetrics {
    let bedwars = player.stats.bedwars.clone().unwrap_or_default();

    let level = bedwars_level(bedwars.experience.unwrap_or(0.0));
    let fkdr = ratio(bedwars.final_kills_bedwars, bedwars.final_deaths_bedwars);

    let mut metrics = DerivedMetrics::new();
    metrics.insert(LEVEL, level);
    metrics.insert(FKDR, fkdr);
    metrics.insert(WLR, ratio(bedwars.wins_bedwars, bedwars.losses_bedwars));
    metrics.insert(BBLR, ratio(bedwars.beds_broken_bedwars, bedwars.beds_lost_bedwars));
    metrics.insert(THREAT_INDEX, threat_index(level, fkdr));
    metrics.insert(WINSTREAK, bedwars.winstreak.unwrap_or(0.0));
    metrics.insert(GAMES_PLAYED, bedwars.games_played_bedwars.unwrap_or(0.0));
    metrics.insert(WINS, bedwars.wins_bedwars.unwrap_or(0.0));
    metrics.insert(FINAL_KILLS, bedwars.final_kills_bedwars.unwrap_or(0.0));
    metrics.insert(FINAL_DEATHS, bedwars.final_deaths_bedwars.unwrap_or(0.0));
    metrics
}

/// Reads the login window.
///
/// Players with hidden API access (or who never logged out) have no
/// timestamps; that payload cannot be classified and is a permanent failure.
pub fn login_window(key: &FetchKey, player: &RawPlayer) -> Result<LoginWindow, ResolveError> {
    let last_login = player
        .last_login
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| ResolveError::Incomplete { key: key.to_string(), field: "lastLogin" })?;
    let last_logout = player
        .last_logout
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| ResolveError::Incomplete { key: key.to_string(), field: "lastLogout" })?;
    Ok(LoginWindow { last_login, last_logout })
}

/// Reconciles the timestamp heuristic with the live status probe.
///
/// The probe is only consulted when the heuristic says online. When it is,
/// its answer wins, every time, with no memory of earlier ticks. `None`
/// (probe failed) counts as offline, so a flaky probe can only hide a player,
/// never invent one.
pub fn reconcile(heuristic_online: bool, probe: Option<&ProbeStatus>) -> Presence {
    match (heuristic_online, probe) {
        (true, Some(status)) if status.online => Presence {
            online: true,
            context: status.context.clone(),
        },
        _ => Presence::default(),
    }
}

/// Display name from the payload, falling back to the key.
pub fn display_name(key: &FetchKey, player: &RawPlayer) -> String {
    player
        .displayname
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| key.to_string())
}

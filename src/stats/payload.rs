//! Upstream payload shapes.
//!
//! Every field is optional: the upstream service omits whatever a player has
//! never touched, and the resolver decides what a missing field means.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw player record as returned by the upstream player endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPlayer {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub displayname: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "lastLogin", default)]
    pub last_login: Option<i64>,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "lastLogout", default)]
    pub last_logout: Option<i64>,
    #[serde(default)]
    pub stats: PlayerStats,
}

impl RawPlayer {
    /// Parses the upstream JSON `player` object.
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    #[serde(rename = "Bedwars", default)]
    pub bedwars: Option<BedwarsStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BedwarsStats {
    #[serde(rename = "Experience", default)]
    pub experience: Option<f64>,
    #[serde(default)]
    pub final_kills_bedwars: Option<f64>,
    #[serde(default)]
    pub final_deaths_bedwars: Option<f64>,
    #[serde(default)]
    pub wins_bedwars: Option<f64>,
    #[serde(default)]
    pub losses_bedwars: Option<f64>,
    #[serde(default)]
    pub beds_broken_bedwars: Option<f64>,
    #[serde(default)]
    pub beds_lost_bedwars: Option<f64>,
    #[serde(default)]
    pub games_played_bedwars: Option<f64>,
    #[serde(default)]
    pub winstreak: Option<f64>,
}

/// Answer of the live status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStatus {
    pub online: bool,
    /// Free-form details such as `gameType`, `mode` and `map`.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

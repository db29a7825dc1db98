#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use statsync_core::clock::{Clock, MonotonicClock};
use statsync_core::entity::ResolvedStats;
use statsync_core::interfaces::{ArtifactRenderer, StatusProbe, UpstreamClient};
use statsync_core::queue::{QueueWorker, RequestQueue, WorkerSettings};
use statsync_core::rate_limiters::{AdmissionGate, TokenBucketCoreConfig};
use statsync_core::stats::{BedwarsStats, PlayerStats, ProbeStatus, RawPlayer, GAMES_PLAYED};
use statsync_core::{FetchKey, UpstreamError};

/// Scripted upstream: known players answer, unknown keys are permanent
/// failures, queued failures are served first, and panicking keys panic.
#[derive(Default)]
pub struct FakeUpstream {
    players: Mutex<HashMap<FetchKey, RawPlayer>>,
    failures: Mutex<HashMap<FetchKey, VecDeque<UpstreamError>>>,
    panicking: Mutex<HashSet<FetchKey>>,
    calls: Mutex<Vec<FetchKey>>,
    delay: Duration,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn set_player(&self, key: &FetchKey, player: RawPlayer) {
        self.players.lock().unwrap().insert(key.clone(), player);
    }

    pub fn fail_next(&self, key: &FetchKey, err: UpstreamError) {
        self.failures.lock().unwrap().entry(key.clone()).or_default().push_back(err);
    }

    pub fn panic_on(&self, key: &FetchKey) {
        self.panicking.lock().unwrap().insert(key.clone());
    }

    pub fn stop_panicking(&self, key: &FetchKey) {
        self.panicking.lock().unwrap().remove(key);
    }

    pub fn calls(&self) -> Vec<FetchKey> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, key: &FetchKey) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == key).count()
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstream {
    async fn fetch(&self, key: &FetchKey) -> Result<RawPlayer, UpstreamError> {
        self.calls.lock().unwrap().push(key.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let panics = self.panicking.lock().unwrap().contains(key);
        if panics {
            panic!("upstream client crashed on {key}");
        }
        if let Some(err) = self.failures.lock().unwrap().get_mut(key).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        self.players
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| UpstreamError::Permanent(format!("{key} not found")))
    }
}

/// Live status: keys marked online answer online, failing keys error out,
/// everything else is offline.
#[derive(Default)]
pub struct FakeProbe {
    online: Mutex<HashMap<FetchKey, BTreeMap<String, String>>>,
    failing: Mutex<HashSet<FetchKey>>,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, key: &FetchKey, game: &str) {
        let context = BTreeMap::from([("gameType".to_string(), game.to_string())]);
        self.online.lock().unwrap().insert(key.clone(), context);
    }

    pub fn set_offline(&self, key: &FetchKey) {
        self.online.lock().unwrap().remove(key);
    }

    pub fn set_failing(&self, key: &FetchKey) {
        self.failing.lock().unwrap().insert(key.clone());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for FakeProbe {
    async fn probe(&self, key: &FetchKey) -> Result<ProbeStatus, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(key) {
            return Err(UpstreamError::Permanent("status unavailable".to_string()));
        }
        Ok(match self.online.lock().unwrap().get(key) {
            Some(context) => ProbeStatus {
                online: true,
                context: context.clone(),
            },
            None => ProbeStatus::default(),
        })
    }
}

/// Renders `id|threat|online|games` as bytes, so any visible change changes the bytes.
#[derive(Default)]
pub struct StubRenderer {
    renders: AtomicUsize,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl ArtifactRenderer for StubRenderer {
    fn render(&self, stats: &ResolvedStats) -> anyhow::Result<Vec<u8>> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "{}|{:.4}|{}|{}",
            stats.id,
            stats.composite_score(),
            stats.presence.online,
            stats.metrics.value(GAMES_PLAYED)
        )
        .into_bytes())
    }
}

/// Bed Wars payload. `online` sets the login/logout timestamps accordingly.
pub fn player(name: &str, experience: f64, final_kills: f64, final_deaths: f64, games: f64, online: bool) -> RawPlayer {
    let (login, logout) = if online {
        (1_700_000_100_000, 1_700_000_000_000)
    } else {
        (1_700_000_000_000, 1_700_000_100_000)
    };
    RawPlayer {
        uuid: None,
        displayname: Some(name.to_string()),
        last_login: Some(login),
        last_logout: Some(logout),
        stats: PlayerStats {
            bedwars: Some(BedwarsStats {
                experience: Some(experience),
                final_kills_bedwars: Some(final_kills),
                final_deaths_bedwars: Some(final_deaths),
                games_played_bedwars: Some(games),
                ..BedwarsStats::default()
            }),
        },
    }
}

pub fn fast_settings(max_in_flight: usize) -> WorkerSettings {
    WorkerSettings {
        max_in_flight,
        max_attempts: 3,
        retry_backoff: Duration::from_millis(100),
        admission_backoff_min: Duration::from_millis(25),
        admission_backoff_max: Duration::from_secs(1),
    }
}

pub fn bucket(capacity: u64, refill_interval_ms: u64, initial_tokens: Option<u64>) -> TokenBucketCoreConfig {
    TokenBucketCoreConfig {
        capacity: capacity.into(),
        refill_interval: refill_interval_ms.into(),
        refill_amount: 1,
        initial_tokens: initial_tokens.map(Into::into),
    }
}

/// A queue with a gate and fakes, worker not yet started.
pub struct Harness {
    pub clock: Arc<dyn Clock>,
    pub queue: Arc<RequestQueue>,
    pub gate: AdmissionGate,
    pub upstream: Arc<FakeUpstream>,
    pub probe: Arc<FakeProbe>,
    pub settings: WorkerSettings,
}

impl Harness {
    pub fn new(upstream: FakeUpstream, bucket: TokenBucketCoreConfig, settings: WorkerSettings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        Harness {
            queue: Arc::new(RequestQueue::new(clock.clone())),
            gate: AdmissionGate::token_bucket(bucket, clock.clone()),
            clock,
            upstream: Arc::new(upstream),
            probe: Arc::new(FakeProbe::new()),
            settings,
        }
    }

    pub fn start_worker(&self) -> JoinHandle<()> {
        QueueWorker::new(
            self.queue.clone(),
            self.gate.clone(),
            self.upstream.clone(),
            self.probe.clone(),
            self.settings.clone(),
        )
        .spawn()
    }
}

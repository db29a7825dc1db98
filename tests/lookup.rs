mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::{player, FakeProbe, FakeUpstream, StubRenderer};
use statsync_core::interfaces::SnapshotStore;
use statsync_core::memory::{InMemoryDirectory, InMemorySnapshotStore, InMemorySurface};
use statsync_core::stats::snapshot::StatisticsSnapshot;
use statsync_core::stats::{DerivedMetrics, GAMES_PLAYED};
use statsync_core::{
    Collaborators, DeltaError, Engine, EngineConfig, FetchError, FetchKey, ResolveError, SurfaceId, UpstreamError,
};

struct Setup {
    engine: Engine,
    upstream: Arc<FakeUpstream>,
    probe: Arc<FakeProbe>,
    renderer: Arc<StubRenderer>,
    snapshots: Arc<InMemorySnapshotStore>,
    surface: Arc<InMemorySurface>,
    directory: Arc<InMemoryDirectory>,
}

fn start(config: EngineConfig) -> Setup {
    let upstream = Arc::new(FakeUpstream::new());
    let probe = Arc::new(FakeProbe::new());
    let renderer = Arc::new(StubRenderer::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let surface = Arc::new(InMemorySurface::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let engine = Engine::start(
        &config,
        Collaborators {
            upstream: upstream.clone(),
            probe: probe.clone(),
            directory: directory.clone(),
            surface: surface.clone(),
            snapshots: snapshots.clone(),
            renderer: renderer.clone(),
        },
    )
    .unwrap();
    Setup {
        engine,
        upstream,
        probe,
        renderer,
        snapshots,
        surface,
        directory,
    }
}

fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.scheduler.tick_interval_secs = 3600;
    config.worker.retry_backoff_ms = 10;
    config
}

#[tokio::test(start_paused = true)]
async fn player_lookup_reconciles_presence() {
    let s = start(quiet_config());
    let key = FetchKey::new("p");
    s.upstream.set_player(&key, player("P", 7000.0, 30.0, 10.0, 20.0, true));
    s.probe.set_online(&key, "BEDWARS");

    let stats = s.engine.lookup().player(&key).await.unwrap();
    assert!(stats.presence.online);
    assert_eq!(stats.display_name, "P");
    s.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn check_valid_separates_permanent_from_transient() {
    let s = start(quiet_config());
    let known = FetchKey::new("known");
    let flaky = FetchKey::new("flaky");
    s.upstream.set_player(&known, player("Known", 0.0, 0.0, 0.0, 0.0, false));
    s.upstream.set_player(&flaky, player("Flaky", 0.0, 0.0, 0.0, 0.0, false));
    for _ in 0..3 {
        s.upstream.fail_next(&flaky, UpstreamError::Transient("429".into()));
    }

    let lookup = s.engine.lookup();
    assert!(lookup.check_valid(&known).await.unwrap());
    assert!(!lookup.check_valid(&FetchKey::new("nobody")).await.unwrap());
    assert!(matches!(
        lookup.check_valid(&flaky).await,
        Err(ResolveError::Fetch(FetchError::Exhausted { .. }))
    ));
    s.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn artifact_is_served_from_cache_within_ttl() {
    let s = start(quiet_config());
    let key = FetchKey::new("p");
    s.upstream.set_player(&key, player("P", 7000.0, 30.0, 10.0, 20.0, false));
    let lookup = s.engine.lookup().clone();

    let first = lookup.artifact(&key).await.unwrap();
    tokio::time::advance(Duration::from_secs(250)).await;
    let second = lookup.artifact(&key).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(s.renderer.renders(), 1);
    assert_eq!(s.upstream.call_count(&key), 1);

    tokio::time::advance(Duration::from_secs(51)).await;
    lookup.artifact(&key).await.unwrap();
    assert_eq!(s.renderer.renders(), 2);
    assert_eq!(s.upstream.call_count(&key), 2);
    s.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn daily_reports_change_over_the_window() {
    let s = start(quiet_config());
    let key = FetchKey::new("p");
    let now = Utc::now();
    for (hours_ago, games) in [(30, 100.0), (2, 108.0)] {
        let mut metrics = DerivedMetrics::new();
        metrics.insert(GAMES_PLAYED, games);
        s.snapshots
            .append(StatisticsSnapshot {
                entity_id: key.clone(),
                derived_metrics: metrics,
                timestamp: now - chrono::Duration::hours(hours_ago),
            })
            .await
            .unwrap();
    }

    let delta = s.engine.lookup().daily(&key).await.unwrap();
    assert_eq!(delta.changes.get(GAMES_PLAYED), Some(8.0));
    assert!(matches!(
        s.engine.lookup().daily(&FetchKey::new("untracked")).await,
        Err(DeltaError::NotTracked(_))
    ));
    s.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn engine_ticks_on_start_and_stops_on_shutdown() {
    // Installs once; repeated calls are harmless
    statsync_core::logging::init();
    statsync_core::logging::init();
    let s = start(quiet_config());
    let chan = SurfaceId::new("chan");
    let key = FetchKey::new("p");
    s.surface.add_surface(chan.clone());
    s.upstream.set_player(&key, player("P", 7000.0, 30.0, 10.0, 20.0, false));
    s.directory.track(key.clone(), chan.clone());

    // The first tick fires as soon as the loop starts
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(s.surface.shown(&chan), vec![key.clone()]);

    let queue = s.engine.queue().clone();
    let lookup = s.engine.lookup().clone();
    s.engine.shutdown().await;
    assert!(queue.is_closed());
    assert!(matches!(
        lookup.player(&key).await,
        Err(ResolveError::Fetch(FetchError::QueueClosed))
    ));
}

#[tokio::test]
async fn invalid_config_refuses_to_start() {
    let mut config = EngineConfig::default();
    config.budget.capacity = 0;
    let result = Engine::start(
        &config,
        Collaborators {
            upstream: Arc::new(FakeUpstream::new()),
            probe: Arc::new(FakeProbe::new()),
            directory: Arc::new(InMemoryDirectory::new()),
            surface: Arc::new(InMemorySurface::new()),
            snapshots: Arc::new(InMemorySnapshotStore::new()),
            renderer: Arc::new(StubRenderer::new()),
        },
    );
    assert!(result.is_err());
}

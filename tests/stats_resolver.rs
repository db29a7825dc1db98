mod common;

use std::time::Duration;

use serde_json::json;

use common::{bucket, fast_settings, player, FakeUpstream, Harness};
use statsync_core::resolve::EntityResolver;
use statsync_core::stats::{
    self, bedwars_level, derive_metrics, ratio, reconcile, threat_index, ProbeStatus, RawPlayer, BBLR, FKDR,
    GAMES_PLAYED, LEVEL, THREAT_INDEX, WINSTREAK, WLR,
};
use statsync_core::{FetchKey, Priority, ResolveError};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn level_follows_prestige_curve() {
    assert_eq!(bedwars_level(0.0), 0.0);
    assert_eq!(bedwars_level(-5.0), 0.0);
    assert!(approx(bedwars_level(250.0), 0.5));
    assert_eq!(bedwars_level(500.0), 1.0);
    assert_eq!(bedwars_level(1500.0), 2.0);
    assert_eq!(bedwars_level(3500.0), 3.0);
    assert_eq!(bedwars_level(7000.0), 4.0);
    assert!(approx(bedwars_level(9500.0), 4.5));
    assert_eq!(bedwars_level(487_000.0), 100.0);
    assert_eq!(bedwars_level(487_500.0), 101.0);
    assert_eq!(bedwars_level(2.0 * 487_000.0 + 7000.0 + 5000.0), 205.0);
}

#[test]
fn ratios_default_to_zero_on_zero_or_missing_denominator() {
    assert_eq!(ratio(Some(10.0), Some(4.0)), 2.5);
    assert_eq!(ratio(Some(10.0), Some(0.0)), 0.0);
    assert_eq!(ratio(Some(10.0), None), 0.0);
    assert_eq!(ratio(None, Some(3.0)), 0.0);
    assert_eq!(ratio(None, None), 0.0);
}

#[test]
fn threat_index_combines_level_and_fkdr() {
    assert!(approx(threat_index(100.0, 2.0), 40.0));
    assert_eq!(threat_index(100.0, 0.0), 0.0);
}

#[test]
fn derive_metrics_from_upstream_json() {
    let raw = RawPlayer::from_json(json!({
        "uuid": "069a79f444e94726a5befca90e38aaf5",
        "displayname": "Notch",
        "lastLogin": 1_700_000_100_000_i64,
        "lastLogout": 1_700_000_000_000_i64,
        "stats": {
            "Bedwars": {
                "Experience": 7000,
                "final_kills_bedwars": 30,
                "final_deaths_bedwars": 10,
                "wins_bedwars": 8,
                "losses_bedwars": 0,
                "beds_broken_bedwars": 12,
                "beds_lost_bedwars": 4,
                "games_played_bedwars": 20,
                "winstreak": 3
            },
            "SkyWars": { "wins": 1 }
        }
    }))
    .unwrap();

    let metrics = derive_metrics(&raw);
    assert_eq!(metrics.get(LEVEL), Some(4.0));
    assert_eq!(metrics.get(FKDR), Some(3.0));
    assert_eq!(metrics.get(WLR), Some(0.0));
    assert_eq!(metrics.get(BBLR), Some(3.0));
    assert!(approx(metrics.value(THREAT_INDEX), 4.0 * 9.0 / 10.0));
    assert_eq!(metrics.get(WINSTREAK), Some(3.0));
    assert_eq!(metrics.get(GAMES_PLAYED), Some(20.0));
}

#[test]
fn missing_stats_never_fail_derivation() {
    let raw = RawPlayer::from_json(json!({ "displayname": "fresh" })).unwrap();
    let metrics = derive_metrics(&raw);
    assert_eq!(metrics.get(LEVEL), Some(0.0));
    assert_eq!(metrics.get(FKDR), Some(0.0));
    assert_eq!(metrics.get(THREAT_INDEX), Some(0.0));
    assert_eq!(metrics.get(GAMES_PLAYED), Some(0.0));
}

#[test]
fn missing_login_timestamps_are_incomplete() {
    let key = FetchKey::new("hidden");
    let raw = RawPlayer::from_json(json!({ "displayname": "hidden", "lastLogin": 5 })).unwrap();
    match stats::login_window(&key, &raw) {
        Err(err @ ResolveError::Incomplete { field: "lastLogout", .. }) => assert!(err.is_permanent()),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn login_window_heuristic_is_strict() {
    let key = FetchKey::new("k");
    let mut raw = player("k", 0.0, 0.0, 0.0, 0.0, true);
    assert!(stats::login_window(&key, &raw).unwrap().appears_online());

    raw.last_logout = raw.last_login;
    assert!(!stats::login_window(&key, &raw).unwrap().appears_online());
}

#[test]
fn probe_wins_over_heuristic() {
    let online = ProbeStatus {
        online: true,
        context: [("mode".to_string(), "FOURS".to_string())].into(),
    };
    let offline = ProbeStatus::default();

    let presence = reconcile(true, Some(&online));
    assert!(presence.online);
    assert_eq!(presence.context.get("mode").map(String::as_str), Some("FOURS"));

    assert!(!reconcile(true, Some(&offline)).online);
    assert!(!reconcile(true, None).online);
    // The heuristic saying offline is final
    assert!(!reconcile(false, Some(&online)).online);
}

#[test]
fn display_name_falls_back_to_key() {
    let key = FetchKey::new("abc");
    let mut raw = player("Shown", 0.0, 0.0, 0.0, 0.0, false);
    assert_eq!(stats::display_name(&key, &raw), "Shown");
    raw.displayname = Some("  ".into());
    assert_eq!(stats::display_name(&key, &raw), "abc");
}

fn resolver_harness() -> Harness {
    Harness::new(FakeUpstream::new(), bucket(100, 1000, None), fast_settings(4))
}

#[tokio::test(start_paused = true)]
async fn resolver_confirms_online_with_probe() {
    let h = resolver_harness();
    let key = FetchKey::new("on");
    h.upstream.set_player(&key, player("On", 7000.0, 30.0, 10.0, 20.0, true));
    h.probe.set_online(&key, "BEDWARS");
    let _worker = h.start_worker();

    let resolver = EntityResolver::new(h.queue.clone(), Some(Duration::from_secs(5)));
    let stats = resolver.resolve(&key, Priority::High).await.unwrap();

    assert!(stats.presence.online);
    assert_eq!(stats.presence.context.get("gameType").map(String::as_str), Some("BEDWARS"));
    assert_eq!(stats.display_name, "On");
    assert_eq!(stats.last_transition_time.timestamp_millis(), 1_700_000_100_000);
    assert!(approx(stats.composite_score(), 3.6));
    assert_eq!(h.probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn resolver_downgrades_when_probe_disagrees_or_fails() {
    let h = resolver_harness();
    let skewed = FetchKey::new("skewed");
    let broken = FetchKey::new("broken");
    h.upstream.set_player(&skewed, player("Skewed", 0.0, 0.0, 0.0, 0.0, true));
    h.upstream.set_player(&broken, player("Broken", 0.0, 0.0, 0.0, 0.0, true));
    h.probe.set_failing(&broken);
    let _worker = h.start_worker();

    let resolver = EntityResolver::new(h.queue.clone(), None);
    let skewed = resolver.resolve(&skewed, Priority::Normal).await.unwrap();
    let broken = resolver.resolve(&broken, Priority::Normal).await.unwrap();

    assert!(!skewed.presence.online);
    assert!(skewed.presence.context.is_empty());
    assert_eq!(skewed.last_transition_time.timestamp_millis(), 1_700_000_000_000);
    assert!(!broken.presence.online);
}

#[tokio::test(start_paused = true)]
async fn resolver_skips_probe_when_offline() {
    let h = resolver_harness();
    let key = FetchKey::new("off");
    h.upstream.set_player(&key, player("Off", 0.0, 0.0, 0.0, 0.0, false));
    h.probe.set_online(&key, "BEDWARS");
    let _worker = h.start_worker();

    let stats = EntityResolver::new(h.queue.clone(), None)
        .resolve(&key, Priority::Normal)
        .await
        .unwrap();
    assert!(!stats.presence.online);
    assert_eq!(h.probe.calls(), 0);
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use statsync_core::cache::ImageCache;
use statsync_core::clock::ManualClock;
use statsync_core::FetchKey;

const SECOND: u64 = 1000;

fn cache_with_clock(ttl_secs: u64, max_entries: usize) -> (ImageCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let cache = ImageCache::new((ttl_secs * SECOND).into(), max_entries, clock.clone());
    (cache, clock)
}

#[tokio::test]
async fn ttl_scenario_renders_again_only_after_expiry() {
    let (cache, clock) = cache_with_clock(300, 16);
    let key = FetchKey::new("k");
    let renders = &AtomicUsize::new(0);
    let render = move || async move {
        let n = renders.fetch_add(1, Ordering::SeqCst);
        Ok::<_, anyhow::Error>(format!("render-{n}").into_bytes())
    };

    let first = cache.get_or_render(&key, render).await.unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    clock.set(250 * SECOND);
    let second = cache.get_or_render(&key, render).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    clock.set(301 * SECOND);
    let third = cache.get_or_render(&key, render).await.unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(&*third, b"render-1");
}

#[tokio::test]
async fn failed_render_keeps_previous_entry() {
    let (cache, clock) = cache_with_clock(300, 16);
    let key = FetchKey::new("k");
    cache.insert(key.clone(), b"old".to_vec());

    clock.set(400 * SECOND);
    let result = cache
        .get_or_render(&key, || async { Err::<Vec<u8>, _>(anyhow::anyhow!("renderer down")) })
        .await;
    assert!(result.is_err());
    assert_eq!(cache.len(), 1);
}

#[test]
fn bytes_equal_is_exact_and_respects_ttl() {
    let (cache, clock) = cache_with_clock(300, 16);
    let key = FetchKey::new("k");

    assert!(!cache.bytes_equal(&key, b"png"));
    cache.insert(key.clone(), b"png".to_vec());
    assert!(cache.bytes_equal(&key, b"png"));
    assert!(!cache.bytes_equal(&key, b"png "));
    assert!(!cache.bytes_equal(&FetchKey::new("other"), b"png"));

    clock.set(299 * SECOND);
    assert!(cache.bytes_equal(&key, b"png"));
    clock.set(300 * SECOND);
    assert!(!cache.bytes_equal(&key, b"png"));
    assert_eq!(cache.get(&key), None);
}

#[test]
fn insert_overwrites_in_place() {
    let (cache, clock) = cache_with_clock(300, 16);
    let key = FetchKey::new("k");
    cache.insert(key.clone(), b"v1".to_vec());
    clock.set(200 * SECOND);
    cache.insert(key.clone(), b"v2".to_vec());

    assert_eq!(cache.len(), 1);
    // Fresh timestamp from the second insert
    clock.set(450 * SECOND);
    assert_eq!(cache.get(&key).as_deref(), Some(&b"v2"[..]));
}

#[test]
fn oldest_entry_is_evicted_beyond_max_entries() {
    let (cache, clock) = cache_with_clock(300, 2);
    cache.insert(FetchKey::new("a"), b"a".to_vec());
    clock.advance(1);
    cache.insert(FetchKey::new("b"), b"b".to_vec());
    clock.advance(1);
    cache.insert(FetchKey::new("c"), b"c".to_vec());

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&FetchKey::new("a")), None);
    assert!(cache.get(&FetchKey::new("b")).is_some());
    assert!(cache.get(&FetchKey::new("c")).is_some());
}

#[test]
fn eviction_within_one_tick_keeps_the_new_entry() {
    let (cache, _clock) = cache_with_clock(300, 1);
    for id in ["a", "b", "c", "d"] {
        cache.insert(FetchKey::new(id), id.as_bytes().to_vec());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&FetchKey::new(id)).is_some(), "{id} was evicted on insert");
    }
}

#[test]
fn invalidate_forgets_the_entry() {
    let (cache, _clock) = cache_with_clock(300, 4);
    let key = FetchKey::new("a");
    cache.insert(key.clone(), b"a".to_vec());
    assert!(cache.bytes_equal(&key, b"a"));

    assert!(cache.invalidate(&key));
    assert!(!cache.bytes_equal(&key, b"a"));
    assert!(!cache.invalidate(&key));
}

#[test]
fn sweep_drops_only_expired_entries() {
    let (cache, clock) = cache_with_clock(300, 16);
    cache.insert(FetchKey::new("old"), b"o".to_vec());
    clock.set(200 * SECOND);
    cache.insert(FetchKey::new("new"), b"n".to_vec());

    clock.set(350 * SECOND);
    assert_eq!(cache.sweep_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&FetchKey::new("new")).is_some());
}

#[test]
#[should_panic(expected = "ttl must be greater than 0")]
fn zero_ttl_panics() {
    ImageCache::new(0, 1, Arc::new(ManualClock::new(0)));
}

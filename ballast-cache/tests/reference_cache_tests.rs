//! ReferenceCache against a counting fetcher and a manual clock.

use ballast_cache::{CacheConfig, KeySpace, ReferenceCache};
use ballast_core::{BallastError, Context, UpstreamError};
use ballast_test_utils::{fixtures, CountingFetcher};
use std::sync::Arc;
use std::time::Duration;

fn config() -> CacheConfig {
    CacheConfig::new()
        .with_parents_ttl(Duration::from_secs(60))
        .with_subjects_ttl(Duration::from_secs(120))
        .with_characteristics_ttl(Duration::from_secs(30))
        .with_max_characteristics(3)
}

fn subject_fetcher(ids: &[&str]) -> CountingFetcher {
    ids.iter().fold(fixtures::sample_fetcher(), |fetcher, id| {
        fetcher.with_characteristics(*id, fixtures::sample_characteristics())
    })
}

#[tokio::test]
async fn test_one_fetch_per_ttl_window() {
    let clock = fixtures::manual_clock();
    let cache = ReferenceCache::with_clock(fixtures::sample_fetcher(), config(), clock.clone());
    let ctx = Context::background();

    let first = cache.get_parents(&ctx).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(cache.fetcher().calls(KeySpace::Parents), 1);

    for _ in 0..5 {
        clock.advance(Duration::from_secs(10));
        cache.get_parents(&ctx).await.unwrap();
    }
    assert_eq!(cache.fetcher().calls(KeySpace::Parents), 1);

    clock.advance(Duration::from_secs(10));
    cache.get_parents(&ctx).await.unwrap();
    assert_eq!(cache.fetcher().calls(KeySpace::Parents), 2);
}

#[tokio::test]
async fn test_hits_share_the_same_allocation() {
    let cache = ReferenceCache::with_clock(
        fixtures::sample_fetcher(),
        config(),
        fixtures::manual_clock(),
    );
    let ctx = Context::background();

    let a = cache.get_subjects(&ctx).await.unwrap();
    let b = cache.get_subjects(&ctx).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn test_capacity_plus_one_evicts_earliest_expiry() {
    let clock = fixtures::manual_clock();
    let fetcher = subject_fetcher(&["a", "b", "c", "d"]);
    let cache = ReferenceCache::with_clock(fetcher, config(), clock.clone());
    let ctx = Context::background();

    for id in ["a", "b", "c", "d"] {
        cache.get_characteristics(&ctx, id).await.unwrap();
        clock.advance(Duration::from_secs(1));
    }

    assert_eq!(cache.characteristics_len(), 3);
    assert!(!cache.contains_subject("a"));
    for id in ["b", "c", "d"] {
        assert!(cache.contains_subject(id));
    }
    assert_eq!(cache.stats().evictions, 1);

    cache.get_characteristics(&ctx, "a").await.unwrap();
    assert_eq!(cache.fetcher().characteristic_calls_for("a"), 2);
    assert!(!cache.contains_subject("b"));
}

#[tokio::test]
async fn test_cleanup_expired_boundary() {
    let clock = fixtures::manual_clock();
    let cache = ReferenceCache::with_clock(subject_fetcher(&["x", "y"]), config(), clock.clone());
    let ctx = Context::background();

    cache.get_characteristics(&ctx, "x").await.unwrap();
    clock.advance(Duration::from_secs(10));
    cache.get_characteristics(&ctx, "y").await.unwrap();

    clock.advance(Duration::from_secs(19));
    assert_eq!(cache.cleanup_expired().total(), 0);

    clock.advance(Duration::from_secs(1));
    let report = cache.cleanup_expired();
    assert_eq!(report.characteristics, 1);
    assert!(!cache.contains_subject("x"));
    assert!(cache.contains_subject("y"));
}

#[tokio::test]
async fn test_fetch_failure_is_returned_and_not_cached() {
    let cache = ReferenceCache::with_clock(
        fixtures::sample_fetcher(),
        config(),
        fixtures::manual_clock(),
    );
    let ctx = Context::background();

    cache.fetcher().fail(KeySpace::Subjects);
    let err = cache.get_subjects(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        BallastError::Upstream(UpstreamError::FetchFailed { ref key_space, .. }) if key_space == "subjects"
    ));
    assert_eq!(cache.stats().entry_count, 0);

    cache.fetcher().recover(KeySpace::Subjects);
    assert_eq!(cache.get_subjects(&ctx).await.unwrap().len(), 2);
    assert_eq!(cache.fetcher().calls(KeySpace::Subjects), 2);
}

#[tokio::test]
async fn test_cancelled_fetch_surfaces_cancellation() {
    let fetcher = fixtures::sample_fetcher().with_latency(Duration::from_secs(5));
    let cache = ReferenceCache::new(fetcher, config());
    let ctx = Context::background().with_timeout(Duration::from_millis(20));

    let err = cache.get_parents(&ctx).await.unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(cache.stats().entry_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_see_consistent_values() {
    let cache = Arc::new(ReferenceCache::new(
        subject_fetcher(&["a", "b", "c"]),
        config(),
    ));
    let ctx = Context::background();

    let mut handles = Vec::new();
    for i in 0..32 {
        let cache = cache.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let id = ["a", "b", "c"][i % 3];
            cache.get_characteristics(&ctx, id).await.map(|v| v.len())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }
    assert!(cache.characteristics_len() <= 3);
}

#[tokio::test]
async fn test_background_cleanup_sweeps_and_stops_on_shutdown() {
    let clock = fixtures::manual_clock();
    let cache = Arc::new(ReferenceCache::with_clock(
        subject_fetcher(&["a", "b"]),
        config(),
        clock.clone(),
    ));
    let ctx = Context::background();
    cache.get_parents(&ctx).await.unwrap();
    cache.get_characteristics(&ctx, "a").await.unwrap();
    cache.get_characteristics(&ctx, "b").await.unwrap();

    let handle = cache.start_cleanup(Duration::from_millis(10));
    clock.advance(Duration::from_secs(45));

    tokio::time::timeout(Duration::from_secs(5), async {
        while cache.characteristics_len() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("cleanup did not run");

    let snapshot = handle.shutdown().await;
    assert!(snapshot.cycles >= 1);
    assert_eq!(snapshot.characteristics_removed, 2);
    assert_eq!(snapshot.parents_removed, 0);
    assert_eq!(cache.stats().entry_count, 1);
}

#[tokio::test]
async fn test_cleanup_stops_when_cache_dropped() {
    let cache = Arc::new(ReferenceCache::new(fixtures::sample_fetcher(), config()));
    let handle = cache.start_cleanup(Duration::from_millis(5));
    drop(cache);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("cleanup task outlived the cache");
}

#[tokio::test]
async fn test_cleanup_stops_when_parent_context_cancelled() {
    let cache = Arc::new(ReferenceCache::new(fixtures::sample_fetcher(), config()));
    let parent = Context::background();
    let handle = cache.start_cleanup_in(&parent, Duration::from_millis(5));
    parent.cancel();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("cleanup task ignored cancellation");
}

#[tokio::test]
async fn test_concurrent_misses_each_fetch() {
    let cache = ReferenceCache::new(
        fixtures::sample_fetcher().with_latency(Duration::from_millis(20)),
        config(),
    );
    let ctx = Context::background();

    let (first, second) = tokio::join!(cache.get_parents(&ctx), cache.get_parents(&ctx));
    assert_eq!(first.unwrap().len(), 2);
    assert_eq!(second.unwrap().len(), 2);
    // No single-flight: both misses went upstream.
    assert_eq!(cache.fetcher().calls(KeySpace::Parents), 2);

    cache.get_parents(&ctx).await.unwrap();
    assert_eq!(cache.fetcher().calls(KeySpace::Parents), 2);
}

//! EnrichmentPipeline wired to mock collaborators.

use ballast_cache::{CacheConfig, KeySpace, ReferenceCache};
use ballast_client::{RateLimitConfig, RateLimiter};
use ballast_core::{BallastError, Context, ExecutorError};
use ballast_fanout::FanOutExecutor;
use ballast_pipeline::{
    synthetic_batch, EnrichmentPipeline, ListingItem, ModelClient, RateLimitedModel,
    SyntheticCatalog, SyntheticModel,
};
use ballast_test_utils::{fixtures, CountingFetcher, FixedModelClient};
use std::sync::Arc;
use std::time::Duration;

fn pipeline<M: ModelClient>(
    fetcher: CountingFetcher,
    model: M,
    concurrency: usize,
) -> EnrichmentPipeline<CountingFetcher, M> {
    let cache = Arc::new(ReferenceCache::new(fetcher, CacheConfig::default()));
    EnrichmentPipeline::new(cache, Arc::new(model), FanOutExecutor::new(concurrency))
}

#[tokio::test]
async fn test_enriches_every_item() {
    let model = FixedModelClient::new()
        .classify_all("Sneakers")
        .classify("img3", "Backpacks")
        .extract_all("color: red\nbrand: Acme");
    let pipeline = pipeline(fixtures::sample_fetcher(), model, 2);

    let report = pipeline
        .run(&Context::background(), fixtures::listings(3))
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded(), 3);
    let img3 = report.item("img3").unwrap();
    assert_eq!(img3.subject_id, "s-backpacks");
    assert_eq!(img3.category.as_deref(), Some("Bags"));
    assert_eq!(img3.attributes.get("brand").map(String::as_str), Some("Acme"));
    assert_eq!(
        report.enriched.iter().map(|i| i.item_id.as_str()).collect::<Vec<_>>(),
        vec!["img1", "img2", "img3"]
    );
}

#[tokio::test]
async fn test_characteristics_fetched_once_per_subject() {
    let model = FixedModelClient::new()
        .classify_all("Sneakers")
        .extract_all("color: blue");
    let pipeline = pipeline(fixtures::sample_fetcher(), model, 4);
    let ctx = Context::background();

    pipeline.run(&ctx, fixtures::listings(12)).await.unwrap();
    let report = pipeline.run(&ctx, fixtures::listings(12)).await.unwrap();

    let fetcher = pipeline.cache().fetcher();
    assert_eq!(fetcher.calls(KeySpace::Parents), 1);
    assert_eq!(fetcher.calls(KeySpace::Subjects), 1);
    // Concurrent first misses may each fetch; after that every read is a hit.
    assert!(fetcher.characteristic_calls_for("s-sneakers") >= 1);
    assert!(fetcher.characteristic_calls_for("s-sneakers") <= 4);
    assert!(report.cache.hits >= 12);
}

#[tokio::test]
async fn test_item_failures_are_isolated() {
    let model = FixedModelClient::new()
        .classify_all("Sneakers")
        .classify("img2", "Hats")
        .extract_all("color: red")
        .extract("img3", "brand: Acme")
        .extract("img4", "color: green")
        .fail_for("img5", "processing failed");
    let pipeline = pipeline(fixtures::sample_fetcher(), model, 3);

    let report = pipeline
        .run(&Context::background(), fixtures::listings(5))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert!(report.item("img1").is_some());
    assert!(report.failure("img2").unwrap().message.contains("unknown subject"));
    assert!(report.failure("img3").unwrap().message.contains("color"));
    assert!(report.failure("img4").unwrap().message.contains("green"));
    assert!(report.failure("img5").unwrap().message.contains("processing failed"));
    assert_eq!(report.cancelled(), 0);
}

#[tokio::test]
async fn test_reference_failure_aborts_run() {
    let fetcher = fixtures::sample_fetcher();
    fetcher.fail(KeySpace::Subjects);
    let model = FixedModelClient::new().classify_all("Sneakers");
    let pipeline = pipeline(fetcher, model, 2);

    let err = pipeline
        .run(&Context::background(), fixtures::listings(2))
        .await
        .unwrap_err();
    assert!(matches!(err, BallastError::Upstream(_)));
    assert_eq!(pipeline.model().calls(), 0);
}

#[tokio::test]
async fn test_duplicate_ids_rejected() {
    let pipeline = pipeline(
        fixtures::sample_fetcher(),
        FixedModelClient::new().classify_all("Sneakers"),
        2,
    );
    let items = vec![
        ListingItem::new("dup", "a"),
        ListingItem::new("dup", "b"),
    ];

    let err = pipeline
        .run(&Context::background(), items)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BallastError::Executor(ExecutorError::DuplicateItemIds {
            ids: vec!["dup".to_string()]
        })
    );
    assert_eq!(pipeline.model().calls(), 0);
}

#[tokio::test]
async fn test_rate_limited_model_throttles_batch() {
    // Two model calls per item; a burst of 4 covers two items, the rest wait.
    let limiter = Arc::new(RateLimiter::new(&RateLimitConfig {
        max_tokens: 4,
        refill_interval: Duration::from_millis(10),
    }));
    let model = RateLimitedModel::new(
        FixedModelClient::new()
            .classify_all("Backpacks")
            .extract_all("color: red"),
        limiter.clone(),
    );
    let pipeline = pipeline(fixtures::sample_fetcher(), model, 4);

    let started = tokio::time::Instant::now();
    let report = pipeline
        .run(&Context::background(), fixtures::listings(4))
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(pipeline.model().inner().calls(), 8);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_cancelled_run_reports_cancelled_items() {
    let model = FixedModelClient::new()
        .classify_all("Sneakers")
        .extract_all("color: red")
        .with_latency(Duration::from_millis(200));
    let pipeline = pipeline(fixtures::sample_fetcher(), model, 1);
    let ctx = Context::background();
    pipeline.cache().get_parents(&ctx).await.unwrap();
    pipeline.cache().get_subjects(&ctx).await.unwrap();

    let run_ctx = ctx.with_timeout(Duration::from_millis(50));
    let report = pipeline.run(&run_ctx, fixtures::listings(4)).await.unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.succeeded() + report.failed(), 4);
    assert!(report.cancelled() >= 1);
}

#[tokio::test]
async fn test_synthetic_run() {
    let limiter = Arc::new(RateLimiter::new(&RateLimitConfig::per_second(1_000)));
    let cache = Arc::new(ReferenceCache::new(
        SyntheticCatalog::new().with_latency(Duration::from_millis(1)),
        CacheConfig::default(),
    ));
    let pipeline = EnrichmentPipeline::new(
        cache,
        Arc::new(RateLimitedModel::new(SyntheticModel::new(), limiter)),
        FanOutExecutor::new(4),
    );

    let report = pipeline
        .run(&Context::background(), synthetic_batch(14))
        .await
        .unwrap();

    assert_eq!(report.total, 14);
    assert_eq!(report.failed(), 2);
    assert!(report.failure("item-0006").is_some());
    assert!(report.failure("item-0013").is_some());
    let first = report.item("item-0000").unwrap();
    assert_eq!(first.subject_name, "Sneakers");
    assert_eq!(first.attributes.get("color").map(String::as_str), Some("red"));
    assert_eq!(first.attributes.get("size").map(String::as_str), Some("38"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total"], 14);
}

//! BALLAST entry point
//!
//! Loads configuration, installs tracing and enriches one batch of listings.
//! With `BALLAST_CATALOG_URL` and `BALLAST_MODEL_URL` set it talks to real
//! upstreams; otherwise it runs against the synthetic catalog and model.

use std::sync::Arc;

use ballast_cache::{ReferenceCache, ReferenceFetcher};
use ballast_client::{ApiClient, RateLimiter};
use ballast_core::{BallastResult, Context};
use ballast_fanout::FanOutExecutor;
use ballast_pipeline::{
    init_tracing, synthetic_batch, CatalogFetcher, Category, Characteristic, EnrichmentPipeline,
    HttpModelClient, ListingItem, ModelClient, PipelineConfig, PipelineReport, RateLimitedModel,
    Subject, SyntheticCatalog, SyntheticModel,
};

#[tokio::main]
async fn main() -> BallastResult<()> {
    let config = PipelineConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.telemetry)?;

    let ctx = Context::background();
    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let items = synthetic_batch(config.batch_size);

    let report = match (&config.catalog_url, &config.model_url) {
        (Some(catalog_url), Some(model_url)) => {
            tracing::info!(%catalog_url, %model_url, "Using HTTP upstreams");
            let catalog = ApiClient::new("catalog", catalog_url.as_str(), limiter.clone())
                .with_retry(config.retry.clone());
            let mut model_api = ApiClient::new("model", model_url.as_str(), limiter)
                .with_retry(config.retry.clone());
            if let Ok(key) = std::env::var("BALLAST_MODEL_API_KEY") {
                model_api = model_api.with_api_key(key);
            }
            let model = HttpModelClient::new(model_api, config.model_endpoint.clone());
            enrich(&ctx, &config, CatalogFetcher::new(catalog), model, items).await?
        }
        _ => {
            tracing::info!("Using synthetic catalog and model");
            let model = RateLimitedModel::new(SyntheticModel::new(), limiter);
            enrich(&ctx, &config, SyntheticCatalog::new(), model, items).await?
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to render report"),
    }
    Ok(())
}

async fn enrich<F, M>(
    ctx: &Context,
    config: &PipelineConfig,
    fetcher: F,
    model: M,
    items: Vec<ListingItem>,
) -> BallastResult<PipelineReport>
where
    F: ReferenceFetcher<Parent = Category, Subject = Subject, Characteristic = Characteristic>,
    M: ModelClient,
{
    let cache = Arc::new(ReferenceCache::new(fetcher, config.cache.clone()));
    let cleanup = cache.start_cleanup_in(ctx, config.cache.cleanup_interval);

    let pipeline = EnrichmentPipeline::new(
        cache,
        Arc::new(model),
        FanOutExecutor::from_config(&config.executor),
    );
    let report = pipeline.run(ctx, items).await;

    let snapshot = cleanup.shutdown().await;
    tracing::debug!(
        cycles = snapshot.cycles,
        removed = snapshot.total_removed(),
        "Cache cleanup stopped"
    );
    report
}

//! BALLAST Pipeline - listing enrichment over the governance layer
//!
//! Wires the [`ReferenceCache`](ballast_cache::ReferenceCache), the
//! [`FanOutExecutor`](ballast_fanout::FanOutExecutor) and a rate-limited
//! [`ModelClient`] into one enrichment stage, plus the configuration and
//! telemetry the `ballast` binary needs.

pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod synthetic;
pub mod telemetry;

pub use catalog::{CatalogFetcher, Category, Characteristic, Subject};
pub use config::PipelineConfig;
pub use error::EnrichError;
pub use model::{
    HttpModelClient, ModelClient, ModelRequest, ModelResponse, ModelTask, RateLimitedModel,
};
pub use pipeline::{EnrichedItem, EnrichmentPipeline, FailedItem, ListingItem, PipelineReport};
pub use synthetic::{synthetic_batch, SyntheticCatalog, SyntheticModel};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};

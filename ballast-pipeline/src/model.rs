//! AI model seam.
//!
//! The pipeline only needs two things from a model: pick one of a list of
//! options for an item, and extract `name: value` attributes. Prompt wording
//! lives with the [`ModelClient`] implementation.

use async_trait::async_trait;
use ballast_client::{ApiClient, RateLimiter};
use ballast_core::{BallastResult, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the model is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTask {
    /// Answer with exactly one of `options`.
    Classify,
    /// Answer with one `name: value` line per option that applies.
    Extract,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub item_id: String,
    pub task: ModelTask,
    /// Item description, image reference or similar.
    pub input: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
}

impl ModelResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Parse `name: value` lines; blank and malformed lines are skipped.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .collect()
    }
}

/// An AI model endpoint.
#[async_trait]
pub trait ModelClient: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn complete(&self, ctx: &Context, request: ModelRequest) -> BallastResult<ModelResponse>;
}

#[async_trait]
impl<M: ModelClient + ?Sized> ModelClient for Arc<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(&self, ctx: &Context, request: ModelRequest) -> BallastResult<ModelResponse> {
        (**self).complete(ctx, request).await
    }
}

/// Wraps a model so every call first takes a token from `limiter`.
#[derive(Debug)]
pub struct RateLimitedModel<M> {
    inner: M,
    limiter: Arc<RateLimiter>,
}

impl<M: ModelClient> RateLimitedModel<M> {
    pub fn new(inner: M, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl<M: ModelClient> ModelClient for RateLimitedModel<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, ctx: &Context, request: ModelRequest) -> BallastResult<ModelResponse> {
        self.limiter.acquire(ctx).await?;
        self.inner.complete(ctx, request).await
    }
}

/// Model reached over HTTP; `POST {endpoint}` with a [`ModelRequest`] body.
///
/// The underlying [`ApiClient`] already acquires a limiter token per attempt,
/// so this client must not be wrapped in [`RateLimitedModel`] as well.
#[derive(Debug)]
pub struct HttpModelClient {
    api: ApiClient,
    endpoint: String,
}

impl HttpModelClient {
    pub fn new(api: ApiClient, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    fn name(&self) -> &str {
        self.api.service()
    }

    async fn complete(&self, ctx: &Context, request: ModelRequest) -> BallastResult<ModelResponse> {
        self.api.post_json(ctx, &self.endpoint, &request).await
    }
}

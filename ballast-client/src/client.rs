//! Rate-limited JSON API client.
//!
//! Every outbound attempt, retries included, first takes a token from the
//! shared [`RateLimiter`]. This is the only layer in BALLAST that retries;
//! it backs off on 429s, 5xx responses and transport failures.

use ballast_core::{BallastError, BallastResult, Context, RetryConfig, UpstreamError};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::rate_limiter::RateLimiter;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_MS: u64 = 1_000;
const SEND_OPERATION: &str = "api_client.send";

/// JSON API client gated by a token bucket.
pub struct ApiClient {
    client: Client,
    service: String,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl ApiClient {
    /// Create a client for `service` rooted at `base_url`.
    ///
    /// `limiter` may be shared with other clients that draw on the same quota.
    pub fn new(
        service: impl Into<String>,
        base_url: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client: Client::new(),
            service: service.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            limiter,
            retry: RetryConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<Req, Res>(
        &self,
        ctx: &Context,
        endpoint: &str,
        body: &Req,
    ) -> BallastResult<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self.url(endpoint);
        self.send_with_retry(ctx, || self.authorize(self.client.post(&url)).json(body))
            .await
    }

    /// GET and decode a JSON response.
    pub async fn get_json<Res: DeserializeOwned>(
        &self,
        ctx: &Context,
        endpoint: &str,
    ) -> BallastResult<Res> {
        let url = self.url(endpoint);
        self.send_with_retry(ctx, || self.authorize(self.client.get(&url)))
            .await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(self.request_timeout);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send_with_retry<Res, B>(&self, ctx: &Context, build: B) -> BallastResult<Res>
    where
        Res: DeserializeOwned,
        B: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire(ctx).await?;

            let result = tokio::select! {
                biased;
                reason = ctx.cancelled() => {
                    return Err(reason.into_error(SEND_OPERATION).into());
                }
                result = self.send_once::<Res>(build()) => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= self.retry.max_retries {
                return Err(err);
            }

            attempt += 1;
            let mut backoff = self.retry.backoff_for(attempt);
            if let BallastError::Upstream(UpstreamError::RateLimited { retry_after_ms, .. }) = &err
            {
                backoff = backoff.max(Duration::from_millis(*retry_after_ms));
            }

            tracing::warn!(
                service = %self.service,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retrying upstream request"
            );

            tokio::select! {
                biased;
                reason = ctx.cancelled() => {
                    return Err(reason.into_error(SEND_OPERATION).into());
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn send_once<Res: DeserializeOwned>(&self, request: RequestBuilder) -> BallastResult<Res> {
        let response = request.send().await.map_err(|e| UpstreamError::Transport {
            service: self.service.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<Res>().await.map_err(|e| {
                UpstreamError::InvalidResponse {
                    service: self.service.clone(),
                    reason: e.to_string(),
                }
                .into()
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1_000))
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            return Err(UpstreamError::RateLimited {
                service: self.service.clone(),
                retry_after_ms,
            }
            .into());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(UpstreamError::RequestFailed {
            service: self.service.clone(),
            status: status.as_u16(),
            message,
        }
        .into())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("retry", &self.retry)
            .finish()
    }
}

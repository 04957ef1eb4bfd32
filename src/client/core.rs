use crate::cache::{CacheManager, RequestKey, RequestKeyBuilder};
use crate::client::config::ClientConfig;
use crate::client::options::RequestOptions;
use crate::client::response::{ApiResponse, ResponseBody};
use crate::client::types::CallStats;
use crate::resilience::{Decision, RequestDeduplicator, RetryPolicy, TimeoutGuard};
use crate::transport::{Method, Transport, TransportRequest, TransportResponse};
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a settled network call, shared by every deduplicated waiter.
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub response: ApiResponse,
    pub attempts: u32,
    pub request_id: String,
}

#[derive(Debug, Clone)]
struct PreparedRequest {
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
}

pub(crate) struct ClientInner {
    pub config: ClientConfig,
    pub transport: Arc<dyn Transport>,
    pub cache: CacheManager,
    pub keys: RequestKeyBuilder,
    pub dedup: RequestDeduplicator<Outcome>,
    pub retry: RetryPolicy,
    pub timeout: TimeoutGuard,
    pub root: CancellationToken,
}

/// Resilient HTTP client: caching, retries, request deduplication and
/// per-attempt timeouts behind `get` / `post` / `put` / `delete`.
///
/// Cloning is cheap and clones share cache, in-flight registry and
/// cancellation scope.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .field("cache_store", &self.inner.cache.store_name())
            .finish()
    }
}

impl ApiClient {
    /// Build a client from configuration with the default transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        crate::client::builder::ApiClientBuilder::from_config(config).build()
    }

    pub fn builder() -> crate::client::builder::ApiClientBuilder {
        crate::client::builder::ApiClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<ApiResponse> {
        Ok(self.get_with_stats(url, options).await?.0)
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let body = Self::encode_body(body)?;
        Ok(self
            .send_with_stats(Method::Post, url, Some(body), options)
            .await?
            .0)
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let body = Self::encode_body(body)?;
        Ok(self
            .send_with_stats(Method::Put, url, Some(body), options)
            .await?
            .0)
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<ApiResponse> {
        Ok(self
            .send_with_stats(Method::Delete, url, None, options)
            .await?
            .0)
    }

    /// GET with per-call stats (cache hit, dedup, attempts, latency).
    ///
    /// Flow: cache check -> single-flight -> timeout-guarded attempts with
    /// retries -> cache write -> every joined caller gets the same result.
    pub async fn get_with_stats(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<(ApiResponse, CallStats)> {
        let start = Instant::now();
        let inner = &self.inner;
        let url = inner.resolve_url(url)?;
        let use_cache = options.cache.unwrap_or(inner.config.cache.enabled);
        let key = match options.cache_key {
            Some(ref k) => RequestKey::new(k.clone()),
            None => inner.keys.key(Method::Get, &url, None),
        };

        if use_cache {
            if let Some(response) = inner.cache.get::<ApiResponse>(&key).await {
                debug!(key = %key, "cache hit");
                let stats = CallStats {
                    method: Method::Get,
                    url,
                    key: Some(key.into_string()),
                    http_status: response.status,
                    attempts: 0,
                    retry_count: 0,
                    cache_hit: true,
                    deduplicated: false,
                    duration_ms: start.elapsed().as_millis(),
                    request_id: None,
                };
                return Ok((response, stats));
            }
        }

        let request = PreparedRequest {
            method: Method::Get,
            url: url.clone(),
            headers: inner.merge_headers(&options.headers),
            body: None,
        };
        let shared_inner = Arc::clone(inner);
        let cache_key = key.clone();
        let flight = inner.dedup.join_or_start_tracked(&key, move || async move {
            let root = shared_inner.root.clone();
            let outcome = shared_inner.execute(request, &root).await?;
            // Must land before the in-flight entry is released.
            if use_cache {
                shared_inner.cache.set(&cache_key, &outcome.response).await;
            }
            Ok(outcome)
        });
        let (outcome, joined) = Self::cancellable(options.cancel.as_ref(), &url, async {
            let (res, joined) = flight.await;
            res.map(|o| (o, joined))
        })
        .await?;

        let stats = CallStats {
            method: Method::Get,
            url,
            key: Some(key.into_string()),
            http_status: outcome.response.status,
            attempts: outcome.attempts,
            retry_count: outcome.attempts.saturating_sub(1),
            cache_hit: false,
            deduplicated: joined,
            duration_ms: start.elapsed().as_millis(),
            request_id: Some(outcome.request_id),
        };
        Ok((outcome.response, stats))
    }

    /// Send any method with per-call stats.
    ///
    /// GET is routed through [`get_with_stats`](Self::get_with_stats) (the body
    /// is ignored). Other methods are never cached nor deduplicated.
    pub async fn send_with_stats(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        options: RequestOptions,
    ) -> Result<(ApiResponse, CallStats)> {
        if method.is_idempotent_read() {
            return self.get_with_stats(url, options).await;
        }

        let start = Instant::now();
        let inner = &self.inner;
        let url = inner.resolve_url(url)?;
        let mut headers = inner.merge_headers(&options.headers);
        if body.is_some() {
            headers
                .entry("content-type".to_string())
                .or_insert_with(|| "application/json".to_string());
        }
        let request = PreparedRequest {
            method,
            url: url.clone(),
            headers,
            body,
        };

        let outcome = Self::cancellable(
            options.cancel.as_ref(),
            &url,
            inner.execute(request, &inner.root),
        )
        .await?;

        let stats = CallStats {
            method,
            url,
            key: None,
            http_status: outcome.response.status,
            attempts: outcome.attempts,
            retry_count: outcome.attempts.saturating_sub(1),
            cache_hit: false,
            deduplicated: false,
            duration_ms: start.elapsed().as_millis(),
            request_id: Some(outcome.request_id),
        };
        Ok((outcome.response, stats))
    }

    /// The key a GET (or a body-carrying request) to `url` would use.
    pub fn request_key(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RequestKey> {
        let url = self.inner.resolve_url(url)?;
        Ok(self.inner.keys.key(method, &url, body))
    }

    /// Drop one cached response. Returns whether an entry was removed.
    pub async fn clear_cache_entry(&self, key: impl Into<RequestKey>) -> bool {
        self.inner.cache.delete(&key.into()).await
    }

    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.inner.cache.stats()
    }

    /// Number of GET requests currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.inner.dedup.in_flight()
    }

    /// Cancel every attempt owned by this client (and its clones).
    ///
    /// Subsequent calls fail with [`Error::Cancelled`].
    pub fn shutdown(&self) {
        self.inner.root.cancel();
    }

    fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Bytes> {
        serde_json::to_vec(body).map(Bytes::from).map_err(|e| {
            Error::configuration_with_context(
                format!("request body is not serializable: {}", e),
                ErrorContext::new().with_field_path("body"),
            )
        })
    }

    /// Race `fut` against the caller's cancellation token.
    ///
    /// Losing the race drops `fut`, which cancels whatever attempt it owns.
    async fn cancellable<T>(
        cancel: Option<&CancellationToken>,
        url: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::cancelled().with_context(
                    ErrorContext::new().with_source("api_client").with_url(url),
                )),
                res = fut => res,
            },
            None => fut.await,
        }
    }
}

impl ClientInner {
    /// Absolute `http(s)` URLs pass through; anything else is appended to `base_url`.
    fn resolve_url(&self, url: &str) -> Result<String> {
        if let Ok(parsed) = url::Url::parse(url) {
            if matches!(parsed.scheme(), "http" | "https") {
                return Ok(url.to_string());
            }
        }
        let base = self.config.base_url.as_deref().ok_or_else(|| {
            Error::configuration_with_context(
                format!("relative URL '{}' requires a base_url", url),
                ErrorContext::new().with_field_path("base_url"),
            )
        })?;
        let base = base.trim_end_matches('/');
        let path = url.trim_start_matches('/');
        if path.is_empty() {
            Ok(base.to_string())
        } else {
            Ok(format!("{}/{}", base, path))
        }
    }

    /// Default headers overlaid with per-call headers, names lower-cased.
    fn merge_headers(&self, per_call: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged: BTreeMap<String, String> = self
            .config
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        for (k, v) in per_call {
            merged.insert(k.to_ascii_lowercase(), v.clone());
        }
        merged
    }

    /// Attempt loop: timeout-guarded transport calls governed by the retry policy.
    ///
    /// Only the last error is returned once retries are exhausted.
    async fn execute(&self, request: PreparedRequest, parent: &CancellationToken) -> Result<Outcome> {
        let mut attempt: u32 = 0;
        loop {
            let request_id = Uuid::new_v4().to_string();
            let started = Instant::now();
            let transport_request = TransportRequest {
                method: request.method,
                url: request.url.clone(),
                headers: request.headers.clone(),
                body: request.body.clone(),
                request_id: request_id.clone(),
            };
            let transport = Arc::clone(&self.transport);
            let result = self
                .timeout
                .run(parent, move |token| async move {
                    let raw = transport.send(transport_request, token).await?;
                    into_response(raw)
                })
                .await
                .map_err(|e| {
                    e.map_context(|c| {
                        c.with_url(request.url.clone())
                            .with_request_id(request_id.clone())
                            .with_attempt(attempt)
                    })
                });

            let err = match result {
                Ok(response) => {
                    debug!(
                        method = %request.method,
                        url = request.url.as_str(),
                        status = response.status,
                        attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "request succeeded"
                    );
                    return Ok(Outcome {
                        response,
                        attempts: attempt + 1,
                        request_id,
                    });
                }
                Err(e) => e,
            };

            match self.retry.decide(&err, attempt) {
                Decision::Retry { delay } => {
                    warn!(
                        method = %request.method,
                        url = request.url.as_str(),
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        status = err.status().unwrap_or(0),
                        error_code = err.code().code(),
                        error = %err,
                        "request failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::select! {
                            biased;
                            _ = parent.cancelled() => {
                                return Err(Error::cancelled().with_context(
                                    ErrorContext::new()
                                        .with_source("api_client")
                                        .with_url(request.url.clone())
                                        .with_attempt(attempt),
                                ));
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    attempt = attempt.saturating_add(1);
                }
                Decision::Fail => {
                    info!(
                        method = %request.method,
                        url = request.url.as_str(),
                        attempts = attempt + 1,
                        status = err.status().unwrap_or(0),
                        error_code = err.code().code(),
                        "request failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}

/// Best-effort parsing of `Retry-After`; only the `<seconds>` form is supported.
fn retry_after(raw: &TransportResponse) -> Option<Duration> {
    let secs: u64 = raw.header("retry-after")?.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

/// Turn a raw response into a decoded response or an HTTP / parse error.
fn into_response(raw: TransportResponse) -> Result<ApiResponse> {
    let content_type = raw.header("content-type").map(str::to_string);
    if !raw.is_success() {
        let data = ResponseBody::decode_lossy(content_type.as_deref(), &raw.body);
        let retry_after = retry_after(&raw);
        return Err(Error::http(raw.status, raw.status_text, data, retry_after)
            .with_context(ErrorContext::new().with_source("api_client")));
    }
    let body = ResponseBody::decode(content_type.as_deref(), &raw.body)?;
    Ok(ApiResponse {
        status: raw.status,
        status_text: raw.status_text,
        headers: raw.headers,
        body,
    })
}

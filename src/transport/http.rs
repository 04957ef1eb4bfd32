use super::{Method, Transport, TransportRequest, TransportResponse};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::Proxy;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `reqwest`-backed transport.
///
/// No overall request timeout is configured on the inner client: attempt
/// deadlines belong to the timeout guard, which cancels through the token.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let connect_timeout_secs = env::var("API_CLIENT_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .pool_max_idle_per_host(
                env::var("API_CLIENT_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("API_CLIENT_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("API_CLIENT_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source("http_transport"),
            )
        })?;

        Ok(Self { client })
    }

    /// Use a preconfigured `reqwest::Client` (TLS roots, proxies, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn to_reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    /// A caller-supplied `x-request-id` replaces the generated correlation id.
    fn build_request(&self, request: &TransportRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(Self::to_reqwest_method(request.method), &request.url);
        let mut has_request_id = false;
        for (k, v) in &request.headers {
            has_request_id |= k.eq_ignore_ascii_case("x-request-id");
            builder = builder.header(k.as_str(), v.as_str());
        }
        if !has_request_id {
            builder = builder.header("x-request-id", &request.request_id);
        }
        if let Some(body) = request.body.clone() {
            builder = builder.body(body);
        }
        builder
    }

    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = request.url.clone();
        let connection_error = |e: reqwest::Error| {
            Error::connection(e.to_string()).with_context(
                ErrorContext::new()
                    .with_source("http_transport")
                    .with_url(url.clone())
                    .with_request_id(request.request_id.clone()),
            )
        };

        let resp = self
            .build_request(&request)
            .send()
            .await
            .map_err(&connection_error)?;

        let status = resp.status();
        let mut headers = BTreeMap::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.trim().to_string());
            }
        }
        let body = resp.bytes().await.map_err(&connection_error)?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<TransportResponse> {
        let url = request.url.clone();
        // Dropping the reqwest future aborts the connection.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled().with_context(
                ErrorContext::new()
                    .with_source("http_transport")
                    .with_url(url),
            )),
            res = self.execute(request) => res,
        }
    }
}

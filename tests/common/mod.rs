//! Scripted in-process transport shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use resilient_api_client::transport::{Transport, TransportRequest, TransportResponse};
use resilient_api_client::{ApiClientBuilder, Error, Result};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// What the transport does for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, &'static str),
    Text(u16, &'static str),
    /// Status plus extra response headers.
    WithHeaders(u16, &'static str, Vec<(&'static str, &'static str)>),
    ConnectionReset,
    /// Never answers; only cancellation ends the call.
    Hang,
}

pub struct MockTransport {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    call_times: Mutex<Vec<Instant>>,
    tokens: Mutex<Vec<CancellationToken>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    /// Always answers `reply` after `delay`.
    pub fn new(reply: Reply, delay: Duration) -> Arc<Self> {
        Self::scripted(Vec::new(), reply, delay)
    }

    /// Answers from `script` in order, then `fallback` forever.
    pub fn scripted(script: Vec<Reply>, fallback: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
            fallback,
            delay,
            call_times: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn ok_json(body: &'static str) -> Arc<Self> {
        Self::new(Reply::Json(200, body), Duration::ZERO)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn response(status: u16, content_type: &str, body: &'static str) -> TransportResponse {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        TransportResponse {
            status,
            status_text: status_text(status).to_string(),
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        self.tokens.lock().unwrap().push(cancel.clone());
        self.requests.lock().unwrap().push(request);

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::cancelled()),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        match reply {
            Reply::Json(status, body) => Ok(Self::response(status, "application/json", body)),
            Reply::Text(status, body) => Ok(Self::response(status, "text/plain", body)),
            Reply::WithHeaders(status, body, extra) => {
                let mut resp = Self::response(status, "application/json", body);
                for (k, v) in extra {
                    resp.headers.insert(k.to_string(), v.to_string());
                }
                Ok(resp)
            }
            Reply::ConnectionReset => Err(Error::connection("connection reset by peer")),
            Reply::Hang => {
                cancel.cancelled().await;
                Err(Error::cancelled())
            }
        }
    }
}

/// Builder preset: mock transport, fast retries, relative paths allowed.
pub fn builder(transport: Arc<MockTransport>) -> ApiClientBuilder {
    ApiClientBuilder::new()
        .base_url("https://pricing.example.com/api")
        .retry_delay(Duration::from_millis(10))
        .timeout(Duration::from_secs(2))
        .transport(transport)
}

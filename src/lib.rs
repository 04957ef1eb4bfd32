//! # resilient-api-client
//!
//! 带缓存、重试、请求去重与单次超时的 HTTP API 客户端。
//!
//! A resilient HTTP API client for services that query pricing and reference
//! data, where many concurrent callers ask for the same resource and the
//! upstream is occasionally slow or flaky.
//!
//! ## Overview
//!
//! Every GET goes through the same pipeline:
//!
//! 1. **Cache**: a fresh cached response is returned without touching the network.
//! 2. **Single-flight**: concurrent callers for the same key share one network call.
//! 3. **Attempts**: each attempt runs under its own deadline and is cancelled
//!    when the deadline passes.
//! 4. **Retries**: connection failures, timeouts, 429 and 5xx are retried with
//!    exponential backoff; other failures are returned immediately.
//! 5. **Cache write**: successful responses are stored before waiters are released.
//!
//! POST, PUT and DELETE skip steps 1, 2 and 5.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_api_client::{ApiClientBuilder, RequestOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> resilient_api_client::Result<()> {
//!     let client = ApiClientBuilder::new()
//!         .base_url("https://pricing.example.com/api")
//!         .timeout(Duration::from_secs(5))
//!         .retries(2)
//!         .default_header("x-api-key", "secret")
//!         .build()?;
//!
//!     let resp = client.get("/v1/prices/DE", RequestOptions::new()).await?;
//!     println!("{} {:?}", resp.status, resp.body);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | `ApiClient`, builder, configuration and response types |
//! | [`cache`] | Request keys, cache stores and the cache manager |
//! | [`resilience`] | Retry policy, per-attempt timeouts, request deduplication |
//! | [`transport`] | The network seam and its `reqwest` implementation |
//! | [`error`] | Error type and context |

pub mod cache;
pub mod client;
pub mod error_code;
pub mod resilience;
pub mod transport;

pub use client::{
    ApiClient, ApiClientBuilder, ApiResponse, CacheStrategy, CallStats, ClientConfig,
    RequestOptions, ResponseBody,
};
pub use error_code::ErrorCode;
pub use transport::Method;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

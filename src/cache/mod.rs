//! 响应缓存模块：可插拔的 TTL 缓存存储，减少重复的 API 调用。
//!
//! # Response Caching Module
//!
//! Pluggable key/value stores with per-entry time-to-live, used by
//! [`ApiClient`](crate::ApiClient) to avoid repeating identical GET requests.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheStore`] | Trait for cache stores (lazy expiry on read) |
//! | [`MemoryCache`] | Process-local, LRU-bounded store |
//! | [`DurableCache`] | File-backed store that survives restarts |
//! | [`CacheManager`] | Serialization, statistics and failure isolation |
//! | [`RequestKeyBuilder`] | Deterministic keys from method, URL and body |
//!
//! ## Example
//!
//! ```rust
//! use resilient_api_client::cache::{CacheManager, MemoryCache, RequestKeyBuilder};
//! use resilient_api_client::transport::Method;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = CacheManager::new(Arc::new(MemoryCache::new(1000)), Duration::from_secs(300));
//! let key = RequestKeyBuilder::new().key(Method::Get, "https://pricing.example.com/v1/de", None);
//! cache.set(&key, &"cached").await;
//! assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("cached"));
//! # });
//! ```
//!
//! Expired entries are never served: stores drop them on the read that finds
//! them, and no background sweeper runs.

mod backend;
mod durable;
mod key;
mod manager;

pub use backend::{CacheEntry, CacheStore, MemoryCache};
pub use durable::DurableCache;
pub use key::{RequestKey, RequestKeyBuilder};
pub use manager::{CacheManager, CacheStats};

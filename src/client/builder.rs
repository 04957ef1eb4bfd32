use crate::cache::{CacheManager, CacheStore, DurableCache, MemoryCache, RequestKeyBuilder};
use crate::client::config::{CacheStrategy, ClientConfig};
use crate::client::core::{ApiClient, ClientInner};
use crate::resilience::{RequestDeduplicator, TimeoutGuard};
use crate::transport::{HttpTransport, Transport};
use crate::{Error, ErrorContext, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Builder for [`ApiClient`].
///
/// Every setter overrides the matching [`ClientConfig`] field. The transport
/// and cache store can be injected, which is how tests run without a network.
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self::from_config(ClientConfig::default())
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            cache_store: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Deadline for each individual attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    pub fn cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.config.cache.strategy = strategy;
        self
    }

    /// File for the durable store. Implies nothing about the strategy.
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache.path = Some(path.into());
        self
    }

    pub fn cache_max_entries(mut self, n: usize) -> Self {
        self.config.cache.max_entries = n;
        self
    }

    pub fn cache_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.cache.key_prefix = Some(prefix.into());
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Replace the HTTP transport (mock servers, custom stacks).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use this store instead of the one selected by the cache strategy.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Apply `API_CLIENT_*` environment overrides on top of what is set so far.
    pub fn with_env_overrides(mut self) -> Self {
        self.config = self.config.with_env_overrides();
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let config = self.config;
        config.validate()?;

        let store: Arc<dyn CacheStore> = match self.cache_store {
            Some(store) => store,
            None => match config.cache.strategy {
                CacheStrategy::Memory => Arc::new(MemoryCache::new(config.cache.max_entries)),
                CacheStrategy::Durable => {
                    let path = config.cache.path.clone().ok_or_else(|| {
                        Error::configuration_with_context(
                            "durable cache strategy requires cache.path",
                            ErrorContext::new().with_field_path("cache.path"),
                        )
                    })?;
                    Arc::new(DurableCache::with_max_entries(path, config.cache.max_entries))
                }
            },
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new()?),
        };

        let keys = match config.cache.key_prefix {
            Some(ref prefix) => RequestKeyBuilder::new().with_prefix(prefix.clone()),
            None => RequestKeyBuilder::new(),
        };

        debug!(
            base_url = config.base_url.as_deref().unwrap_or(""),
            timeout_ms = config.timeout.as_millis() as u64,
            retries = config.retries,
            cache_store = store.name(),
            "building api client"
        );

        let inner = ClientInner {
            cache: CacheManager::new(store, config.cache.ttl),
            retry: config.retry_policy(),
            timeout: TimeoutGuard::new(config.timeout),
            keys,
            dedup: RequestDeduplicator::new(),
            transport,
            root: CancellationToken::new(),
            config,
        };
        Ok(ApiClient {
            inner: Arc::new(inner),
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_without_path_fails() {
        let err = ApiClientBuilder::new()
            .cache_strategy(CacheStrategy::Durable)
            .build()
            .unwrap_err();
        assert_eq!(err.context().field_path.as_deref(), Some("cache.path"));
    }

    #[test]
    fn test_injected_store_satisfies_durable_strategy() {
        let client = ApiClientBuilder::new()
            .cache_strategy(CacheStrategy::Durable)
            .cache_store(Arc::new(MemoryCache::new(4)))
            .build()
            .unwrap();
        assert_eq!(client.inner.cache.store_name(), "memory");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = ApiClientBuilder::new().base_url("::nope").build().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_setters_reach_config() {
        let client = ApiClientBuilder::new()
            .base_url("https://pricing.example.com")
            .timeout(Duration::from_millis(1500))
            .retries(5)
            .retry_delay(Duration::from_millis(20))
            .cache_ttl(Duration::from_secs(9))
            .cache_enabled(false)
            .build()
            .unwrap();
        let cfg = client.config();
        assert_eq!(cfg.timeout, Duration::from_millis(1500));
        assert_eq!(cfg.retries, 5);
        assert_eq!(cfg.retry_delay, Duration::from_millis(20));
        assert_eq!(cfg.cache.ttl, Duration::from_secs(9));
        assert!(!cfg.cache.enabled);
        assert_eq!(client.inner.retry.max_retries, 5);
        assert_eq!(client.inner.cache.default_ttl(), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_durable_store_honours_max_entries() {
        let dir = std::env::temp_dir().join(format!("api-client-{}", uuid::Uuid::new_v4()));
        let client = ApiClientBuilder::new()
            .cache_strategy(CacheStrategy::Durable)
            .cache_path(dir.join("cache.json"))
            .cache_max_entries(2)
            .build()
            .unwrap();
        for i in 0..3 {
            let key = crate::cache::RequestKey::new(format!("k{i}"));
            client.inner.cache.set(&key, &i).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.inner.cache.store_name(), "durable");
        assert_eq!(client.inner.cache.len().await, 2);
        let _ = std::fs::remove_dir_all(dir);
    }
}

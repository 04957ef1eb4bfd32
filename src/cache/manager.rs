//! Cache manager.
//!
//! Serializes values for the store and turns every store failure into a miss,
//! so a broken cache can slow the client down but never fail a call.

use super::backend::CacheStore;
use super::key::RequestKey;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    max_entry_size: usize,
    stats: AtomicStats,
}

impl CacheManager {
    pub const DEFAULT_MAX_ENTRY_SIZE: usize = 10 * 1024 * 1024;

    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self {
            store,
            default_ttl,
            max_entry_size: Self::DEFAULT_MAX_ENTRY_SIZE,
            stats: AtomicStats::default(),
        }
    }

    /// Values whose serialized form exceeds `bytes` are not cached.
    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &RequestKey) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(val) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(val)
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "discarding undecodable cache entry");
                    let _ = self.store.delete(key).await;
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, store = self.store.name(), error = %e, "cache read failed");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &RequestKey, value: &T) {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    pub async fn set_with_ttl<T: Serialize>(&self, key: &RequestKey, value: &T, ttl: Duration) {
        let data = match serde_json::to_vec(value) {
            Ok(data) => data,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "cache value not serializable");
                return;
            }
        };
        if data.len() > self.max_entry_size {
            debug!(key = %key, size = data.len(), "skipping oversized cache entry");
            return;
        }
        match self.store.set(key, &data, ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, store = self.store.name(), error = %e, "cache write failed");
            }
        }
    }

    pub async fn delete(&self, key: &RequestKey) -> bool {
        match self.store.delete(key).await {
            Ok(deleted) => {
                if deleted {
                    self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                }
                deleted
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "cache delete failed");
                false
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            warn!(store = self.store.name(), error = %e, "cache clear failed");
        }
    }

    pub async fn len(&self) -> usize {
        self.store.len().await.unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::{Error, Result};
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _: &RequestKey) -> Result<Option<Vec<u8>>> {
            Err(Error::configuration("store offline"))
        }
        async fn set(&self, _: &RequestKey, _: &[u8], _: Duration) -> Result<()> {
            Err(Error::configuration("store offline"))
        }
        async fn delete(&self, _: &RequestKey) -> Result<bool> {
            Err(Error::configuration("store offline"))
        }
        async fn clear(&self) -> Result<()> {
            Err(Error::configuration("store offline"))
        }
        async fn len(&self) -> Result<usize> {
            Err(Error::configuration("store offline"))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_stats() {
        let manager = CacheManager::new(Arc::new(MemoryCache::new(8)), Duration::from_secs(60));
        let key = RequestKey::new("k");
        assert_eq!(manager.get::<String>(&key).await, None);
        manager.set(&key, &"value".to_string()).await;
        assert_eq!(manager.get::<String>(&key).await, Some("value".to_string()));
        assert!(manager.delete(&key).await);

        let stats = manager.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.deletes, 1);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_store_failures_degrade_to_miss() {
        let manager = CacheManager::new(Arc::new(FailingStore), Duration::from_secs(60));
        let key = RequestKey::new("k");
        manager.set(&key, &1u32).await;
        assert_eq!(manager.get::<u32>(&key).await, None);
        assert!(!manager.delete(&key).await);
        manager.clear().await;
        assert_eq!(manager.len().await, 0);
        assert_eq!(manager.stats().errors, 4);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss_and_evicts() {
        let manager = CacheManager::new(Arc::new(MemoryCache::new(8)), Duration::from_secs(60));
        let key = RequestKey::new("k");
        manager.set(&key, &"text").await;
        assert_eq!(manager.get::<u64>(&key).await, None);
        assert_eq!(manager.len().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_values_are_skipped() {
        let manager = CacheManager::new(Arc::new(MemoryCache::new(8)), Duration::from_secs(60))
            .with_max_entry_size(4);
        let key = RequestKey::new("k");
        manager.set(&key, &"far too long").await;
        assert_eq!(manager.get::<String>(&key).await, None);
        assert_eq!(manager.stats().sets, 0);
    }
}

//! Cache store trait and the in-memory implementation.

use super::key::RequestKey;
use crate::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A stored value with its time-to-live.
///
/// Valid while `stored_at.elapsed() < ttl`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// Key/value store with per-entry TTL.
///
/// Implementations must treat an expired entry as absent and remove it when it
/// is read. They must be safe to share between tasks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &RequestKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &RequestKey, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &RequestKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    /// Number of live (unexpired) entries.
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// Process-local store, bounded with least-recently-used eviction.
pub struct MemoryCache {
    entries: Mutex<LruCache<RequestKey, CacheEntry>>,
}

impl MemoryCache {
    pub const DEFAULT_MAX_ENTRIES: usize = 1000;

    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &RequestKey) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.peek(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(None),
        };
        if expired {
            entries.pop(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &RequestKey, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(key.clone(), CacheEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.pop(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.iter().filter(|(_, e)| !e.is_expired()).count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

//! File-backed cache store that survives process restarts.

use super::backend::CacheStore;
use super::key::RequestKey;
use crate::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const FORMAT_VERSION: u32 = 1;

/// Default bound on stored entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedEntry {
    value: String,
    stored_at_ms: u64,
    ttl_ms: u64,
}

impl PersistedEntry {
    fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.stored_at_ms) >= self.ttl_ms
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: HashMap<RequestKey, PersistedEntry>,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    entries: &'a HashMap<RequestKey, PersistedEntry>,
}

/// In-memory view plus a counter bumped on every mutation.
#[derive(Default)]
struct State {
    entries: HashMap<RequestKey, PersistedEntry>,
    generation: u64,
}

/// Serialized state at a given generation, ready to be written.
struct Snapshot {
    generation: u64,
    data: Vec<u8>,
}

/// Drop expired entries, then the oldest ones above `max_entries`.
///
/// `keep` is never evicted for capacity.
fn prune(
    entries: &mut HashMap<RequestKey, PersistedEntry>,
    now: u64,
    max_entries: usize,
    keep: Option<&RequestKey>,
) {
    entries.retain(|_, e| !e.is_expired(now));
    if entries.len() <= max_entries {
        return;
    }
    let mut by_age: Vec<(u64, RequestKey)> = entries
        .iter()
        .filter(|(k, _)| Some(*k) != keep)
        .map(|(k, e)| (e.stored_at_ms, k.clone()))
        .collect();
    by_age.sort();
    let excess = entries.len() - max_entries;
    for (_, key) in by_age.into_iter().take(excess) {
        entries.remove(&key);
    }
}

/// Durable store persisted as a JSON file.
///
/// Mutations update the in-memory map under a short lock and take a
/// serialized snapshot; the snapshot is then written with `tokio::fs`
/// (temp file + rename) outside that lock. Writers are serialized and a
/// snapshot older than the last one written is skipped, so the file never
/// goes back in time. Expired entries are pruned and the entry count is
/// bounded on every write.
///
/// Storage failures never reach the caller: a failed write rolls the entry
/// back and the next read is a miss.
pub struct DurableCache {
    path: PathBuf,
    max_entries: usize,
    state: Mutex<State>,
    /// Generation of the last snapshot on disk.
    written: tokio::sync::Mutex<u64>,
}

impl DurableCache {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_max_entries(path, DEFAULT_MAX_ENTRIES)
    }

    /// Like [`open`](Self::open) with an explicit entry bound.
    pub fn with_max_entries(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let path = path.into();
        let max_entries = max_entries.max(1);
        let mut entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable cache file");
                HashMap::new()
            }
        };
        prune(&mut entries, now_ms(), max_entries, None);
        debug!(path = %path.display(), entries = entries.len(), "durable cache opened");
        Self {
            path,
            max_entries,
            state: Mutex::new(State {
                entries,
                generation: 0,
            }),
            written: tokio::sync::Mutex::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    // Runs once at construction, before the store is shared.
    fn load(path: &Path) -> io::Result<HashMap<RequestKey, PersistedEntry>> {
        let raw = std::fs::read(path)?;
        let file: CacheFile = serde_json::from_slice(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if file.version != FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported cache file version {}", file.version),
            ));
        }
        Ok(file.entries)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `mutate` under the state lock, prune, and snapshot the result.
    fn mutate<R>(
        &self,
        keep: Option<&RequestKey>,
        mutate: impl FnOnce(&mut HashMap<RequestKey, PersistedEntry>) -> R,
    ) -> (R, io::Result<Snapshot>) {
        let mut state = self.lock_state();
        let out = mutate(&mut state.entries);
        prune(&mut state.entries, now_ms(), self.max_entries, keep);
        state.generation += 1;
        let data = serde_json::to_vec(&CacheFileRef {
            version: FORMAT_VERSION,
            entries: &state.entries,
        })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
        let snapshot = data.map(|data| Snapshot {
            generation: state.generation,
            data,
        });
        (out, snapshot)
    }

    async fn flush(&self, snapshot: io::Result<Snapshot>) -> io::Result<()> {
        let snapshot = snapshot?;
        let mut written = self.written.lock().await;
        if *written >= snapshot.generation {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &snapshot.data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        *written = snapshot.generation;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DurableCache {
    async fn get(&self, key: &RequestKey) -> Result<Option<Vec<u8>>> {
        let lookup = {
            let state = self.lock_state();
            state
                .entries
                .get(key)
                .map(|e| (e.is_expired(now_ms()), e.value.clone()))
        };
        let encoded = match lookup {
            None => return Ok(None),
            Some((false, encoded)) => encoded,
            Some((true, _)) => {
                let (_, snapshot) = self.mutate(None, |entries| entries.remove(key));
                if let Err(e) = self.flush(snapshot).await {
                    warn!(path = %self.path.display(), error = %e, "failed to persist cache eviction");
                }
                return Ok(None);
            }
        };
        match BASE64.decode(&encoded) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => {
                warn!(key = %key, error = %e, "dropping undecodable cache entry");
                self.lock_state().entries.remove(key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &RequestKey, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = PersistedEntry {
            value: BASE64.encode(value),
            stored_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
        };
        let (previous, snapshot) =
            self.mutate(Some(key), |entries| entries.insert(key.clone(), entry.clone()));
        if let Err(e) = self.flush(snapshot).await {
            warn!(
                path = %self.path.display(),
                key = %key,
                error = %e,
                "cache write failed, entry not stored"
            );
            // Undo only if no later write replaced the entry meanwhile.
            let mut state = self.lock_state();
            if state.entries.get(key) == Some(&entry) {
                match previous.filter(|p| !p.is_expired(now_ms())) {
                    Some(prev) => {
                        state.entries.insert(key.clone(), prev);
                    }
                    None => {
                        state.entries.remove(key);
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        if !self.lock_state().entries.contains_key(key) {
            return Ok(false);
        }
        let (removed, snapshot) = self.mutate(None, |entries| entries.remove(key).is_some());
        if removed {
            if let Err(e) = self.flush(snapshot).await {
                warn!(path = %self.path.display(), error = %e, "failed to persist cache delete");
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let (_, snapshot) = self.mutate(None, |entries| entries.clear());
        if let Err(e) = self.flush(snapshot).await {
            warn!(path = %self.path.display(), error = %e, "failed to persist cache clear");
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let state = self.lock_state();
        let now = now_ms();
        Ok(state.entries.values().filter(|e| !e.is_expired(now)).count())
    }

    fn name(&self) -> &'static str {
        "durable"
    }
}

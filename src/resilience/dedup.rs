use crate::cache::RequestKey;
use crate::Result;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type SharedAttempt<T> = Shared<BoxFuture<'static, Result<T>>>;

struct InFlight<T> {
    id: u64,
    handle: WeakShared<BoxFuture<'static, Result<T>>>,
}

type Registry<T> = Arc<Mutex<HashMap<RequestKey, InFlight<T>>>>;

/// Single-flight execution keyed by [`RequestKey`].
///
/// Concurrent callers for the same key share one attempt and all receive a
/// clone of its result. The registry only holds weak handles: when every
/// waiter has gone away the attempt future is dropped, which cancels its
/// transport call, and the entry is removed.
pub struct RequestDeduplicator<T> {
    in_flight: Registry<T>,
    next_id: AtomicU64,
}

/// Removes a registry entry when its attempt settles or is dropped.
///
/// Only removes the entry if it still belongs to the same attempt, so a stale
/// guard never evicts a newer attempt for the key.
struct Registration<T> {
    registry: Registry<T>,
    key: RequestKey,
    id: u64,
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        let mut map = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if map.get(&self.key).map(|e| e.id) == Some(self.id) {
            map.remove(&self.key);
        }
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the in-flight attempt for `key`, or start one with `attempt`.
    ///
    /// The lookup and the registration happen in one critical section. The
    /// attempt future is created and polled only after the lock is released,
    /// and its registry entry is removed before any waiter sees the result.
    pub async fn join_or_start<F, Fut>(&self, key: &RequestKey, attempt: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.join_or_start_tracked(key, attempt).await.0
    }

    /// Like [`join_or_start`](Self::join_or_start), also reporting whether
    /// this caller joined an attempt someone else started.
    pub async fn join_or_start_tracked<F, Fut>(&self, key: &RequestKey, attempt: F) -> (Result<T>, bool)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (shared, joined) = {
            let mut map = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match map.get(key).and_then(|e| e.handle.upgrade()) {
                Some(existing) => {
                    debug!(key = %key, "joining in-flight request");
                    (existing, true)
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let shared = Self::start(Arc::clone(&self.in_flight), key.clone(), id, attempt);
                    if let Some(handle) = shared.downgrade() {
                        map.insert(key.clone(), InFlight { id, handle });
                    }
                    (shared, false)
                }
            }
        };
        (shared.await, joined)
    }

    fn start<F, Fut>(registry: Registry<T>, key: RequestKey, id: u64, attempt: F) -> SharedAttempt<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let registration = Registration { registry, key, id };
        async move {
            let result = attempt().await;
            drop(registration);
            result
        }
        .boxed()
        .shared()
    }

    /// Number of attempts currently registered.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn key(s: &str) -> RequestKey {
        RequestKey::new(s)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_attempt() {
        let dedup = Arc::new(RequestDeduplicator::<u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dedup = Arc::clone(&dedup);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                dedup
                    .join_or_start(&key("prices/de"), move || async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst) as u64;
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(n + 42)
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_tracked_reports_followers() {
        let dedup = RequestDeduplicator::<u8>::new();
        let slow = || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(1)
        };
        let k = key("k");
        let (a, b, c) = tokio::join!(
            dedup.join_or_start_tracked(&k, slow),
            dedup.join_or_start_tracked(&k, slow),
            dedup.join_or_start_tracked(&k, slow),
        );
        let joined: Vec<bool> = [&a, &b, &c].iter().map(|r| r.1).collect();
        assert_eq!(joined, vec![false, true, true]);
        assert!(a.0.is_ok() && b.0.is_ok() && c.0.is_ok());
    }

    #[tokio::test]
    async fn test_errors_are_shared_too() {
        let dedup = Arc::new(RequestDeduplicator::<u64>::new());
        let a = {
            let dedup = Arc::clone(&dedup);
            tokio::spawn(async move {
                dedup
                    .join_or_start(&key("k"), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(Error::connection("reset by peer"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let b = dedup
            .join_or_start(&key("k"), || async { Ok(1) })
            .await;
        let a = a.await.unwrap();
        assert_eq!(a.unwrap_err().message(), "reset by peer");
        assert_eq!(b.unwrap_err().message(), "reset by peer");
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let dedup = RequestDeduplicator::<&'static str>::new();
        let (ka, kb) = (key("a"), key("b"));
        let (a, b) = tokio::join!(
            dedup.join_or_start(&ka, || async { Ok("a") }),
            dedup.join_or_start(&kb, || async { Ok("b") }),
        );
        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_new_attempt_starts_after_settlement() {
        let dedup = RequestDeduplicator::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for expected in 1..=3 {
            let calls = Arc::clone(&calls);
            let n = dedup
                .join_or_start(&key("k"), move || async move {
                    Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
                })
                .await
                .unwrap();
            assert_eq!(n, expected);
            assert_eq!(dedup.in_flight(), 0);
        }
    }

    #[tokio::test]
    async fn test_abandoned_attempt_is_dropped_and_deregistered() {
        struct DropFlag(Arc<std::sync::atomic::AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dedup = RequestDeduplicator::<u32>::new();
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = DropFlag(Arc::clone(&dropped));

        let slow = key("slow");
        let waiter = dedup.join_or_start(&slow, move || async move {
            let _flag = flag;
            futures::future::pending::<()>().await;
            Ok(0)
        });
        let res = tokio::time::timeout(Duration::from_millis(20), waiter).await;
        assert!(res.is_err());
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(dedup.in_flight(), 0);

        // The key is free again.
        let n = dedup.join_or_start(&slow, || async { Ok(5) }).await;
        assert_eq!(n.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_remaining_waiter_keeps_attempt_alive() {
        let dedup = Arc::new(RequestDeduplicator::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let make = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(60)).await;
                Ok(9)
            }
        };

        let k = key("k");
        let impatient = dedup.join_or_start(&k, make(Arc::clone(&calls)));
        let patient = {
            let dedup = Arc::clone(&dedup);
            let f = make(Arc::clone(&calls));
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                dedup.join_or_start(&key("k"), f).await
            })
        };
        let _ = tokio::time::timeout(Duration::from_millis(20), impatient).await;
        assert_eq!(patient.await.unwrap().unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

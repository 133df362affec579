//! Per-key coordination: single-flight execution and keyed locks

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::error::{RepoError, Result};

type SharedResult<T> = Shared<BoxFuture<'static, Result<T>>>;

/// At most one running computation per key
///
/// The first caller for a key starts the work on its own task; callers that
/// arrive while it runs wait for the same result. The entry is dropped when
/// the work completes, so the next caller starts afresh. Dropping a waiting
/// caller never cancels the work.
pub struct SingleFlight<K, T> {
    inflight: Arc<Mutex<HashMap<K, SharedResult<T>>>>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join the run already in progress
    pub async fn run<F>(&self, key: K, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match inflight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let registry = Arc::clone(&self.inflight);
                    let owned_key = key.clone();
                    let handle = tokio::spawn(async move {
                        let result = work.await;
                        registry
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&owned_key);
                        result
                    });

                    let joined: BoxFuture<'static, Result<T>> = async move {
                        handle.await.map_err(RepoError::from)?
                    }
                    .boxed();
                    let joined = joined.shared();
                    inflight.insert(key, joined.clone());
                    joined
                }
            }
        };

        shared.await
    }

    /// Number of keys with work in progress
    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One async mutex per key, created on demand
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flight: Arc<SingleFlight<String, u64>> = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                flight
                    .run("key".to_string(), async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared_and_not_cached() {
        let flight: SingleFlight<&'static str, u64> = SingleFlight::new();

        let err = flight
            .run("k", async { Err(RepoError::invalid("boom")) })
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidRequest { .. }));

        let ok = flight.run("k", async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flight: Arc<SingleFlight<u32, u32>> = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for key in 0..4u32 {
            let flight = Arc::clone(&flight);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                flight
                    .run(key, async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(key * 2)
                    })
                    .await
            }));
        }
        for (key, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), key as u32 * 2);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_keyed_locks_serialize_same_key() {
        let locks: Arc<KeyedLocks<String>> = Arc::new(KeyedLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&"same".to_string()).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        // Released entries are pruned on the next acquisition
        drop(locks.lock(&"other".to_string()).await);
        assert!(locks.len() <= 1);
    }
}

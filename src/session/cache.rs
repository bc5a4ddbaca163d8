//! Single-flight memoization for derived session fields.
//!
//! The first caller for a key runs the derivation; callers arriving while it
//! is in flight subscribe to its outcome instead of dispatching again. A
//! successful outcome is kept; a failed one is dropped so the next caller
//! starts over.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use tokio::sync::broadcast;

enum Slot<V, E> {
    /// Derivation running; waiters subscribe here
    InFlight(broadcast::Sender<Result<V, E>>),
    /// Derivation finished successfully
    Resolved(V),
}

/// At-most-one in-flight derivation per key
pub struct SingleFlight<K, V, E> {
    slots: DashMap<K, Slot<V, E>>,
    /// Calls that joined an in-flight derivation
    coalesced: AtomicU64,
    /// Derivations actually started
    dispatched: AtomicU64,
}

/// Clears an abandoned in-flight slot if the leading future is dropped
/// before it settles, so waiters retry instead of hanging.
struct LeaderGuard<'a, K: Eq + Hash, V, E> {
    slots: &'a DashMap<K, Slot<V, E>>,
    key: &'a K,
    armed: bool,
}

impl<K: Eq + Hash, V, E> Drop for LeaderGuard<'_, K, V, E> {
    fn drop(&mut self) {
        if self.armed {
            self.slots
                .remove_if(self.key, |_, slot| matches!(slot, Slot::InFlight(_)));
        }
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
    E: Clone,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            coalesced: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, running `resolve` only if no value
    /// is cached and no derivation is in flight.
    pub async fn get_or_resolve<F, Fut>(&self, key: K, resolve: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let sender = loop {
            let mut receiver = match self.slots.entry(key.clone()) {
                Entry::Occupied(entry) => match entry.get() {
                    Slot::Resolved(value) => return Ok(value.clone()),
                    Slot::InFlight(sender) => sender.subscribe(),
                },
                Entry::Vacant(entry) => {
                    let (sender, _) = broadcast::channel(1);
                    entry.insert(Slot::InFlight(sender.clone()));
                    break sender;
                }
            };

            self.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!("coalescing derivation of {:?}", key);
            match receiver.recv().await {
                Ok(outcome) => return outcome,
                Err(_) => debug!("in-flight derivation of {:?} abandoned, retrying", key),
            }
        };

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let mut guard = LeaderGuard {
            slots: &self.slots,
            key: &key,
            armed: true,
        };
        let outcome = resolve().await;
        match &outcome {
            Ok(value) => {
                self.slots.insert(key.clone(), Slot::Resolved(value.clone()));
            }
            Err(_) => {
                self.slots.remove(&key);
            }
        }
        guard.armed = false;

        // No receivers is fine
        let _ = sender.send(outcome.clone());
        outcome
    }

    /// The resolved value for `key`, without triggering a derivation
    pub fn cached(&self, key: &K) -> Option<V> {
        self.slots.get(key).and_then(|slot| match slot.value() {
            Slot::Resolved(value) => Some(value.clone()),
            Slot::InFlight(_) => None,
        })
    }

    /// Whether a derivation for `key` is running
    pub fn is_in_flight(&self, key: &K) -> bool {
        matches!(self.slots.get(key).as_deref(), Some(Slot::InFlight(_)))
    }

    /// Forget every resolved value and in-flight slot.
    ///
    /// Waiters on a dropped slot retry against an empty cache.
    pub fn invalidate_all(&self) {
        self.slots.clear();
    }

    /// Number of calls that joined an existing derivation
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    /// Number of derivations started
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_single_call() {
        let cache: SingleFlight<&str, u32, String> = SingleFlight::new();
        let value = cache.get_or_resolve("a", || async { Ok(7) }).await;
        assert_eq!(value, Ok(7));
        assert_eq!(cache.cached(&"a"), Some(7));
        assert_eq!(cache.coalesced_count(), 0);
        assert_eq!(cache.dispatched_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_derivation() {
        let cache: Arc<SingleFlight<&str, u32, String>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve("field", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.dispatched_count(), 1);
        assert_eq!(cache.coalesced_count(), 4);
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_forgotten() {
        let cache: Arc<SingleFlight<&str, u32, String>> = Arc::new(SingleFlight::new());

        let leader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_resolve("k", || async {
                        sleep(Duration::from_millis(30)).await;
                        Err("boom".to_string())
                    })
                    .await
            })
        };
        sleep(Duration::from_millis(5)).await;
        let waiter = cache.get_or_resolve("k", || async { Ok(1) }).await;
        assert_eq!(waiter, Err("boom".to_string()));
        assert_eq!(leader.await.unwrap(), Err("boom".to_string()));
        assert_eq!(cache.cached(&"k"), None);

        // Re-invoking after failure derives again.
        assert_eq!(cache.get_or_resolve("k", || async { Ok(2) }).await, Ok(2));
        assert_eq!(cache.dispatched_count(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_leader_lets_waiter_retry() {
        let cache: Arc<SingleFlight<&str, u32, String>> = Arc::new(SingleFlight::new());

        let leader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_resolve("k", || async {
                        sleep(Duration::from_secs(30)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        sleep(Duration::from_millis(10)).await;
        assert!(cache.is_in_flight(&"k"));

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_or_resolve("k", || async { Ok(5) }).await })
        };
        sleep(Duration::from_millis(10)).await;
        leader.abort();

        assert_eq!(waiter.await.unwrap(), Ok(5));
        assert_eq!(cache.cached(&"k"), Some(5));
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache: SingleFlight<u8, u8, ()> = SingleFlight::new();
        cache.get_or_resolve(1, || async { Ok(1) }).await.unwrap();
        cache.invalidate_all();
        assert_eq!(cache.cached(&1), None);
    }
}

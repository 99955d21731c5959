//! Sliding-expiration key/value store.
//!
//! Values are opaque (`Arc<dyn Any + Send + Sync>`) and keyed by string.
//! Every mutation, and the eviction scan, runs under one store-wide mutex;
//! observer notification happens after that mutex is released.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::DrainError;

use super::config::StoreConfig;
use super::events::{CacheAction, CacheEvent, CacheObserver, ObserverList, SubscriptionId};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "rowdrain_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "rowdrain_cache_miss_total";
pub(crate) const METRIC_CACHE_EXPIRED: &str = "rowdrain_cache_expired_total";
pub(crate) const METRIC_CACHE_ENTRIES: &str = "rowdrain_cache_entries";

/// Shared, type-erased cache value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

struct Entry {
    value: CacheValue,
    last_access: Instant,
}

impl Entry {
    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access)
    }
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, Entry>,
    disposed: bool,
}

/// Thread-safe store with sliding expiration and lifecycle notifications.
///
/// `put` never overwrites: inserting an existing key fails with
/// [`DrainError::DuplicateKey`] and leaves the stored value untouched.
pub struct ExpiringStore {
    config: StoreConfig,
    state: Mutex<StoreState>,
    observers: ObserverList,
}

impl ExpiringStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: Mutex::new(StoreState::default()),
            observers: ObserverList::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn sliding_expiration(&self) -> Duration {
        self.config.sliding_expiration
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn subscribe(&self, observer: Arc<dyn CacheObserver>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert `value` under `key`, starting its expiration window.
    pub fn put<V>(&self, key: impl Into<String>, value: V) -> Result<(), DrainError>
    where
        V: Any + Send + Sync,
    {
        self.put_shared(key, Arc::new(value))
    }

    /// Insert an already shared value; the caller keeps its own handle.
    pub fn put_shared<V>(&self, key: impl Into<String>, value: Arc<V>) -> Result<(), DrainError>
    where
        V: Any + Send + Sync,
    {
        let key = key.into();
        let event = {
            let mut state = mutex_lock(&self.state, SOURCE, "put");
            if state.disposed {
                return Err(DrainError::Disposed);
            }
            if state.entries.contains_key(&key) {
                return Err(DrainError::duplicate_key(key));
            }
            state.entries.insert(
                key.clone(),
                Entry {
                    value: value as CacheValue,
                    last_access: Instant::now(),
                },
            );
            gauge!(METRIC_CACHE_ENTRIES).set(state.entries.len() as f64);
            self.observers.stamp(key, CacheAction::Added)
        };

        self.observers.notify(std::slice::from_ref(&event));
        Ok(())
    }

    /// Delete `key`. Returns whether an entry was present.
    pub fn remove(&self, key: &str) -> bool {
        let event = {
            let mut state = mutex_lock(&self.state, SOURCE, "remove");
            match state.entries.remove(key) {
                Some(_) => {
                    gauge!(METRIC_CACHE_ENTRIES).set(state.entries.len() as f64);
                    self.observers.stamp(key, CacheAction::Removed)
                }
                None => return false,
            }
        };

        self.observers.notify(std::slice::from_ref(&event));
        true
    }

    /// Remove every key, emitting one `Removed` event per key.
    pub fn clear(&self) -> usize {
        let events: Vec<CacheEvent> = {
            let mut state = mutex_lock(&self.state, SOURCE, "clear");
            let mut keys: Vec<String> = state.entries.drain().map(|(key, _)| key).collect();
            keys.sort_unstable();
            gauge!(METRIC_CACHE_ENTRIES).set(0.0);
            keys.into_iter()
                .map(|key| self.observers.stamp(key, CacheAction::Removed))
                .collect()
        };

        self.observers.notify(&events);
        events.len()
    }

    /// Release the store. Entries are dropped without notifications, observers
    /// are detached, and the background sweeper stops at its next tick.
    pub fn dispose(&self) {
        let released = {
            let mut state = mutex_lock(&self.state, SOURCE, "dispose");
            if state.disposed {
                return;
            }
            state.disposed = true;
            let released = state.entries.len();
            state.entries.clear();
            released
        };
        self.observers.clear();
        gauge!(METRIC_CACHE_ENTRIES).set(0.0);
        info!(released, "Expiring store disposed");
    }

    pub fn is_disposed(&self) -> bool {
        mutex_lock(&self.state, SOURCE, "is_disposed").disposed
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// True when `key` is present and its window has not elapsed. Does not
    /// refresh the window.
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let state = mutex_lock(&self.state, SOURCE, "exists");
        state
            .entries
            .get(key)
            .is_some_and(|entry| entry.idle_for(now) <= self.config.sliding_expiration)
    }

    /// Fetch the value stored under `key` as `V`.
    ///
    /// A hit restarts the entry's expiration window. With `remove_after`, the
    /// entry is deleted in the same critical section as the read, so the
    /// eviction scan can never also observe it. Returns `None` when the key
    /// is absent, already idle past its window, or holds a different type
    /// (in which case the entry is left untouched).
    pub fn get<V>(&self, key: &str, remove_after: bool) -> Option<Arc<V>>
    where
        V: Any + Send + Sync,
    {
        self.lookup(key, remove_after, |value| value.is::<V>())
            .and_then(|value| value.downcast::<V>().ok())
    }

    /// Untyped variant of [`ExpiringStore::get`].
    pub fn get_raw(&self, key: &str, remove_after: bool) -> Option<CacheValue> {
        self.lookup(key, remove_after, |_| true)
    }

    fn lookup(
        &self,
        key: &str,
        remove_after: bool,
        accepts: impl Fn(&(dyn Any + Send + Sync)) -> bool,
    ) -> Option<CacheValue> {
        let now = Instant::now();
        let (found, events) = {
            let mut state = mutex_lock(&self.state, SOURCE, "get");
            let mut events = Vec::new();

            let expired = state
                .entries
                .get(key)
                .is_some_and(|entry| entry.idle_for(now) > self.config.sliding_expiration);
            if expired {
                state.entries.remove(key);
                counter!(METRIC_CACHE_EXPIRED).increment(1);
                gauge!(METRIC_CACHE_ENTRIES).set(state.entries.len() as f64);
                events.push(self.observers.stamp(key, CacheAction::Expired));
            }

            let found = match state.entries.get_mut(key) {
                Some(entry) if accepts(entry.value.as_ref()) => {
                    entry.last_access = now;
                    Some(Arc::clone(&entry.value))
                }
                Some(_) => {
                    debug!(key, "Cache entry holds a different value type");
                    None
                }
                None => None,
            };

            if found.is_some() && remove_after {
                state.entries.remove(key);
                gauge!(METRIC_CACHE_ENTRIES).set(state.entries.len() as f64);
                events.push(self.observers.stamp(key, CacheAction::Removed));
            }

            (found, events)
        };

        if found.is_some() {
            counter!(METRIC_CACHE_HIT).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS).increment(1);
        }

        self.observers.notify(&events);
        found
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    /// Evict every entry idle for longer than the sliding window, emitting
    /// `Expired` for each. Returns the number of evicted keys.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let events: Vec<CacheEvent> = {
            let mut state = mutex_lock(&self.state, SOURCE, "sweep_expired");
            if state.disposed {
                return 0;
            }

            let window = self.config.sliding_expiration;
            let mut stale: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.idle_for(now) > window)
                .map(|(key, _)| key.clone())
                .collect();
            stale.sort_unstable();

            for key in &stale {
                state.entries.remove(key);
            }
            if !stale.is_empty() {
                gauge!(METRIC_CACHE_ENTRIES).set(state.entries.len() as f64);
            }

            stale
                .into_iter()
                .map(|key| self.observers.stamp(key, CacheAction::Expired))
                .collect()
        };

        if !events.is_empty() {
            counter!(METRIC_CACHE_EXPIRED).increment(events.len() as u64);
            debug!(expired = events.len(), "Eviction scan completed");
        }

        self.observers.notify(&events);
        events.len()
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Currently stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = mutex_lock(&self.state, SOURCE, "keys")
            .entries
            .keys()
            .cloned()
            .collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for ExpiringStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn store_with_window(secs: u64) -> ExpiringStore {
        ExpiringStore::new(StoreConfig::new().with_sliding_expiration(Duration::from_secs(secs)))
    }

    fn record(store: &ExpiringStore) -> Arc<Mutex<Vec<(String, CacheAction)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(Arc::new(move |event: &CacheEvent| {
            sink.lock()
                .expect("sink lock")
                .push((event.key.clone(), event.action));
        }));
        seen
    }

    #[test]
    fn absent_keys_are_not_found() {
        let store = ExpiringStore::default();
        assert!(!store.exists("missing"));
        assert!(store.get::<String>("missing", false).is_none());
        assert!(!store.remove("missing"));
    }

    #[test]
    fn put_then_get_returns_value() {
        let store = ExpiringStore::default();
        store.put("greeting", "hello".to_string()).expect("put");

        assert!(store.exists("greeting"));
        let value = store.get::<String>("greeting", false).expect("hit");
        assert_eq!(value.as_str(), "hello");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_put_fails_and_keeps_first_value() {
        let store = ExpiringStore::default();
        store.put("k", 1_u32).expect("first put");

        let err = store.put("k", 2_u32).expect_err("duplicate");
        assert!(matches!(err, DrainError::DuplicateKey { ref key } if key == "k"));
        assert_eq!(*store.get::<u32>("k", false).expect("hit"), 1);
    }

    #[test]
    fn get_with_remove_after_leaves_key_absent() {
        let store = ExpiringStore::default();
        let seen = record(&store);
        store.put("once", 7_i64).expect("put");

        assert_eq!(*store.get::<i64>("once", true).expect("hit"), 7);
        assert!(!store.exists("once"));
        assert!(store.get::<i64>("once", true).is_none());

        let seen = seen.lock().expect("seen");
        assert_eq!(
            seen.as_slice(),
            &[
                ("once".to_string(), CacheAction::Added),
                ("once".to_string(), CacheAction::Removed),
            ]
        );
    }

    #[test]
    fn type_mismatch_is_a_miss_without_removal() {
        let store = ExpiringStore::default();
        store.put("n", 5_u8).expect("put");

        assert!(store.get::<String>("n", true).is_none());
        assert!(store.exists("n"));
        assert!(store.get_raw("n", false).is_some());
    }

    #[test]
    fn remove_emits_only_when_deleted() {
        let store = ExpiringStore::default();
        let seen = record(&store);
        store.put("a", ()).expect("put");

        assert!(store.remove("a"));
        assert!(!store.remove("a"));

        let actions: Vec<CacheAction> = seen.lock().expect("seen").iter().map(|(_, a)| *a).collect();
        assert_eq!(actions, vec![CacheAction::Added, CacheAction::Removed]);
    }

    #[test]
    fn clear_emits_one_removed_per_key() {
        let store = ExpiringStore::default();
        store.put("b", 2).expect("put b");
        store.put("a", 1).expect("put a");
        let seen = record(&store);

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());

        let seen = seen.lock().expect("seen");
        assert_eq!(
            seen.as_slice(),
            &[
                ("a".to_string(), CacheAction::Removed),
                ("b".to_string(), CacheAction::Removed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_entry_is_swept_as_expired() {
        let store = store_with_window(60);
        let seen = record(&store);
        store.put("idle", "x").expect("put");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!store.exists("idle"));
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.is_empty());

        let seen = seen.lock().expect("seen");
        assert_eq!(seen.last(), Some(&("idle".to_string(), CacheAction::Expired)));
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_slide_the_window() {
        let store = store_with_window(60);
        store.put("hot", 1_u16).expect("put");

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(45)).await;
            assert!(store.get::<u16>("hot", false).is_some());
            assert_eq!(store.sweep_expired(), 0);
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.sweep_expired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_of_unswept_idle_entry_reports_expired_once() {
        let store = store_with_window(10);
        let seen = record(&store);
        store.put("late", 3_i32).expect("put");

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.get::<i32>("late", true).is_none());
        assert_eq!(store.sweep_expired(), 0);

        let actions: Vec<CacheAction> = seen.lock().expect("seen").iter().map(|(_, a)| *a).collect();
        assert_eq!(actions, vec![CacheAction::Added, CacheAction::Expired]);
    }

    #[test]
    fn dispose_rejects_puts_and_empties_store() {
        let store = ExpiringStore::default();
        store.subscribe(Arc::new(|_: &CacheEvent| {}));
        store.put("k", 1).expect("put");

        store.dispose();

        assert!(store.is_disposed());
        assert_eq!(store.observer_count(), 0);
        assert!(store.is_empty());
        assert!(matches!(store.put("k2", 2), Err(DrainError::Disposed)));
        assert!(store.get::<i32>("k", false).is_none());
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn observer_may_reenter_the_store() {
        let store = Arc::new(ExpiringStore::default());
        let inner = Arc::clone(&store);
        store.subscribe(Arc::new(move |event: &CacheEvent| {
            if event.action == CacheAction::Added {
                let _ = inner.exists(&event.key);
            }
        }));

        store.put("reentrant", 1).expect("put");
        assert!(store.exists("reentrant"));
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = ExpiringStore::default();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.state.lock().expect("state lock should be acquired");
            panic!("poison state lock");
        }));

        store.put("after", 1).expect("put after poison");
        assert!(store.exists("after"));
    }

    #[test]
    fn keys_are_sorted() {
        let store = ExpiringStore::default();
        for key in ["c", "a", "b"] {
            store.put(key, ()).expect("put");
        }
        assert_eq!(store.keys(), vec!["a", "b", "c"]);
    }
}

//! Cache lifecycle notifications.
//!
//! Every key-level change in the store produces exactly one [`CacheEvent`],
//! delivered synchronously to each registered [`CacheObserver`].

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use time::OffsetDateTime;
use tracing::{debug, warn};

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::events";

/// Monotonic sequence number assigned to each emitted event.
pub type Epoch = u64;

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheAction {
    /// The key was inserted by `put`.
    Added,
    /// The key was deleted explicitly (`remove`, `get` with remove-after, `clear`).
    Removed,
    /// The key was evicted by the sliding-expiration sweep.
    Expired,
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// A single key lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: String,
    pub action: CacheAction,
    pub epoch: Epoch,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(key: impl Into<String>, action: CacheAction, epoch: Epoch) -> Self {
        Self {
            key: key.into(),
            action,
            epoch,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Receives store notifications.
///
/// Delivery happens on the thread that caused the change (or on the sweeper
/// task for [`CacheAction::Expired`]), after the store lock is released.
/// Delivery order across threads is therefore not guaranteed, even for a
/// single key: a `Removed` may arrive before the `Added` it follows. Sort by
/// [`CacheEvent::epoch`] to recover the order in which changes were applied.
///
/// Implementations must return quickly: a slow observer delays the caller
/// and the next eviction scan.
pub trait CacheObserver: Send + Sync {
    fn on_cache_event(&self, event: &CacheEvent);
}

impl<F> CacheObserver for F
where
    F: Fn(&CacheEvent) + Send + Sync,
{
    fn on_cache_event(&self, event: &CacheEvent) {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to detach an observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registered observers plus the epoch counter shared by all emitted events.
pub(crate) struct ObserverList {
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn CacheObserver>)>>,
    next_subscription: AtomicU64,
    epoch_counter: AtomicU64,
}

impl ObserverList {
    pub(crate) fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self, observer: Arc<dyn CacheObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        rw_write(&self.observers, SOURCE, "subscribe").push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = rw_write(&self.observers, SOURCE, "unsubscribe");
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn clear(&self) {
        rw_write(&self.observers, SOURCE, "clear").clear();
    }

    pub(crate) fn len(&self) -> usize {
        rw_read(&self.observers, SOURCE, "len").len()
    }

    /// Stamp an event with the next epoch. Called while the store lock is
    /// held so epochs follow the order in which changes were applied.
    pub(crate) fn stamp(&self, key: impl Into<String>, action: CacheAction) -> CacheEvent {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        CacheEvent::new(key, action, epoch)
    }

    /// Deliver events to every observer, in epoch order.
    ///
    /// The observer list is snapshotted first so an observer may subscribe,
    /// unsubscribe, or call back into the store while being notified.
    pub(crate) fn notify(&self, events: &[CacheEvent]) {
        if events.is_empty() {
            return;
        }

        let observers: Vec<Arc<dyn CacheObserver>> = rw_read(&self.observers, SOURCE, "notify")
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for event in events {
            debug!(
                key = %event.key,
                action = %event.action,
                epoch = event.epoch,
                observers = observers.len(),
                "Cache event emitted"
            );

            for observer in &observers {
                let delivered = catch_unwind(AssertUnwindSafe(|| observer.on_cache_event(event)));
                if delivered.is_err() {
                    warn!(
                        key = %event.key,
                        action = %event.action,
                        epoch = event.epoch,
                        "Cache observer panicked; continuing with remaining observers"
                    );
                }
            }
        }
    }
}

impl Default for ObserverList {
    fn default() -> Self {
        Self::new()
    }
}

//! Expiring key/value store.
//!
//! Holds opaque values under string keys with sliding expiration:
//!
//! - **Store**: coarse-locked map; `put` never overwrites, lookups slide the
//!   expiration window, `get` can read-and-remove atomically.
//! - **Events**: `Added`, `Removed` and `Expired` notifications delivered
//!   synchronously to registered observers.
//! - **Sweeper**: periodic tokio task evicting idle entries.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! sliding_expiration_secs = 300
//! polling_interval_secs = 600
//! ```

mod config;
mod events;
mod lock;
mod store;
mod sweeper;

pub use config::StoreConfig;
pub use events::{CacheAction, CacheEvent, CacheObserver, Epoch, SubscriptionId};
pub use store::{CacheValue, ExpiringStore};
pub use sweeper::SweeperHandle;

pub(crate) use store::{METRIC_CACHE_ENTRIES, METRIC_CACHE_EXPIRED, METRIC_CACHE_HIT, METRIC_CACHE_MISS};

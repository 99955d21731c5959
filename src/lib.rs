//! Materialize tabular rows into typed values.
//!
//! Accessor tables are built once per entity shape and kept in an
//! [`ExpiringStore`](cache::ExpiringStore) with sliding expiration.

pub mod cache;
pub mod config;
pub mod error;
pub mod mapping;
pub mod telemetry;

pub use cache::{CacheAction, CacheEvent, CacheObserver, ExpiringStore, StoreConfig};
pub use error::{CoercionError, DrainError};
pub use mapping::{Entity, EntityShape, Materializer, RowCursor, RowSet, Value};

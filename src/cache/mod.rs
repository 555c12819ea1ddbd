//! Namespaced response cache with offline support.
//!
//! This module provides the storage side of the interception layer:
//! - Isolated namespaces of response snapshots keyed by normalized URL
//! - A persistent FIFO for writes that still need remote acknowledgment
//! - A small metadata table for lifecycle bookkeeping
//!
//! Backends: SQLite for real runs, an in-memory store for tests and dry runs.

mod memory;
mod storage;
mod traits;
mod types;

pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::{CacheStorage, MetaStorage, QueueStorage, Store};
pub use types::{
  CacheResult, CacheSource, CachedResponse, Request, Response, OFFLINE_DATA_ERROR, OFFLINE_TEXT,
  STATUS_UNAVAILABLE,
};

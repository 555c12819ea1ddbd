//! Storage contracts for namespaces, the sync queue, and worker metadata.

use std::collections::BTreeSet;

use color_eyre::Result;

use super::types::{CachedResponse, Response};
use crate::sync::SyncEntry;

/// Trait for namespace-partitioned response storage.
///
/// Entries are keyed by normalized request URL. A `put` replaces any previous
/// entry for the same URL wholesale; entries are never edited in place.
pub trait CacheStorage: Send + Sync {
  /// Create the namespace if it does not exist yet.
  fn open(&self, namespace: &str) -> Result<()>;

  /// Look up the entry stored for `url` in `namespace`.
  fn match_entry(&self, namespace: &str, url: &str) -> Result<Option<CachedResponse>>;

  /// Store a response, creating the namespace if needed.
  fn put(&self, namespace: &str, url: &str, response: &Response) -> Result<()>;

  /// Drop a namespace and all of its entries. Returns whether it existed.
  fn delete(&self, namespace: &str) -> Result<bool>;

  /// Names of every namespace currently present.
  fn list_namespaces(&self) -> Result<BTreeSet<String>>;
}

/// Trait for the persistent FIFO of deferred writes.
pub trait QueueStorage: Send + Sync {
  /// Append a payload under `tag`, assigning the next sequence number.
  fn push(&self, tag: &str, payload: &[u8]) -> Result<SyncEntry>;

  /// All entries queued under `tag`, oldest first.
  fn pending(&self, tag: &str) -> Result<Vec<SyncEntry>>;

  /// Remove an acknowledged entry.
  fn remove(&self, seq: u64) -> Result<()>;
}

/// Small key/value store for worker bookkeeping (data version, fingerprint).
pub trait MetaStorage: Send + Sync {
  fn get_meta(&self, key: &str) -> Result<Option<String>>;

  fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}

/// Everything the worker needs from one backing store.
pub trait Store: CacheStorage + QueueStorage + MetaStorage {}

impl<T: CacheStorage + QueueStorage + MetaStorage> Store for T {}

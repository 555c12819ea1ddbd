//! In-memory implementation of the storage contracts.
//!
//! Used for ephemeral runs (`--database :memory:` on the CLI) and throughout
//! the test suite.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheStorage, MetaStorage, QueueStorage};
use super::types::{CachedResponse, Response};
use crate::sync::SyncEntry;

#[derive(Default)]
struct Inner {
  /// Entries per namespace, in insertion order
  namespaces: BTreeMap<String, Vec<(String, CachedResponse)>>,
  queue: VecDeque<SyncEntry>,
  next_seq: u64,
  meta: HashMap<String, String>,
}

/// Storage that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStorage {
  inner: Mutex<Inner>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn inner(&self) -> Result<MutexGuard<'_, Inner>> {
    self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, namespace: &str) -> Result<()> {
    self
      .inner()?
      .namespaces
      .entry(namespace.to_string())
      .or_default();
    Ok(())
  }

  fn match_entry(&self, namespace: &str, url: &str) -> Result<Option<CachedResponse>> {
    let inner = self.inner()?;
    Ok(
      inner
        .namespaces
        .get(namespace)
        .and_then(|entries| entries.iter().find(|(key, _)| key == url))
        .map(|(_, cached)| cached.clone()),
    )
  }

  fn put(&self, namespace: &str, url: &str, response: &Response) -> Result<()> {
    let mut inner = self.inner()?;
    let entries = inner.namespaces.entry(namespace.to_string()).or_default();
    entries.retain(|(key, _)| key != url);
    entries.push((
      url.to_string(),
      CachedResponse {
        response: response.clone(),
        stored_at: Utc::now(),
      },
    ));
    Ok(())
  }

  fn delete(&self, namespace: &str) -> Result<bool> {
    Ok(self.inner()?.namespaces.remove(namespace).is_some())
  }

  fn list_namespaces(&self) -> Result<BTreeSet<String>> {
    Ok(self.inner()?.namespaces.keys().cloned().collect())
  }
}

impl QueueStorage for MemoryStorage {
  fn push(&self, tag: &str, payload: &[u8]) -> Result<SyncEntry> {
    let mut inner = self.inner()?;
    inner.next_seq += 1;
    let entry = SyncEntry {
      seq: inner.next_seq,
      tag: tag.to_string(),
      payload: payload.to_vec(),
      queued_at: Utc::now(),
    };
    inner.queue.push_back(entry.clone());
    Ok(entry)
  }

  fn pending(&self, tag: &str) -> Result<Vec<SyncEntry>> {
    Ok(
      self
        .inner()?
        .queue
        .iter()
        .filter(|entry| entry.tag == tag)
        .cloned()
        .collect(),
    )
  }

  fn remove(&self, seq: u64) -> Result<()> {
    self.inner()?.queue.retain(|entry| entry.seq != seq);
    Ok(())
  }
}

impl MetaStorage for MemoryStorage {
  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    Ok(self.inner()?.meta.get(key).cloned())
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    self
      .inner()?
      .meta
      .insert(key.to_string(), value.to_string());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_replaced_entry_moves_to_end() {
    let storage = MemoryStorage::new();
    storage.put("data-v2", "/data/a.json", &Response::new(200, "a1")).unwrap();
    storage.put("data-v2", "/data/b.json", &Response::new(200, "b")).unwrap();
    storage.put("data-v2", "/data/a.json", &Response::new(200, "a2")).unwrap();

    let inner = storage.inner().unwrap();
    let keys: Vec<_> = inner.namespaces["data-v2"]
      .iter()
      .map(|(k, _)| k.as_str())
      .collect();
    assert_eq!(keys, vec!["/data/b.json", "/data/a.json"]);
  }

  #[test]
  fn test_sequence_is_monotonic_after_removal() {
    let storage = MemoryStorage::new();
    let a = storage.push("user-data", b"A").unwrap();
    storage.remove(a.seq).unwrap();
    let b = storage.push("user-data", b"B").unwrap();
    assert!(b.seq > a.seq);
  }
}

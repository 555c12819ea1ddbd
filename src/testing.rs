//! Scripted doubles for the network, the sync endpoint and the host platform.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::cache::{
  CacheStorage, CachedResponse, MemoryStorage, MetaStorage, QueueStorage, Request, Response,
};
use crate::classifier::Classifier;
use crate::config::ClassifierConfig;
use crate::error::{NetworkError, SyncError};
use crate::host::Host;
use crate::manifest::Manifest;
use crate::network::Network;
use crate::notify::Notification;
use crate::sync::{Remote, SyncEntry};

pub const TEST_ORIGIN: &str = "https://satify.example.com";

/// Classifier over the default manifest and rules at [`TEST_ORIGIN`].
pub fn classifier() -> Classifier {
  Classifier::new(
    Url::parse(TEST_ORIGIN).unwrap(),
    &Manifest::default(),
    &ClassifierConfig::default(),
  )
}

enum Route {
  Respond(Response),
  Fail,
  Abort,
}

/// Network answering from a routing table keyed by the URL exactly as requested.
///
/// Unrouted URLs get a 404, or a transport failure when offline.
#[derive(Default)]
pub struct ScriptedNetwork {
  routes: Mutex<HashMap<String, Route>>,
  calls: Mutex<Vec<String>>,
  offline: bool,
}

impl ScriptedNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every request fails at the transport level.
  pub fn offline() -> Self {
    Self {
      offline: true,
      ..Self::default()
    }
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Route::Respond(response));
  }

  pub fn fail(&self, url: &str) {
    self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
  }

  /// The request is cancelled before a response arrives.
  pub fn abort(&self, url: &str) {
    self.routes.lock().unwrap().insert(url.to_string(), Route::Abort);
  }

  /// URLs fetched so far, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Network for ScriptedNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self.calls.lock().unwrap().push(request.url.clone());

    let failure = || NetworkError::Transport {
      url: request.url.clone(),
      reason: "connection refused".to_string(),
    };
    if self.offline {
      return Err(failure());
    }

    match self.routes.lock().unwrap().get(&request.url) {
      Some(Route::Respond(response)) => Ok(response.clone()),
      Some(Route::Fail) => Err(failure()),
      Some(Route::Abort) => Err(NetworkError::Aborted {
        url: request.url.clone(),
      }),
      None => Ok(Response::new(404, "not found")),
    }
  }
}

/// Sync endpoint recording every attempt; fails for chosen payloads.
#[derive(Default)]
pub struct RecordingRemote {
  failing: HashSet<Vec<u8>>,
  attempts: Mutex<Vec<String>>,
  delivered: Mutex<Vec<String>>,
}

impl RecordingRemote {
  pub fn failing_on(payloads: &[&str]) -> Self {
    Self {
      failing: payloads.iter().map(|p| p.as_bytes().to_vec()).collect(),
      ..Self::default()
    }
  }

  pub fn attempts(&self) -> Vec<String> {
    self.attempts.lock().unwrap().clone()
  }

  pub fn delivered(&self) -> Vec<String> {
    self.delivered.lock().unwrap().clone()
  }
}

#[async_trait]
impl Remote for RecordingRemote {
  async fn deliver(&self, entry: &SyncEntry) -> Result<(), SyncError> {
    let payload = String::from_utf8_lossy(&entry.payload).to_string();
    self.attempts.lock().unwrap().push(payload.clone());

    if self.failing.contains(&entry.payload) {
      return Err(SyncError::DeliveryFailure {
        seq: entry.seq,
        reason: "endpoint unreachable".to_string(),
      });
    }
    self.delivered.lock().unwrap().push(payload);
    Ok(())
  }
}

/// Host recording claims, notifications and opened windows.
#[derive(Default)]
pub struct RecordingHost {
  refuse_claims: bool,
  claims: Mutex<usize>,
  notifications: Mutex<Vec<Notification>>,
  windows: Mutex<Vec<String>>,
}

impl RecordingHost {
  pub fn refusing_claims() -> Self {
    Self {
      refuse_claims: true,
      ..Self::default()
    }
  }

  pub fn claims(&self) -> usize {
    *self.claims.lock().unwrap()
  }

  pub fn notifications(&self) -> Vec<Notification> {
    self.notifications.lock().unwrap().clone()
  }

  pub fn windows(&self) -> Vec<String> {
    self.windows.lock().unwrap().clone()
  }
}

impl Host for RecordingHost {
  fn claim_sessions(&self) -> Result<usize> {
    if self.refuse_claims {
      return Err(eyre!("no sessions to claim"));
    }
    *self.claims.lock().unwrap() += 1;
    Ok(1)
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    self.notifications.lock().unwrap().push(notification.clone());
    Ok(())
  }

  fn open_window(&self, target: &str) -> Result<()> {
    self.windows.lock().unwrap().push(target.to_string());
    Ok(())
  }
}

/// In-memory store whose namespace deletes always fail.
#[derive(Default)]
pub struct UndeletableStorage {
  inner: MemoryStorage,
}

impl UndeletableStorage {
  pub fn inner(&self) -> &MemoryStorage {
    &self.inner
  }
}

impl CacheStorage for UndeletableStorage {
  fn open(&self, namespace: &str) -> Result<()> {
    self.inner.open(namespace)
  }

  fn match_entry(&self, namespace: &str, url: &str) -> Result<Option<CachedResponse>> {
    self.inner.match_entry(namespace, url)
  }

  fn put(&self, namespace: &str, url: &str, response: &Response) -> Result<()> {
    self.inner.put(namespace, url, response)
  }

  fn delete(&self, namespace: &str) -> Result<bool> {
    Err(eyre!("disk I/O error deleting {}", namespace))
  }

  fn list_namespaces(&self) -> Result<BTreeSet<String>> {
    self.inner.list_namespaces()
  }
}

impl QueueStorage for UndeletableStorage {
  fn push(&self, tag: &str, payload: &[u8]) -> Result<SyncEntry> {
    self.inner.push(tag, payload)
  }

  fn pending(&self, tag: &str) -> Result<Vec<SyncEntry>> {
    self.inner.pending(tag)
  }

  fn remove(&self, seq: u64) -> Result<()> {
    self.inner.remove(seq)
  }
}

impl MetaStorage for UndeletableStorage {
  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    self.inner.get_meta(key)
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    self.inner.set_meta(key, value)
  }
}

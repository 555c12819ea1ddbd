//! Deferred sync queue: locally recorded user actions awaiting remote acknowledgment.
//!
//! Entries are delivered oldest first. The first failed delivery stops the
//! drain, so nothing is ever delivered ahead of an entry queued before it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::QueueStorage;
use crate::error::SyncError;

/// Connect timeout for sync delivery.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A queued payload. The payload bytes belong to the calling application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
  /// Monotonically assigned sequence number
  pub seq: u64,
  /// Queue the entry belongs to
  pub tag: String,
  pub payload: Vec<u8>,
  pub queued_at: DateTime<Utc>,
}

/// Delivers one entry to the remote endpoint.
///
/// Deliveries may be retried; deduplication is the endpoint's job.
#[async_trait]
pub trait Remote: Send + Sync {
  async fn deliver(&self, entry: &SyncEntry) -> Result<(), SyncError>;
}

/// POSTs payloads as JSON to a fixed endpoint.
#[derive(Clone)]
pub struct HttpRemote {
  client: Client,
  endpoint: Url,
}

impl HttpRemote {
  pub fn new(endpoint: Url) -> Result<Self> {
    let client = Client::builder()
      .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, endpoint })
  }
}

#[async_trait]
impl Remote for HttpRemote {
  async fn deliver(&self, entry: &SyncEntry) -> Result<(), SyncError> {
    let failure = |reason: String| SyncError::DeliveryFailure {
      seq: entry.seq,
      reason,
    };

    let response = self
      .client
      .post(self.endpoint.clone())
      .header(reqwest::header::CONTENT_TYPE, "application/json")
      .header("x-sync-seq", entry.seq.to_string())
      .body(entry.payload.clone())
      .send()
      .await
      .map_err(|e| failure(e.to_string()))?;

    if response.status().is_success() {
      Ok(())
    } else {
      Err(failure(format!("status {}", response.status())))
    }
  }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  /// Sequence numbers acknowledged and removed, in delivery order
  pub delivered: Vec<u64>,
  /// Entries still queued afterwards
  pub remaining: usize,
  /// The failure that stopped the drain, if any
  pub failure: Option<SyncError>,
}

pub struct SyncQueue<S: QueueStorage> {
  storage: Arc<S>,
  tag: String,
  /// Serializes drains so two triggers cannot deliver out of order
  draining: Mutex<()>,
}

impl<S: QueueStorage> SyncQueue<S> {
  pub fn new(storage: Arc<S>, tag: impl Into<String>) -> Self {
    Self {
      storage,
      tag: tag.into(),
      draining: Mutex::new(()),
    }
  }

  pub fn tag(&self) -> &str {
    &self.tag
  }

  /// Record a payload locally. Does not touch the network.
  pub fn enqueue(&self, payload: &[u8]) -> Result<SyncEntry> {
    let entry = self.storage.push(&self.tag, payload)?;
    debug!(tag = %self.tag, seq = entry.seq, bytes = payload.len(), "Queued for sync");
    Ok(entry)
  }

  pub fn pending(&self) -> Result<Vec<SyncEntry>> {
    self.storage.pending(&self.tag)
  }

  /// Deliver queued entries in FIFO order, stopping at the first failure.
  pub async fn drain<R: Remote>(&self, remote: &R) -> Result<DrainReport> {
    let _guard = self.draining.lock().await;
    let pending = self.storage.pending(&self.tag)?;
    let mut report = DrainReport::default();

    for (idx, entry) in pending.iter().enumerate() {
      match remote.deliver(entry).await {
        Ok(()) => {
          self.storage.remove(entry.seq)?;
          debug!(tag = %self.tag, seq = entry.seq, "Sync entry delivered");
          report.delivered.push(entry.seq);
        }
        Err(e) => {
          warn!(tag = %self.tag, seq = entry.seq, error = %e, "Sync delivery failed, will retry on next trigger");
          report.remaining = pending.len() - idx;
          report.failure = Some(e);
          return Ok(report);
        }
      }
    }

    info!(tag = %self.tag, delivered = report.delivered.len(), "Sync queue drained");
    Ok(report)
  }
}

//! Request and response snapshots, plus metadata about where a response came from.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body served when neither network nor cache can answer a non-data request.
pub const OFFLINE_TEXT: &str = "Content not available offline";

/// Error message carried in the JSON body for unavailable data assets.
pub const OFFLINE_DATA_ERROR: &str = "Data not available offline";

/// Status of every synthetic "unavailable" response.
pub const STATUS_UNAVAILABLE: u16 = 503;

/// An outgoing content request as seen by the interception layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub url: String,
  pub method: String,
  pub headers: BTreeMap<String, String>,
}

impl Request {
  pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      method: method.into(),
      headers: BTreeMap::new(),
    }
  }

  /// Shorthand for a GET request, which is what almost every caller sends.
  pub fn get(url: impl Into<String>) -> Self {
    Self::new("GET", url)
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into().to_ascii_lowercase(), value.into());
    self
  }

  /// Only GET requests are ever read from or written to a namespace.
  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  /// Same request aimed at another URL (used to serve the shell document).
  pub fn retarget(&self, url: &str) -> Self {
    Self {
      url: url.to_string(),
      method: self.method.clone(),
      headers: self.headers.clone(),
    }
  }
}

/// Immutable snapshot of a response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default)]
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  /// Header names are stored lowercased.
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into().to_ascii_lowercase(), value.into());
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  /// Only a plain 200 counts as success. Partial content is never cached.
  pub fn is_success(&self) -> bool {
    self.status == 200
  }

  pub fn text(&self) -> Cow<'_, str> {
    String::from_utf8_lossy(&self.body)
  }

  /// Synthetic plain-text "unavailable offline" response.
  pub fn unavailable_text() -> Self {
    Self::new(STATUS_UNAVAILABLE, OFFLINE_TEXT).with_header("content-type", "text/plain")
  }

  /// Synthetic machine-readable "unavailable offline" response for data assets.
  pub fn unavailable_json() -> Self {
    let body = serde_json::json!({ "error": OFFLINE_DATA_ERROR }).to_string();
    Self::new(STATUS_UNAVAILABLE, body).with_header("content-type", "application/json")
  }
}

/// A response stored in a namespace.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored snapshot
  pub response: Response,
  /// When the snapshot was stored
  pub stored_at: DateTime<Utc>,
}

/// Result from a strategy run, including the data and where it came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Data served from a namespace.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Synthetic data produced because network and cache were both exhausted.
  pub fn unavailable(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Unavailable,
      cached_at: None,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Stored snapshot from a namespace
  Cache,
  /// Network and cache exhausted, synthetic response
  Unavailable,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      CacheSource::Network => "network",
      CacheSource::Cache => "cache",
      CacheSource::Unavailable => "unavailable",
    };
    f.write_str(label)
  }
}

//! Periodic refresh of the data namespace when the server publishes a newer data version.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::{Request, Store};
use crate::classifier::Classifier;
use crate::manifest::Manifest;
use crate::network::Network;
use crate::registry::{Purpose, VersionRegistry};

/// Metadata key holding the data version currently cached.
pub const DATA_VERSION_KEY: &str = "data_version";

/// Data version assumed before the first refresh.
const INITIAL_DATA_VERSION: u64 = 1;

#[derive(Debug, Deserialize)]
struct VersionResponse {
  version: u64,
}

pub struct DataRefresher<S: Store, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  registry: Arc<VersionRegistry>,
  classifier: Arc<Classifier>,
  manifest: Arc<Manifest>,
  version_endpoint: String,
}

impl<S: Store, N: Network> DataRefresher<S, N> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<N>,
    registry: Arc<VersionRegistry>,
    classifier: Arc<Classifier>,
    manifest: Arc<Manifest>,
    version_endpoint: impl Into<String>,
  ) -> Self {
    Self {
      storage,
      network,
      registry,
      classifier,
      manifest,
      version_endpoint: version_endpoint.into(),
    }
  }

  pub fn cached_version(&self) -> Result<u64> {
    match self.storage.get_meta(DATA_VERSION_KEY)? {
      Some(raw) => raw
        .parse()
        .map_err(|e| eyre!("Invalid stored data version '{}': {}", raw, e)),
      None => Ok(INITIAL_DATA_VERSION),
    }
  }

  /// Check the server's data version and re-fetch the data manifest if it is newer.
  ///
  /// Returns the new version when a refresh happened. The stored version only
  /// advances when every data asset was refreshed, so a partial refresh is
  /// retried on the next trigger.
  pub async fn refresh(&self) -> Result<Option<u64>> {
    let response = self
      .network
      .fetch(&Request::get(self.version_endpoint.as_str()))
      .await
      .map_err(|e| eyre!("Failed to fetch data version: {}", e))?;
    if !response.is_success() {
      return Err(eyre!("Data version endpoint returned {}", response.status));
    }

    let remote: VersionResponse = serde_json::from_slice(&response.body)
      .map_err(|e| eyre!("Failed to parse data version: {}", e))?;
    let cached = self.cached_version()?;
    if remote.version <= cached {
      debug!(cached, remote = remote.version, "Data is up to date");
      return Ok(None);
    }

    let namespace = self
      .registry
      .namespace(Purpose::Data)
      .ok_or_else(|| eyre!("No current data namespace"))?;

    let mut failed = 0usize;
    for url in self.manifest.entries(Purpose::Data) {
      match self.network.fetch(&Request::get(url.as_str())).await {
        Ok(fresh) if fresh.is_success() => {
          self
            .storage
            .put(&namespace.name, &self.classifier.normalize(url), &fresh)?;
        }
        Ok(fresh) => {
          warn!(url = %url, status = fresh.status, "Data refresh got non-success status");
          failed += 1;
        }
        Err(e) => {
          warn!(url = %url, error = %e, "Data refresh fetch failed");
          failed += 1;
        }
      }
    }

    if failed > 0 {
      return Err(eyre!("{} data assets could not be refreshed", failed));
    }

    self
      .storage
      .set_meta(DATA_VERSION_KEY, &remote.version.to_string())?;
    info!(from = cached, to = remote.version, "Data refreshed");
    Ok(Some(remote.version))
  }
}

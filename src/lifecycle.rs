//! Worker lifecycle: install, activate, and hand-over to the next version.
//!
//! `Installing -> Waiting -> Activating -> Active -> Redundant`
//!
//! Installation warms every current namespace from the manifest and is
//! all-or-nothing. Activation evicts every namespace the registry does not
//! list as current, then claims open sessions.

use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use crate::cache::{Request, Response, Store};
use crate::classifier::Classifier;
use crate::error::LifecycleError;
use crate::host::Host;
use crate::manifest::Manifest;
use crate::network::Network;
use crate::registry::VersionRegistry;

/// Metadata key holding the fingerprint of the last activated manifest.
pub const FINGERPRINT_KEY: &str = "manifest_fingerprint";

/// Metadata key holding the version tag of the last activated worker.
pub const ACTIVE_VERSION_KEY: &str = "active_version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  Waiting,
  Activating,
  Active,
  Redundant,
}

impl fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      LifecycleState::Installing => "installing",
      LifecycleState::Waiting => "waiting",
      LifecycleState::Activating => "activating",
      LifecycleState::Active => "active",
      LifecycleState::Redundant => "redundant",
    };
    f.write_str(label)
  }
}

/// One planned pre-warm fetch.
struct WarmJob {
  namespace: String,
  key: String,
  url: String,
}

pub struct Lifecycle<S: Store, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  registry: Arc<VersionRegistry>,
  classifier: Arc<Classifier>,
  manifest: Arc<Manifest>,
  state: LifecycleState,
}

impl<S: Store, N: Network> Lifecycle<S, N> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<N>,
    registry: Arc<VersionRegistry>,
    classifier: Arc<Classifier>,
    manifest: Arc<Manifest>,
  ) -> Self {
    Self {
      storage,
      network,
      registry,
      classifier,
      manifest,
      state: LifecycleState::Installing,
    }
  }

  pub fn state(&self) -> LifecycleState {
    self.state
  }

  pub fn fingerprint(&self) -> String {
    self.manifest.fingerprint(self.registry.version())
  }

  /// Whether the store was last activated with a different manifest or version.
  pub fn needs_install(&self) -> Result<bool, LifecycleError> {
    let active = self
      .storage
      .get_meta(FINGERPRINT_KEY)
      .map_err(|e| LifecycleError::Storage(e.to_string()))?;
    Ok(active.as_deref() != Some(self.fingerprint().as_str()))
  }

  /// Pre-warm every current namespace from the manifest.
  ///
  /// All fetches complete before anything is written. Any transport failure
  /// or non-200 status aborts the install, leaves the store untouched and
  /// makes this instance redundant; the previous version stays in control.
  pub async fn install(&mut self) -> Result<(), LifecycleError> {
    self.expect(LifecycleState::Installing, "install")?;
    info!(version = self.registry.version(), entries = self.manifest.len(), "Installing");
    if self.manifest.is_empty() {
      warn!(version = self.registry.version(), "Manifest is empty, nothing to pre-warm");
    }

    let manifest = &self.manifest;
    let classifier = &self.classifier;
    let jobs: Vec<WarmJob> = self
      .registry
      .current()
      .flat_map(|ns| {
        manifest.entries(ns.purpose).iter().map(move |url| WarmJob {
          namespace: ns.name.clone(),
          key: classifier.normalize(url),
          url: url.clone(),
        })
      })
      .collect();

    let network = &self.network;
    let fetched = try_join_all(jobs.iter().map(|job| async move {
      let failure = |reason: String| LifecycleError::InstallationFailure {
        url: job.url.clone(),
        reason,
      };
      match network.fetch(&Request::get(job.url.as_str())).await {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(failure(format!("status {}", response.status))),
        Err(e) => Err(failure(e.to_string())),
      }
    }))
    .await;

    let responses = match fetched {
      Ok(responses) => responses,
      Err(e) => {
        error!(version = self.registry.version(), error = %e, "Installation failed");
        self.state = LifecycleState::Redundant;
        return Err(e);
      }
    };

    if let Err(e) = self.write_all(&jobs, &responses) {
      error!(version = self.registry.version(), error = %e, "Installation failed");
      self.state = LifecycleState::Redundant;
      return Err(e);
    }

    self.state = LifecycleState::Waiting;
    info!(version = self.registry.version(), "Installed, skipping wait");
    Ok(())
  }

  /// Write warmed responses. On failure, namespaces this install created are
  /// dropped again so a half-warmed version never lingers.
  fn write_all(&self, jobs: &[WarmJob], responses: &[Response]) -> Result<(), LifecycleError> {
    let storage_err = |e: color_eyre::Report| LifecycleError::Storage(e.to_string());
    let existing = self.storage.list_namespaces().map_err(storage_err)?;

    if let Err(e) = self.warm(jobs, responses) {
      for ns in self.registry.current() {
        if !existing.contains(&ns.name) {
          if let Err(cleanup) = self.storage.delete(&ns.name) {
            warn!(namespace = %ns.name, error = %cleanup, "Failed to roll back namespace");
          }
        }
      }
      return Err(storage_err(e));
    }
    Ok(())
  }

  fn warm(&self, jobs: &[WarmJob], responses: &[Response]) -> color_eyre::Result<()> {
    for ns in self.registry.current() {
      self.storage.open(&ns.name)?;
    }
    for (job, response) in jobs.iter().zip(responses) {
      self.storage.put(&job.namespace, &job.key, response)?;
      debug!(namespace = %job.namespace, url = %job.key, "Pre-warmed");
    }
    Ok(())
  }

  /// Evict stale namespaces, then claim open sessions.
  ///
  /// Returns the evicted namespace names. Eviction finishes before any
  /// session is claimed.
  pub async fn activate<H: Host>(&mut self, host: &H) -> Result<Vec<String>, LifecycleError> {
    self.expect(LifecycleState::Waiting, "activate")?;
    self.state = LifecycleState::Activating;
    info!(version = self.registry.version(), "Activating");

    let evicted = match self.evict_and_record() {
      Ok(evicted) => evicted,
      Err(e) => {
        error!(version = self.registry.version(), error = %e, "Activation failed");
        self.state = LifecycleState::Redundant;
        return Err(e);
      }
    };

    match host.claim_sessions() {
      Ok(claimed) => debug!(claimed, "Claimed open sessions"),
      Err(e) => warn!(error = %e, "Failed to claim sessions, they pick up the new version on reload"),
    }

    self.state = LifecycleState::Active;
    info!(version = self.registry.version(), evicted = evicted.len(), "Activated");
    Ok(evicted)
  }

  fn evict_and_record(&self) -> Result<Vec<String>, LifecycleError> {
    let storage_err = |e: color_eyre::Report| LifecycleError::Storage(e.to_string());
    let existing = self.storage.list_namespaces().map_err(storage_err)?;

    let mut evicted = Vec::new();
    for name in self.registry.stale(&existing) {
      self.storage.delete(name).map_err(storage_err)?;
      info!(namespace = name, "Evicted stale namespace");
      evicted.push(name.to_string());
    }

    self
      .storage
      .set_meta(FINGERPRINT_KEY, &self.fingerprint())
      .map_err(storage_err)?;
    self
      .storage
      .set_meta(ACTIVE_VERSION_KEY, self.registry.version())
      .map_err(storage_err)?;
    Ok(evicted)
  }

  /// A newer install took over.
  pub fn supersede(&mut self) {
    if self.state != LifecycleState::Redundant {
      info!(version = self.registry.version(), from = %self.state, "Superseded");
      self.state = LifecycleState::Redundant;
    }
  }

  fn expect(&self, state: LifecycleState, action: &'static str) -> Result<(), LifecycleError> {
    if self.state == state {
      Ok(())
    } else {
      Err(LifecycleError::InvalidTransition {
        action,
        state: self.state,
      })
    }
  }
}

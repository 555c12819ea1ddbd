//! Typed failures of the interception layer.
//!
//! Only background operations and lifecycle phases surface these. A request
//! that exhausts both network and cache gets a synthetic 503 response instead.

use thiserror::Error;

use crate::lifecycle::LifecycleState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
  #[error("Invalid URL '{url}': {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("Request to {url} failed: {reason}")]
  Transport { url: String, reason: String },

  /// The request timed out or its context went away; handled like any transport failure.
  #[error("Request to {url} was aborted")]
  Aborted { url: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
  #[error("Installation failed for {url}: {reason}")]
  InstallationFailure { url: String, reason: String },

  #[error("Cannot {action} while {state}")]
  InvalidTransition {
    action: &'static str,
    state: LifecycleState,
  },

  #[error("Storage error: {0}")]
  Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
  #[error("Delivery of sync entry {seq} failed: {reason}")]
  DeliveryFailure { seq: u64, reason: String },
}

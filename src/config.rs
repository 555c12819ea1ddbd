use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::manifest::Manifest;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL that relative request URLs resolve against
  pub origin: String,
  /// Version tag baked into every namespace name (e.g. "v2")
  pub version: String,
  /// Namespace name prefix (e.g. "satify")
  pub cache_prefix: String,
  pub manifest: Manifest,
  pub classifier: ClassifierConfig,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
  pub data_refresh: DataRefreshConfig,
  /// Database location (default: $XDG_DATA_HOME/satify/offline.db)
  pub database: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      version: "v2".to_string(),
      cache_prefix: "satify".to_string(),
      manifest: Manifest::default(),
      classifier: ClassifierConfig::default(),
      sync: SyncConfig::default(),
      notifications: NotificationConfig::default(),
      data_refresh: DataRefreshConfig::default(),
      database: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
  /// Hosts whose scripts are treated as static assets (subdomains included)
  pub third_party_origins: Vec<String>,
  /// Path segment marking data requests
  pub data_root: String,
  /// Data sub-path accepted even without a `.json` suffix
  pub data_subpath: String,
  /// The document every app-shell request is answered with
  pub shell_document: String,
  /// First path segment of API routes, never treated as app shell
  pub api_root: String,
}

impl Default for ClassifierConfig {
  fn default() -> Self {
    Self {
      third_party_origins: vec!["polyfill.io".to_string(), "cdn.jsdelivr.net".to_string()],
      data_root: "/data/".to_string(),
      data_subpath: "chunks/".to_string(),
      shell_document: "/index.html".to_string(),
      api_root: "api".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Remote endpoint queued payloads are POSTed to
  pub endpoint: String,
  /// Sync tag that drains the user-data queue
  pub tag: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      endpoint: "/api/sessions".to_string(),
      tag: "user-data".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationActionConfig {
  pub action: String,
  pub title: String,
  pub icon: Option<String>,
  /// Navigation target; `None` makes this a dismiss action
  pub target: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  pub icon: String,
  pub badge: String,
  /// Vibration pattern in milliseconds
  pub vibrate: Vec<u32>,
  pub actions: Vec<NotificationActionConfig>,
  /// Where unknown or absent actions navigate to
  pub default_target: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "SATify".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/badge-72x72.png".to_string(),
      vibrate: vec![100, 50, 100],
      actions: vec![
        NotificationActionConfig {
          action: "explore".to_string(),
          title: "Practice Now".to_string(),
          icon: Some("/icons/practice-action.png".to_string()),
          target: Some("/?mode=practice".to_string()),
        },
        NotificationActionConfig {
          action: "close".to_string(),
          title: "Close".to_string(),
          icon: Some("/icons/close-action.png".to_string()),
          target: None,
        },
      ],
      default_target: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataRefreshConfig {
  /// Periodic sync tag that triggers a data refresh
  pub tag: String,
  /// Endpoint returning `{"version": <n>}`
  pub version_endpoint: String,
}

impl Default for DataRefreshConfig {
  fn default() -> Self {
    Self {
      tag: "update-questions".to_string(),
      version_endpoint: "/api/questions/version".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./satify.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/satify/config.yaml
  ///
  /// Without any file the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("satify.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("satify").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    url::Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    Ok(())
  }
}

//! Deploy-time manifest of URLs to pre-warm, one list per namespace purpose.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::registry::Purpose;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
  /// Same-origin assets and third-party scripts, immutable per deploy
  pub static_assets: Vec<String>,
  /// JSON data fetched network-first at runtime
  pub data_assets: Vec<String>,
  /// The shell document
  pub shell: Vec<String>,
}

impl Default for Manifest {
  fn default() -> Self {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
    Self {
      static_assets: owned(&[
        "/styles.css",
        "/js/app.js",
        "/js/auth.js",
        "/js/practice.js",
        "/js/analytics.js",
        "/manifest.json",
        "https://polyfill.io/v3/polyfill.min.js?features=es6",
        "https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js",
      ]),
      data_assets: owned(&["/data/manifest.json", "/data/lookup.json"]),
      shell: owned(&["/index.html"]),
    }
  }
}

impl Manifest {
  pub fn entries(&self, purpose: Purpose) -> &[String] {
    match purpose {
      Purpose::Static => &self.static_assets,
      Purpose::Data => &self.data_assets,
      Purpose::AppShell => &self.shell,
    }
  }

  pub fn len(&self) -> usize {
    self.static_assets.len() + self.data_assets.len() + self.shell.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// SHA-256 over the version tag and every list, hex encoded.
  ///
  /// Two deploys with the same fingerprint serve identical pre-warmed content.
  pub fn fingerprint(&self, version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(version.as_bytes());
    for purpose in Purpose::ALL {
      hasher.update([0u8]);
      hasher.update(purpose.label().as_bytes());
      for url in self.entries(purpose) {
        hasher.update([b'\n']);
        hasher.update(url.as_bytes());
      }
    }
    hex::encode(hasher.finalize())
  }
}

//! Version registry: which namespaces are current and which are stale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a namespace holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
  Static,
  Data,
  AppShell,
}

impl Purpose {
  /// Every purpose a strategy can read or write.
  pub const ALL: [Purpose; 3] = [Purpose::Static, Purpose::Data, Purpose::AppShell];

  /// Short label used inside namespace names.
  pub fn label(self) -> &'static str {
    match self {
      Purpose::Static => "static",
      Purpose::Data => "data",
      Purpose::AppShell => "shell",
    }
  }
}

/// A named, isolated store of cached entries for one purpose and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
  pub name: String,
  pub purpose: Purpose,
}

/// Build a namespace name such as `satify-static-v2` (or `static-v2` without a prefix).
pub fn namespace_name(prefix: &str, purpose: Purpose, version: &str) -> String {
  if prefix.is_empty() {
    format!("{}-{}", purpose.label(), version)
  } else {
    format!("{}-{}-{}", prefix, purpose.label(), version)
  }
}

/// The ordered set of namespaces considered current for one version.
///
/// Built once from configuration and never mutated while serving requests.
/// Any namespace not listed here is eligible for eviction.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
  version: String,
  current: Vec<Namespace>,
}

impl VersionRegistry {
  /// Registry covering every purpose in [`Purpose::ALL`].
  ///
  /// The current set is derived from the purposes the strategies use, so a new
  /// purpose gets a current namespace without anyone editing a list of names.
  pub fn new(prefix: &str, version: &str) -> Self {
    Self::with_purposes(prefix, version, Purpose::ALL)
  }

  /// Registry covering only the given purposes (duplicates are ignored).
  pub fn with_purposes(
    prefix: &str,
    version: &str,
    purposes: impl IntoIterator<Item = Purpose>,
  ) -> Self {
    let mut current: Vec<Namespace> = Vec::new();
    for purpose in purposes {
      if current.iter().any(|ns| ns.purpose == purpose) {
        continue;
      }
      current.push(Namespace {
        name: namespace_name(prefix, purpose, version),
        purpose,
      });
    }

    Self {
      version: version.to_string(),
      current,
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// The current namespace for a purpose, if this registry serves it.
  pub fn namespace(&self, purpose: Purpose) -> Option<&Namespace> {
    self.current.iter().find(|ns| ns.purpose == purpose)
  }

  /// Current namespaces in registry order.
  pub fn current(&self) -> impl Iterator<Item = &Namespace> {
    self.current.iter()
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.current.iter().any(|ns| ns.name == name)
  }

  /// Names from `existing` that are not current.
  pub fn stale<'a>(&self, existing: &'a BTreeSet<String>) -> Vec<&'a str> {
    existing
      .iter()
      .filter(|name| !self.is_current(name))
      .map(String::as_str)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_namespace_names() {
    assert_eq!(namespace_name("satify", Purpose::Static, "v2"), "satify-static-v2");
    assert_eq!(namespace_name("", Purpose::Data, "v2"), "data-v2");
    assert_eq!(namespace_name("satify", Purpose::AppShell, "v3"), "satify-shell-v3");
  }

  #[test]
  fn test_one_current_namespace_per_purpose() {
    let registry = VersionRegistry::with_purposes(
      "",
      "v2",
      [Purpose::Static, Purpose::Data, Purpose::Static],
    );
    let names: Vec<_> = registry.current().map(|ns| ns.name.as_str()).collect();
    assert_eq!(names, vec!["static-v2", "data-v2"]);
    assert!(registry.namespace(Purpose::AppShell).is_none());
  }

  #[test]
  fn test_default_registry_covers_every_purpose() {
    let registry = VersionRegistry::new("satify", "v2");
    for purpose in Purpose::ALL {
      assert!(registry.namespace(purpose).is_some());
    }
  }

  #[test]
  fn test_stale_names() {
    let registry = VersionRegistry::with_purposes("", "v2", [Purpose::Static, Purpose::Data]);
    let existing: BTreeSet<String> = ["static-v1", "static-v2", "data-v2", "legacy"]
      .into_iter()
      .map(String::from)
      .collect();

    assert_eq!(registry.stale(&existing), vec!["legacy", "static-v1"]);
  }
}

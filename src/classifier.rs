//! Request classification: which strategy serves a request.
//!
//! Rules are evaluated in order and the first match wins:
//! 1. non-GET requests are `other` and never cached
//! 2. manifest static assets and third-party script origins are `static-asset`
//! 3. same-origin paths under the data root ending in `.json` (or under the
//!    data sub-path) are `data-asset`
//! 4. the root, the shell document, and extension-less paths outside the API
//!    root are `app-shell`
//! 5. everything else is `other`

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::config::ClassifierConfig;
use crate::manifest::Manifest;

/// Request category, one per strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
  StaticAsset,
  DataAsset,
  AppShell,
  Other,
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Category::StaticAsset => "static-asset",
      Category::DataAsset => "data-asset",
      Category::AppShell => "app-shell",
      Category::Other => "other",
    };
    f.write_str(label)
  }
}

/// Pure mapping from `(url, method)` to a [`Category`].
#[derive(Debug, Clone)]
pub struct Classifier {
  origin: Url,
  static_allow: HashSet<String>,
  third_party_hosts: Vec<String>,
  data_root: String,
  data_subpath: String,
  shell_document: String,
  api_root: String,
}

impl Classifier {
  pub fn new(origin: Url, manifest: &Manifest, rules: &ClassifierConfig) -> Self {
    let mut classifier = Self {
      origin,
      static_allow: HashSet::new(),
      third_party_hosts: rules
        .third_party_origins
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect(),
      data_root: rules.data_root.clone(),
      data_subpath: rules.data_subpath.clone(),
      shell_document: String::new(),
      api_root: rules.api_root.trim_matches('/').to_string(),
    };
    classifier.static_allow = manifest
      .static_assets
      .iter()
      .map(|url| classifier.normalize(url))
      .collect();
    classifier.shell_document = classifier.normalize(&rules.shell_document);
    classifier
  }

  /// Cache key of the shell document.
  pub fn shell_document(&self) -> &str {
    &self.shell_document
  }

  /// Resolve a possibly relative URL against the origin.
  pub fn resolve(&self, url: &str) -> Option<Url> {
    self.origin.join(url).ok()
  }

  /// Normalized cache key for a request URL.
  ///
  /// Same-origin URLs become `path[?query]`; cross-origin URLs keep their full
  /// form. Fragments never take part in the key.
  pub fn normalize(&self, url: &str) -> String {
    match self.resolve(url) {
      Some(mut resolved) => {
        resolved.set_fragment(None);
        if self.is_same_origin(&resolved) {
          match resolved.query() {
            Some(query) => format!("{}?{}", resolved.path(), query),
            None => resolved.path().to_string(),
          }
        } else {
          resolved.to_string()
        }
      }
      None => url.trim().to_string(),
    }
  }

  pub fn classify(&self, url: &str, method: &str) -> Category {
    if !method.eq_ignore_ascii_case("GET") {
      return Category::Other;
    }

    let resolved = match self.resolve(url) {
      Some(resolved) => resolved,
      None => return Category::Other,
    };

    if self.static_allow.contains(&self.normalize(url)) || self.is_third_party(&resolved) {
      return Category::StaticAsset;
    }

    if !self.is_same_origin(&resolved) {
      return Category::Other;
    }

    let path = resolved.path();
    if self.is_data_path(path) {
      return Category::DataAsset;
    }

    if self.is_shell_path(path) {
      return Category::AppShell;
    }

    Category::Other
  }

  fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  fn is_third_party(&self, url: &Url) -> bool {
    let host = match url.host_str() {
      Some(host) => host.to_ascii_lowercase(),
      None => return false,
    };
    self
      .third_party_hosts
      .iter()
      .any(|allowed| host == *allowed || host.ends_with(&format!(".{}", allowed)))
  }

  fn is_data_path(&self, path: &str) -> bool {
    let Some(idx) = path.find(&self.data_root) else {
      return false;
    };
    let rest = &path[idx + self.data_root.len()..];
    path.ends_with(".json") || (!self.data_subpath.is_empty() && rest.contains(&self.data_subpath))
  }

  fn is_shell_path(&self, path: &str) -> bool {
    if path == "/" || path == self.shell_document {
      return true;
    }

    let mut segments = path.trim_start_matches('/').split('/');
    let under_api = segments.next() == Some(self.api_root.as_str());
    let last = path.rsplit('/').next().unwrap_or_default();
    !under_api && !last.contains('.')
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    Classifier::new(
      Url::parse("https://satify.example.com").unwrap(),
      &Manifest::default(),
      &ClassifierConfig::default(),
    )
  }

  #[test]
  fn test_non_get_is_other() {
    let c = classifier();
    assert_eq!(c.classify("/styles.css", "POST"), Category::Other);
    assert_eq!(c.classify("/data/lookup.json", "PUT"), Category::Other);
    assert_eq!(c.classify("/", "DELETE"), Category::Other);
  }

  #[test]
  fn test_method_is_case_insensitive() {
    assert_eq!(classifier().classify("/styles.css", "get"), Category::StaticAsset);
  }

  #[test]
  fn test_static_assets() {
    let c = classifier();
    assert_eq!(c.classify("/styles.css", "GET"), Category::StaticAsset);
    assert_eq!(
      c.classify("https://satify.example.com/js/app.js", "GET"),
      Category::StaticAsset
    );
    assert_eq!(
      c.classify("https://cdn.jsdelivr.net/npm/mathjax@3/es5/input/tex.js", "GET"),
      Category::StaticAsset
    );
    assert_eq!(
      c.classify("https://polyfill.io/v3/polyfill.min.js?features=es6", "GET"),
      Category::StaticAsset
    );
  }

  #[test]
  fn test_unlisted_same_origin_script_is_other() {
    assert_eq!(classifier().classify("/js/unknown.js", "GET"), Category::Other);
  }

  #[test]
  fn test_data_assets() {
    let c = classifier();
    assert_eq!(c.classify("/data/lookup.json", "GET"), Category::DataAsset);
    assert_eq!(c.classify("/data/topics/algebra.json", "GET"), Category::DataAsset);
    assert_eq!(c.classify("/data/chunks/0001", "GET"), Category::DataAsset);
    assert_eq!(c.classify("/data/readme.txt", "GET"), Category::Other);
  }

  #[test]
  fn test_static_wins_ties_with_data() {
    let manifest = Manifest {
      static_assets: vec!["/data/lookup.json".to_string()],
      ..Manifest::default()
    };
    let c = Classifier::new(
      Url::parse("https://satify.example.com").unwrap(),
      &manifest,
      &ClassifierConfig::default(),
    );
    assert_eq!(c.classify("/data/lookup.json", "GET"), Category::StaticAsset);
  }

  #[test]
  fn test_app_shell() {
    let c = classifier();
    assert_eq!(c.classify("/", "GET"), Category::AppShell);
    assert_eq!(c.classify("/?mode=practice", "GET"), Category::AppShell);
    assert_eq!(c.classify("/index.html", "GET"), Category::AppShell);
    assert_eq!(c.classify("/practice/vocab", "GET"), Category::AppShell);
    assert_eq!(c.classify("/api/questions/version", "GET"), Category::Other);
    assert_eq!(c.classify("/images/logo.png", "GET"), Category::Other);
  }

  #[test]
  fn test_cross_origin_is_other() {
    let c = classifier();
    assert_eq!(c.classify("https://elsewhere.example.org/", "GET"), Category::Other);
    assert_eq!(
      c.classify("https://elsewhere.example.org/data/lookup.json", "GET"),
      Category::Other
    );
  }

  #[test]
  fn test_normalize() {
    let c = classifier();
    assert_eq!(c.normalize("/styles.css#top"), "/styles.css");
    assert_eq!(c.normalize("https://satify.example.com/data/a.json?x=1"), "/data/a.json?x=1");
    assert_eq!(
      c.normalize("https://cdn.jsdelivr.net/npm/x.js"),
      "https://cdn.jsdelivr.net/npm/x.js"
    );
    assert_eq!(c.shell_document(), "/index.html");
  }
}

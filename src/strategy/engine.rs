//! Interpreter that runs a strategy's steps against storage and network.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Scope, Step, Strategy, Target};
use crate::cache::{CacheResult, CacheStorage, CachedResponse, Request, Response};
use crate::classifier::{Category, Classifier};
use crate::network::Network;
use crate::registry::{Purpose, VersionRegistry};

/// Serves intercepted requests through the strategy of their category.
///
/// The registry and classifier are fixed at construction, so two engines
/// for different versions can share one store side by side.
pub struct StrategyEngine<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  registry: Arc<VersionRegistry>,
  classifier: Arc<Classifier>,
}

impl<S: CacheStorage, N: Network> StrategyEngine<S, N> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<N>,
    registry: Arc<VersionRegistry>,
    classifier: Arc<Classifier>,
  ) -> Self {
    Self {
      storage,
      network,
      registry,
      classifier,
    }
  }

  pub fn classify(&self, request: &Request) -> Category {
    self.classifier.classify(&request.url, &request.method)
  }

  /// Classify a request and serve it. Never fails: the last resort is a
  /// synthetic 503.
  pub async fn handle(&self, request: &Request) -> CacheResult<Response> {
    let category = self.classify(request);
    let strategy = Strategy::for_category(category);
    debug!(url = %request.url, %category, strategy = strategy.name, "Intercepted request");
    self.run(strategy, request).await
  }

  /// Run `strategy`'s steps in order until one yields a response.
  pub async fn run(&self, strategy: &Strategy, request: &Request) -> CacheResult<Response> {
    for step in strategy.steps {
      match *step {
        Step::Cache { .. } if !request.is_get() => {
          debug!(url = %request.url, method = %request.method, "Skipping cache for non-GET request");
        }
        Step::Cache { scope, target } => {
          let key = self.key(request, target);
          if let Some(hit) = self.lookup(scope, &key) {
            debug!(url = %key, strategy = strategy.name, "Served from cache");
            return CacheResult::from_cache(hit.response, hit.stored_at);
          }
          debug!(url = %key, strategy = strategy.name, "Cache miss");
        }
        Step::Network {
          target,
          store_in,
          require_success,
        } => {
          let outgoing = match target {
            Target::Request => request.clone(),
            Target::ShellDocument => request.retarget(self.classifier.shell_document()),
          };

          match self.network.fetch(&outgoing).await {
            Ok(response) if response.is_success() => {
              if let Some(purpose) = store_in.filter(|_| request.is_get()) {
                self.store(purpose, &self.key(request, target), &response);
              }
              return CacheResult::from_network(response);
            }
            Ok(response) if !require_success => {
              debug!(url = %outgoing.url, status = response.status, "Passing through non-success response");
              return CacheResult::from_network(response);
            }
            Ok(response) => {
              debug!(url = %outgoing.url, status = response.status, strategy = strategy.name, "Non-success status, falling back");
            }
            Err(e) => {
              debug!(url = %outgoing.url, error = %e, strategy = strategy.name, "Network failed, falling back");
            }
          }
        }
        Step::Unavailable(kind) => {
          warn!(url = %request.url, strategy = strategy.name, "Network and cache exhausted");
          return CacheResult::unavailable(kind.response());
        }
      }
    }

    warn!(url = %request.url, strategy = strategy.name, "Strategy ran out of steps");
    CacheResult::unavailable(Response::unavailable_text())
  }

  fn key(&self, request: &Request, target: Target) -> String {
    match target {
      Target::Request => self.classifier.normalize(&request.url),
      Target::ShellDocument => self.classifier.shell_document().to_string(),
    }
  }

  /// Storage errors on the read path count as a miss.
  fn lookup(&self, scope: Scope, key: &str) -> Option<CachedResponse> {
    let namespaces: Vec<&str> = match scope {
      Scope::Namespace(purpose) => self
        .registry
        .namespace(purpose)
        .map(|ns| vec![ns.name.as_str()])
        .unwrap_or_default(),
      Scope::Current => self.registry.current().map(|ns| ns.name.as_str()).collect(),
    };

    for namespace in namespaces {
      match self.storage.match_entry(namespace, key) {
        Ok(Some(hit)) => return Some(hit),
        Ok(None) => {}
        Err(e) => warn!(namespace, url = key, error = %e, "Cache read failed, treating as miss"),
      }
    }
    None
  }

  /// Completes before the response is returned. A failed write is logged and
  /// the response is still served.
  fn store(&self, purpose: Purpose, key: &str, response: &Response) {
    let Some(namespace) = self.registry.namespace(purpose) else {
      warn!(?purpose, url = key, "No current namespace, response not stored");
      return;
    };

    match self.storage.put(&namespace.name, key, response) {
      Ok(()) => debug!(namespace = %namespace.name, url = key, "Stored response"),
      Err(e) => warn!(namespace = %namespace.name, url = key, error = %e, "Cache write failed"),
    }
  }
}

impl<S: CacheStorage, N: Network> Clone for StrategyEngine<S, N> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
      registry: Arc::clone(&self.registry),
      classifier: Arc::clone(&self.classifier),
    }
  }
}

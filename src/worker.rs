//! The worker: every platform event routed to one typed contract.
//!
//! [`Worker::dispatch`] is the dispatch table. Each [`WorkerEvent`] variant maps
//! to exactly one handler, and every handler terminates in an
//! [`EventOutcome`]; nothing escapes to the caller as an unhandled failure.

use std::fmt;
use std::sync::Arc;

use color_eyre::{eyre::eyre, Report, Result};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheResult, Request, Response, Store};
use crate::classifier::{Category, Classifier};
use crate::config::Config;
use crate::error::LifecycleError;
use crate::host::Host;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::manifest::Manifest;
use crate::network::Network;
use crate::notify::{NavigationIntent, Notification, NotificationDispatcher};
use crate::refresh::DataRefresher;
use crate::registry::VersionRegistry;
use crate::strategy::StrategyEngine;
use crate::sync::{DrainReport, Remote, SyncEntry, SyncQueue};

/// An event delivered by the platform.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  /// Connectivity restored
  Sync { tag: String },
  PeriodicSync { tag: String },
  Push { payload: Option<String> },
  NotificationClick { action: Option<String> },
  /// A newer version activated and took over
  Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Install,
  Activate,
  Fetch,
  Sync,
  PeriodicSync,
  Push,
  NotificationClick,
  Superseded,
}

impl WorkerEvent {
  pub fn kind(&self) -> EventKind {
    match self {
      WorkerEvent::Install => EventKind::Install,
      WorkerEvent::Activate => EventKind::Activate,
      WorkerEvent::Fetch(_) => EventKind::Fetch,
      WorkerEvent::Sync { .. } => EventKind::Sync,
      WorkerEvent::PeriodicSync { .. } => EventKind::PeriodicSync,
      WorkerEvent::Push { .. } => EventKind::Push,
      WorkerEvent::NotificationClick { .. } => EventKind::NotificationClick,
      WorkerEvent::Superseded => EventKind::Superseded,
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      EventKind::Install => "install",
      EventKind::Activate => "activate",
      EventKind::Fetch => "fetch",
      EventKind::Sync => "sync",
      EventKind::PeriodicSync => "periodicsync",
      EventKind::Push => "push",
      EventKind::NotificationClick => "notificationclick",
      EventKind::Superseded => "superseded",
    };
    f.write_str(label)
  }
}

/// How an event ended.
#[derive(Debug)]
pub enum EventOutcome {
  Installed,
  Activated { evicted: Vec<String> },
  Response(CacheResult<Response>),
  Synced(DrainReport),
  DataRefreshed(Option<u64>),
  Notified(Option<Notification>),
  Navigated(NavigationIntent),
  Retired,
  /// The event carried a tag this worker does not handle
  Ignored,
  /// Logged and contained; lifecycle failures leave the previous version in control
  Failed { kind: EventKind, reason: String },
}

/// A namespace as seen by `status` and `namespaces`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceStatus {
  pub name: String,
  pub current: bool,
}

pub struct Worker<S: Store, N: Network, R: Remote, H: Host> {
  storage: Arc<S>,
  registry: Arc<VersionRegistry>,
  classifier: Arc<Classifier>,
  engine: StrategyEngine<S, N>,
  lifecycle: Mutex<Lifecycle<S, N>>,
  queue: SyncQueue<S>,
  refresher: DataRefresher<S, N>,
  notifier: NotificationDispatcher,
  refresh_tag: String,
  remote: R,
  host: H,
}

impl<S: Store, N: Network, R: Remote, H: Host> Worker<S, N, R, H> {
  /// Build a worker for the version described by `config`.
  pub fn new(config: &Config, storage: Arc<S>, network: Arc<N>, remote: R, host: H) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", config.origin, e))?;
    let manifest = Arc::new(config.manifest.clone());
    let registry = Arc::new(VersionRegistry::new(&config.cache_prefix, &config.version));
    let classifier = Arc::new(Classifier::new(origin, &manifest, &config.classifier));

    Ok(Self::from_parts(
      storage,
      network,
      registry,
      classifier,
      manifest,
      config,
      remote,
      host,
    ))
  }

  #[allow(clippy::too_many_arguments)]
  fn from_parts(
    storage: Arc<S>,
    network: Arc<N>,
    registry: Arc<VersionRegistry>,
    classifier: Arc<Classifier>,
    manifest: Arc<Manifest>,
    config: &Config,
    remote: R,
    host: H,
  ) -> Self {
    let engine = StrategyEngine::new(
      Arc::clone(&storage),
      Arc::clone(&network),
      Arc::clone(&registry),
      Arc::clone(&classifier),
    );
    let lifecycle = Lifecycle::new(
      Arc::clone(&storage),
      Arc::clone(&network),
      Arc::clone(&registry),
      Arc::clone(&classifier),
      Arc::clone(&manifest),
    );
    let refresher = DataRefresher::new(
      Arc::clone(&storage),
      network,
      Arc::clone(&registry),
      Arc::clone(&classifier),
      manifest,
      config.data_refresh.version_endpoint.clone(),
    );

    Self {
      queue: SyncQueue::new(Arc::clone(&storage), config.sync.tag.clone()),
      storage,
      registry,
      classifier,
      engine,
      lifecycle: Mutex::new(lifecycle),
      refresher,
      notifier: NotificationDispatcher::new(config.notifications.clone()),
      refresh_tag: config.data_refresh.tag.clone(),
      remote,
      host,
    }
  }

  pub fn registry(&self) -> &VersionRegistry {
    &self.registry
  }

  pub fn classify(&self, url: &str, method: &str) -> Category {
    self.classifier.classify(url, method)
  }

  pub async fn state(&self) -> LifecycleState {
    self.lifecycle.lock().await.state()
  }

  pub async fn fingerprint(&self) -> String {
    self.lifecycle.lock().await.fingerprint()
  }

  pub async fn needs_install(&self) -> Result<bool, LifecycleError> {
    self.lifecycle.lock().await.needs_install()
  }

  /// Route an event to its contract.
  pub async fn dispatch(&self, event: WorkerEvent) -> EventOutcome {
    let kind = event.kind();
    debug!(%kind, "Dispatching event");

    let outcome: Result<EventOutcome> = match event {
      WorkerEvent::Install => self
        .on_install()
        .await
        .map(|()| EventOutcome::Installed)
        .map_err(Report::from),
      WorkerEvent::Activate => self
        .on_activate()
        .await
        .map(|evicted| EventOutcome::Activated { evicted })
        .map_err(Report::from),
      WorkerEvent::Fetch(request) => Ok(EventOutcome::Response(self.on_fetch(&request).await)),
      WorkerEvent::Sync { tag } => self.on_sync_tag(&tag).await.map(|report| match report {
        Some(report) => EventOutcome::Synced(report),
        None => EventOutcome::Ignored,
      }),
      WorkerEvent::PeriodicSync { tag } => {
        if tag == self.refresh_tag {
          self.on_periodic_sync().await.map(EventOutcome::DataRefreshed)
        } else {
          debug!(%tag, "Unknown periodic sync tag");
          Ok(EventOutcome::Ignored)
        }
      }
      WorkerEvent::Push { payload } => self.on_push(payload.as_deref()).map(EventOutcome::Notified),
      WorkerEvent::NotificationClick { action } => self
        .on_notification_interact(action.as_deref())
        .map(EventOutcome::Navigated),
      WorkerEvent::Superseded => {
        self.on_superseded().await;
        Ok(EventOutcome::Retired)
      }
    };

    outcome.unwrap_or_else(|e| {
      error!(%kind, error = %e, "Event handler failed");
      EventOutcome::Failed {
        kind,
        reason: e.to_string(),
      }
    })
  }

  /// Pre-warm this version's namespaces.
  pub async fn on_install(&self) -> Result<(), LifecycleError> {
    self.lifecycle.lock().await.install().await
  }

  /// Evict stale namespaces and claim sessions.
  pub async fn on_activate(&self) -> Result<Vec<String>, LifecycleError> {
    self.lifecycle.lock().await.activate(&self.host).await
  }

  /// Step aside for a newer version. Requests are still served until the
  /// instance is dropped.
  pub async fn on_superseded(&self) {
    self.lifecycle.lock().await.supersede();
  }

  /// Serve an intercepted request.
  pub async fn on_fetch(&self, request: &Request) -> CacheResult<Response> {
    self.engine.handle(request).await
  }

  /// Record a user action for later delivery.
  pub fn enqueue(&self, payload: &[u8]) -> Result<SyncEntry> {
    self.queue.enqueue(payload)
  }

  pub fn pending(&self) -> Result<Vec<SyncEntry>> {
    self.queue.pending()
  }

  /// Drain the queue selected by `tag`. Unknown tags return `None`.
  pub async fn on_sync_tag(&self, tag: &str) -> Result<Option<DrainReport>> {
    if tag != self.queue.tag() {
      debug!(tag, "Unknown sync tag");
      return Ok(None);
    }
    let report = self.queue.drain(&self.remote).await?;
    if report.failure.is_some() {
      info!(tag, remaining = report.remaining, "Sync incomplete, entries kept for next trigger");
    }
    Ok(Some(report))
  }

  pub async fn on_periodic_sync(&self) -> Result<Option<u64>> {
    self.refresher.refresh().await
  }

  pub fn on_push(&self, payload: Option<&str>) -> Result<Option<Notification>> {
    self.notifier.dispatch(payload, &self.host)
  }

  /// Resolve the interaction and open the target window, if any.
  pub fn on_notification_interact(&self, action: Option<&str>) -> Result<NavigationIntent> {
    let intent = self.notifier.on_interact(action);
    if let NavigationIntent::Open(target) = &intent {
      if let Err(e) = self.host.open_window(target) {
        warn!(target = %target, error = %e, "Failed to open window");
      }
    }
    Ok(intent)
  }

  /// Every namespace in the store, flagged current or stale.
  pub fn namespaces(&self) -> Result<Vec<NamespaceStatus>> {
    Ok(
      self
        .storage
        .list_namespaces()?
        .into_iter()
        .map(|name| NamespaceStatus {
          current: self.registry.is_current(&name),
          name,
        })
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, CacheStorage, MemoryStorage};
  use crate::testing::{RecordingHost, RecordingRemote, ScriptedNetwork, TEST_ORIGIN};

  type TestWorker = Worker<MemoryStorage, ScriptedNetwork, RecordingRemote, RecordingHost>;

  fn config() -> Config {
    Config {
      origin: TEST_ORIGIN.to_string(),
      cache_prefix: String::new(),
      manifest: Manifest {
        static_assets: vec!["/styles.css".into()],
        data_assets: vec!["/data/lookup.json".into()],
        shell: vec!["/index.html".into()],
      },
      ..Config::default()
    }
  }

  fn worker_with(
    storage: &Arc<MemoryStorage>,
    network: &Arc<ScriptedNetwork>,
    remote: RecordingRemote,
  ) -> TestWorker {
    Worker::new(
      &config(),
      Arc::clone(storage),
      Arc::clone(network),
      remote,
      RecordingHost::default(),
    )
    .unwrap()
  }

  fn online() -> Arc<ScriptedNetwork> {
    let network = ScriptedNetwork::new();
    network.respond("/styles.css", Response::new(200, "css"));
    network.respond("/data/lookup.json", Response::new(200, "{}"));
    network.respond("/index.html", Response::new(200, "<html></html>"));
    Arc::new(network)
  }

  #[tokio::test]
  async fn test_styles_fetched_once_then_served_from_cache() {
    let storage = Arc::new(MemoryStorage::new());
    let network = Arc::new(ScriptedNetwork::new());
    network.respond("/styles.css", Response::new(200, "body{}"));
    let worker = worker_with(&storage, &network, RecordingRemote::default());

    let first = worker.dispatch(WorkerEvent::Fetch(Request::get("/styles.css"))).await;
    let EventOutcome::Response(first) = first else {
      panic!("expected a response");
    };
    assert_eq!(first.data.status, 200);
    assert!(storage.match_entry("static-v2", "/styles.css").unwrap().is_some());

    let second = worker.on_fetch(&Request::get("/styles.css")).await;
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(network.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_lookup_offline_without_cache_is_503() {
    let storage = Arc::new(MemoryStorage::new());
    let network = Arc::new(ScriptedNetwork::offline());
    let worker = worker_with(&storage, &network, RecordingRemote::default());

    let result = worker.on_fetch(&Request::get("/data/lookup.json")).await;
    assert_eq!(result.data.status, 503);
    assert_eq!(result.data.header("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&result.data.body).unwrap();
    assert_eq!(body["error"], "Data not available offline");
  }

  #[tokio::test]
  async fn test_install_then_activate_evicts_previous_version() {
    let storage = Arc::new(MemoryStorage::new());
    storage.put("static-v1", "/styles.css", &Response::new(200, "old")).unwrap();
    let network = online();
    let worker = worker_with(&storage, &network, RecordingRemote::default());

    assert!(matches!(worker.dispatch(WorkerEvent::Install).await, EventOutcome::Installed));
    match worker.dispatch(WorkerEvent::Activate).await {
      EventOutcome::Activated { evicted } => assert_eq!(evicted, vec!["static-v1"]),
      other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(worker.state().await, LifecycleState::Active);

    let statuses = worker.namespaces().unwrap();
    assert!(statuses.iter().all(|ns| ns.current));
    assert_eq!(statuses.len(), 3);
  }

  #[tokio::test]
  async fn test_failed_install_is_contained() {
    let storage = Arc::new(MemoryStorage::new());
    let network = Arc::new(ScriptedNetwork::offline());
    let worker = worker_with(&storage, &network, RecordingRemote::default());

    match worker.dispatch(WorkerEvent::Install).await {
      EventOutcome::Failed { kind, .. } => assert_eq!(kind, EventKind::Install),
      other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(worker.state().await, LifecycleState::Redundant);
  }

  #[tokio::test]
  async fn test_user_data_sync_drains_queue() {
    let storage = Arc::new(MemoryStorage::new());
    let network = online();
    let worker = worker_with(&storage, &network, RecordingRemote::failing_on(&["B"]));
    for p in ["A", "B", "C"] {
      worker.enqueue(p.as_bytes()).unwrap();
    }

    let outcome = worker
      .dispatch(WorkerEvent::Sync {
        tag: "user-data".to_string(),
      })
      .await;
    let EventOutcome::Synced(report) = outcome else {
      panic!("expected a sync report");
    };
    assert_eq!(report.remaining, 2);

    let left: Vec<_> = worker.pending().unwrap().into_iter().map(|e| e.payload).collect();
    assert_eq!(left, vec![b"B".to_vec(), b"C".to_vec()]);
  }

  #[tokio::test]
  async fn test_unknown_sync_tag_is_ignored() {
    let storage = Arc::new(MemoryStorage::new());
    let worker = worker_with(&storage, &online(), RecordingRemote::default());
    worker.enqueue(b"A").unwrap();

    let outcome = worker
      .dispatch(WorkerEvent::Sync {
        tag: "sync-analytics".to_string(),
      })
      .await;
    assert!(matches!(outcome, EventOutcome::Ignored));
    assert_eq!(worker.pending().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_push_then_click_opens_practice() {
    let storage = Arc::new(MemoryStorage::new());
    let worker = worker_with(&storage, &online(), RecordingRemote::default());

    let outcome = worker
      .dispatch(WorkerEvent::Push {
        payload: Some("New questions are ready".to_string()),
      })
      .await;
    match outcome {
      EventOutcome::Notified(Some(n)) => assert_eq!(n.body, "New questions are ready"),
      other => panic!("unexpected outcome {:?}", other),
    }

    let outcome = worker
      .dispatch(WorkerEvent::NotificationClick {
        action: Some("explore".to_string()),
      })
      .await;
    assert!(matches!(outcome, EventOutcome::Navigated(NavigationIntent::Open(ref t)) if t == "/?mode=practice"));

    worker.dispatch(WorkerEvent::NotificationClick { action: Some("close".to_string()) }).await;
    worker.dispatch(WorkerEvent::NotificationClick { action: None }).await;
    assert_eq!(worker.host.windows(), vec!["/?mode=practice", "/"]);
    assert_eq!(worker.host.notifications().len(), 1);
  }

  #[tokio::test]
  async fn test_periodic_sync_refreshes_data() {
    let storage = Arc::new(MemoryStorage::new());
    let network = online();
    network.respond("/api/questions/version", Response::new(200, r#"{"version": 2}"#));
    let worker = worker_with(&storage, &network, RecordingRemote::default());

    let outcome = worker
      .dispatch(WorkerEvent::PeriodicSync {
        tag: "update-questions".to_string(),
      })
      .await;
    assert!(matches!(outcome, EventOutcome::DataRefreshed(Some(2))));

    let other = worker
      .dispatch(WorkerEvent::PeriodicSync {
        tag: "something-else".to_string(),
      })
      .await;
    assert!(matches!(other, EventOutcome::Ignored));
  }

  #[tokio::test]
  async fn test_two_versions_side_by_side() {
    let storage = Arc::new(MemoryStorage::new());
    let network = online();
    let v2 = worker_with(&storage, &network, RecordingRemote::default());
    let v3 = Worker::new(
      &Config {
        version: "v3".to_string(),
        ..config()
      },
      Arc::clone(&storage),
      Arc::clone(&network),
      RecordingRemote::default(),
      RecordingHost::default(),
    )
    .unwrap();

    v2.on_install().await.unwrap();
    v2.on_activate().await.unwrap();
    assert_ne!(v2.fingerprint().await, v3.fingerprint().await);
    assert!(v3.needs_install().await.unwrap());

    v3.on_install().await.unwrap();
    let evicted = v3.on_activate().await.unwrap();
    assert_eq!(evicted, vec!["data-v2", "shell-v2", "static-v2"]);
    assert!(!v3.needs_install().await.unwrap());
  }

  #[tokio::test]
  async fn test_active_worker_retires_when_superseded() {
    let storage = Arc::new(MemoryStorage::new());
    let worker = worker_with(&storage, &online(), RecordingRemote::default());
    worker.on_install().await.unwrap();
    worker.on_activate().await.unwrap();
    assert_eq!(worker.state().await, LifecycleState::Active);

    let outcome = worker.dispatch(WorkerEvent::Superseded).await;
    assert!(matches!(outcome, EventOutcome::Retired));
    assert_eq!(worker.state().await, LifecycleState::Redundant);
    assert!(matches!(
      worker.dispatch(WorkerEvent::Activate).await,
      EventOutcome::Failed { kind: EventKind::Activate, .. }
    ));
  }
}

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use satify_offline::cache::{MemoryStorage, Request, SqliteStorage, Store};
use satify_offline::config::Config;
use satify_offline::host::Host;
use satify_offline::network::HttpNetwork;
use satify_offline::notify::Notification;
use satify_offline::sync::HttpRemote;
use satify_offline::worker::{EventOutcome, Worker, WorkerEvent};

/// Database argument selecting the in-memory store.
const IN_MEMORY: &str = ":memory:";

#[derive(Parser, Debug)]
#[command(name = "satify-offline")]
#[command(about = "Offline cache and request interception for SATify")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./satify.yaml, then $XDG_CONFIG_HOME/satify/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache database path, or ":memory:" for a throwaway store
  #[arg(short, long)]
  database: Option<String>,

  /// Write logs to daily files in this directory instead of stderr
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-warm this version's namespaces without activating
  Install,
  /// Install, then activate: evict stale namespaces and claim sessions
  Deploy,
  /// Serve a request through its strategy
  Fetch {
    url: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
  },
  /// Show which category a request falls into
  Classify {
    url: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
  },
  /// List cache namespaces and whether they are current
  Namespaces,
  /// Queue a payload for delivery on the next sync
  Enqueue { payload: String },
  /// Connectivity restored: drain the queue for a sync tag
  Sync {
    /// Defaults to the configured user data tag
    tag: Option<String>,
  },
  /// Periodic trigger: refresh cached data if the server has a newer version
  Refresh {
    /// Defaults to the configured data refresh tag
    tag: Option<String>,
  },
  /// Deliver a push message
  Push { payload: Option<String> },
  /// Interact with a notification
  Click { action: Option<String> },
  /// Show version, install state and queue depth
  Status,
}

/// Host for a terminal session: notifications and windows go to stdout.
struct ConsoleHost;

impl Host for ConsoleHost {
  fn claim_sessions(&self) -> Result<usize> {
    Ok(0)
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    let rendered = serde_json::to_string_pretty(notification)
      .map_err(|e| eyre!("Failed to render notification: {}", e))?;
    println!("{}", rendered);
    Ok(())
  }

  fn open_window(&self, target: &str) -> Result<()> {
    println!("open {}", target);
    Ok(())
  }
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  // RUST_LOG controls the level, e.g. RUST_LOG=satify_offline=debug
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "satify-offline.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
      None
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_dir.as_deref());

  let config = Config::load(args.config.as_deref())?;
  info!(version = %config.version, origin = %config.origin, "Starting");

  match args.database.as_deref() {
    Some(IN_MEMORY) => run(args.command, &config, Arc::new(MemoryStorage::new())).await,
    Some(path) => {
      let storage = SqliteStorage::open(Some(Path::new(path)))?;
      run(args.command, &config, Arc::new(storage)).await
    }
    None => {
      let storage = SqliteStorage::open(config.database.as_deref())?;
      run(args.command, &config, Arc::new(storage)).await
    }
  }
}

async fn run<S: Store>(command: Command, config: &Config, storage: Arc<S>) -> Result<()> {
  let origin = Url::parse(&config.origin)
    .map_err(|e| eyre!("Invalid origin '{}': {}", config.origin, e))?;
  let endpoint = origin
    .join(&config.sync.endpoint)
    .map_err(|e| eyre!("Invalid sync endpoint '{}': {}", config.sync.endpoint, e))?;

  let network = Arc::new(HttpNetwork::new(origin)?);
  let remote = HttpRemote::new(endpoint)?;
  let worker = Worker::new(config, storage, network, remote, ConsoleHost)?;

  let event = match command {
    Command::Install => WorkerEvent::Install,
    Command::Deploy => {
      report(worker.dispatch(WorkerEvent::Install).await)?;
      WorkerEvent::Activate
    }
    Command::Fetch { url, method } => WorkerEvent::Fetch(Request::new(method, url)),
    Command::Classify { url, method } => {
      println!("{}", worker.classify(&url, &method));
      return Ok(());
    }
    Command::Namespaces => {
      for ns in worker.namespaces()? {
        let marker = if ns.current { "current" } else { "stale" };
        println!("{}\t{}", ns.name, marker);
      }
      return Ok(());
    }
    Command::Enqueue { payload } => {
      let entry = worker.enqueue(payload.as_bytes())?;
      println!("queued #{} on {}", entry.seq, entry.tag);
      return Ok(());
    }
    Command::Sync { tag } => WorkerEvent::Sync {
      tag: tag.unwrap_or_else(|| config.sync.tag.clone()),
    },
    Command::Refresh { tag } => WorkerEvent::PeriodicSync {
      tag: tag.unwrap_or_else(|| config.data_refresh.tag.clone()),
    },
    Command::Push { payload } => WorkerEvent::Push { payload },
    Command::Click { action } => WorkerEvent::NotificationClick { action },
    Command::Status => {
      println!("version      {}", worker.registry().version());
      println!("fingerprint  {}", worker.fingerprint().await);
      println!("up to date   {}", !worker.needs_install().await?);
      println!("pending sync {}", worker.pending()?.len());
      return Ok(());
    }
  };

  report(worker.dispatch(event).await)
}

fn report(outcome: EventOutcome) -> Result<()> {
  match outcome {
    EventOutcome::Installed => println!("installed"),
    EventOutcome::Activated { evicted } => {
      println!("activated");
      for name in evicted {
        println!("evicted {}", name);
      }
    }
    EventOutcome::Response(result) => {
      eprintln!("{} ({})", result.data.status, result.source);
      println!("{}", result.data.text());
    }
    EventOutcome::Synced(report) => {
      println!(
        "delivered {}, remaining {}",
        report.delivered.len(),
        report.remaining
      );
      if let Some(failure) = report.failure {
        eprintln!("{}", failure);
      }
    }
    EventOutcome::DataRefreshed(Some(version)) => println!("data refreshed to version {}", version),
    EventOutcome::DataRefreshed(None) => println!("data up to date"),
    EventOutcome::Notified(None) => println!("nothing to show"),
    EventOutcome::Notified(Some(_)) => {}
    EventOutcome::Navigated(_) => {}
    EventOutcome::Retired => println!("retired"),
    EventOutcome::Ignored => println!("ignored"),
    EventOutcome::Failed { kind, reason } => return Err(eyre!("{} failed: {}", kind, reason)),
  }
  Ok(())
}

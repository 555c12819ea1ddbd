//! Caching strategies expressed as ordered fallback steps.
//!
//! A strategy is a list of [`Step`]s. The engine runs them in order and the
//! first step that yields a response ends the run. Adding a category means
//! adding a table here, not writing new control flow.

mod engine;

pub use engine::StrategyEngine;

use crate::cache::Response;
use crate::classifier::Category;
use crate::registry::Purpose;

/// Which namespaces a cache step looks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  /// The current namespace of one purpose
  Namespace(Purpose),
  /// Every current namespace, in registry order
  Current,
}

/// What URL a step works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
  /// The URL that was requested
  Request,
  /// The configured shell document, whatever was requested
  ShellDocument,
}

/// Body format of the synthetic 503.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
  Text,
  Json,
}

impl Unavailable {
  pub fn response(self) -> Response {
    match self {
      Unavailable::Text => Response::unavailable_text(),
      Unavailable::Json => Response::unavailable_json(),
    }
  }
}

/// One step of a fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  /// Serve a stored entry if one exists.
  Cache { scope: Scope, target: Target },
  /// Fetch over the network. A 200 is stored in `store_in` before being
  /// returned. Other statuses are returned as-is unless `require_success`,
  /// in which case they fall through like a transport failure.
  Network {
    target: Target,
    store_in: Option<Purpose>,
    require_success: bool,
  },
  /// Terminal synthetic "unavailable offline" response.
  Unavailable(Unavailable),
}

#[derive(Debug, Clone, Copy)]
pub struct Strategy {
  pub name: &'static str,
  pub steps: &'static [Step],
}

/// Static assets are immutable per deploy: serve from cache, fill on miss.
pub const CACHE_FIRST: Strategy = Strategy {
  name: "cache-first",
  steps: &[
    Step::Cache {
      scope: Scope::Namespace(Purpose::Static),
      target: Target::Request,
    },
    Step::Network {
      target: Target::Request,
      store_in: Some(Purpose::Static),
      require_success: false,
    },
    Step::Unavailable(Unavailable::Text),
  ],
};

/// Data changes between deploys: prefer fresh, degrade to the last copy.
pub const NETWORK_FIRST: Strategy = Strategy {
  name: "network-first",
  steps: &[
    Step::Network {
      target: Target::Request,
      store_in: Some(Purpose::Data),
      require_success: true,
    },
    Step::Cache {
      scope: Scope::Namespace(Purpose::Data),
      target: Target::Request,
    },
    Step::Unavailable(Unavailable::Json),
  ],
};

/// The shell must render instantly: a stale shell beats a blocked app.
/// The network is only consulted when no shell has been stored yet.
pub const SHELL_FIRST: Strategy = Strategy {
  name: "shell-first",
  steps: &[
    Step::Cache {
      scope: Scope::Namespace(Purpose::AppShell),
      target: Target::ShellDocument,
    },
    Step::Network {
      target: Target::ShellDocument,
      store_in: Some(Purpose::AppShell),
      require_success: false,
    },
    Step::Unavailable(Unavailable::Text),
  ],
};

/// Everything else goes to the network, with any stored copy as a last resort.
pub const NETWORK_ONLY: Strategy = Strategy {
  name: "network-only",
  steps: &[
    Step::Network {
      target: Target::Request,
      store_in: None,
      require_success: false,
    },
    Step::Cache {
      scope: Scope::Current,
      target: Target::Request,
    },
    Step::Unavailable(Unavailable::Text),
  ],
};

impl Strategy {
  pub fn for_category(category: Category) -> &'static Strategy {
    match category {
      Category::StaticAsset => &CACHE_FIRST,
      Category::DataAsset => &NETWORK_FIRST,
      Category::AppShell => &SHELL_FIRST,
      Category::Other => &NETWORK_ONLY,
    }
  }

  /// Purposes whose namespaces this strategy reads or writes.
  pub fn purposes(&self) -> impl Iterator<Item = Purpose> + '_ {
    self.steps.iter().filter_map(|step| match step {
      Step::Cache {
        scope: Scope::Namespace(purpose),
        ..
      } => Some(*purpose),
      Step::Network {
        store_in: Some(purpose),
        ..
      } => Some(*purpose),
      _ => None,
    })
  }
}

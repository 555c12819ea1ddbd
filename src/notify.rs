//! Push payloads become notifications; interactions become navigation intents.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::NotificationConfig;
use crate::host::Host;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: Option<String>,
}

/// A user-visible notification. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub actions: Vec<NotificationAction>,
  pub arrived_at: DateTime<Utc>,
}

/// What the application should do after a notification interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationIntent {
  /// Open a window at the given target
  Open(String),
  /// Close the notification and do nothing else
  Dismiss,
}

pub struct NotificationDispatcher {
  config: NotificationConfig,
}

impl NotificationDispatcher {
  pub fn new(config: NotificationConfig) -> Self {
    Self { config }
  }

  /// Build the notification for a push payload.
  pub fn build(&self, payload: &str) -> Notification {
    Notification {
      title: self.config.title.clone(),
      body: payload.to_string(),
      icon: self.config.icon.clone(),
      badge: self.config.badge.clone(),
      vibrate: self.config.vibrate.clone(),
      actions: self
        .config
        .actions
        .iter()
        .map(|a| NotificationAction {
          action: a.action.clone(),
          title: a.title.clone(),
          icon: a.icon.clone(),
        })
        .collect(),
      arrived_at: Utc::now(),
    }
  }

  /// Show a notification for the payload. A push without a payload shows nothing.
  pub fn dispatch<H: Host>(&self, payload: Option<&str>, host: &H) -> Result<Option<Notification>> {
    let Some(payload) = payload else {
      debug!("Push without payload, nothing to show");
      return Ok(None);
    };

    let notification = self.build(payload);
    host.show_notification(&notification)?;
    info!(title = %notification.title, "Notification shown");
    Ok(Some(notification))
  }

  /// Map an interaction to a navigation intent.
  ///
  /// Known actions go to their configured target, dismiss actions go nowhere,
  /// and unknown or absent actions open the default target.
  pub fn on_interact(&self, action: Option<&str>) -> NavigationIntent {
    let configured = action.and_then(|id| self.config.actions.iter().find(|a| a.action == id));

    match configured {
      Some(a) => match &a.target {
        Some(target) => NavigationIntent::Open(target.clone()),
        None => NavigationIntent::Dismiss,
      },
      None => NavigationIntent::Open(self.config.default_target.clone()),
    }
  }
}

//! The platform the worker runs inside.
//!
//! Everything user-facing goes through this trait, so the worker can be
//! driven in-process without a browser runtime.

use color_eyre::Result;

use crate::notify::Notification;

pub trait Host: Send + Sync {
  /// Take control of every open session. Returns how many were claimed.
  fn claim_sessions(&self) -> Result<usize>;

  fn show_notification(&self, notification: &Notification) -> Result<()>;

  /// Open (or focus) a window at `target`.
  fn open_window(&self, target: &str) -> Result<()>;
}

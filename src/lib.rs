//! Offline caching and request interception for the SATify web app.
//!
//! A [`worker::Worker`] sits between the app and the network. It classifies
//! every request, answers it from versioned cache namespaces or the network
//! according to the category's strategy, defers user writes until
//! connectivity returns, and turns push messages into notifications.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod network;
pub mod notify;
pub mod refresh;
pub mod registry;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

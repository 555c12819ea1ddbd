//! Network transport used by strategies, installation and data refresh.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::cache::{Request, Response};
use crate::error::NetworkError;

/// Connect timeout for the HTTP transport. Request timeouts are left to the server.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Fetches a request over the network.
///
/// Implementations report transport failures as `Err` and return every HTTP
/// status as-is; deciding what counts as success is up to the strategy.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// HTTP transport backed by reqwest.
/// Clone is cheap - reqwest::Client shares its connection pool.
#[derive(Clone)]
pub struct HttpNetwork {
  client: Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: Url) -> Result<Self> {
    let client = Client::builder()
      .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  pub fn resolve(&self, url: &str) -> Result<Url, NetworkError> {
    self.origin.join(url).map_err(|e| NetworkError::InvalidUrl {
      url: url.to_string(),
      reason: e.to_string(),
    })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let url = self.resolve(&request.url)?;
    let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
      .map_err(|e| NetworkError::InvalidUrl {
        url: request.url.clone(),
        reason: format!("invalid method {}: {}", request.method, e),
      })?;

    let mut builder = self.client.request(method, url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let transport = |e: reqwest::Error| {
      if e.is_timeout() {
        NetworkError::Aborted {
          url: url.to_string(),
        }
      } else {
        NetworkError::Transport {
          url: url.to_string(),
          reason: e.to_string(),
        }
      }
    };

    let response = builder.send().await.map_err(transport)?;
    let status = response.status().as_u16();

    let mut headers = BTreeMap::new();
    for (name, value) in response.headers() {
      if let Ok(value) = value.to_str() {
        headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
      }
    }

    let body = response.bytes().await.map_err(transport)?.to_vec();
    debug!(url = %url, status, bytes = body.len(), "Fetched over network");

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

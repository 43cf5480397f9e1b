//! Marketplace HTTP Client - Throttled REST/GraphQL Client
//!
//! Wraps reqwest with a concurrency limit and a requests-per-second
//! limiter shared by every marketplace adapter. One request is issued
//! per call; failures are reported, never retried.

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::domain::{LendError, LendResult};

/// Configuration for the marketplace HTTP client.
#[derive(Debug, Clone)]
pub struct MarketHttpConfig {
  /// Maximum concurrent requests across all sources.
  pub max_concurrent: usize,
  /// Sustained request rate across all sources.
  pub requests_per_second: u32,
  /// User agent sent with every request.
  pub user_agent: String,
}

impl Default for MarketHttpConfig {
  fn default() -> Self {
    Self {
      max_concurrent: 4,
      requests_per_second: 2,
      user_agent: concat!("nftlend-core/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

/// Throttled HTTP client shared by the marketplace adapters.
pub struct MarketHttpClient {
  /// Underlying HTTP client.
  http: Client,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Rate limiter.
  limiter: DefaultDirectRateLimiter,
}

impl MarketHttpClient {
  /// Create a new client.
  pub fn new(config: &MarketHttpConfig) -> Result<Self> {
    let http = Client::builder()
      .user_agent(config.user_agent.clone())
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

    Ok(Self {
      http,
      semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
      limiter: RateLimiter::direct(Quota::per_second(rate)),
    })
  }

  /// GET `url` and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> LendResult<T> {
    self.execute(self.http.get(url), url).await
  }

  /// POST a JSON body to `url` and decode the JSON response.
  pub async fn post_json<B, T>(&self, url: &str, body: &B) -> LendResult<T>
  where
    B: Serialize + Sync,
    T: DeserializeOwned,
  {
    self.execute(self.http.post(url).json(body), url).await
  }

  /// Execute one request under the concurrency and rate limits.
  async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str) -> LendResult<T> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(LendError::external)?;
    self.limiter.until_ready().await;

    debug!(url, "Marketplace request");

    let response = request
      .send()
      .await
      .map_err(|e| LendError::external(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(LendError::external(format!("{url}: HTTP {status}: {body}")));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| LendError::external(format!("{url}: invalid JSON: {e}")))
  }
}

impl std::fmt::Debug for MarketHttpClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MarketHttpClient")
      .field("available_permits", &self.semaphore.available_permits())
      .finish_non_exhaustive()
  }
}

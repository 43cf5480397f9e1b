//! Token Metadata Fetcher - Token URI Documents
//!
//! Downloads the JSON document a token URI points to. `ipfs://` URIs
//! are rewritten to the configured HTTP gateway.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::domain::{LendError, LendResult, TokenMetadata};
use crate::ports::marketplace::MetadataFetcher;

const IPFS_SCHEME: &str = "ipfs://";

/// Rewrite `ipfs://` URIs to `gateway`; other URIs pass through.
pub fn resolve_uri(uri: &str, gateway: &str) -> String {
  let uri = uri.trim();
  match uri.strip_prefix(IPFS_SCHEME) {
    Some(path) => {
      let path = path.strip_prefix("ipfs/").unwrap_or(path);
      format!("{}/{path}", gateway.trim_end_matches('/'))
    }
    None => uri.to_string(),
  }
}

pub struct HttpMetadataFetcher {
  http: Client,
  ipfs_gateway: String,
}

impl HttpMetadataFetcher {
  pub fn new(ipfs_gateway: impl Into<String>, timeout: Duration) -> Result<Self> {
    let http = Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build metadata HTTP client")?;
    Ok(Self {
      http,
      ipfs_gateway: ipfs_gateway.into(),
    })
  }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
  #[instrument(skip(self))]
  async fn fetch_metadata(&self, uri: &str) -> LendResult<TokenMetadata> {
    if uri.trim().is_empty() {
      return Err(LendError::external("token has no metadata URI"));
    }
    let url = resolve_uri(uri, &self.ipfs_gateway);
    let response = self
      .http
      .get(&url)
      .send()
      .await
      .map_err(|e| LendError::external(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
      return Err(LendError::external(format!("{url}: HTTP {status}")));
    }

    let meta = response
      .json::<TokenMetadata>()
      .await
      .map_err(|e| LendError::external(format!("{url}: invalid metadata: {e}")))?;
    debug!(name = %meta.name, "Token metadata fetched");
    Ok(meta)
  }
}

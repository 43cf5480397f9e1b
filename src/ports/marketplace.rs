//! Marketplace Port - External Trade Sources and Token Metadata
//!
//! Each source adapter issues one request per invocation and returns
//! the trades it found. Push-style sources return nothing directly and
//! deliver their trades later over the live feed.

use async_trait::async_trait;

use crate::domain::{Asset, ExternalTrade, LendResult, MarketSource, TokenMetadata};

/// Trade-history source for one marketplace.
#[async_trait]
pub trait MarketplaceAdapter: Send + Sync + 'static {
  fn source(&self) -> MarketSource;

  /// Trades of `asset` reported by the marketplace.
  async fn fetch_trades(&self, asset: &Asset) -> LendResult<Vec<ExternalTrade>>;
}

/// Fetches the metadata document behind a token URI.
#[async_trait]
pub trait MetadataFetcher: Send + Sync + 'static {
  async fn fetch_metadata(&self, uri: &str) -> LendResult<TokenMetadata>;
}

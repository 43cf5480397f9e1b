//! Solsea Adapter - Push-Style SOL Sales
//!
//! Solsea answers history queries over the live feed, not over HTTP.
//! A crawl queues a `find` request for the mint on the feed's outbound
//! queue and returns no trades; the sales arrive later as `431` frames
//! and are recorded by the feed handler.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use crate::adapters::feeds::FeedPublisher;
use crate::domain::{Asset, ExternalTrade, LendError, LendResult, MarketSource};
use crate::ports::marketplace::MarketplaceAdapter;

/// Socket.IO event id prefix of the history query.
const FIND_PREFIX: &str = "421";

/// Frame asking for the sold archive of `mint`.
pub fn find_sold_frame(mint: &str) -> String {
  let query = json!(["find", "listed-archive", { "Mint": mint, "status": "SOLD" }]);
  format!("{FIND_PREFIX}{query}")
}

pub struct SolseaAdapter {
  publisher: FeedPublisher,
}

impl SolseaAdapter {
  pub fn new(publisher: FeedPublisher) -> Self {
    Self { publisher }
  }
}

#[async_trait]
impl MarketplaceAdapter for SolseaAdapter {
  fn source(&self) -> MarketSource {
    MarketSource::Solsea
  }

  #[instrument(skip(self, asset), fields(asset_id = asset.id))]
  async fn fetch_trades(&self, asset: &Asset) -> LendResult<Vec<ExternalTrade>> {
    let mint = asset.crawl_address();
    if !self.publisher.publish(find_sold_frame(mint)) {
      return Err(LendError::external("solsea live feed is not running"));
    }
    debug!(mint, "Solsea history requested over live feed");
    Ok(Vec::new())
  }
}

//! Magic Eden Adapter - SOL Activity History
//!
//! Queries the global activity endpoint for a mint and keeps only the
//! `exchange` rows. Amounts are lamports and converted to SOL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Url;
use serde_json::json;
use tracing::{debug, instrument};

use super::client::MarketHttpClient;
use super::types::{MagicEdenActivities, MagicEdenActivity};
use crate::domain::market::units_to_decimal;
use crate::domain::{Asset, ExternalTrade, LendError, LendResult, MarketSource, Network};
use crate::ports::marketplace::MarketplaceAdapter;

const LAMPORT_DECIMALS: u32 = 9;

pub struct MagicEdenAdapter {
  http: Arc<MarketHttpClient>,
  base_url: String,
}

impl MagicEdenAdapter {
  pub fn new(http: Arc<MarketHttpClient>, base_url: impl Into<String>) -> Self {
    Self {
      http,
      base_url: base_url.into(),
    }
  }

  fn activity_url(&self, mint: &str) -> LendResult<Url> {
    let query = json!({
      "$match": { "mint": mint },
      "$sort": { "blockTime": -1, "createdAt": -1 },
      "$skip": 0,
    });
    Url::parse_with_params(
      &format!("{}/rpc/getGlobalActivitiesByQuery", self.base_url.trim_end_matches('/')),
      &[("q", query.to_string())],
    )
    .map_err(|e| LendError::external(format!("magic eden url: {e}")))
  }
}

/// Sales among the activities, as normalized trades.
pub fn exchange_trades(activities: &[MagicEdenActivity]) -> Vec<ExternalTrade> {
  activities
    .iter()
    .filter(|a| a.tx_type == "exchange")
    .filter_map(|a| {
      Some(ExternalTrade {
        source: MarketSource::MagicEden,
        network: Network::Sol,
        seller: a.seller_address.clone(),
        buyer: a.buyer_address.clone(),
        amount: units_to_decimal(u128::from(a.parsed_transaction.total_amount), LAMPORT_DECIMALS)?,
        currency_symbol: "SOL".to_string(),
        occurred_at: DateTime::from_timestamp(a.block_time, 0),
        external_id: Some(a.transaction_id.clone()).filter(|id| !id.is_empty()),
      })
    })
    .collect()
}

#[async_trait]
impl MarketplaceAdapter for MagicEdenAdapter {
  fn source(&self) -> MarketSource {
    MarketSource::MagicEden
  }

  #[instrument(skip(self, asset), fields(asset_id = asset.id))]
  async fn fetch_trades(&self, asset: &Asset) -> LendResult<Vec<ExternalTrade>> {
    let url = self.activity_url(asset.crawl_address())?;
    let page: MagicEdenActivities = self.http.get_json(url.as_str()).await?;
    let trades = exchange_trades(&page.results);
    debug!(activities = page.results.len(), trades = trades.len(), "Magic Eden history fetched");
    Ok(trades)
  }
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  #[test]
  fn test_only_exchanges_are_kept() {
    let page: MagicEdenActivities = serde_json::from_value(json!({
      "results": [
        {
          "txType": "exchange",
          "transaction_id": "sig1",
          "blockTime": 1_650_000_000,
          "mint": "Mint111",
          "buyer_address": "Buyer",
          "seller_address": "Seller",
          "parsedTransaction": { "total_amount": 2_500_000_000u64 }
        },
        { "txType": "initializeEscrow", "transaction_id": "sig2", "blockTime": 1 }
      ]
    }))
    .unwrap();

    let trades = exchange_trades(&page.results);
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].amount, dec!(2.5));
    assert_eq!(trades[0].external_id.as_deref(), Some("sig1"));
    assert_eq!(trades[0].currency_symbol, "SOL");
    assert_eq!(trades[0].occurred_at.unwrap().timestamp(), 1_650_000_000);
  }

  #[test]
  fn test_activity_url_encodes_query() {
    let http = Arc::new(MarketHttpClient::new(&Default::default()).unwrap());
    let adapter = MagicEdenAdapter::new(http, "https://api-mainnet.magiceden.io/");
    let url = adapter.activity_url("Mint111").unwrap();
    assert_eq!(url.path(), "/rpc/getGlobalActivitiesByQuery");
    let (_, q) = url.query_pairs().next().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&q).unwrap();
    assert_eq!(parsed["$match"]["mint"], "Mint111");
  }
}

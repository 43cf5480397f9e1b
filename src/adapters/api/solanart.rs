//! Solanart Adapter - Last Sales of a Token
//!
//! Prices arrive in whole currency units together with the currency
//! symbol; Solanart reports no transaction id.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use super::client::MarketHttpClient;
use super::types::SolanartSale;
use crate::domain::{Asset, ExternalTrade, LendError, LendResult, MarketSource, Network};
use crate::ports::marketplace::MarketplaceAdapter;

pub struct SolanartAdapter {
  http: Arc<MarketHttpClient>,
  base_url: String,
}

impl SolanartAdapter {
  pub fn new(http: Arc<MarketHttpClient>, base_url: impl Into<String>) -> Self {
    Self {
      http,
      base_url: base_url.into(),
    }
  }
}

/// Convert sales to trades; rows with an unusable price are skipped.
pub fn sale_trades(sales: &[SolanartSale]) -> Vec<ExternalTrade> {
  sales
    .iter()
    .filter_map(|s| {
      let Ok(amount) = Decimal::try_from(s.price) else {
        warn!(mint = %s.mint, price = s.price, "Solanart price not representable");
        return None;
      };
      Some(ExternalTrade {
        source: MarketSource::Solanart,
        network: Network::Sol,
        seller: s.seller.clone(),
        buyer: s.buyer.clone(),
        amount,
        currency_symbol: s.currency.clone(),
        occurred_at: s.date,
        external_id: None,
      })
    })
    .collect()
}

#[async_trait]
impl MarketplaceAdapter for SolanartAdapter {
  fn source(&self) -> MarketSource {
    MarketSource::Solanart
  }

  #[instrument(skip(self, asset), fields(asset_id = asset.id))]
  async fn fetch_trades(&self, asset: &Asset) -> LendResult<Vec<ExternalTrade>> {
    let url = Url::parse_with_params(
      &format!("{}/last_sales_token", self.base_url.trim_end_matches('/')),
      &[("address", asset.crawl_address())],
    )
    .map_err(|e| LendError::external(format!("solanart url: {e}")))?;

    let sales: Vec<SolanartSale> = self.http.get_json(url.as_str()).await?;
    debug!(sales = sales.len(), "Solanart history fetched");
    Ok(sale_trades(&sales))
  }
}

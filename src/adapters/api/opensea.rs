//! OpenSea Adapter - Successful Auction History
//!
//! Issues the `EventHistoryQuery` GraphQL request filtered to
//! `AUCTION_SUCCESSFUL`. Prices are wei strings quoted in ether, which
//! outside Ethereum mainnet settles as the bridged WETH token. The block
//! explorer link of the settling transaction serves as the external id.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::json;
use tracing::{debug, instrument};

use super::client::MarketHttpClient;
use super::types::{OpenSeaEvent, OpenSeaEventHistory};
use crate::domain::market::units_to_decimal;
use crate::domain::{Asset, ExternalTrade, LendResult, MarketSource, Network};
use crate::ports::marketplace::MarketplaceAdapter;

const WEI_DECIMALS: u32 = 18;

const EVENT_HISTORY_QUERY: &str = r"query EventHistoryQuery(
  $archetype: ArchetypeInputType
  $eventTypes: [EventType!]
  $count: Int = 16
) {
  assetEvents(archetype: $archetype, eventTypes: $eventTypes, first: $count, includeHidden: true) {
    edges {
      node {
        eventTimestamp
        seller { address }
        winnerAccount { address }
        price { quantityInEth }
        transaction { blockExplorerLink }
      }
    }
  }
}";

pub struct OpenSeaAdapter {
  http: Arc<MarketHttpClient>,
  graphql_url: String,
}

impl OpenSeaAdapter {
  pub fn new(http: Arc<MarketHttpClient>, graphql_url: impl Into<String>) -> Self {
    Self {
      http,
      graphql_url: graphql_url.into(),
    }
  }
}

const fn chain_name(network: Network) -> &'static str {
  match network {
    Network::Matic => "MATIC",
    _ => "ETHEREUM",
  }
}

/// Currency symbol of an ether-quoted price on `network`.
const fn settlement_symbol(network: Network) -> &'static str {
  match network {
    Network::Eth => "ETH",
    _ => "WETH",
  }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|d| d.with_timezone(&Utc))
    .ok()
    .or_else(|| {
      NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
    })
}

/// Convert auction events to trades; events without a price are skipped.
pub fn auction_trades(network: Network, events: &[OpenSeaEvent]) -> Vec<ExternalTrade> {
  events
    .iter()
    .filter_map(|e| {
      let wei: u128 = e.price.as_ref()?.quantity_in_eth.parse().ok()?;
      Some(ExternalTrade {
        source: MarketSource::OpenSea,
        network,
        seller: e.seller.as_ref().map(|a| a.address.to_lowercase()).unwrap_or_default(),
        buyer: e
          .winner_account
          .as_ref()
          .map(|a| a.address.to_lowercase())
          .unwrap_or_default(),
        amount: units_to_decimal(wei, WEI_DECIMALS)?,
        currency_symbol: settlement_symbol(network).to_string(),
        occurred_at: e.event_timestamp.as_deref().and_then(parse_timestamp),
        external_id: e
          .transaction
          .as_ref()
          .map(|t| t.block_explorer_link.clone())
          .filter(|link| !link.is_empty()),
      })
    })
    .collect()
}

#[async_trait]
impl MarketplaceAdapter for OpenSeaAdapter {
  fn source(&self) -> MarketSource {
    MarketSource::OpenSea
  }

  #[instrument(skip(self, asset), fields(asset_id = asset.id))]
  async fn fetch_trades(&self, asset: &Asset) -> LendResult<Vec<ExternalTrade>> {
    let body = json!({
      "id": "EventHistoryQuery",
      "query": EVENT_HISTORY_QUERY,
      "variables": {
        "archetype": {
          "chain": chain_name(asset.network),
          "tokenId": asset.token_id,
          "assetContractAddress": asset.crawl_address(),
        },
        "eventTypes": ["AUCTION_SUCCESSFUL"],
        "count": 16,
      }
    });

    let history: OpenSeaEventHistory = self.http.post_json(&self.graphql_url, &body).await?;
    let events: Vec<OpenSeaEvent> = history
      .data
      .asset_events
      .edges
      .into_iter()
      .map(|edge| edge.node)
      .collect();
    debug!(events = events.len(), "OpenSea history fetched");
    Ok(auction_trades(asset.network, &events))
  }
}

//! Marketplace API Response Types
//!
//! Wire shapes of the trade-history endpoints. Only the fields the
//! adapters read are declared; everything else is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Envelope of the Magic Eden activity query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MagicEdenActivities {
  #[serde(default)]
  pub results: Vec<MagicEdenActivity>,
}

/// One Magic Eden activity row.
#[derive(Debug, Clone, Deserialize)]
pub struct MagicEdenActivity {
  /// Activity kind; sales are `exchange`.
  #[serde(rename = "txType", default)]
  pub tx_type: String,
  #[serde(default)]
  pub transaction_id: String,
  /// Unix seconds.
  #[serde(rename = "blockTime", default)]
  pub block_time: i64,
  #[serde(default)]
  pub mint: String,
  #[serde(default)]
  pub buyer_address: String,
  #[serde(default)]
  pub seller_address: String,
  #[serde(rename = "parsedTransaction", default)]
  pub parsed_transaction: MagicEdenParsedTx,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MagicEdenParsedTx {
  /// Lamports.
  #[serde(default)]
  pub total_amount: u64,
}

/// One Solanart sale.
#[derive(Debug, Clone, Deserialize)]
pub struct SolanartSale {
  #[serde(default)]
  pub date: Option<DateTime<Utc>>,
  #[serde(default)]
  pub mint: String,
  #[serde(rename = "buyerAdd", default)]
  pub buyer: String,
  #[serde(rename = "seller_address", default)]
  pub seller: String,
  /// Whole currency units.
  #[serde(default)]
  pub price: f64,
  /// Currency symbol.
  #[serde(default)]
  pub currency: String,
}

/// OpenSea GraphQL event history response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenSeaEventHistory {
  #[serde(default)]
  pub data: OpenSeaData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenSeaData {
  #[serde(rename = "assetEvents", default)]
  pub asset_events: OpenSeaEdges,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenSeaEdges {
  #[serde(default)]
  pub edges: Vec<OpenSeaEdge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSeaEdge {
  pub node: OpenSeaEvent,
}

/// One successful auction.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenSeaEvent {
  #[serde(rename = "eventTimestamp", default)]
  pub event_timestamp: Option<String>,
  #[serde(default)]
  pub seller: Option<OpenSeaAccount>,
  #[serde(rename = "winnerAccount", default)]
  pub winner_account: Option<OpenSeaAccount>,
  #[serde(default)]
  pub price: Option<OpenSeaPrice>,
  #[serde(default)]
  pub transaction: Option<OpenSeaTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSeaAccount {
  #[serde(default)]
  pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSeaPrice {
  /// Wei, as a decimal string.
  #[serde(rename = "quantityInEth", default)]
  pub quantity_in_eth: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSeaTransaction {
  #[serde(rename = "blockExplorerLink", default)]
  pub block_explorer_link: String,
}

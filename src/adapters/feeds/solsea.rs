//! Solsea Trade Handler - Inbound Socket.IO Frames
//!
//! Answers to the history requests arrive as `431` frames: the event id
//! prefix followed by a JSON array of `{ "data": [sale, ...] }`. Each
//! sale is attributed to the asset whose contract or test address
//! equals its mint; sales of untracked mints are dropped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::market::units_to_decimal;
use crate::domain::{ExternalTrade, MarketSource, Network};
use crate::ports::live_feed::FeedHandler;
use crate::ports::store::Store;
use crate::usecases::ingestion::{IngestOutcome, IngestionSink};

/// Socket.IO event id prefix of history answers.
const TRADE_PREFIX: &str = "431";
const LAMPORT_DECIMALS: u32 = 9;

#[derive(Debug, Deserialize)]
struct SolseaAnswer {
    #[serde(default)]
    data: Vec<SolseaSale>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolseaSale {
    mint: String,
    /// Lamports.
    price: u64,
    #[serde(default)]
    seller_key: String,
    #[serde(default)]
    buyer_key: String,
    #[serde(default)]
    listed_at: Option<DateTime<Utc>>,
}

/// What an inbound frame carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// Sales keyed by mint address.
    Trades(Vec<(String, ExternalTrade)>),
    /// Keep-alive answers and other events.
    Other,
    /// A trade envelope whose body did not parse.
    Unparsed(String),
}

impl FeedFrame {
    const fn label(&self) -> &'static str {
        match self {
            Self::Trades(_) => "trade",
            Self::Other => "other",
            Self::Unparsed(_) => "unparsed",
        }
    }
}

/// Classify one inbound text frame.
pub fn parse_frame(text: &str) -> FeedFrame {
    let Some(body) = text.strip_prefix(TRADE_PREFIX) else {
        return FeedFrame::Other;
    };
    let answers: Vec<Option<SolseaAnswer>> = match serde_json::from_str(body) {
        Ok(answers) => answers,
        Err(e) => return FeedFrame::Unparsed(e.to_string()),
    };

    let trades = answers
        .into_iter()
        .flatten()
        .flat_map(|answer| answer.data)
        .filter_map(|sale| {
            let amount = units_to_decimal(u128::from(sale.price), LAMPORT_DECIMALS)?;
            let trade = ExternalTrade {
                source: MarketSource::Solsea,
                network: Network::Sol,
                seller: sale.seller_key,
                buyer: sale.buyer_key,
                amount,
                currency_symbol: "SOL".to_string(),
                occurred_at: sale.listed_at,
                external_id: None,
            };
            Some((sale.mint, trade))
        })
        .collect();
    FeedFrame::Trades(trades)
}

/// Records Solsea sales from the live feed.
pub struct SolseaTradeHandler<S: Store> {
    sink: Arc<IngestionSink<S>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<S: Store> SolseaTradeHandler<S> {
    pub fn new(sink: Arc<IngestionSink<S>>) -> Self {
        Self {
            sink,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl<S: Store> FeedHandler for SolseaTradeHandler<S> {
    async fn on_text(&self, text: &str) {
        let frame = parse_frame(text);
        if let Some(metrics) = &self.metrics {
            metrics.feed_frames.with_label_values(&[frame.label()]).inc();
        }

        match frame {
            FeedFrame::Trades(trades) => {
                for (mint, trade) in &trades {
                    match self.sink.ingest_for_address(mint, trade).await {
                        Ok(IngestOutcome::Inserted(id)) => {
                            debug!(mint = %mint, transaction_id = id, "Solsea sale recorded");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(mint = %mint, error = %e, "Solsea sale not recorded"),
                    }
                }
            }
            FeedFrame::Unparsed(reason) => debug!(reason = %reason, "Unparsed Solsea frame"),
            FeedFrame::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_trade_frame_parsed() {
        let frame = parse_frame(
            r#"431[{"data":[{"mint":"Mint111","price":1500000000,"sellerKey":"S","buyerKey":"B","status":"SOLD","listedAt":"2022-03-01T10:00:00Z"}]},null]"#,
        );
        let FeedFrame::Trades(trades) = frame else {
            panic!("expected trades, got {frame:?}");
        };
        assert_eq!(trades.len(), 1);
        let (mint, trade) = &trades[0];
        assert_eq!(mint, "Mint111");
        assert_eq!(trade.amount, dec!(1.5));
        assert_eq!(trade.seller, "S");
        assert!(trade.external_id.is_none());
        assert_eq!(trade.occurred_at.unwrap().timestamp(), 1_646_128_800);
    }

    #[test]
    fn test_other_frames() {
        assert_eq!(parse_frame("3"), FeedFrame::Other);
        assert_eq!(parse_frame("40"), FeedFrame::Other);
        assert!(matches!(parse_frame("431{not json"), FeedFrame::Unparsed(_)));
    }
}

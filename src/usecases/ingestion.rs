//! Ingestion Sink - Idempotent Recording of External Trades
//!
//! Turns a normalized `ExternalTrade` into one `AssetTransaction`.
//! The currency is resolved by symbol on the trade's network; a trade
//! whose currency is unknown fails on its own without affecting the
//! rest of its batch. Trades carrying an external id are recorded at
//! most once per source.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::models::AssetTransactionKind;
use crate::domain::{AssetTransaction, ExternalTrade, LendError, LendResult, RecordId};
use crate::ports::store::{Store, StoreTx};

/// What happened to one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
  /// A new asset transaction was recorded.
  Inserted(RecordId),
  /// The (source, external id) pair was already recorded.
  Duplicate,
  /// No tracked asset matches the trade's asset id or token address.
  Unattributed,
}

/// Totals of a batch ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
  pub inserted: usize,
  pub duplicates: usize,
  pub unattributed: usize,
  pub failed: usize,
}

/// Appends external trades to the asset ledger.
pub struct IngestionSink<S: Store> {
  store: Arc<S>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl<S: Store> IngestionSink<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Record `trade` against `asset_id` in its own transaction.
  #[instrument(skip(self, trade), fields(source = %trade.source))]
  pub async fn ingest(&self, asset_id: RecordId, trade: &ExternalTrade) -> LendResult<IngestOutcome> {
    let mut tx = self.store.begin().await?;
    if tx.asset(asset_id).await?.is_none() {
      debug!(asset_id, "Trade for an unknown asset");
      return Ok(IngestOutcome::Unattributed);
    }
    let outcome = record(tx.as_mut(), asset_id, trade).await?;
    tx.commit().await?;
    self.count(trade, outcome);
    Ok(outcome)
  }

  /// Record a live-feed trade for the asset whose primary or test
  /// address equals `token_address`.
  #[instrument(skip(self, trade), fields(source = %trade.source))]
  pub async fn ingest_for_address(
    &self,
    token_address: &str,
    trade: &ExternalTrade,
  ) -> LendResult<IngestOutcome> {
    let mut tx = self.store.begin().await?;
    let asset = match tx.asset_by_contract_address(token_address).await? {
      Some(asset) => Some(asset),
      None => tx.asset_by_test_address(token_address).await?,
    };
    let Some(asset) = asset else {
      debug!(token_address, "Trade does not match a tracked asset");
      return Ok(IngestOutcome::Unattributed);
    };
    let outcome = record(tx.as_mut(), asset.id, trade).await?;
    tx.commit().await?;
    self.count(trade, outcome);
    Ok(outcome)
  }

  /// Record every trade, each in its own transaction.
  pub async fn ingest_batch(&self, asset_id: RecordId, trades: &[ExternalTrade]) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for trade in trades {
      match self.ingest(asset_id, trade).await {
        Ok(IngestOutcome::Inserted(_)) => summary.inserted += 1,
        Ok(IngestOutcome::Duplicate) => summary.duplicates += 1,
        Ok(IngestOutcome::Unattributed) => summary.unattributed += 1,
        Err(e) => {
          warn!(asset_id, source = %trade.source, error = %e, "Trade not recorded");
          summary.failed += 1;
        }
      }
    }
    summary
  }

  fn count(&self, trade: &ExternalTrade, outcome: IngestOutcome) {
    if let (Some(metrics), IngestOutcome::Inserted(_)) = (&self.metrics, outcome) {
      metrics
        .trades_ingested
        .with_label_values(&[trade.source.host()])
        .inc();
    }
  }
}

async fn record(
  tx: &mut dyn StoreTx,
  asset_id: RecordId,
  trade: &ExternalTrade,
) -> LendResult<IngestOutcome> {
  if let Some(external_id) = trade.external_id.as_deref() {
    if tx
      .asset_transaction_by_external_id(trade.source, external_id)
      .await?
      .is_some()
    {
      return Ok(IngestOutcome::Duplicate);
    }
  }

  let currency = tx
    .currency_by_symbol(trade.network, &trade.currency_symbol)
    .await?
    .ok_or_else(|| {
      LendError::not_found(format!(
        "currency {} on {}",
        trade.currency_symbol, trade.network
      ))
    })?;

  let stored = tx
    .insert_asset_transaction(AssetTransaction {
      id: 0,
      source: trade.source,
      network: trade.network,
      asset_id,
      kind: AssetTransactionKind::Exchange,
      seller: trade.seller.clone(),
      buyer: trade.buyer.clone(),
      external_id: trade.external_id.clone(),
      transaction_at: trade.occurred_at,
      amount: trade.amount,
      currency_id: currency.id,
      created_at: Utc::now(),
    })
    .await?;

  debug!(asset_id, transaction_id = stored.id, amount = %stored.amount, "Trade recorded");
  Ok(IngestOutcome::Inserted(stored.id))
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;
  use crate::adapters::persistence::MemoryStore;
  use crate::domain::{Asset, Currency, MarketSource, Network};

  fn trade(external_id: Option<&str>, symbol: &str) -> ExternalTrade {
    ExternalTrade {
      source: MarketSource::MagicEden,
      network: Network::Sol,
      seller: "Seller".into(),
      buyer: "Buyer".into(),
      amount: dec!(2.5),
      currency_symbol: symbol.into(),
      occurred_at: None,
      external_id: external_id.map(str::to_string),
    }
  }

  /// Store with SOL seeded and one tracked asset, whose id is returned.
  async fn store() -> (Arc<MemoryStore>, RecordId) {
    let store = MemoryStore::new();
    store
      .seed_currency(Currency {
        id: 1,
        network: Network::Sol,
        symbol: "SOL".into(),
        contract_address: String::new(),
        decimals: 9,
        enabled: true,
      })
      .await;
    let mut tx = store.begin().await.unwrap();
    let asset = tx
      .insert_asset(Asset {
        id: 0,
        network: Network::Sol,
        collection_id: 0,
        slug: "mint111".into(),
        contract_address: "Mint111".into(),
        test_contract_address: None,
        token_id: "0".into(),
        name: "Degen Ape".into(),
        image_url: String::new(),
        external_url: String::new(),
        attributes: "[]".into(),
        meta_json: "{}".into(),
        meta_json_url: String::new(),
        crawled_at: Default::default(),
      })
      .await
      .unwrap();
    tx.commit().await.unwrap();
    (Arc::new(store), asset.id)
  }

  #[tokio::test]
  async fn test_external_id_recorded_once() {
    let (store, asset_id) = store().await;
    let sink = IngestionSink::new(store);
    let first = sink.ingest(asset_id, &trade(Some("sig1"), "SOL")).await.unwrap();
    assert!(matches!(first, IngestOutcome::Inserted(_)));
    let again = sink.ingest(asset_id, &trade(Some("sig1"), "SOL")).await.unwrap();
    assert_eq!(again, IngestOutcome::Duplicate);
  }

  #[tokio::test]
  async fn test_trades_without_id_are_appended() {
    let (store, asset_id) = store().await;
    let sink = IngestionSink::new(Arc::clone(&store));
    sink.ingest(asset_id, &trade(None, "SOL")).await.unwrap();
    sink.ingest(asset_id, &trade(None, "SOL")).await.unwrap();
    assert_eq!(store.snapshot().await.asset_transactions.len(), 2);
  }

  #[tokio::test]
  async fn test_unknown_currency_fails_only_that_trade() {
    let (store, asset_id) = store().await;
    let sink = IngestionSink::new(Arc::clone(&store));
    let summary = sink
      .ingest_batch(
        asset_id,
        &[trade(Some("a"), "SOL"), trade(Some("b"), "DOGE"), trade(Some("c"), "sol")],
      )
      .await;
    assert_eq!(
      summary,
      BatchSummary {
        inserted: 2,
        duplicates: 0,
        unattributed: 0,
        failed: 1
      }
    );
  }

  #[tokio::test]
  async fn test_batch_counts_unattributed_apart_from_duplicates() {
    let (store, asset_id) = store().await;
    let sink = IngestionSink::new(Arc::clone(&store));
    sink.ingest(asset_id, &trade(Some("seen"), "SOL")).await.unwrap();

    let known = sink
      .ingest_batch(asset_id, &[trade(Some("seen"), "SOL")])
      .await;
    assert_eq!((known.duplicates, known.unattributed), (1, 0));

    let unknown = sink
      .ingest_batch(asset_id + 100, &[trade(Some("x"), "SOL"), trade(None, "SOL")])
      .await;
    assert_eq!(
      unknown,
      BatchSummary {
        inserted: 0,
        duplicates: 0,
        unattributed: 2,
        failed: 0
      }
    );
    assert_eq!(store.snapshot().await.asset_transactions.len(), 1);
  }
}

//! Crawl Scheduler - Per-Source Cooldown for Marketplace History
//!
//! Decides independently for every marketplace source whether an
//! asset's trade history is due for a refresh, runs the due sources
//! concurrently, and stamps the crawl time in its own read-modify-write
//! transaction once the source answered. Concurrent callers for the
//! same (asset, source) queue on a per-key lock and re-read the stamp,
//! so a source is called at most once per cooldown window.
//!
//! Crawl failures never reach the caller. A failed source keeps its old
//! stamp and is retried on the next request after the window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::ingestion::IngestionSink;
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::{Asset, LendError, LendResult, MarketSource, RecordId};
use crate::ports::marketplace::MarketplaceAdapter;
use crate::ports::store::Store;

/// Default minimum time between two crawls of one source for one asset.
pub const DEFAULT_COOLDOWN_HOURS: i64 = 24;

/// Result of one source for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
  /// The source answered; `inserted` trades were new.
  Fetched { trades: usize, inserted: usize },
  /// Last crawl is within the cooldown window.
  NotDue,
  /// The source does not list tokens of the asset's network.
  NotCovered,
  /// The source or the store failed; the stamp was left untouched.
  Failed(String),
}

impl CrawlOutcome {
  const fn label(&self) -> &'static str {
    match self {
      Self::Fetched { .. } => "ok",
      Self::NotDue | Self::NotCovered => "skipped",
      Self::Failed(_) => "failed",
    }
  }
}

/// Per-source outcomes of one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
  pub outcomes: Vec<(MarketSource, CrawlOutcome)>,
}

impl CrawlReport {
  pub fn outcome(&self, source: MarketSource) -> Option<&CrawlOutcome> {
    self
      .outcomes
      .iter()
      .find(|(s, _)| *s == source)
      .map(|(_, o)| o)
  }

  /// Number of sources that were actually called.
  pub fn fetched(&self) -> usize {
    self
      .outcomes
      .iter()
      .filter(|(_, o)| matches!(o, CrawlOutcome::Fetched { .. }))
      .count()
  }
}

/// Whether a crawl stamped at `last` is due at `now`.
pub fn is_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown: Duration) -> bool {
  last.map_or(true, |at| now.signed_duration_since(at) > cooldown)
}

type KeyLocks = HashMap<(RecordId, MarketSource), Arc<Mutex<()>>>;

/// Cooldown-gated marketplace crawler.
pub struct CrawlScheduler<S: Store> {
  store: Arc<S>,
  sources: Vec<Arc<dyn MarketplaceAdapter>>,
  sink: Arc<IngestionSink<S>>,
  cooldown: Duration,
  in_flight: StdMutex<KeyLocks>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl<S: Store> CrawlScheduler<S> {
  pub fn new(
    store: Arc<S>,
    sources: Vec<Arc<dyn MarketplaceAdapter>>,
    sink: Arc<IngestionSink<S>>,
  ) -> Self {
    Self {
      store,
      sources,
      sink,
      cooldown: Duration::hours(DEFAULT_COOLDOWN_HOURS),
      in_flight: StdMutex::new(HashMap::new()),
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
    self.cooldown = cooldown;
    self
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  pub fn cooldown(&self) -> Duration {
    self.cooldown
  }

  /// Crawl every due source for the asset. Never fails.
  #[instrument(skip(self))]
  pub async fn refresh(&self, asset_id: RecordId) -> CrawlReport {
    let runs = self.sources.iter().map(|source| async move {
      let outcome = self.crawl_source(asset_id, source.as_ref()).await;
      if let Some(metrics) = &self.metrics {
        metrics
          .crawl_runs
          .with_label_values(&[source.source().host(), outcome.label()])
          .inc();
      }
      (source.source(), outcome)
    });
    let outcomes = join_all(runs).await;

    let report = CrawlReport { outcomes };
    debug!(asset_id, fetched = report.fetched(), "Crawl refresh finished");
    report
  }

  async fn crawl_source(&self, asset_id: RecordId, adapter: &dyn MarketplaceAdapter) -> CrawlOutcome {
    let source = adapter.source();
    let lock = self.key_lock(asset_id, source);
    let outcome = {
      let _guard = lock.lock().await;
      self.crawl_locked(asset_id, adapter).await
    };
    drop(lock);
    self.release_key(asset_id, source);
    outcome
  }

  async fn crawl_locked(&self, asset_id: RecordId, adapter: &dyn MarketplaceAdapter) -> CrawlOutcome {
    let source = adapter.source();

    let asset = match self.read_asset(asset_id).await {
      Ok(asset) => asset,
      Err(e) => {
        warn!(asset_id, source = %source, error = %e, "Crawl could not read asset");
        return CrawlOutcome::Failed(e.to_string());
      }
    };

    if !source.covers(asset.network) {
      return CrawlOutcome::NotCovered;
    }
    let now = Utc::now();
    if !is_due(asset.last_crawled(source), now, self.cooldown) {
      return CrawlOutcome::NotDue;
    }

    let trades = match adapter.fetch_trades(&asset).await {
      Ok(trades) => trades,
      Err(e) => {
        warn!(asset_id, source = %source, error = %e, "Marketplace crawl failed");
        return CrawlOutcome::Failed(e.to_string());
      }
    };

    let summary = self.sink.ingest_batch(asset_id, &trades).await;

    if let Err(e) = self.stamp(asset_id, source, now).await {
      warn!(asset_id, source = %source, error = %e, "Crawl stamp not saved");
      return CrawlOutcome::Failed(e.to_string());
    }

    info!(
      asset_id,
      source = %source,
      trades = trades.len(),
      inserted = summary.inserted,
      duplicates = summary.duplicates,
      unattributed = summary.unattributed,
      failed = summary.failed,
      "Marketplace crawl complete"
    );
    CrawlOutcome::Fetched {
      trades: trades.len(),
      inserted: summary.inserted,
    }
  }

  async fn read_asset(&self, asset_id: RecordId) -> LendResult<Asset> {
    let mut tx = self.store.begin().await?;
    tx.asset(asset_id)
      .await?
      .ok_or_else(|| LendError::not_found(format!("asset {asset_id}")))
  }

  /// Set the crawl stamp on a freshly read row.
  async fn stamp(&self, asset_id: RecordId, source: MarketSource, at: DateTime<Utc>) -> LendResult<()> {
    let mut tx = self.store.begin().await?;
    let mut asset = tx
      .asset(asset_id)
      .await?
      .ok_or_else(|| LendError::not_found(format!("asset {asset_id}")))?;
    asset.mark_crawled(source, at);
    tx.update_asset(&asset).await?;
    tx.commit().await
  }

  fn key_lock(&self, asset_id: RecordId, source: MarketSource) -> Arc<Mutex<()>> {
    let mut locks = self
      .in_flight
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    Arc::clone(locks.entry((asset_id, source)).or_default())
  }

  fn release_key(&self, asset_id: RecordId, source: MarketSource) {
    let mut locks = self
      .in_flight
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    if locks
      .get(&(asset_id, source))
      .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
      locks.remove(&(asset_id, source));
    }
  }
}

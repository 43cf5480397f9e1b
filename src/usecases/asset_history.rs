//! Asset History - Trade Listing With On-Read Crawling
//!
//! Listing an asset's external trades first gives every due marketplace
//! source a chance to report new ones. Crawl failures are swallowed by
//! the scheduler, so the listing always returns what is already known.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use super::crawl_scheduler::CrawlScheduler;
use crate::domain::{AssetTransaction, LendError, LendResult, Page, RecordId};
use crate::ports::store::Store;

/// One page of asset transactions, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPage {
  pub items: Vec<AssetTransaction>,
  pub total: usize,
  pub page: usize,
  pub limit: usize,
}

/// Read side of the asset trade ledger.
pub struct AssetHistory<S: Store> {
  store: Arc<S>,
  crawler: Arc<CrawlScheduler<S>>,
}

impl<S: Store> AssetHistory<S> {
  pub fn new(store: Arc<S>, crawler: Arc<CrawlScheduler<S>>) -> Self {
    Self { store, crawler }
  }

  /// Refresh due sources, then return one page of trades.
  ///
  /// # Errors
  /// `NotFound` for an unknown asset, `Validation` for an empty page size.
  #[instrument(skip(self))]
  pub async fn list(&self, asset_id: RecordId, page: Page) -> LendResult<TransactionPage> {
    if page.limit == 0 {
      return Err(LendError::validation("limit must be positive"));
    }
    {
      let mut tx = self.store.begin().await?;
      if tx.asset(asset_id).await?.is_none() {
        return Err(LendError::not_found(format!("asset {asset_id}")));
      }
    }

    self.crawler.refresh(asset_id).await;

    let mut tx = self.store.begin().await?;
    let (items, total) = tx.asset_transactions(asset_id, page).await?;
    Ok(TransactionPage {
      items,
      total,
      page: page.page.max(1),
      limit: page.limit,
    })
  }
}

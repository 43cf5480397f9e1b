//! Settlement Use Case - Applying Chain Events to Loans and Offers
//!
//! Each settlement event identifies its loan by (borrower, nonce) and
//! its offer by (lender, nonce). Applying an event moves the records
//! through their state machines and appends an immutable ledger entry
//! carrying the transaction hash.
//!
//! Settlement flow per event:
//! 1. Resolve the loan or offer; unknown records are skipped
//! 2. Skip the event when its transition already happened
//! 3. Apply the transition (illegal transitions are a conflict)
//! 4. Close sibling offers and write the ledger entry

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::canonical::nonce_key;
use crate::domain::{
  LendError, LendResult, LoanLedgerEntry, LoanStatus, OfferStatus, SettlementEvent, SettlementKind,
  SettlementOutcome,
};
use crate::ports::store::{Store, StoreTx};

/// Applies settlement events, one transaction per event.
pub struct SettlementApplier<S: Store> {
  store: Arc<S>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl<S: Store> SettlementApplier<S> {
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

  /// Apply `event` in its own transaction.
  #[instrument(skip(self, event), fields(network = %event.network, kind = event.kind.name()))]
  pub async fn apply(&self, event: &SettlementEvent) -> LendResult<SettlementOutcome> {
    let mut tx = self.store.begin().await?;
    let outcome = apply_in(tx.as_mut(), event).await?;
    tx.commit().await?;
    self.record(event, &outcome);
    Ok(outcome)
  }

  pub(crate) fn record(&self, event: &SettlementEvent, outcome: &SettlementOutcome) {
    if let (Some(metrics), SettlementOutcome::Applied) = (&self.metrics, outcome) {
      metrics
        .settlements
        .with_label_values(&[event.network.as_str(), event.kind.name()])
        .inc();
    }
  }
}

/// Apply `event` inside an open transaction.
///
/// # Errors
/// `Conflict` when the event would violate a state machine.
pub async fn apply_in(tx: &mut dyn StoreTx, event: &SettlementEvent) -> LendResult<SettlementOutcome> {
  let network = event.network;
  let tx_hash = Some(event.transaction_hash.clone());
  let at = event.occurred_at.unwrap_or_else(Utc::now);

  let outcome = match &event.kind {
    SettlementKind::LoanStarted {
      borrower,
      borrower_nonce,
      lender,
      lender_nonce,
    } => {
      let borrower = network.normalize_address(borrower);
      let lender = network.normalize_address(lender);
      let Some(mut loan) = tx.loan_by_nonce(network, &borrower, borrower_nonce).await? else {
        return Ok(skipped(event, "unknown loan"));
      };
      if loan.init_tx_hash.is_some() && loan.status != LoanStatus::New {
        return Ok(skipped(event, "loan already started"));
      }
      loan.transition(LoanStatus::Active)?;

      let offers = tx.offers_for_loan(loan.id).await?;
      let accepted = offers
        .iter()
        .find(|o| o.lender == lender && nonce_key(&o.nonce_hex) == nonce_key(lender_nonce))
        .cloned();

      if let Some(offer) = &accepted {
        loan.offer_principal_amount = Some(offer.principal_amount);
        loan.offer_interest_rate = Some(offer.interest_rate);
        loan.offer_duration = Some(offer.duration);
      } else {
        warn!(loan_id = loan.id, lender = %lender, "Started loan with an untracked offer");
      }
      let duration = loan.offer_duration.unwrap_or(loan.duration);
      loan.lender = Some(lender);
      loan.started_at = Some(at);
      loan.expired_at = i64::try_from(duration)
        .ok()
        .and_then(Duration::try_seconds)
        .map(|d| at + d);
      loan.init_tx_hash = tx_hash.clone();
      tx.update_loan(&loan).await?;

      for mut offer in offers.into_iter().filter(|o| o.status == OfferStatus::New) {
        if accepted.as_ref().is_some_and(|a| a.id == offer.id) {
          offer.close(OfferStatus::Approved)?;
          offer.accept_tx_hash = tx_hash.clone();
        } else {
          offer.close(OfferStatus::Rejected)?;
        }
        tx.update_offer(&offer).await?;
      }

      tx.insert_ledger_entry(LoanLedgerEntry::for_loan(&loan, event.kind.ledger_kind(), tx_hash))
        .await?;
      info!(loan_id = loan.id, "Loan started");
      SettlementOutcome::Applied
    }

    SettlementKind::LoanCancelled { borrower, nonce } => {
      let borrower = network.normalize_address(borrower);
      let Some(mut loan) = tx.loan_by_nonce(network, &borrower, nonce).await? else {
        return Ok(skipped(event, "unknown loan"));
      };
      if loan.status == LoanStatus::Cancelled {
        return Ok(skipped(event, "loan already cancelled"));
      }
      loan.transition(LoanStatus::Cancelled)?;
      loan.cancel_tx_hash = tx_hash.clone();
      tx.update_loan(&loan).await?;

      for mut offer in tx.offers_for_loan(loan.id).await? {
        if offer.status == OfferStatus::New {
          offer.close(OfferStatus::Cancelled)?;
          tx.update_offer(&offer).await?;
        }
      }

      tx.insert_ledger_entry(LoanLedgerEntry::for_loan(&loan, event.kind.ledger_kind(), tx_hash))
        .await?;
      info!(loan_id = loan.id, "Loan cancelled");
      SettlementOutcome::Applied
    }

    SettlementKind::OfferCancelled { lender, nonce } => {
      let lender = network.normalize_address(lender);
      let Some(mut offer) = tx.offer_by_nonce(&lender, nonce).await? else {
        return Ok(skipped(event, "unknown offer"));
      };
      match offer.status {
        OfferStatus::Cancelled | OfferStatus::Rejected => {
          return Ok(skipped(event, "offer already closed"));
        }
        OfferStatus::Approved => {
          return Err(LendError::conflict(format!(
            "offer {} was approved and cannot be cancelled",
            offer.id
          )));
        }
        OfferStatus::New => {}
      }
      offer.close(OfferStatus::Cancelled)?;
      offer.cancel_tx_hash = tx_hash.clone();
      tx.update_offer(&offer).await?;

      if let Some(loan) = tx.loan(offer.loan_id).await? {
        let mut entry = LoanLedgerEntry::for_loan(&loan, event.kind.ledger_kind(), tx_hash);
        entry.lender = Some(offer.lender.clone());
        entry.principal_amount = offer.principal_amount;
        entry.interest_rate = offer.interest_rate;
        entry.duration = offer.duration;
        tx.insert_ledger_entry(entry).await?;
      }
      info!(offer_id = offer.id, "Offer cancelled");
      SettlementOutcome::Applied
    }

    SettlementKind::LoanRepaid { borrower, nonce }
    | SettlementKind::LoanLiquidated { borrower, nonce } => {
      let next = if matches!(event.kind, SettlementKind::LoanRepaid { .. }) {
        LoanStatus::Finished
      } else {
        LoanStatus::Liquidated
      };
      let borrower = network.normalize_address(borrower);
      let Some(mut loan) = tx.loan_by_nonce(network, &borrower, nonce).await? else {
        return Ok(skipped(event, "unknown loan"));
      };
      if loan.status == next {
        return Ok(skipped(event, "loan already closed"));
      }
      loan.transition(next)?;
      loan.finished_at = Some(at);
      if next == LoanStatus::Finished {
        loan.pay_tx_hash = tx_hash.clone();
      } else {
        loan.liquidate_tx_hash = tx_hash.clone();
      }
      tx.update_loan(&loan).await?;

      tx.insert_ledger_entry(LoanLedgerEntry::for_loan(&loan, event.kind.ledger_kind(), tx_hash))
        .await?;
      info!(loan_id = loan.id, status = ?next, "Loan closed");
      SettlementOutcome::Applied
    }
  };

  Ok(outcome)
}

fn skipped(event: &SettlementEvent, reason: &str) -> SettlementOutcome {
  warn!(
    network = %event.network,
    kind = event.kind.name(),
    tx_hash = %event.transaction_hash,
    reason,
    "Settlement event skipped"
  );
  SettlementOutcome::Skipped(reason.to_string())
}

//! Loan Offer Workflow - Signed Listings and Offers
//!
//! `create_loan` and `create_loan_offer` accept terms that a wallet has
//! signed for the on-chain lending contract. Each call validates its
//! input, rebuilds the canonical message and checks the signer before
//! any write. Chain and metadata calls run with no transaction open; the
//! records are then written in a single transaction that re-reads every
//! row it depends on. Any failure drops the transaction, so a lazily
//! created asset or collection never outlives a rejected signature.
//!
//! Loans and offers only leave `New` through settlement events.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::signature::SignatureVerifier;
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::{
  Asset, CanonicalMessage, Collection, Currency, LedgerEntryKind, LendError, LendResult, Loan,
  LoanLedgerEntry, LoanOffer, LoanStatus, Network, OfferStatus, RecordId, SignedTerms,
  TokenMetadata, canonicalize,
};
use crate::ports::chain_client::ChainRegistry;
use crate::ports::marketplace::MetadataFetcher;
use crate::ports::store::{Store, StoreTx};

/// Borrower listing terms as signed by the borrower's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateLoanRequest {
  pub network: Network,
  pub principal_amount: Decimal,
  pub currency_id: RecordId,
  /// Seconds.
  pub duration: u64,
  #[serde(default)]
  pub interest_rate: Decimal,
  pub borrower: String,
  pub contract_address: String,
  pub token_id: String,
  pub nonce: String,
  pub signature: String,
}

/// Lender offer terms as signed by the lender's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateOfferRequest {
  pub principal_amount: Decimal,
  /// Seconds.
  pub duration: u64,
  #[serde(default)]
  pub interest_rate: Decimal,
  pub lender: String,
  pub nonce: String,
  pub signature: String,
}

/// Creates loans and offers from signed terms.
pub struct LoanOfferWorkflow<S: Store, M: MetadataFetcher + ?Sized> {
  store: Arc<S>,
  metadata: Arc<M>,
  chains: ChainRegistry,
  verifier: SignatureVerifier,
  /// Flat admin fee per network, committed to in every signature.
  admin_fees: HashMap<Network, u64>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl<S: Store, M: MetadataFetcher + ?Sized> LoanOfferWorkflow<S, M> {
  pub fn new(store: Arc<S>, metadata: Arc<M>, chains: ChainRegistry) -> Self {
    Self {
      store,
      metadata,
      verifier: SignatureVerifier::new(chains.clone()),
      chains,
      admin_fees: HashMap::new(),
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_admin_fee(mut self, network: Network, fee: u64) -> Self {
    self.admin_fees.insert(network, fee);
    self
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  fn admin_fee(&self, network: Network) -> u64 {
    self.admin_fees.get(&network).copied().unwrap_or(0)
  }

  /// List an NFT as collateral.
  ///
  /// # Errors
  /// - `Validation` for missing fields or a network without signed listings
  /// - `NotFound` for an unknown currency
  /// - `SignatureMismatch` when the borrower did not sign the terms
  /// - `Conflict` when the asset already has a `New` loan
  #[instrument(skip(self, request), fields(network = %request.network, token_id = %request.token_id))]
  pub async fn create_loan(&self, request: CreateLoanRequest) -> LendResult<Loan> {
    let request = validate_loan(request)?;
    let network = request.network;
    let chain = self.chains.get(network)?;

    let (currency, known) = {
      let mut tx = self.store.begin().await?;
      let currency = enabled_currency(tx.as_mut(), request.currency_id, network).await?;
      let known = tx
        .asset_by_token(network, &request.contract_address, &request.token_id)
        .await?;
      (currency, known)
    };

    let message = canonicalize(&SignedTerms {
      principal_amount: request.principal_amount,
      currency_decimals: currency.decimals,
      token_id: request.token_id.clone(),
      duration: request.duration,
      interest_rate: request.interest_rate,
      admin_fee: self.admin_fee(network),
      nonce_hex: request.nonce.clone(),
      collateral_contract: request.contract_address.clone(),
      currency_contract: currency.contract_address.clone(),
      counterparty: request.borrower.clone(),
      chain_id: chain.chain_id(),
    })?;
    self
      .check_signature(network, "loan", &message, &request.signature, &request.borrower)
      .await?;

    // Token metadata is fetched with no transaction open.
    let catalog = match known {
      Some(_) => None,
      None => {
        let uri = chain
          .token_uri(&request.contract_address, &request.token_id)
          .await?;
        let meta = self.metadata.fetch_metadata(&uri).await?;
        Some((uri, meta))
      }
    };

    let mut tx = self.store.begin().await?;
    let currency = enabled_currency(tx.as_mut(), currency.id, network).await?;
    let asset = resolve_asset(
      tx.as_mut(),
      network,
      &request.contract_address,
      &request.token_id,
      catalog,
    )
    .await?;

    if let Some(open) = tx.open_loan_for_asset(asset.id).await? {
      return Err(LendError::conflict(format!(
        "asset {} already has open loan {}",
        asset.id, open.id
      )));
    }

    let now = Utc::now();
    let loan = tx
      .insert_loan(Loan {
        id: 0,
        network,
        owner: request.borrower,
        asset_id: asset.id,
        currency_id: currency.id,
        principal_amount: request.principal_amount,
        interest_rate: request.interest_rate,
        duration: request.duration,
        started_at: Some(now),
        expired_at: Some(expiry(now, request.duration)?),
        finished_at: None,
        status: LoanStatus::New,
        signature: request.signature,
        nonce_hex: request.nonce,
        lender: None,
        offer_principal_amount: None,
        offer_interest_rate: None,
        offer_duration: None,
        init_tx_hash: None,
        cancel_tx_hash: None,
        pay_tx_hash: None,
        liquidate_tx_hash: None,
        created_at: now,
      })
      .await?;
    tx.insert_ledger_entry(LoanLedgerEntry::for_loan(&loan, LedgerEntryKind::Listed, None))
      .await?;
    tx.commit().await?;

    if let Some(metrics) = &self.metrics {
      metrics
        .loans_created
        .with_label_values(&[network.as_str()])
        .inc();
    }
    info!(
      loan_id = loan.id,
      asset_id = asset.id,
      borrower = %loan.owner,
      principal = %loan.principal_amount,
      "Loan listed"
    );
    Ok(loan)
  }

  /// Offer to fund a `New` loan.
  ///
  /// # Errors
  /// - `Validation` for missing fields
  /// - `NotFound` for an unknown loan, currency or asset
  /// - `Conflict` when the loan is not `New` or the (lender, nonce) pair is taken
  /// - `SignatureMismatch` when the lender did not sign the terms
  #[instrument(skip(self, request), fields(lender = %request.lender))]
  pub async fn create_loan_offer(
    &self,
    loan_id: RecordId,
    request: CreateOfferRequest,
  ) -> LendResult<LoanOffer> {
    let request = validate_offer(loan_id, request)?;

    let (loan, currency, asset) = {
      let mut tx = self.store.begin().await?;
      let loan = new_loan(tx.as_mut(), loan_id).await?;
      let currency = enabled_currency(tx.as_mut(), loan.currency_id, loan.network).await?;
      let asset = tx
        .asset(loan.asset_id)
        .await?
        .ok_or_else(|| LendError::not_found(format!("asset {}", loan.asset_id)))?;
      (loan, currency, asset)
    };

    let network = loan.network;
    let chain = self.chains.get(network)?;
    let lender = network.normalize_address(&request.lender);

    let message = canonicalize(&SignedTerms {
      principal_amount: request.principal_amount,
      currency_decimals: currency.decimals,
      token_id: asset.token_id.clone(),
      duration: request.duration,
      interest_rate: request.interest_rate,
      admin_fee: self.admin_fee(network),
      nonce_hex: request.nonce.clone(),
      collateral_contract: asset.contract_address.clone(),
      currency_contract: currency.contract_address.clone(),
      counterparty: lender.clone(),
      chain_id: chain.chain_id(),
    })?;
    self
      .check_signature(network, "offer", &message, &request.signature, &lender)
      .await?;

    // Re-read under the write transaction: the loan may have left `New`.
    let mut tx = self.store.begin().await?;
    new_loan(tx.as_mut(), loan_id).await?;
    if let Some(existing) = tx.offer_by_nonce(&lender, &request.nonce).await? {
      return Err(LendError::conflict(format!(
        "nonce {} of {lender} already used by offer {}",
        request.nonce, existing.id
      )));
    }

    let offer = tx
      .insert_offer(LoanOffer {
        id: 0,
        network,
        loan_id,
        lender,
        principal_amount: request.principal_amount,
        interest_rate: request.interest_rate,
        duration: request.duration,
        status: OfferStatus::New,
        nonce_hex: request.nonce,
        signature: request.signature,
        accept_tx_hash: None,
        cancel_tx_hash: None,
        created_at: Utc::now(),
      })
      .await?;
    tx.commit().await?;

    if let Some(metrics) = &self.metrics {
      metrics
        .offers_created
        .with_label_values(&[network.as_str()])
        .inc();
    }
    info!(
      offer_id = offer.id,
      loan_id,
      lender = %offer.lender,
      principal = %offer.principal_amount,
      "Loan offer created"
    );
    Ok(offer)
  }

  async fn check_signature(
    &self,
    network: Network,
    kind: &str,
    message: &CanonicalMessage,
    signature: &str,
    signer: &str,
  ) -> LendResult<()> {
    let result = self.verifier.verify(network, message, signature, signer).await;
    if let (Err(LendError::SignatureMismatch { .. }), Some(metrics)) = (&result, &self.metrics) {
      metrics
        .signature_rejections
        .with_label_values(&[network.as_str(), kind])
        .inc();
    }
    result
  }
}

/// Existing asset for the token, or a new one built from the metadata
/// fetched before the transaction opened.
async fn resolve_asset(
  tx: &mut dyn StoreTx,
  network: Network,
  contract_address: &str,
  token_id: &str,
  catalog: Option<(String, TokenMetadata)>,
) -> LendResult<Asset> {
  if let Some(asset) = tx.asset_by_token(network, contract_address, token_id).await? {
    return Ok(asset);
  }
  let Some((uri, meta)) = catalog else {
    return Err(LendError::conflict(format!(
      "asset {contract_address}/{token_id} changed while the loan was prepared"
    )));
  };

  let collection = match tx.collection_by_contract(network, contract_address).await? {
    Some(collection) => collection,
    None => {
      let created = tx
        .insert_collection(Collection::first_seen(network, contract_address, &meta))
        .await?;
      debug!(collection_id = created.id, contract_address, "Collection created");
      created
    }
  };

  let asset = tx
    .insert_asset(Asset::from_metadata(&collection, token_id, &uri, &meta)?)
    .await?;
  debug!(asset_id = asset.id, token_id, "Asset created from token metadata");
  Ok(asset)
}

async fn new_loan(tx: &mut dyn StoreTx, loan_id: RecordId) -> LendResult<Loan> {
  let loan = tx
    .loan(loan_id)
    .await?
    .ok_or_else(|| LendError::not_found(format!("loan {loan_id}")))?;
  if loan.status != LoanStatus::New {
    return Err(LendError::conflict(format!(
      "loan {loan_id} is {:?} and no longer takes offers",
      loan.status
    )));
  }
  Ok(loan)
}

async fn enabled_currency(
  tx: &mut dyn StoreTx,
  currency_id: RecordId,
  network: Network,
) -> LendResult<Currency> {
  tx.currency(currency_id, network)
    .await?
    .filter(|c| c.enabled)
    .ok_or_else(|| LendError::not_found(format!("currency {currency_id} on {network}")))
}

fn expiry(start: DateTime<Utc>, duration: u64) -> LendResult<DateTime<Utc>> {
  i64::try_from(duration)
    .ok()
    .and_then(Duration::try_seconds)
    .and_then(|d| start.checked_add_signed(d))
    .ok_or_else(|| LendError::validation(format!("duration {duration} is out of range")))
}

fn require(value: &str, field: &str) -> LendResult<()> {
  if value.trim().is_empty() {
    return Err(LendError::validation(format!("{field} is required")));
  }
  Ok(())
}

fn require_terms(principal: Decimal, interest_rate: Decimal, duration: u64) -> LendResult<()> {
  if principal <= Decimal::ZERO {
    return Err(LendError::validation("principal_amount must be positive"));
  }
  if interest_rate < Decimal::ZERO {
    return Err(LendError::validation("interest_rate must not be negative"));
  }
  if duration == 0 {
    return Err(LendError::validation("duration is required"));
  }
  Ok(())
}

fn validate_loan(mut request: CreateLoanRequest) -> LendResult<CreateLoanRequest> {
  if !request.network.supports_signed_listing() {
    return Err(LendError::validation(format!(
      "network {} does not accept signed listings",
      request.network
    )));
  }
  require_terms(request.principal_amount, request.interest_rate, request.duration)?;
  if request.currency_id == 0 {
    return Err(LendError::validation("currency_id is required"));
  }
  require(&request.borrower, "borrower")?;
  require(&request.contract_address, "contract_address")?;
  require(&request.token_id, "token_id")?;
  require(&request.nonce, "nonce")?;
  require(&request.signature, "signature")?;

  request.borrower = request.network.normalize_address(&request.borrower);
  request.contract_address = request.network.normalize_address(&request.contract_address);
  request.token_id = request.token_id.trim().to_string();
  request.nonce = request.nonce.trim().to_lowercase();
  request.signature = request.signature.trim().to_lowercase();
  Ok(request)
}

fn validate_offer(loan_id: RecordId, mut request: CreateOfferRequest) -> LendResult<CreateOfferRequest> {
  if loan_id == 0 {
    return Err(LendError::validation("loan id is required"));
  }
  require_terms(request.principal_amount, request.interest_rate, request.duration)?;
  require(&request.lender, "lender")?;
  require(&request.nonce, "nonce")?;
  require(&request.signature, "signature")?;

  request.nonce = request.nonce.trim().to_lowercase();
  request.signature = request.signature.trim().to_lowercase();
  Ok(request)
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  fn loan_request() -> CreateLoanRequest {
    CreateLoanRequest {
      network: Network::Matic,
      principal_amount: dec!(100),
      currency_id: 1,
      duration: 86_400,
      interest_rate: dec!(0.12),
      borrower: " 0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD ".into(),
      contract_address: "0x1111111111111111111111111111111111111111".into(),
      token_id: "42".into(),
      nonce: "0x0A".into(),
      signature: "0xAB".into(),
    }
  }

  #[test]
  fn test_validate_loan_normalizes() {
    let request = validate_loan(loan_request()).unwrap();
    assert_eq!(request.borrower, "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd");
    assert_eq!(request.nonce, "0x0a");
    assert_eq!(request.signature, "0xab");
  }

  #[test]
  fn test_validate_loan_rejects_bad_terms() {
    let mut r = loan_request();
    r.principal_amount = dec!(0);
    assert!(matches!(validate_loan(r), Err(LendError::Validation(_))));

    let mut r = loan_request();
    r.network = Network::Eth;
    assert!(matches!(validate_loan(r), Err(LendError::Validation(_))));

    let mut r = loan_request();
    r.signature = "  ".into();
    assert!(matches!(validate_loan(r), Err(LendError::Validation(_))));

    let mut r = loan_request();
    r.duration = 0;
    assert!(matches!(validate_loan(r), Err(LendError::Validation(_))));
  }

  #[test]
  fn test_validate_offer_requires_fields() {
    let offer = CreateOfferRequest {
      principal_amount: dec!(90),
      duration: 3600,
      interest_rate: dec!(0.1),
      lender: "0xabc".into(),
      nonce: "0x01".into(),
      signature: "0x00".into(),
    };
    assert!(validate_offer(7, offer.clone()).is_ok());
    assert!(matches!(validate_offer(0, offer.clone()), Err(LendError::Validation(_))));

    let mut missing = offer;
    missing.lender = String::new();
    assert!(matches!(validate_offer(7, missing), Err(LendError::Validation(_))));
  }

  #[test]
  fn test_expiry_adds_duration() {
    let start = Utc::now();
    assert_eq!(expiry(start, 60).unwrap(), start + Duration::seconds(60));
    assert!(expiry(start, u64::MAX).is_err());
  }
}

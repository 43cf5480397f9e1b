//! Lending Records - Loans, Offers, Assets and Ledger Entries
//!
//! Plain serializable records shared by the store, the workflows and
//! the chain hooks. Status enums carry the loan and offer state
//! machines; everything else is data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::{LendError, LendResult};
use super::market::MarketSource;
use super::network::Network;

/// Store-assigned record identifier.
pub type RecordId = u64;

/// Loan lifecycle.
///
/// `New → Active → {Finished | Liquidated}`, and `New → Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    New,
    Active,
    Finished,
    Liquidated,
    Cancelled,
}

impl LoanStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Liquidated | Self::Cancelled)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Active | Self::Cancelled)
                | (Self::Active, Self::Finished | Self::Liquidated)
        )
    }
}

/// Offer lifecycle: `New → {Approved | Rejected | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    New,
    Approved,
    Rejected,
    Cancelled,
}

impl OfferStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::New)
    }
}

/// Lending currency (reference data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: RecordId,
    pub network: Network,
    pub symbol: String,
    /// Token contract on `network` (empty for a native coin).
    pub contract_address: String,
    /// Integer precision used when scaling amounts.
    pub decimals: u32,
    pub enabled: bool,
}

/// NFT collection, created the first time one of its tokens is listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: RecordId,
    pub network: Network,
    pub slug: String,
    pub contract_address: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

impl Collection {
    /// Collection for a contract seen for the first time.
    pub fn first_seen(network: Network, contract_address: &str, meta: &TokenMetadata) -> Self {
        Self {
            id: 0,
            network,
            slug: make_slug(contract_address),
            contract_address: contract_address.to_string(),
            name: String::new(),
            description: meta.description.clone(),
            enabled: true,
        }
    }
}

/// Token metadata document served from a token URI.
///
/// Attributes are opaque to the lending core and stored as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub external_url: String,
    pub attributes: serde_json::Value,
}

/// Collateral NFT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: RecordId,
    pub network: Network,
    pub collection_id: RecordId,
    pub slug: String,
    pub contract_address: String,
    /// Address of the same token on a test deployment, if any.
    pub test_contract_address: Option<String>,
    pub token_id: String,
    pub name: String,
    pub image_url: String,
    pub external_url: String,
    pub attributes: String,
    pub meta_json: String,
    pub meta_json_url: String,
    /// Last crawl per external source.
    #[serde(default)]
    pub crawled_at: BTreeMap<MarketSource, DateTime<Utc>>,
}

impl Asset {
    /// Build a new asset from fetched metadata.
    pub fn from_metadata(
        collection: &Collection,
        token_id: &str,
        meta_json_url: &str,
        meta: &TokenMetadata,
    ) -> LendResult<Self> {
        let attributes = serde_json::to_string(&meta.attributes)
            .map_err(|e| LendError::validation(format!("token attributes: {e}")))?;
        let meta_json = serde_json::to_string(meta)
            .map_err(|e| LendError::validation(format!("token metadata: {e}")))?;
        Ok(Self {
            id: 0,
            network: collection.network,
            collection_id: collection.id,
            slug: make_slug(&format!("{}-{token_id}", collection.contract_address)),
            contract_address: collection.contract_address.clone(),
            test_contract_address: None,
            token_id: token_id.to_string(),
            name: meta.name.clone(),
            image_url: meta.image.clone(),
            external_url: meta.external_url.clone(),
            attributes,
            meta_json,
            meta_json_url: meta_json_url.to_string(),
            crawled_at: BTreeMap::new(),
        })
    }

    /// Address used when querying marketplaces (test address wins).
    pub fn crawl_address(&self) -> &str {
        self.test_contract_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.contract_address)
    }

    pub fn last_crawled(&self, source: MarketSource) -> Option<DateTime<Utc>> {
        self.crawled_at.get(&source).copied()
    }

    pub fn mark_crawled(&mut self, source: MarketSource, at: DateTime<Utc>) {
        self.crawled_at.insert(source, at);
    }
}

/// Borrower listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: RecordId,
    pub network: Network,
    /// Borrower address.
    pub owner: String,
    pub asset_id: RecordId,
    pub currency_id: RecordId,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    /// Seconds.
    pub duration: u64,
    pub started_at: Option<DateTime<Utc>>,
    /// Advisory; only a liquidation event ends a loan.
    pub expired_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub signature: String,
    pub nonce_hex: String,
    /// Lender of the approved offer once started.
    pub lender: Option<String>,
    pub offer_principal_amount: Option<Decimal>,
    pub offer_interest_rate: Option<Decimal>,
    pub offer_duration: Option<u64>,
    pub init_tx_hash: Option<String>,
    pub cancel_tx_hash: Option<String>,
    pub pay_tx_hash: Option<String>,
    pub liquidate_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Loan {
    /// Move to `next`, enforcing the state machine.
    ///
    /// # Errors
    /// `Conflict` for an illegal transition.
    pub fn transition(&mut self, next: LoanStatus) -> LendResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(LendError::conflict(format!(
                "loan {} cannot move from {:?} to {next:?}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Lender offer against a `New` loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanOffer {
    pub id: RecordId,
    pub network: Network,
    pub loan_id: RecordId,
    pub lender: String,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    pub duration: u64,
    pub status: OfferStatus,
    pub nonce_hex: String,
    pub signature: String,
    pub accept_tx_hash: Option<String>,
    pub cancel_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LoanOffer {
    /// Close a `New` offer.
    ///
    /// # Errors
    /// `Conflict` if the offer is already closed.
    pub fn close(&mut self, next: OfferStatus) -> LendResult<()> {
        if self.status.is_terminal() || next == OfferStatus::New {
            return Err(LendError::conflict(format!(
                "offer {} cannot move from {:?} to {next:?}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Kind of immutable loan ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Listed,
    Started,
    Cancelled,
    OfferCancelled,
    Repaid,
    Liquidated,
}

/// Immutable loan ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanLedgerEntry {
    pub id: RecordId,
    pub network: Network,
    pub loan_id: RecordId,
    pub kind: LedgerEntryKind,
    pub borrower: String,
    pub lender: Option<String>,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    pub duration: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LoanLedgerEntry {
    /// Snapshot of `loan` under the given kind.
    pub fn for_loan(loan: &Loan, kind: LedgerEntryKind, tx_hash: Option<String>) -> Self {
        Self {
            id: 0,
            network: loan.network,
            loan_id: loan.id,
            kind,
            borrower: loan.owner.clone(),
            lender: loan.lender.clone(),
            principal_amount: loan.offer_principal_amount.unwrap_or(loan.principal_amount),
            interest_rate: loan.offer_interest_rate.unwrap_or(loan.interest_rate),
            duration: loan.offer_duration.unwrap_or(loan.duration),
            started_at: loan.started_at,
            expired_at: loan.expired_at,
            tx_hash,
            created_at: Utc::now(),
        }
    }
}

/// Kind of externally observed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetTransactionKind {
    Exchange,
}

/// One externally observed trade of an asset. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTransaction {
    pub id: RecordId,
    pub source: MarketSource,
    pub network: Network,
    pub asset_id: RecordId,
    pub kind: AssetTransactionKind,
    pub seller: String,
    pub buyer: String,
    pub external_id: Option<String>,
    pub transaction_at: Option<DateTime<Utc>>,
    pub amount: Decimal,
    pub currency_id: RecordId,
    pub created_at: DateTime<Utc>,
}

/// Non-EVM instruction already applied, keyed by transaction and index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub network: Network,
    pub transaction_hash: String,
    pub instruction_index: u32,
    pub block_number: u64,
    pub instruction: String,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Page {
    pub const fn new(page: usize, limit: usize) -> Self {
        Self { page, limit }
    }

    pub const fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// URL slug: lowercase alphanumerics separated by single dashes.
pub fn make_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn loan(status: LoanStatus) -> Loan {
        Loan {
            id: 1,
            network: Network::Matic,
            owner: "0xb0".into(),
            asset_id: 1,
            currency_id: 1,
            principal_amount: dec!(100),
            interest_rate: dec!(0.1),
            duration: 60,
            started_at: None,
            expired_at: None,
            finished_at: None,
            status,
            signature: "0xsig".into(),
            nonce_hex: "0x01".into(),
            lender: None,
            offer_principal_amount: None,
            offer_interest_rate: None,
            offer_duration: None,
            init_tx_hash: None,
            cancel_tx_hash: None,
            pay_tx_hash: None,
            liquidate_tx_hash: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_loan_state_machine() {
        let mut l = loan(LoanStatus::New);
        assert!(l.transition(LoanStatus::Finished).is_err());
        l.transition(LoanStatus::Active).unwrap();
        l.transition(LoanStatus::Liquidated).unwrap();
        assert!(l.status.is_terminal());
        assert!(matches!(
            l.transition(LoanStatus::Active),
            Err(LendError::Conflict(_))
        ));
    }

    #[test]
    fn test_offer_closes_once() {
        let mut offer = LoanOffer {
            id: 3,
            network: Network::Matic,
            loan_id: 1,
            lender: "0xl".into(),
            principal_amount: dec!(1),
            interest_rate: dec!(0),
            duration: 1,
            status: OfferStatus::New,
            nonce_hex: "0x1".into(),
            signature: "0x".into(),
            accept_tx_hash: None,
            cancel_tx_hash: None,
            created_at: Utc::now(),
        };
        offer.close(OfferStatus::Approved).unwrap();
        assert!(offer.close(OfferStatus::Cancelled).is_err());
    }

    #[test]
    fn test_ledger_entry_prefers_offer_terms() {
        let mut l = loan(LoanStatus::Active);
        l.offer_principal_amount = Some(dec!(90));
        let entry = LoanLedgerEntry::for_loan(&l, LedgerEntryKind::Started, Some("0xtx".into()));
        assert_eq!(entry.principal_amount, dec!(90));
        assert_eq!(entry.interest_rate, dec!(0.1));
    }

    #[test]
    fn test_slug() {
        assert_eq!(make_slug("0xAbC-12"), "0xabc-12");
        assert_eq!(make_slug("  Cool Cats!! #1 "), "cool-cats-1");
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::new(1, 20).offset(), 0);
        assert_eq!(Page::new(3, 10).offset(), 20);
        assert_eq!(Page::new(0, 10).offset(), 0);
    }

    #[test]
    fn test_crawl_address_prefers_test_address() {
        let meta = TokenMetadata::default();
        let collection = Collection::first_seen(Network::Sol, "Mint111", &meta);
        let mut asset = Asset::from_metadata(&collection, "1", "https://x", &meta).unwrap();
        assert_eq!(asset.crawl_address(), "Mint111");
        asset.test_contract_address = Some("DevMint".into());
        assert_eq!(asset.crawl_address(), "DevMint");
    }
}

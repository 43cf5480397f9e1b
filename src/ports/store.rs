//! Store Port - Transactional Record Persistence
//!
//! Every read and write of lending records goes through a `StoreTx`
//! obtained from `Store::begin`. Writes become visible only on
//! `commit`; dropping a transaction without committing discards all
//! of its writes. Workflows re-read the rows they depend on inside
//! the transaction instead of trusting copies read earlier.

use async_trait::async_trait;

use crate::domain::{
  Asset, AssetTransaction, Collection, Currency, LendResult, Loan, LoanLedgerEntry, LoanOffer,
  MarketSource, Network, Page, RecordId,
};
use crate::domain::models::InstructionRecord;

/// Entry point of the persistence capability.
#[async_trait]
pub trait Store: Send + Sync + 'static {
  /// Open a unit of work.
  async fn begin(&self) -> LendResult<Box<dyn StoreTx>>;
}

/// One unit of work. Inserts assign ids and return the stored record.
#[async_trait]
pub trait StoreTx: Send {
  // ── Reference data ──────────────────────────────────────

  async fn currency(&mut self, id: RecordId, network: Network) -> LendResult<Option<Currency>>;

  async fn currency_by_symbol(
    &mut self,
    network: Network,
    symbol: &str,
  ) -> LendResult<Option<Currency>>;

  async fn insert_currency(&mut self, currency: Currency) -> LendResult<Currency>;

  // ── Catalog ─────────────────────────────────────────────

  async fn collection_by_contract(
    &mut self,
    network: Network,
    contract_address: &str,
  ) -> LendResult<Option<Collection>>;

  async fn insert_collection(&mut self, collection: Collection) -> LendResult<Collection>;

  async fn asset(&mut self, id: RecordId) -> LendResult<Option<Asset>>;

  async fn asset_by_token(
    &mut self,
    network: Network,
    contract_address: &str,
    token_id: &str,
  ) -> LendResult<Option<Asset>>;

  /// Most recent asset whose primary contract address equals `address`.
  async fn asset_by_contract_address(&mut self, address: &str) -> LendResult<Option<Asset>>;

  /// Most recent asset whose test contract address equals `address`.
  async fn asset_by_test_address(&mut self, address: &str) -> LendResult<Option<Asset>>;

  async fn insert_asset(&mut self, asset: Asset) -> LendResult<Asset>;

  async fn update_asset(&mut self, asset: &Asset) -> LendResult<()>;

  // ── Loans and offers ────────────────────────────────────

  async fn loan(&mut self, id: RecordId) -> LendResult<Option<Loan>>;

  /// The loan in status `New` for the asset, if any.
  async fn open_loan_for_asset(&mut self, asset_id: RecordId) -> LendResult<Option<Loan>>;

  /// Loan signed by `owner` with `nonce` (nonces compared numerically).
  async fn loan_by_nonce(
    &mut self,
    network: Network,
    owner: &str,
    nonce: &str,
  ) -> LendResult<Option<Loan>>;

  async fn insert_loan(&mut self, loan: Loan) -> LendResult<Loan>;

  async fn update_loan(&mut self, loan: &Loan) -> LendResult<()>;

  /// Offer signed by `lender` with `nonce` (nonces compared numerically).
  ///
  /// `lender` must already be normalized for its network.
  async fn offer_by_nonce(&mut self, lender: &str, nonce: &str) -> LendResult<Option<LoanOffer>>;

  async fn offers_for_loan(&mut self, loan_id: RecordId) -> LendResult<Vec<LoanOffer>>;

  async fn insert_offer(&mut self, offer: LoanOffer) -> LendResult<LoanOffer>;

  async fn update_offer(&mut self, offer: &LoanOffer) -> LendResult<()>;

  async fn insert_ledger_entry(&mut self, entry: LoanLedgerEntry) -> LendResult<LoanLedgerEntry>;

  async fn ledger_for_loan(&mut self, loan_id: RecordId) -> LendResult<Vec<LoanLedgerEntry>>;

  // ── External trades ─────────────────────────────────────

  async fn asset_transaction_by_external_id(
    &mut self,
    source: MarketSource,
    external_id: &str,
  ) -> LendResult<Option<AssetTransaction>>;

  async fn insert_asset_transaction(
    &mut self,
    transaction: AssetTransaction,
  ) -> LendResult<AssetTransaction>;

  /// Transactions of an asset, newest first, with the total count.
  async fn asset_transactions(
    &mut self,
    asset_id: RecordId,
    page: Page,
  ) -> LendResult<(Vec<AssetTransaction>, usize)>;

  // ── Chain cursors ───────────────────────────────────────

  async fn block_cursor(&mut self, network: Network) -> LendResult<Option<u64>>;

  async fn set_block_cursor(&mut self, network: Network, block: u64) -> LendResult<()>;

  async fn instruction_seen(
    &mut self,
    network: Network,
    transaction_hash: &str,
    instruction_index: u32,
  ) -> LendResult<bool>;

  async fn record_instruction(&mut self, record: InstructionRecord) -> LendResult<()>;

  /// Publish every write made through this transaction.
  async fn commit(self: Box<Self>) -> LendResult<()>;
}

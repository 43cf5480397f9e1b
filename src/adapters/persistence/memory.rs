//! Memory Store - Serializable In-Process Transactions
//!
//! Implements the `Store` port over a single `StoreSnapshot` guarded by
//! an async mutex. A transaction owns the lock for its whole lifetime
//! and works on a private copy; `commit` swaps the copy in, dropping
//! the transaction discards it. Transactions are therefore fully
//! serialized, and the uniqueness rules of the lending ledger are
//! checked on insert against the copy being committed.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::canonical::nonce_key;
use crate::domain::models::InstructionRecord;
use crate::domain::{
    Asset, AssetTransaction, Collection, Currency, LendError, LendResult, Loan, LoanLedgerEntry,
    LoanOffer, LoanStatus, MarketSource, Network, Page, RecordId,
};
use crate::ports::store::{Store, StoreTx};

/// Every record held by the store. Also the on-disk snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    /// Last id handed out; ids are shared across record kinds.
    pub last_id: RecordId,
    pub currencies: BTreeMap<RecordId, Currency>,
    pub collections: BTreeMap<RecordId, Collection>,
    pub assets: BTreeMap<RecordId, Asset>,
    pub loans: BTreeMap<RecordId, Loan>,
    pub offers: BTreeMap<RecordId, LoanOffer>,
    pub ledger: BTreeMap<RecordId, LoanLedgerEntry>,
    pub asset_transactions: BTreeMap<RecordId, AssetTransaction>,
    pub block_cursors: BTreeMap<Network, u64>,
    pub instructions: Vec<InstructionRecord>,
}

impl StoreSnapshot {
    fn next_id(&mut self) -> RecordId {
        self.last_id += 1;
        self.last_id
    }

    fn assign_id(&mut self, id: RecordId) -> RecordId {
        if id == 0 {
            self.next_id()
        } else {
            self.last_id = self.last_id.max(id);
            id
        }
    }
}

/// In-process transactional store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store starting from a previously saved snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(snapshot)),
        }
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.lock().await.clone()
    }

    /// Insert or replace a reference currency outside any transaction.
    pub async fn seed_currency(&self, currency: Currency) -> Currency {
        let mut state = self.inner.lock().await;
        let mut currency = currency;
        currency.id = state.assign_id(currency.id);
        state.currencies.insert(currency.id, currency.clone());
        currency
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> LendResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }
}

/// Open transaction: the held lock plus the working copy.
struct MemoryTx {
    guard: OwnedMutexGuard<StoreSnapshot>,
    work: StoreSnapshot,
}

fn same_nonce(a: &str, b: &str) -> bool {
    nonce_key(a) == nonce_key(b)
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn currency(&mut self, id: RecordId, network: Network) -> LendResult<Option<Currency>> {
        Ok(self
            .work
            .currencies
            .get(&id)
            .filter(|c| c.network == network)
            .cloned())
    }

    async fn currency_by_symbol(
        &mut self,
        network: Network,
        symbol: &str,
    ) -> LendResult<Option<Currency>> {
        Ok(self
            .work
            .currencies
            .values()
            .find(|c| c.network == network && c.symbol.eq_ignore_ascii_case(symbol))
            .cloned())
    }

    async fn insert_currency(&mut self, mut currency: Currency) -> LendResult<Currency> {
        currency.id = self.work.assign_id(currency.id);
        self.work.currencies.insert(currency.id, currency.clone());
        Ok(currency)
    }

    async fn collection_by_contract(
        &mut self,
        network: Network,
        contract_address: &str,
    ) -> LendResult<Option<Collection>> {
        Ok(self
            .work
            .collections
            .values()
            .find(|c| c.network == network && c.contract_address == contract_address)
            .cloned())
    }

    async fn insert_collection(&mut self, mut collection: Collection) -> LendResult<Collection> {
        let exists = self.work.collections.values().any(|c| {
            c.network == collection.network && c.contract_address == collection.contract_address
        });
        if exists {
            return Err(LendError::conflict(format!(
                "collection {} already exists on {}",
                collection.contract_address, collection.network
            )));
        }
        collection.id = self.work.next_id();
        self.work.collections.insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn asset(&mut self, id: RecordId) -> LendResult<Option<Asset>> {
        Ok(self.work.assets.get(&id).cloned())
    }

    async fn asset_by_token(
        &mut self,
        network: Network,
        contract_address: &str,
        token_id: &str,
    ) -> LendResult<Option<Asset>> {
        Ok(self
            .work
            .assets
            .values()
            .find(|a| {
                a.network == network
                    && a.contract_address == contract_address
                    && a.token_id == token_id
            })
            .cloned())
    }

    async fn asset_by_contract_address(&mut self, address: &str) -> LendResult<Option<Asset>> {
        Ok(self
            .work
            .assets
            .values()
            .rev()
            .find(|a| a.contract_address == address)
            .cloned())
    }

    async fn asset_by_test_address(&mut self, address: &str) -> LendResult<Option<Asset>> {
        Ok(self
            .work
            .assets
            .values()
            .rev()
            .find(|a| a.test_contract_address.as_deref() == Some(address))
            .cloned())
    }

    async fn insert_asset(&mut self, mut asset: Asset) -> LendResult<Asset> {
        let exists = self.work.assets.values().any(|a| {
            a.network == asset.network
                && a.contract_address == asset.contract_address
                && a.token_id == asset.token_id
        });
        if exists {
            return Err(LendError::conflict(format!(
                "asset {}#{} already exists",
                asset.contract_address, asset.token_id
            )));
        }
        asset.id = self.work.next_id();
        self.work.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn update_asset(&mut self, asset: &Asset) -> LendResult<()> {
        match self.work.assets.get_mut(&asset.id) {
            Some(row) => {
                *row = asset.clone();
                Ok(())
            }
            None => Err(LendError::not_found(format!("asset {}", asset.id))),
        }
    }

    async fn loan(&mut self, id: RecordId) -> LendResult<Option<Loan>> {
        Ok(self.work.loans.get(&id).cloned())
    }

    async fn open_loan_for_asset(&mut self, asset_id: RecordId) -> LendResult<Option<Loan>> {
        Ok(self
            .work
            .loans
            .values()
            .find(|l| l.asset_id == asset_id && l.status == LoanStatus::New)
            .cloned())
    }

    async fn loan_by_nonce(
        &mut self,
        network: Network,
        owner: &str,
        nonce: &str,
    ) -> LendResult<Option<Loan>> {
        Ok(self
            .work
            .loans
            .values()
            .rev()
            .find(|l| l.network == network && l.owner == owner && same_nonce(&l.nonce_hex, nonce))
            .cloned())
    }

    async fn insert_loan(&mut self, mut loan: Loan) -> LendResult<Loan> {
        if loan.status == LoanStatus::New {
            let open = self
                .work
                .loans
                .values()
                .any(|l| l.asset_id == loan.asset_id && l.status == LoanStatus::New);
            if open {
                return Err(LendError::conflict(format!(
                    "asset {} already has an open loan",
                    loan.asset_id
                )));
            }
        }
        loan.id = self.work.next_id();
        self.work.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn update_loan(&mut self, loan: &Loan) -> LendResult<()> {
        match self.work.loans.get_mut(&loan.id) {
            Some(row) => {
                *row = loan.clone();
                Ok(())
            }
            None => Err(LendError::not_found(format!("loan {}", loan.id))),
        }
    }

    async fn offer_by_nonce(&mut self, lender: &str, nonce: &str) -> LendResult<Option<LoanOffer>> {
        Ok(self
            .work
            .offers
            .values()
            .find(|o| o.lender == lender && same_nonce(&o.nonce_hex, nonce))
            .cloned())
    }

    async fn offers_for_loan(&mut self, loan_id: RecordId) -> LendResult<Vec<LoanOffer>> {
        Ok(self
            .work
            .offers
            .values()
            .filter(|o| o.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn insert_offer(&mut self, mut offer: LoanOffer) -> LendResult<LoanOffer> {
        let replay = self
            .work
            .offers
            .values()
            .any(|o| o.lender == offer.lender && same_nonce(&o.nonce_hex, &offer.nonce_hex));
        if replay {
            return Err(LendError::conflict(format!(
                "offer nonce {} already used by {}",
                offer.nonce_hex, offer.lender
            )));
        }
        offer.id = self.work.next_id();
        self.work.offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    async fn update_offer(&mut self, offer: &LoanOffer) -> LendResult<()> {
        match self.work.offers.get_mut(&offer.id) {
            Some(row) => {
                *row = offer.clone();
                Ok(())
            }
            None => Err(LendError::not_found(format!("offer {}", offer.id))),
        }
    }

    async fn insert_ledger_entry(
        &mut self,
        mut entry: LoanLedgerEntry,
    ) -> LendResult<LoanLedgerEntry> {
        entry.id = self.work.next_id();
        self.work.ledger.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn ledger_for_loan(&mut self, loan_id: RecordId) -> LendResult<Vec<LoanLedgerEntry>> {
        Ok(self
            .work
            .ledger
            .values()
            .filter(|e| e.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn asset_transaction_by_external_id(
        &mut self,
        source: MarketSource,
        external_id: &str,
    ) -> LendResult<Option<AssetTransaction>> {
        Ok(self
            .work
            .asset_transactions
            .values()
            .find(|t| t.source == source && t.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn insert_asset_transaction(
        &mut self,
        mut transaction: AssetTransaction,
    ) -> LendResult<AssetTransaction> {
        if let Some(external_id) = transaction.external_id.as_deref() {
            let seen = self.work.asset_transactions.values().any(|t| {
                t.source == transaction.source && t.external_id.as_deref() == Some(external_id)
            });
            if seen {
                return Err(LendError::conflict(format!(
                    "{} transaction {external_id} already recorded",
                    transaction.source
                )));
            }
        }
        transaction.id = self.work.next_id();
        self.work
            .asset_transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn asset_transactions(
        &mut self,
        asset_id: RecordId,
        page: Page,
    ) -> LendResult<(Vec<AssetTransaction>, usize)> {
        let mut rows: Vec<AssetTransaction> = self
            .work
            .asset_transactions
            .values()
            .filter(|t| t.asset_id == asset_id)
            .cloned()
            .collect();
        // Newest first; undated trades sort after dated ones.
        rows.sort_by(|a, b| {
            b.transaction_at
                .cmp(&a.transaction_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let total = rows.len();
        let items = rows
            .into_iter()
            .skip(page.offset())
            .take(page.limit)
            .collect();
        Ok((items, total))
    }

    async fn block_cursor(&mut self, network: Network) -> LendResult<Option<u64>> {
        Ok(self.work.block_cursors.get(&network).copied())
    }

    async fn set_block_cursor(&mut self, network: Network, block: u64) -> LendResult<()> {
        self.work.block_cursors.insert(network, block);
        Ok(())
    }

    async fn instruction_seen(
        &mut self,
        network: Network,
        transaction_hash: &str,
        instruction_index: u32,
    ) -> LendResult<bool> {
        Ok(self.work.instructions.iter().any(|r| {
            r.network == network
                && r.transaction_hash == transaction_hash
                && r.instruction_index == instruction_index
        }))
    }

    async fn record_instruction(&mut self, record: InstructionRecord) -> LendResult<()> {
        if let Err(pos) = self.work.instructions.binary_search(&record) {
            self.work.instructions.insert(pos, record);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LendResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        debug!(at = %Utc::now(), "Store transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{OfferStatus, TokenMetadata};

    fn usdc() -> Currency {
        Currency {
            id: 7,
            network: Network::Matic,
            symbol: "USDC".into(),
            contract_address: "0x2791bca1f2de4661ed88a30c99a7a9449aa84174".into(),
            decimals: 6,
            enabled: true,
        }
    }

    fn offer(lender: &str, nonce: &str) -> LoanOffer {
        LoanOffer {
            id: 0,
            network: Network::Matic,
            loan_id: 1,
            lender: lender.into(),
            principal_amount: dec!(10),
            interest_rate: dec!(0.1),
            duration: 60,
            status: OfferStatus::New,
            nonce_hex: nonce.into(),
            signature: "0x".into(),
            accept_tx_hash: None,
            cancel_tx_hash: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let meta = TokenMetadata::default();

        let mut tx = store.begin().await.unwrap();
        tx.insert_collection(Collection::first_seen(Network::Matic, "0xc0", &meta))
            .await
            .unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx
            .collection_by_contract(Network::Matic, "0xc0")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        store.seed_currency(usdc()).await;

        let mut tx = store.begin().await.unwrap();
        tx.set_block_cursor(Network::Sol, 120).await.unwrap();
        tx.commit().await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.block_cursors.get(&Network::Sol), Some(&120));
        assert_eq!(snapshot.currencies.get(&7).map(|c| c.decimals), Some(6));
        assert!(snapshot.last_id >= 7);
    }

    #[tokio::test]
    async fn test_offer_nonce_is_unique_numerically() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_offer(offer("0xabc", "0x01")).await.unwrap();

        let dup = tx.insert_offer(offer("0xabc", "0x1")).await;
        assert!(matches!(dup, Err(LendError::Conflict(_))));

        tx.insert_offer(offer("0xabc", "0x02")).await.unwrap();
        tx.insert_offer(offer("0xdef", "0x01")).await.unwrap();
        assert_eq!(tx.offers_for_loan(1).await.unwrap().len(), 3);
        assert!(tx.offer_by_nonce("0xabc", "0x0001").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_currency_lookup_respects_network() {
        let store = MemoryStore::new();
        store.seed_currency(usdc()).await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.currency(7, Network::Matic).await.unwrap().is_some());
        assert!(tx.currency(7, Network::Bsc).await.unwrap().is_none());
        assert!(tx
            .currency_by_symbol(Network::Matic, "usdc")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_instruction_recorded_once() {
        let store = MemoryStore::new();
        let record = InstructionRecord {
            network: Network::Sol,
            transaction_hash: "5xTx".into(),
            instruction_index: 1,
            block_number: 9,
            instruction: "pay_loan".into(),
        };
        let mut tx = store.begin().await.unwrap();
        tx.record_instruction(record.clone()).await.unwrap();
        tx.record_instruction(record).await.unwrap();
        assert!(tx.instruction_seen(Network::Sol, "5xTx", 1).await.unwrap());
        assert!(!tx.instruction_seen(Network::Sol, "5xTx", 2).await.unwrap());
        tx.commit().await.unwrap();
        assert_eq!(store.snapshot().await.instructions.len(), 1);
    }
}

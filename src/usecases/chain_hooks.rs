//! Chain Event Hooks - Per-Network Settlement Entry Points
//!
//! Invoked by an external trigger (webhook or scheduled job):
//!
//! - `scan_block` on SOL advances the shared block cursor and applies
//!   the lending instructions of the block; repeating a block at or
//!   below the cursor does nothing.
//! - `scan_block` on an EVM network filters lending-contract logs since
//!   the requested block (or the cursor) and applies every decoded
//!   settlement event.
//! - `on_instruction` receives one pre-decoded SOL instruction out of
//!   band; each (transaction, instruction index) is applied once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::settlement::{SettlementApplier, apply_in};
use crate::domain::models::InstructionRecord;
use crate::domain::{
  InstructionHook, LendError, LendResult, Network, SettlementEvent, SettlementOutcome,
};
use crate::ports::chain_client::ChainRegistry;
use crate::ports::store::Store;

/// Result of one block hook call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
  pub from_block: u64,
  /// Cursor after the scan.
  pub cursor: u64,
  pub applied: usize,
  pub skipped: usize,
}

/// Result of one instruction hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionOutcome {
  Settled(SettlementOutcome),
  /// Recorded without a state change.
  Unparsed,
  /// Already recorded earlier.
  Replayed,
}

/// Network-dispatched chain entry points.
pub struct ChainEventHooks<S: Store> {
  store: Arc<S>,
  chains: ChainRegistry,
  settlements: Arc<SettlementApplier<S>>,
  /// First block scanned when an EVM network has no cursor yet.
  start_blocks: HashMap<Network, u64>,
}

impl<S: Store> ChainEventHooks<S> {
  pub fn new(store: Arc<S>, chains: ChainRegistry, settlements: Arc<SettlementApplier<S>>) -> Self {
    Self {
      store,
      chains,
      settlements,
      start_blocks: HashMap::new(),
    }
  }

  #[must_use]
  pub fn with_start_block(mut self, network: Network, block: u64) -> Self {
    self.start_blocks.insert(network, block);
    self
  }

  /// Process `block` on the network named `network`.
  ///
  /// # Errors
  /// - `Validation` for an unknown or unconfigured network
  /// - `ExternalService` when the chain cannot be read
  #[instrument(skip(self))]
  pub async fn scan_block(&self, network: &str, block: u64) -> LendResult<ScanReport> {
    let network: Network = network.parse()?;
    if network.is_evm() {
      self.scan_evm(network, block).await
    } else {
      self.scan_instructions(network, block).await
    }
  }

  async fn scan_instructions(&self, network: Network, block: u64) -> LendResult<ScanReport> {
    let cursor = self.cursor(network).await?;
    if cursor.is_some_and(|c| block <= c) {
      debug!(network = %network, block, "Block already processed");
      return Ok(ScanReport {
        from_block: block,
        cursor: cursor.unwrap_or(block),
        ..ScanReport::default()
      });
    }

    let mut report = ScanReport {
      from_block: block,
      ..ScanReport::default()
    };
    if let Ok(chain) = self.chains.get(network) {
      for hook in chain.instructions_in_block(block).await? {
        match self.apply_instruction(network, &hook).await? {
          InstructionOutcome::Settled(SettlementOutcome::Applied) => report.applied += 1,
          _ => report.skipped += 1,
        }
      }
    }

    report.cursor = self.advance_cursor(network, block).await?;
    info!(network = %network, block, applied = report.applied, "Block processed");
    Ok(report)
  }

  async fn scan_evm(&self, network: Network, block: u64) -> LendResult<ScanReport> {
    let chain = self
      .chains
      .get(network)
      .map_err(|_| LendError::validation(format!("network {network} has no chain hook")))?;

    let from_block = if block > 0 {
      block
    } else {
      match self.cursor(network).await? {
        Some(cursor) => cursor + 1,
        None => self.start_blocks.get(&network).copied().unwrap_or(0),
      }
    };

    let batch = chain.filter_logs_since(from_block).await?;
    let mut report = ScanReport {
      from_block,
      ..ScanReport::default()
    };
    for event in &batch.events {
      match self.settlements.apply(event).await {
        Ok(SettlementOutcome::Applied) => report.applied += 1,
        Ok(SettlementOutcome::Skipped(_)) => report.skipped += 1,
        Err(LendError::Conflict(reason)) => {
          warn!(
            network = %network,
            tx_hash = %event.transaction_hash,
            reason = %reason,
            "Settlement event rejected"
          );
          report.skipped += 1;
        }
        Err(e) => return Err(e),
      }
    }

    report.cursor = self.advance_cursor(network, batch.last_block).await?;
    info!(
      network = %network,
      from_block,
      last_block = batch.last_block,
      applied = report.applied,
      skipped = report.skipped,
      "Lending logs processed"
    );
    Ok(report)
  }

  /// Apply one out-of-band instruction.
  ///
  /// # Errors
  /// `Validation` when `network` is not the instruction-based chain.
  #[instrument(skip(self, hook), fields(tx_hash = %hook.transaction_hash, index = hook.instruction_index))]
  pub async fn on_instruction(
    &self,
    network: &str,
    hook: InstructionHook,
  ) -> LendResult<InstructionOutcome> {
    let network: Network = network.parse()?;
    if network.is_evm() {
      return Err(LendError::validation(format!(
        "network {network} reports logs, not instructions"
      )));
    }
    self.apply_instruction(network, &hook).await
  }

  async fn apply_instruction(
    &self,
    network: Network,
    hook: &InstructionHook,
  ) -> LendResult<InstructionOutcome> {
    let mut tx = self.store.begin().await?;
    if tx
      .instruction_seen(network, &hook.transaction_hash, hook.instruction_index)
      .await?
    {
      return Ok(InstructionOutcome::Replayed);
    }

    let settled = match hook.instruction.settlement() {
      Some(kind) => {
        let event = SettlementEvent {
          network,
          transaction_hash: hook.transaction_hash.clone(),
          block_number: hook.block_number,
          occurred_at: block_time(hook.block_time),
          kind,
        };
        let outcome = apply_in(tx.as_mut(), &event).await?;
        Some((event, outcome))
      }
      None => {
        warn!(
          instruction = hook.instruction.name(),
          tx_hash = %hook.transaction_hash,
          "Unparsed instruction recorded without settlement"
        );
        None
      }
    };

    tx.record_instruction(InstructionRecord {
      network,
      transaction_hash: hook.transaction_hash.clone(),
      instruction_index: hook.instruction_index,
      block_number: hook.block_number,
      instruction: hook.instruction.name().to_string(),
    })
    .await?;
    tx.commit().await?;

    Ok(match settled {
      Some((event, outcome)) => {
        self.settlements.record(&event, &outcome);
        InstructionOutcome::Settled(outcome)
      }
      None => InstructionOutcome::Unparsed,
    })
  }

  async fn cursor(&self, network: Network) -> LendResult<Option<u64>> {
    let mut tx = self.store.begin().await?;
    tx.block_cursor(network).await
  }

  /// Move the cursor forward to `block`; never moves it back.
  async fn advance_cursor(&self, network: Network, block: u64) -> LendResult<u64> {
    let mut tx = self.store.begin().await?;
    let current = tx.block_cursor(network).await?;
    if current.is_some_and(|c| c >= block) {
      return Ok(current.unwrap_or(block));
    }
    tx.set_block_cursor(network, block).await?;
    tx.commit().await?;
    Ok(block)
  }
}

fn block_time(seconds: u64) -> Option<DateTime<Utc>> {
  if seconds == 0 {
    return None;
  }
  i64::try_from(seconds)
    .ok()
    .and_then(|s| DateTime::from_timestamp(s, 0))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::adapters::persistence::MemoryStore;

  fn hooks(store: &Arc<MemoryStore>) -> ChainEventHooks<MemoryStore> {
    let settlements = Arc::new(SettlementApplier::new(Arc::clone(store)));
    ChainEventHooks::new(Arc::clone(store), ChainRegistry::new(), settlements)
  }

  fn hook(instruction: &str, index: u32) -> InstructionHook {
    serde_json::from_value(json!({
      "block_number": 77,
      "block_time": 1_650_000_000u64,
      "transaction_hash": "5xSig",
      "instruction_index": index,
      "instruction": instruction,
      "data": {"borrower": "Borrower1", "nonce": "0x01"}
    }))
    .unwrap()
  }

  #[tokio::test]
  async fn test_sol_block_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let hooks = hooks(&store);

    let first = hooks.scan_block("sol", 120).await.unwrap();
    assert_eq!(first.cursor, 120);
    let again = hooks.scan_block("SOL", 120).await.unwrap();
    assert_eq!(again.cursor, 120);
    let older = hooks.scan_block("SOL", 90).await.unwrap();
    assert_eq!(older.cursor, 120);
    assert_eq!(store.snapshot().await.block_cursors[&Network::Sol], 120);
  }

  #[tokio::test]
  async fn test_unsupported_networks_are_validation_errors() {
    let store = Arc::new(MemoryStore::new());
    let hooks = hooks(&store);
    assert!(matches!(
      hooks.scan_block("doge", 1).await,
      Err(LendError::Validation(_))
    ));
    assert!(matches!(
      hooks.scan_block("bsc", 1).await,
      Err(LendError::Validation(_))
    ));
    assert!(matches!(
      hooks.on_instruction("matic", hook("pay_loan", 0)).await,
      Err(LendError::Validation(_))
    ));
  }

  #[tokio::test]
  async fn test_instruction_recorded_once() {
    let store = Arc::new(MemoryStore::new());
    let hooks = hooks(&store);

    let first = hooks.on_instruction("sol", hook("mint_voucher", 0)).await.unwrap();
    assert_eq!(first, InstructionOutcome::Unparsed);
    let replay = hooks.on_instruction("sol", hook("mint_voucher", 0)).await.unwrap();
    assert_eq!(replay, InstructionOutcome::Replayed);

    let unknown_loan = hooks.on_instruction("sol", hook("pay_loan", 1)).await.unwrap();
    assert!(matches!(
      unknown_loan,
      InstructionOutcome::Settled(SettlementOutcome::Skipped(_))
    ));
    assert_eq!(store.snapshot().await.instructions.len(), 2);
  }

  #[test]
  fn test_block_time() {
    assert!(block_time(0).is_none());
    assert_eq!(block_time(60).unwrap().timestamp(), 60);
  }
}

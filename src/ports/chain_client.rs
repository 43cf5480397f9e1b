//! Chain Client Port - Per-Network Chain Capabilities
//!
//! One `ChainClient` per configured network provides signature
//! recovery, token metadata lookup and settlement log filtering.
//! `ChainRegistry` selects the client by network; a network without a
//! client is reported as `UnsupportedNetwork`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{InstructionHook, LendError, LendResult, Network, SettlementEvent};

/// Settlement events found in a block range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBatch {
  /// Decoded events in chain order.
  pub events: Vec<SettlementEvent>,
  /// Last block included in the scan.
  pub last_block: u64,
}

/// Chain capabilities consumed by the lending core.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
  /// Network served by this client.
  fn network(&self) -> Network;

  /// Chain id committed to in signed messages.
  fn chain_id(&self) -> u64;

  /// Recover the address that signed `message`, lowercase `0x` hex.
  ///
  /// Malformed signatures are a `Validation` error.
  async fn recover_signer(&self, message: &[u8], signature: &str) -> LendResult<String>;

  /// Metadata URI of an NFT.
  async fn token_uri(&self, contract_address: &str, token_id: &str) -> LendResult<String>;

  /// Lending contract events from `from_block` to the chain head.
  async fn filter_logs_since(&self, from_block: u64) -> LendResult<LogBatch>;

  /// Lending program instructions executed in `block` (non-EVM chains).
  async fn instructions_in_block(&self, _block: u64) -> LendResult<Vec<InstructionHook>> {
    Ok(Vec::new())
  }
}

/// Network-keyed lookup of chain clients.
#[derive(Clone, Default)]
pub struct ChainRegistry {
  clients: HashMap<Network, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a client under its own network, replacing any previous one.
  #[must_use]
  pub fn with_client(mut self, client: Arc<dyn ChainClient>) -> Self {
    self.clients.insert(client.network(), client);
    self
  }

  /// Client for `network`.
  ///
  /// # Errors
  /// `UnsupportedNetwork` if no client is registered.
  pub fn get(&self, network: Network) -> LendResult<Arc<dyn ChainClient>> {
    self
      .clients
      .get(&network)
      .cloned()
      .ok_or_else(|| LendError::UnsupportedNetwork(network.to_string()))
  }

  pub fn networks(&self) -> impl Iterator<Item = Network> + '_ {
    self.clients.keys().copied()
  }

  pub fn len(&self) -> usize {
    self.clients.len()
  }

  pub fn is_empty(&self) -> bool {
    self.clients.is_empty()
  }
}

impl std::fmt::Debug for ChainRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChainRegistry")
      .field("networks", &self.clients.keys().collect::<Vec<_>>())
      .finish()
  }
}

//! SOL Chain Client - Instruction-Based Settlement
//!
//! SOL loans are created and settled by program instructions. Those
//! reach the service through the instruction webhook, so this client
//! only identifies the network: it has no listing signatures to
//! recover, no ERC-721 metadata and no contract logs.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{InstructionHook, LendError, LendResult, Network};
use crate::ports::chain_client::{ChainClient, LogBatch};

/// Chain client for the SOL network.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolanaChainClient;

impl SolanaChainClient {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChainClient for SolanaChainClient {
    fn network(&self) -> Network {
        Network::Sol
    }

    fn chain_id(&self) -> u64 {
        0
    }

    async fn recover_signer(&self, _message: &[u8], _signature: &str) -> LendResult<String> {
        Err(LendError::UnsupportedNetwork(Network::Sol.to_string()))
    }

    async fn token_uri(&self, _contract_address: &str, _token_id: &str) -> LendResult<String> {
        Err(LendError::UnsupportedNetwork(Network::Sol.to_string()))
    }

    async fn filter_logs_since(&self, from_block: u64) -> LendResult<LogBatch> {
        Ok(LogBatch {
            events: Vec::new(),
            last_block: from_block,
        })
    }

    async fn instructions_in_block(&self, block: u64) -> LendResult<Vec<InstructionHook>> {
        debug!(block, "SOL block has no scanned instructions, settlement arrives via the instruction hook");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signature_recovery_is_unsupported() {
        let client = SolanaChainClient::new();
        assert_eq!(client.chain_id(), 0);
        assert!(matches!(
            client.recover_signer(b"m", "0x").await,
            Err(LendError::UnsupportedNetwork(ref n)) if n == "SOL"
        ));
        assert!(client.instructions_in_block(5).await.unwrap().is_empty());
    }
}

//! Chain Registry Builder - One Client per Configured Network
//!
//! SOL always gets its instruction-based client. An EVM network whose
//! RPC is unreachable, serves another chain id or has no lending
//! contract deployed is left out with a warning; requests for it then
//! fail with `UnsupportedNetwork` instead of stopping the service.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::{EvmChainClient, EvmProvider, SolanaChainClient};
use crate::config::NetworkConfig;
use crate::domain::Network;
use crate::ports::chain_client::{ChainClient, ChainRegistry};

/// Connect every configured network that can be reached.
pub async fn connect_chains(networks: &[NetworkConfig]) -> ChainRegistry {
    let mut chains = ChainRegistry::new();
    for net in networks {
        match connect_network(net).await {
            Ok(client) => {
                info!(network = %net.network, chain_id = client.chain_id(), "Chain client ready");
                chains = chains.with_client(client);
            }
            Err(e) => {
                warn!(network = %net.network, error = %e, "Network disabled, chain client unavailable");
            }
        }
    }
    chains
}

async fn connect_network(net: &NetworkConfig) -> Result<Arc<dyn ChainClient>> {
    if net.network == Network::Sol {
        return Ok(Arc::new(SolanaChainClient::new()));
    }
    let provider = EvmProvider::connect(net).await?;
    let client = EvmChainClient::connect(&provider, net.network, &net.lending_contract)
        .await?
        .with_max_block_range(net.max_block_range);
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LendError;

    fn network(network: Network, rpc_url: &str) -> NetworkConfig {
        NetworkConfig {
            network,
            rpc_url: rpc_url.into(),
            chain_id: 137,
            admin_fee: 0,
            lending_contract: "0x0000000000000000000000000000000000000000".into(),
            start_block: 0,
            max_block_range: 2_000,
        }
    }

    #[tokio::test]
    async fn test_unreachable_evm_network_is_skipped() {
        let chains = connect_chains(&[
            network(Network::Sol, ""),
            network(Network::Matic, "http://127.0.0.1:1"),
        ])
        .await;

        assert_eq!(chains.len(), 1);
        assert_eq!(chains.get(Network::Sol).unwrap().chain_id(), 0);
        assert!(matches!(
            chains.get(Network::Matic),
            Err(LendError::UnsupportedNetwork(ref n)) if n == "MATIC"
        ));
    }
}

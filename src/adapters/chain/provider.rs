//! EVM RPC Provider - alloy-rs 0.9 Connection Management
//!
//! Connects to one EVM network's RPC endpoint, checks that the node
//! serves the configured chain id and exposes a shared provider for
//! signature-independent reads (token URIs, lending-contract logs).
//!
//! `ProviderBuilder::on_builtin` yields a provider over the boxed
//! transport, which is stored type-erased as `dyn Provider`.

use std::sync::Arc;

use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::config::NetworkConfig;

/// Shared RPC provider for one EVM network.
pub struct EvmProvider {
    /// The alloy provider (type-erased).
    provider: Arc<dyn Provider + Send + Sync>,
    /// Chain id reported by the node.
    chain_id: u64,
}

impl EvmProvider {
    /// Connect to the network's RPC and validate the chain id.
    #[instrument(skip_all, fields(network = %config.network))]
    pub async fn connect(config: &NetworkConfig) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .on_builtin(&config.rpc_url)
            .await
            .with_context(|| format!("Failed to connect to {} RPC", config.network))?;
        let provider: Arc<dyn Provider + Send + Sync> = Arc::new(provider);

        let chain_id = provider
            .get_chain_id()
            .await
            .context("Failed to query chain ID")?;

        if chain_id != config.chain_id {
            bail!(
                "{} RPC serves chain_id={chain_id}, config expects {}",
                config.network,
                config.chain_id
            );
        }

        info!(chain_id, "Connected to EVM RPC");

        Ok(Self { provider, chain_id })
    }

    /// Shared reference to the alloy provider (type-erased).
    pub fn inner(&self) -> Arc<dyn Provider + Send + Sync> {
        Arc::clone(&self.provider)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

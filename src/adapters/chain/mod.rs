//! Chain Adapters - Per-Network Chain Access
//!
//! Provides on-chain access for the `ChainClient` port:
//! - EVM RPC provider management with chain id validation
//! - EVM signer recovery, token URIs and lending-contract logs
//! - SOL client for the instruction-based network
//! - Registry builder that skips unreachable networks

pub mod evm;
pub mod provider;
pub mod registry;
pub mod solana;

pub use evm::{EvmChainClient, recover_evm_signer};
pub use provider::EvmProvider;
pub use registry::connect_chains;
pub use solana::SolanaChainClient;

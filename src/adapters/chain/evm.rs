//! EVM Chain Client - Signatures, Token URIs and Lending Logs
//!
//! Implements the `ChainClient` port for one EVM network via alloy-rs:
//!
//! - signer recovery over EIP-191 personal messages
//! - `tokenURI(uint256)` via a raw `eth_call`
//! - `eth_getLogs` on the lending contract, decoded into settlement events
//!
//! The lending contract address comes from `config.toml` and is
//! checked for deployed code at startup.

use std::str::FromStr;
use std::sync::Arc;

use alloy::hex;
use alloy::primitives::{Address, PrimitiveSignature, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEventInterface};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::DateTime;
use tracing::{debug, info, instrument};

use super::provider::EvmProvider;
use crate::domain::{LendError, LendResult, Network, SettlementEvent, SettlementKind};
use crate::ports::chain_client::{ChainClient, LogBatch};

/// Largest block range requested in one `eth_getLogs` call.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 2_000;

sol! {
    /// Events emitted by the lending contract.
    interface INftLending {
        event LoanStarted(address indexed borrower, uint256 borrowerNonce, address indexed lender, uint256 lenderNonce);
        event LoanCancelled(address indexed borrower, uint256 nonce);
        event OfferCancelled(address indexed lender, uint256 nonce);
        event LoanRepaid(address indexed borrower, uint256 nonce);
        event LoanLiquidated(address indexed borrower, uint256 nonce);
    }

    interface IERC721Metadata {
        function tokenURI(uint256 tokenId) external view returns (string);
    }
}

use INftLending::INftLendingEvents;

/// Recover the EIP-191 signer of `message`, lowercase `0x` hex.
///
/// # Errors
/// `Validation` when the signature is not 65 bytes of hex or does not
/// recover to a public key.
pub fn recover_evm_signer(message: &[u8], signature: &str) -> LendResult<String> {
    let raw = hex::decode(signature.trim())
        .map_err(|e| LendError::validation(format!("signature is not hex: {e}")))?;
    let signature = PrimitiveSignature::try_from(raw.as_slice())
        .map_err(|e| LendError::validation(format!("malformed signature: {e}")))?;
    let signer = signature
        .recover_address_from_msg(message)
        .map_err(|e| LendError::validation(format!("signature does not recover: {e}")))?;
    Ok(format!("{signer:#x}"))
}

/// Settlement change carried by a lending-contract event.
pub fn settlement_kind(event: &INftLendingEvents) -> SettlementKind {
    let addr = |a: &Address| format!("{a:#x}");
    let nonce = |n: &U256| format!("{n:#x}");
    match event {
        INftLendingEvents::LoanStarted(e) => SettlementKind::LoanStarted {
            borrower: addr(&e.borrower),
            borrower_nonce: nonce(&e.borrowerNonce),
            lender: addr(&e.lender),
            lender_nonce: nonce(&e.lenderNonce),
        },
        INftLendingEvents::LoanCancelled(e) => SettlementKind::LoanCancelled {
            borrower: addr(&e.borrower),
            nonce: nonce(&e.nonce),
        },
        INftLendingEvents::OfferCancelled(e) => SettlementKind::OfferCancelled {
            lender: addr(&e.lender),
            nonce: nonce(&e.nonce),
        },
        INftLendingEvents::LoanRepaid(e) => SettlementKind::LoanRepaid {
            borrower: addr(&e.borrower),
            nonce: nonce(&e.nonce),
        },
        INftLendingEvents::LoanLiquidated(e) => SettlementKind::LoanLiquidated {
            borrower: addr(&e.borrower),
            nonce: nonce(&e.nonce),
        },
    }
}

/// Chain client for one EVM network.
pub struct EvmChainClient {
    network: Network,
    chain_id: u64,
    /// Shared RPC provider (type-erased).
    provider: Arc<dyn Provider + Send + Sync>,
    /// Lending contract emitting settlement events.
    lending_contract: Address,
    max_block_range: u64,
}

impl EvmChainClient {
    /// Bind the lending contract and check that it has deployed code.
    #[instrument(skip(provider), fields(network = %network))]
    pub async fn connect(provider: &EvmProvider, network: Network, lending_contract: &str) -> Result<Self> {
        let lending_contract = Address::from_str(lending_contract)
            .with_context(|| format!("Invalid lending contract for {network}"))?;
        let inner = provider.inner();

        let code = inner
            .get_code_at(lending_contract)
            .await
            .context("Failed to query lending contract code")?;
        if code.is_empty() {
            bail!("Lending contract {lending_contract} on {network} has no deployed code");
        }
        info!(contract = %lending_contract, "Lending contract validated on-chain");

        Ok(Self {
            network,
            chain_id: provider.chain_id(),
            provider: inner,
            lending_contract,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
        })
    }

    #[must_use]
    pub fn with_max_block_range(mut self, blocks: u64) -> Self {
        self.max_block_range = blocks.max(1);
        self
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn network(&self) -> Network {
        self.network
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn recover_signer(&self, message: &[u8], signature: &str) -> LendResult<String> {
        recover_evm_signer(message, signature)
    }

    #[instrument(skip(self))]
    async fn token_uri(&self, contract_address: &str, token_id: &str) -> LendResult<String> {
        let contract = Address::from_str(contract_address.trim())
            .map_err(|e| LendError::validation(format!("{contract_address:?} is not an address: {e}")))?;
        let token_id = crate::domain::canonical::parse_integer(token_id)?;

        let calldata = IERC721Metadata::tokenURICall { tokenId: token_id }.abi_encode();
        let result = self
            .provider
            .call(&TransactionRequest::default().to(contract).input(calldata.into()))
            .await
            .map_err(LendError::external)?;

        let uri = IERC721Metadata::tokenURICall::abi_decode_returns(&result, true)
            .map_err(LendError::external)?
            ._0;
        debug!(uri = %uri, "Token URI resolved");
        Ok(uri)
    }

    #[instrument(skip(self))]
    async fn filter_logs_since(&self, from_block: u64) -> LendResult<LogBatch> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(LendError::external)?;
        if from_block > head {
            return Ok(LogBatch {
                events: Vec::new(),
                last_block: head,
            });
        }
        let to_block = head.min(from_block.saturating_add(self.max_block_range - 1));

        let filter = Filter::new()
            .address(self.lending_contract)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(LendError::external)?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            let decoded = match INftLendingEvents::decode_log(&log.inner, true) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!(error = %e, "Skipping unknown lending log");
                    continue;
                }
            };
            events.push(SettlementEvent {
                network: self.network,
                transaction_hash: log
                    .transaction_hash
                    .map(|h| format!("{h:#x}"))
                    .unwrap_or_default(),
                block_number: log.block_number.unwrap_or(from_block),
                occurred_at: log
                    .block_timestamp
                    .and_then(|t| i64::try_from(t).ok())
                    .and_then(|t| DateTime::from_timestamp(t, 0)),
                kind: settlement_kind(&decoded.data),
            });
        }

        debug!(from_block, to_block, events = events.len(), "Lending logs decoded");
        Ok(LogBatch {
            events,
            last_block: to_block,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::signers::SignerSync;
    use alloy::signers::local::PrivateKeySigner;

    use super::*;

    #[test]
    fn test_recovers_personal_message_signer() {
        let signer = PrivateKeySigner::random();
        let message = b"listing terms";
        let signature = signer.sign_message_sync(message).unwrap();
        let encoded = hex::encode_prefixed(signature.as_bytes());

        let recovered = recover_evm_signer(message, &encoded).unwrap();
        assert_eq!(recovered, format!("{:#x}", signer.address()));

        let other = recover_evm_signer(b"other terms", &encoded).unwrap();
        assert_ne!(other, recovered);
    }

    #[test]
    fn test_malformed_signature_is_validation_error() {
        assert!(matches!(
            recover_evm_signer(b"x", "0x1234"),
            Err(LendError::Validation(_))
        ));
        assert!(matches!(
            recover_evm_signer(b"x", "not hex"),
            Err(LendError::Validation(_))
        ));
    }

    #[test]
    fn test_event_mapping_uses_hex_nonces() {
        let borrower = Address::repeat_byte(0xab);
        let event = INftLendingEvents::LoanRepaid(INftLending::LoanRepaid {
            borrower,
            nonce: U256::from(10),
        });
        assert_eq!(
            settlement_kind(&event),
            SettlementKind::LoanRepaid {
                borrower: format!("{borrower:#x}"),
                nonce: "0xa".into(),
            }
        );
    }
}

//! Settlement Events - Chain-Observed Loan State Changes
//!
//! Decoded from EVM logs or non-EVM instructions. Events identify the
//! loan by (borrower, borrower nonce) and the offer by (lender, lender
//! nonce), the same keys the signed messages commit to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::LedgerEntryKind;
use super::network::Network;

/// What happened on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementKind {
    /// Borrower accepted an offer; funds moved, loan is running.
    LoanStarted {
        borrower: String,
        borrower_nonce: String,
        lender: String,
        lender_nonce: String,
    },
    LoanCancelled {
        borrower: String,
        nonce: String,
    },
    OfferCancelled {
        lender: String,
        nonce: String,
    },
    LoanRepaid {
        borrower: String,
        nonce: String,
    },
    LoanLiquidated {
        borrower: String,
        nonce: String,
    },
}

impl SettlementKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoanStarted { .. } => "loan_started",
            Self::LoanCancelled { .. } => "loan_cancelled",
            Self::OfferCancelled { .. } => "offer_cancelled",
            Self::LoanRepaid { .. } => "loan_repaid",
            Self::LoanLiquidated { .. } => "loan_liquidated",
        }
    }

    pub const fn ledger_kind(&self) -> LedgerEntryKind {
        match self {
            Self::LoanStarted { .. } => LedgerEntryKind::Started,
            Self::LoanCancelled { .. } => LedgerEntryKind::Cancelled,
            Self::OfferCancelled { .. } => LedgerEntryKind::OfferCancelled,
            Self::LoanRepaid { .. } => LedgerEntryKind::Repaid,
            Self::LoanLiquidated { .. } => LedgerEntryKind::Liquidated,
        }
    }
}

/// A settlement event with its on-chain position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub network: Network,
    pub transaction_hash: String,
    pub block_number: u64,
    pub occurred_at: Option<DateTime<Utc>>,
    pub kind: SettlementKind,
}

/// Result of applying one settlement event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Applied,
    /// Nothing to do: already applied, or not a tracked loan/offer.
    Skipped(String),
}

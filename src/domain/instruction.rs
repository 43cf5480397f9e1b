//! Non-EVM Instructions - Typed Webhook Payloads
//!
//! The instruction hook receives pre-decoded program instructions out
//! of band from block scanning. The free-form `data` field is decoded
//! into `Instruction` by name; unknown names and undecodable data land
//! in `Instruction::Unparsed` instead of failing the whole payload.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use super::settlement::SettlementKind;

/// Offer acceptance starting a loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOfferData {
    pub borrower: String,
    pub borrower_nonce: String,
    pub lender: String,
    pub lender_nonce: String,
}

/// Instruction addressing a loan by borrower nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRefData {
    pub borrower: String,
    pub nonce: String,
}

/// Instruction addressing an offer by lender nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRefData {
    pub lender: String,
    pub nonce: String,
}

/// Known lending program instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    AcceptOffer(AcceptOfferData),
    CancelLoan(LoanRefData),
    CancelOffer(OfferRefData),
    PayLoan(LoanRefData),
    LiquidateLoan(LoanRefData),
    /// Unknown name or data that does not match the known shape.
    Unparsed { name: String, reason: String },
}

impl Instruction {
    /// Decode `data` according to the instruction `name`.
    pub fn decode(name: &str, data: serde_json::Value) -> Self {
        match name {
            "accept_offer" | "AcceptOffer" => decode_as(name, data, Self::AcceptOffer),
            "cancel_loan" | "CancelLoan" => decode_as(name, data, Self::CancelLoan),
            "cancel_offer" | "CancelOffer" => decode_as(name, data, Self::CancelOffer),
            "pay_loan" | "PayLoan" => decode_as(name, data, Self::PayLoan),
            "liquidate_loan" | "LiquidateLoan" => decode_as(name, data, Self::LiquidateLoan),
            other => Self::Unparsed {
                name: other.to_string(),
                reason: "unknown instruction".to_string(),
            },
        }
    }

    /// Settlement change carried by the instruction, if any.
    pub fn settlement(&self) -> Option<SettlementKind> {
        match self {
            Self::AcceptOffer(d) => Some(SettlementKind::LoanStarted {
                borrower: d.borrower.clone(),
                borrower_nonce: d.borrower_nonce.clone(),
                lender: d.lender.clone(),
                lender_nonce: d.lender_nonce.clone(),
            }),
            Self::CancelLoan(d) => Some(SettlementKind::LoanCancelled {
                borrower: d.borrower.clone(),
                nonce: d.nonce.clone(),
            }),
            Self::CancelOffer(d) => Some(SettlementKind::OfferCancelled {
                lender: d.lender.clone(),
                nonce: d.nonce.clone(),
            }),
            Self::PayLoan(d) => Some(SettlementKind::LoanRepaid {
                borrower: d.borrower.clone(),
                nonce: d.nonce.clone(),
            }),
            Self::LiquidateLoan(d) => Some(SettlementKind::LoanLiquidated {
                borrower: d.borrower.clone(),
                nonce: d.nonce.clone(),
            }),
            Self::Unparsed { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::AcceptOffer(_) => "accept_offer",
            Self::CancelLoan(_) => "cancel_loan",
            Self::CancelOffer(_) => "cancel_offer",
            Self::PayLoan(_) => "pay_loan",
            Self::LiquidateLoan(_) => "liquidate_loan",
            Self::Unparsed { name, .. } => name,
        }
    }
}

fn decode_as<T, F>(name: &str, data: serde_json::Value, wrap: F) -> Instruction
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Instruction,
{
    match serde_json::from_value::<T>(data) {
        Ok(parsed) => wrap(parsed),
        Err(e) => Instruction::Unparsed {
            name: name.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Wire form of the instruction hook body.
#[derive(Debug, Deserialize)]
struct RawInstructionHook {
    block_number: u64,
    #[serde(default)]
    block_time: u64,
    transaction_hash: String,
    #[serde(default)]
    transaction_index: u32,
    instruction_index: u32,
    #[serde(default)]
    program: String,
    instruction: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Instruction hook payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawInstructionHook")]
pub struct InstructionHook {
    pub block_number: u64,
    /// Unix seconds.
    pub block_time: u64,
    pub transaction_hash: String,
    pub transaction_index: u32,
    pub instruction_index: u32,
    pub program: String,
    pub instruction: Instruction,
}

impl From<RawInstructionHook> for InstructionHook {
    fn from(raw: RawInstructionHook) -> Self {
        Self {
            block_number: raw.block_number,
            block_time: raw.block_time,
            transaction_hash: raw.transaction_hash,
            transaction_index: raw.transaction_index,
            instruction_index: raw.instruction_index,
            program: raw.program,
            instruction: Instruction::decode(&raw.instruction, raw.data),
        }
    }
}

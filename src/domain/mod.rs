//! Domain layer - Lending records and pure protocol logic.
//!
//! Records, state machines, the canonical signed-message encoding and
//! the typed chain events. Nothing here performs I/O; every type is
//! serializable and testable in isolation.

pub mod canonical;
pub mod error;
pub mod instruction;
pub mod market;
pub mod models;
pub mod network;
pub mod settlement;

// Re-export core types for convenience
pub use canonical::{CanonicalMessage, SignedTerms, canonicalize};
pub use error::{LendError, LendResult};
pub use instruction::{Instruction, InstructionHook};
pub use market::{ExternalTrade, MarketSource};
pub use models::{
    Asset, AssetTransaction, Collection, Currency, LedgerEntryKind, Loan, LoanLedgerEntry,
    LoanOffer, LoanStatus, OfferStatus, Page, RecordId, TokenMetadata,
};
pub use network::Network;
pub use settlement::{SettlementEvent, SettlementKind, SettlementOutcome};

//! Use Cases Layer - Lending Workflows
//!
//! Orchestrates domain logic with port interfaces. Each use case is a
//! self-contained operation over the store and the chain, marketplace
//! and live-feed ports.
//!
//! Use cases:
//! - `LoanOfferWorkflow`: Signed listing and offer creation
//! - `SignatureVerifier`: Signer recovery against the claimed party
//! - `CrawlScheduler`: Per-source cooldown for marketplace crawls
//! - `IngestionSink`: Idempotent recording of external trades
//! - `SettlementApplier`: Chain events to loan and offer transitions
//! - `ChainEventHooks`: Per-network block and instruction entry points
//! - `AssetHistory`: Trade listing with on-read crawling

pub mod asset_history;
pub mod chain_hooks;
pub mod crawl_scheduler;
pub mod ingestion;
pub mod loan_workflow;
pub mod settlement;
pub mod signature;

pub use asset_history::{AssetHistory, TransactionPage};
pub use chain_hooks::{ChainEventHooks, InstructionOutcome, ScanReport};
pub use crawl_scheduler::{CrawlOutcome, CrawlReport, CrawlScheduler};
pub use ingestion::{BatchSummary, IngestOutcome, IngestionSink};
pub use loan_workflow::{CreateLoanRequest, CreateOfferRequest, LoanOfferWorkflow};
pub use settlement::SettlementApplier;
pub use signature::SignatureVerifier;

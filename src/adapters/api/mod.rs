//! Marketplace and Metadata HTTP Adapters
//!
//! Implements the marketplace port for each external trade source and
//! the token metadata fetcher. Pull sources share one throttled HTTP
//! client; the push source queues its requests on the live feed.
//!
//! Sub-modules:
//! - `client`: HTTP client with concurrency and rate limits
//! - `magiceden`: Magic Eden activity history (SOL)
//! - `solanart`: Solanart last sales (SOL)
//! - `solsea`: Solsea history requests over the live feed (SOL)
//! - `opensea`: OpenSea GraphQL event history (EVM)
//! - `metadata`: Token URI documents, with IPFS gateway rewriting
//! - `types`: Marketplace response type definitions

pub mod client;
pub mod magiceden;
pub mod metadata;
pub mod opensea;
pub mod solanart;
pub mod solsea;
pub mod types;

pub use client::{MarketHttpClient, MarketHttpConfig};
pub use magiceden::MagicEdenAdapter;
pub use metadata::HttpMetadataFetcher;
pub use opensea::OpenSeaAdapter;
pub use solanart::SolanartAdapter;
pub use solsea::SolseaAdapter;

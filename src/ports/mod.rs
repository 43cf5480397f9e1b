//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `Store`: Transactional persistence of lending records
//! - `ChainClient`: Per-network signature recovery, metadata and logs
//! - `MarketplaceAdapter`: External trade-history sources
//! - `FeedConnector`: Streaming transport for the live feed

pub mod chain_client;
pub mod live_feed;
pub mod marketplace;
pub mod store;

pub use chain_client::{ChainClient, ChainRegistry, LogBatch};
pub use live_feed::{FeedConnection, FeedConnector, FeedHandler, Frame, FrameSink, FrameStream};
pub use marketplace::{MarketplaceAdapter, MetadataFetcher};
pub use store::{Store, StoreTx};

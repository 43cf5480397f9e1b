//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. RPC endpoints,
//! lending contract addresses, marketplace URLs and currency reference
//! data are externalized here - nothing is hardcoded in the domain layer.

pub mod loader;

use serde::Deserialize;

use crate::domain::{Currency, Network};

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the service begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and log level.
  pub service: ServiceConfig,
  /// One entry per chain the service talks to.
  pub networks: Vec<NetworkConfig>,
  /// Marketplace endpoints and crawl pacing.
  pub marketplaces: MarketplaceConfig,
  /// Lending currencies seeded into the store at startup.
  #[serde(default)]
  pub currencies: Vec<Currency>,
  /// HTTP server for the API, hooks, metrics and probes.
  #[serde(default)]
  pub server: ServerConfig,
  /// Snapshot persistence.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

impl AppConfig {
  pub fn network(&self, network: Network) -> Option<&NetworkConfig> {
    self.networks.iter().find(|n| n.network == network)
  }
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level used when `RUST_LOG` is unset.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Chain endpoint and lending contract of one network.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  pub network: Network,
  /// JSON-RPC endpoint (ignored for SOL).
  #[serde(default)]
  pub rpc_url: String,
  /// Expected EIP-155 chain id; 0 for SOL.
  #[serde(default)]
  pub chain_id: u64,
  /// Flat admin fee committed to in signed listings and offers.
  #[serde(default)]
  pub admin_fee: u64,
  /// Lending contract whose logs the block hook scans.
  #[serde(default)]
  pub lending_contract: String,
  /// First block scanned before any cursor exists.
  #[serde(default)]
  pub start_block: u64,
  /// Widest `eth_getLogs` range per hook call.
  #[serde(default = "default_max_block_range")]
  pub max_block_range: u64,
}

/// Marketplace endpoints and crawl pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceConfig {
  /// Magic Eden API base URL.
  pub magiceden_url: String,
  /// Solanart API base URL.
  pub solanart_url: String,
  /// OpenSea GraphQL endpoint.
  pub opensea_url: String,
  /// Solsea Socket.IO websocket URL.
  pub solsea_ws_url: String,
  /// Minimum time between two crawls of one (asset, source).
  #[serde(default = "default_crawl_cooldown")]
  pub crawl_cooldown_hours: i64,
  /// Live-feed heartbeat period.
  #[serde(default = "default_heartbeat")]
  pub heartbeat_seconds: u64,
  /// Delay before the live feed reconnects.
  #[serde(default = "default_reconnect")]
  pub reconnect_seconds: u64,
  /// Sustained request rate across all pull sources.
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
  /// Concurrent requests across all pull sources.
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,
  /// HTTP gateway for `ipfs://` token URIs.
  #[serde(default = "default_ipfs_gateway")]
  pub ipfs_gateway: String,
  /// Metadata request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub metadata_timeout_seconds: u64,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Bind address.
  #[serde(default = "default_bind")]
  pub bind: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self { bind: default_bind() }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory holding the store snapshot.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Store snapshot interval (seconds).
  #[serde(default = "default_snapshot_interval")]
  pub snapshot_interval_seconds: u64,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      snapshot_interval_seconds: default_snapshot_interval(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_max_block_range() -> u64 {
  2_000
}

fn default_crawl_cooldown() -> i64 {
  24
}

fn default_heartbeat() -> u64 {
  5
}

fn default_reconnect() -> u64 {
  5
}

fn default_requests_per_second() -> u32 {
  2
}

fn default_max_concurrent() -> usize {
  4
}

fn default_ipfs_gateway() -> String {
  "https://ipfs.io/ipfs".to_string()
}

fn default_timeout() -> u64 {
  15
}

fn default_bind() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_snapshot_interval() -> u64 {
  60
}

//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    networks = config.networks.len(),
    currencies = config.currencies.len(),
    cooldown_hours = config.marketplaces.crawl_cooldown_hours,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - At least one network, each listed once
/// - EVM networks with an RPC URL, a chain id and a lending contract
/// - Positive crawl and heartbeat intervals
/// - Non-empty marketplace URLs
/// - Currencies on configured networks with unique ids
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.networks.is_empty(),
    "At least one network must be configured"
  );

  let mut seen = HashSet::new();
  for net in &config.networks {
    anyhow::ensure!(
      seen.insert(net.network),
      "Network {} is configured more than once",
      net.network
    );
    if net.network.is_evm() {
      anyhow::ensure!(
        !net.rpc_url.is_empty(),
        "Network {} has empty rpc_url",
        net.network
      );
      anyhow::ensure!(
        net.chain_id > 0,
        "Network {} must have a positive chain_id",
        net.network
      );
      anyhow::ensure!(
        !net.lending_contract.is_empty(),
        "Network {} has empty lending_contract",
        net.network
      );
      anyhow::ensure!(
        net.max_block_range > 0,
        "Network {} max_block_range must be positive",
        net.network
      );
    }
  }

  // Marketplace validation
  let market = &config.marketplaces;
  anyhow::ensure!(
    market.crawl_cooldown_hours > 0,
    "crawl_cooldown_hours must be positive, got {}",
    market.crawl_cooldown_hours
  );
  anyhow::ensure!(
    market.heartbeat_seconds > 0,
    "heartbeat_seconds must be positive"
  );
  anyhow::ensure!(
    market.requests_per_second > 0 && market.max_concurrent > 0,
    "Marketplace rate limits must be positive"
  );
  for (name, url) in [
    ("magiceden_url", &market.magiceden_url),
    ("solanart_url", &market.solanart_url),
    ("opensea_url", &market.opensea_url),
    ("solsea_ws_url", &market.solsea_ws_url),
  ] {
    anyhow::ensure!(!url.is_empty(), "{name} must not be empty");
  }

  // Currency validation
  let mut ids = HashSet::new();
  for currency in &config.currencies {
    anyhow::ensure!(
      ids.insert(currency.id),
      "Currency id {} is listed more than once",
      currency.id
    );
    anyhow::ensure!(
      seen.contains(&currency.network),
      "Currency {} is on unconfigured network {}",
      currency.symbol,
      currency.network
    );
  }

  anyhow::ensure!(
    config.persistence.snapshot_interval_seconds > 0,
    "snapshot_interval_seconds must be positive"
  );

  Ok(())
}

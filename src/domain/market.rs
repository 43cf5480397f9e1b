//! External Marketplaces - Sources and Normalized Trades
//!
//! Each marketplace the crawler knows about is a `MarketSource`. Source
//! adapters turn their own trade-history payloads into `ExternalTrade`
//! records that the ingestion sink appends to the asset ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::network::Network;

/// External trade-history source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSource {
    MagicEden,
    Solanart,
    Solsea,
    OpenSea,
}

impl MarketSource {
    pub const ALL: [Self; 4] = [Self::MagicEden, Self::Solanart, Self::Solsea, Self::OpenSea];

    /// Host name recorded on ingested transactions.
    pub const fn host(self) -> &'static str {
        match self {
            Self::MagicEden => "magiceden.io",
            Self::Solanart => "solanart.io",
            Self::Solsea => "solsea.io",
            Self::OpenSea => "opensea.io",
        }
    }

    /// Whether the source lists tokens of `network`.
    pub const fn covers(self, network: Network) -> bool {
        match self {
            Self::MagicEden | Self::Solanart | Self::Solsea => matches!(network, Network::Sol),
            Self::OpenSea => matches!(network, Network::Eth | Network::Matic),
        }
    }

    /// Push-style sources deliver trades over the live feed.
    pub const fn is_push(self) -> bool {
        matches!(self, Self::Solsea)
    }
}

impl fmt::Display for MarketSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.host())
    }
}

/// Trade reported by a marketplace, normalized across sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTrade {
    pub source: MarketSource,
    pub network: Network,
    pub seller: String,
    pub buyer: String,
    pub amount: Decimal,
    pub currency_symbol: String,
    pub occurred_at: Option<DateTime<Utc>>,
    /// Source transaction id; not every source reports one.
    pub external_id: Option<String>,
}

/// Convert an integer amount in base units (lamports, wei) to a decimal.
pub fn units_to_decimal(raw: u128, decimals: u32) -> Option<Decimal> {
    let value = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(value, decimals)
        .ok()
        .map(|d| d.normalize())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_lamports_to_sol() {
        assert_eq!(units_to_decimal(1_500_000_000, 9), Some(dec!(1.5)));
        assert_eq!(units_to_decimal(0, 9), Some(dec!(0)));
    }

    #[test]
    fn test_wei_to_eth() {
        assert_eq!(
            units_to_decimal(250_000_000_000_000_000, 18),
            Some(dec!(0.25))
        );
    }

    #[test]
    fn test_source_coverage() {
        assert!(MarketSource::MagicEden.covers(Network::Sol));
        assert!(!MarketSource::MagicEden.covers(Network::Matic));
        assert!(MarketSource::OpenSea.covers(Network::Eth));
        assert!(MarketSource::Solsea.is_push());
        assert_eq!(MarketSource::Solanart.to_string(), "solanart.io");
    }
}

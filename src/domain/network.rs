//! Networks - Supported Chains and Address Normalization
//!
//! One non-EVM chain (SOL) and several EVM-compatible chains. Signed
//! listings and offers are accepted only on the EVM lending set;
//! settlement hooks run on every configured network.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::LendError;

/// Blockchain network identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    /// Solana (non-EVM, ed25519 keys, base58 addresses).
    Sol,
    /// Polygon PoS.
    Matic,
    /// Avalanche C-Chain.
    Avax,
    /// BNB Smart Chain.
    Bsc,
    /// Ethereum mainnet.
    Eth,
}

impl Network {
    /// Networks where signed listings and offers are accepted.
    pub const LENDING: [Self; 3] = [Self::Matic, Self::Avax, Self::Bsc];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sol => "SOL",
            Self::Matic => "MATIC",
            Self::Avax => "AVAX",
            Self::Bsc => "BSC",
            Self::Eth => "ETH",
        }
    }

    pub const fn is_evm(self) -> bool {
        !matches!(self, Self::Sol)
    }

    /// Whether `CreateLoan` / `CreateLoanOffer` are accepted on this network.
    pub const fn supports_signed_listing(self) -> bool {
        matches!(self, Self::Matic | Self::Avax | Self::Bsc)
    }

    /// Canonical form of an address on this network.
    ///
    /// EVM addresses are case-insensitive hex and are lowercased.
    /// Base58 addresses are case-sensitive and only trimmed.
    pub fn normalize_address(self, address: &str) -> String {
        let trimmed = address.trim();
        if self.is_evm() {
            trimmed.to_lowercase()
        } else {
            trimmed.to_string()
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = LendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SOL" => Ok(Self::Sol),
            "MATIC" => Ok(Self::Matic),
            "AVAX" => Ok(Self::Avax),
            "BSC" => Ok(Self::Bsc),
            "ETH" => Ok(Self::Eth),
            other => Err(LendError::validation(format!("unknown network {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("matic".parse::<Network>().unwrap(), Network::Matic);
        assert_eq!(" Sol ".parse::<Network>().unwrap(), Network::Sol);
        assert!(matches!(
            "doge".parse::<Network>(),
            Err(LendError::Validation(_))
        ));
    }

    #[test]
    fn test_lending_set() {
        for n in Network::LENDING {
            assert!(n.supports_signed_listing());
            assert!(n.is_evm());
        }
        assert!(!Network::Eth.supports_signed_listing());
        assert!(!Network::Sol.supports_signed_listing());
    }

    #[test]
    fn test_normalize_address_keeps_base58_case() {
        assert_eq!(Network::Bsc.normalize_address(" 0xAbC "), "0xabc");
        assert_eq!(
            Network::Sol.normalize_address("9xQeWvG816bUx9EP"),
            "9xQeWvG816bUx9EP"
        );
    }

    #[test]
    fn test_serde_uses_uppercase_tags() {
        let json = serde_json::to_string(&Network::Avax).unwrap();
        assert_eq!(json, "\"AVAX\"");
    }
}

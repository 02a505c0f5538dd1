use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::RootwatchError;

/// Chains the bridge is deployed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Chain {
    Ethereum,
    Optimism,
    Arbitrum,
    Polygon,
    Gnosis,
    Nova,
    Base,
}

impl Chain {
    /// Chain where roots are confirmed and bonded
    pub const ROOT: Chain = Chain::Ethereum;

    pub const ALL: [Chain; 7] = [
        Chain::Ethereum,
        Chain::Optimism,
        Chain::Arbitrum,
        Chain::Polygon,
        Chain::Gnosis,
        Chain::Nova,
        Chain::Base,
    ];

    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Optimism => 10,
            Chain::Arbitrum => 42161,
            Chain::Polygon => 137,
            Chain::Gnosis => 100,
            Chain::Nova => 42170,
            Chain::Base => 8453,
        }
    }

    pub fn from_chain_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.chain_id() == id)
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Optimism => "optimism",
            Chain::Arbitrum => "arbitrum",
            Chain::Polygon => "polygon",
            Chain::Gnosis => "gnosis",
            Chain::Nova => "nova",
            Chain::Base => "base",
        }
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// Rollups whose L1→L2 messages land as redeemable retryable tickets
    pub fn uses_retryable_tickets(&self) -> bool {
        matches!(self, Chain::Arbitrum | Chain::Nova)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Chain {
    type Err = RootwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "mainnet" => Ok(Chain::Ethereum),
            "optimism" => Ok(Chain::Optimism),
            "arbitrum" => Ok(Chain::Arbitrum),
            "polygon" => Ok(Chain::Polygon),
            "gnosis" | "xdai" => Ok(Chain::Gnosis),
            "nova" => Ok(Chain::Nova),
            "base" => Ok(Chain::Base),
            other => Err(RootwatchError::validation(format!("Unknown chain '{}'", other))),
        }
    }
}

impl Serialize for Chain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.slug())
    }
}

impl<'de> Deserialize<'de> for Chain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Tokens with a bridge deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Token {
    Eth,
    Usdc,
    Usdt,
    Dai,
    Matic,
    Hop,
}

impl Token {
    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Eth => "ETH",
            Token::Usdc => "USDC",
            Token::Usdt => "USDT",
            Token::Dai => "DAI",
            Token::Matic => "MATIC",
            Token::Hop => "HOP",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Token {
    type Err = RootwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ETH" => Ok(Token::Eth),
            "USDC" => Ok(Token::Usdc),
            "USDT" => Ok(Token::Usdt),
            "DAI" => Ok(Token::Dai),
            "MATIC" => Ok(Token::Matic),
            "HOP" => Ok(Token::Hop),
            other => Err(RootwatchError::validation(format!("Unknown token '{}'", other))),
        }
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_roundtrip() {
        for chain in Chain::ALL {
            assert_eq!(Chain::from_chain_id(chain.chain_id()), Some(chain));
        }
        assert_eq!(Chain::from_chain_id(999), None);
    }

    #[test]
    fn test_chain_aliases() {
        assert_eq!("xdai".parse::<Chain>().unwrap(), Chain::Gnosis);
        assert_eq!("Optimism".parse::<Chain>().unwrap(), Chain::Optimism);
        assert!("solana".parse::<Chain>().is_err());
    }

    #[test]
    fn test_token_case_insensitive() {
        assert_eq!("usdc".parse::<Token>().unwrap(), Token::Usdc);
        assert_eq!(Token::Usdc.to_string(), "USDC");
        assert!("DOGE".parse::<Token>().is_err());
    }

    #[test]
    fn test_only_arbitrum_family_uses_tickets() {
        assert!(Chain::Arbitrum.uses_retryable_tickets());
        assert!(Chain::Nova.uses_retryable_tickets());
        assert!(!Chain::Optimism.uses_retryable_tickets());
    }
}

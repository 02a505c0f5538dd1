//! Deserializers for the decimal-string numbers the subgraph and config files use.

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    fn into_u256(self) -> Result<U256, String> {
        match self {
            NumberOrString::Number(n) => Ok(U256::from(n)),
            NumberOrString::String(s) => {
                U256::from_str(s.trim()).map_err(|e| format!("invalid amount '{}': {}", s, e))
            }
        }
    }

    fn into_u64(self) -> Result<u64, String> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|e| format!("invalid integer '{}': {}", s, e)),
        }
    }
}

pub fn u256_from_str<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrString::deserialize(deserializer)?
        .into_u256()
        .map_err(serde::de::Error::custom)
}

pub fn opt_u256_from_str<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_u256)
        .transpose()
        .map_err(serde::de::Error::custom)
}

pub fn u64_from_str<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrString::deserialize(deserializer)?
        .into_u64()
        .map_err(serde::de::Error::custom)
}

pub fn opt_u64_from_str<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_u64)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "u256_from_str")]
        amount: U256,
        #[serde(deserialize_with = "u64_from_str")]
        block: u64,
        #[serde(default, deserialize_with = "opt_u64_from_str")]
        chain_id: Option<u64>,
    }

    #[test]
    fn test_decimal_strings() {
        let s: Sample =
            serde_json::from_str(r#"{"amount":"123456789012345678901234","block":"42"}"#).unwrap();
        assert_eq!(s.amount, U256::from_str("123456789012345678901234").unwrap());
        assert_eq!(s.block, 42);
        assert_eq!(s.chain_id, None);
    }

    #[test]
    fn test_plain_numbers() {
        let s: Sample = serde_json::from_str(r#"{"amount":5,"block":7,"chain_id":"10"}"#).unwrap();
        assert_eq!(s.amount, U256::from(5u64));
        assert_eq!(s.chain_id, Some(10));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(serde_json::from_str::<Sample>(r#"{"amount":"ten","block":"1"}"#).is_err());
    }
}

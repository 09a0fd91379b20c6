//! CAIP-2 chain identifiers.
//!
//! A [`ChainId`] uniquely identifies a blockchain network as
//! `namespace:reference`, e.g. `eip155:8453` for Base or
//! `solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp` for Solana mainnet.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A CAIP-2 compliant blockchain identifier.
///
/// The `namespace` selects the blockchain family (`eip155`, `solana`, …);
/// the `reference` selects the specific chain within it. Serializes as the
/// colon-joined string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Creates a chain ID from namespace and reference components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Returns the namespace component (e.g. `"eip155"`).
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component (e.g. `"8453"`).
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Returns the namespace wildcard pattern for this chain (e.g. `"eip155:*"`).
    #[must_use]
    pub fn namespace_wildcard(&self) -> String {
        format!("{}:*", self.namespace)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Error returned when parsing an invalid chain ID string.
///
/// A valid chain ID is `namespace:reference` with both components non-empty.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| ChainIdFormatError(s.into()))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(Self {
            namespace: namespace.into(),
            reference: reference.into(),
        })
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let chain_id: ChainId = "eip155:8453".parse().unwrap();
        assert_eq!(chain_id.namespace(), "eip155");
        assert_eq!(chain_id.reference(), "8453");
        assert_eq!(chain_id.to_string(), "eip155:8453");
    }

    #[test]
    fn solana_reference_may_contain_base58() {
        let chain_id: ChainId = "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp".parse().unwrap();
        assert_eq!(chain_id.namespace(), "solana");
        assert_eq!(chain_id.namespace_wildcard(), "solana:*");
    }

    #[test]
    fn rejects_missing_reference() {
        assert!("eip155".parse::<ChainId>().is_err());
        assert!("eip155:".parse::<ChainId>().is_err());
        assert!(":8453".parse::<ChainId>().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let chain_id: ChainId = "eip155:1".parse().unwrap();
        let json = serde_json::to_string(&chain_id).unwrap();
        assert_eq!(json, "\"eip155:1\"");
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain_id);
    }
}

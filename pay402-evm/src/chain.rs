//! EVM chain primitives: chain references, token amounts, and network
//! configuration.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use pay402::chain::ChainId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A numeric EIP-155 chain reference (e.g. `8453` for Base).
///
/// Converts to and from the CAIP-2 form `eip155:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eip155ChainReference(u64);

impl Eip155ChainReference {
    /// Creates a chain reference from a raw numeric chain ID.
    #[must_use]
    pub const fn new(chain_id: u64) -> Self {
        Self(chain_id)
    }

    /// Returns the numeric chain ID.
    #[must_use]
    pub const fn inner(&self) -> u64 {
        self.0
    }

    /// Returns the CAIP-2 chain ID (`eip155:<id>`).
    #[must_use]
    pub fn as_chain_id(&self) -> ChainId {
        ChainId::new("eip155", self.0.to_string())
    }
}

impl fmt::Display for Eip155ChainReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eip155:{}", self.0)
    }
}

/// Error parsing a CAIP-2 string into an EIP-155 chain reference.
#[derive(Debug, thiserror::Error)]
#[error("not an eip155 chain id: {0}")]
pub struct NotEip155Error(String);

impl TryFrom<&str> for Eip155ChainReference {
    type Error = NotEip155Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let reference = value
            .strip_prefix("eip155:")
            .ok_or_else(|| NotEip155Error(value.into()))?;
        let chain_id = reference
            .parse::<u64>()
            .map_err(|_| NotEip155Error(value.into()))?;
        Ok(Self(chain_id))
    }
}

/// A token amount in base units, serialized as a decimal string.
///
/// Wraps [`U256`] so wire values like `"1000000"` survive JSON without
/// precision loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    /// Zero amount.
    pub const ZERO: Self = Self(U256::ZERO);
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl FromStr for TokenAmount {
    type Err = alloy_primitives::ruint::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str_radix(s, 10).map(Self)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A known asset deployment on an EVM network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    /// Token contract address.
    pub address: Address,
    /// Token decimals.
    pub decimals: u8,
    /// EIP-712 domain name of the token contract.
    pub name: String,
    /// EIP-712 domain version of the token contract.
    pub version: String,
}

/// Configuration for a known EVM network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// CAIP-2 network identifier (e.g. `"eip155:8453"`).
    pub network: String,
    /// Numeric EIP-155 chain ID.
    pub chain_id: u64,
    /// Known assets on this network; the first is the default.
    pub assets: Vec<AssetInfo>,
}

impl NetworkConfig {
    /// Finds asset info by contract address.
    #[must_use]
    pub fn find_asset(&self, address: Address) -> Option<&AssetInfo> {
        self.assets.iter().find(|a| a.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_reference_round_trip() {
        let chain = Eip155ChainReference::try_from("eip155:8453").unwrap();
        assert_eq!(chain.inner(), 8453);
        assert_eq!(chain.to_string(), "eip155:8453");
        assert_eq!(chain.as_chain_id().to_string(), "eip155:8453");
    }

    #[test]
    fn rejects_non_evm_chains() {
        assert!(Eip155ChainReference::try_from("solana:mainnet").is_err());
        assert!(Eip155ChainReference::try_from("eip155:abc").is_err());
    }

    #[test]
    fn token_amount_string_serde() {
        let amount: TokenAmount = "1000000".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"1000000\"");
        let back: TokenAmount = serde_json::from_str("\"1000000\"").unwrap();
        assert_eq!(back, amount);
    }
}

//! Version detection, payload parsing, and network pattern matching.

use serde_json::Value;

use super::v1::{PaymentPayloadV1, PaymentRequiredV1, PaymentRequirementsV1};
use super::v2::{PaymentPayload, PaymentRequired, PaymentRequirements};
use super::{Network, ProtocolError};

/// Extracts the `x402Version` field from JSON data.
///
/// # Errors
///
/// Returns [`ProtocolError::MissingVersion`] if the field is absent and
/// [`ProtocolError::InvalidVersion`] if it is not 1 or 2.
pub fn detect_version(data: &Value) -> Result<u32, ProtocolError> {
    let version = data
        .get("x402Version")
        .ok_or(ProtocolError::MissingVersion)?;

    let version = version.as_u64().ok_or(ProtocolError::InvalidVersion(0))?;

    #[allow(clippy::cast_possible_truncation)]
    match version {
        1 | 2 => Ok(version as u32),
        _ => Err(ProtocolError::InvalidVersion(version as u32)),
    }
}

/// Checks if a payment payload matches the given requirements.
///
/// - **V1**: compares `scheme` and `network` only (`asset` is deliberately
///   not compared).
/// - **V2**: full structural equality of the `accepted` copy against the
///   requirements.
#[must_use]
pub fn matches_requirements_v2(payload: &PaymentPayload, requirements: &PaymentRequirements) -> bool {
    payload.accepted == *requirements
}

/// V1 payload/requirements matching: `(scheme, network)` only.
#[must_use]
pub fn matches_requirements_v1(
    payload: &PaymentPayloadV1,
    requirements: &PaymentRequirementsV1,
) -> bool {
    payload.scheme == requirements.scheme && payload.network == requirements.network
}

/// Parses a 402 response into the appropriate version type.
///
/// # Errors
///
/// Returns [`ProtocolError`] on parse failure or unknown version.
pub fn parse_payment_required(data: &Value) -> Result<PaymentRequiredEnum, ProtocolError> {
    let version = detect_version(data)?;
    if version == 1 {
        let v1: PaymentRequiredV1 = serde_json::from_value(data.clone())?;
        Ok(PaymentRequiredEnum::V1(Box::new(v1)))
    } else {
        let v2: PaymentRequired = serde_json::from_value(data.clone())?;
        Ok(PaymentRequiredEnum::V2(Box::new(v2)))
    }
}

/// Parses a 402 response from raw JSON bytes.
///
/// # Errors
///
/// Returns [`ProtocolError`] on parse failure.
pub fn parse_payment_required_bytes(data: &[u8]) -> Result<PaymentRequiredEnum, ProtocolError> {
    let parsed: Value = serde_json::from_slice(data)?;
    parse_payment_required(&parsed)
}

/// Parses a payment payload into the appropriate version type.
///
/// # Errors
///
/// Returns [`ProtocolError`] on parse failure or unknown version.
pub fn parse_payment_payload(data: &Value) -> Result<PaymentPayloadEnum, ProtocolError> {
    let version = detect_version(data)?;
    if version == 1 {
        let v1: PaymentPayloadV1 = serde_json::from_value(data.clone())?;
        Ok(PaymentPayloadEnum::V1(Box::new(v1)))
    } else {
        let v2: PaymentPayload = serde_json::from_value(data.clone())?;
        Ok(PaymentPayloadEnum::V2(Box::new(v2)))
    }
}

/// Parses a payment payload from raw JSON bytes.
///
/// # Errors
///
/// Returns [`ProtocolError`] on parse failure.
pub fn parse_payment_payload_bytes(data: &[u8]) -> Result<PaymentPayloadEnum, ProtocolError> {
    let parsed: Value = serde_json::from_slice(data)?;
    parse_payment_payload(&parsed)
}

/// Checks if a network matches a pattern.
///
/// Patterns ending with `*` match any reference sharing the prefix, so
/// `eip155:*` matches every EVM chain.
#[must_use]
pub fn matches_network_pattern(network: &str, pattern: &str) -> bool {
    pattern
        .strip_suffix('*')
        .map_or_else(|| pattern == network, |prefix| network.starts_with(prefix))
}

/// Finds the entry registered for a network, with wildcard fallback.
///
/// Tries an exact key first, then any registered wildcard pattern that
/// matches the network.
#[must_use]
pub fn find_by_network<'a, T, S: std::hash::BuildHasher>(
    entries: &'a std::collections::HashMap<Network, T, S>,
    network: &str,
) -> Option<&'a T> {
    if let Some(v) = entries.get(network) {
        return Some(v);
    }

    for (pattern, entry) in entries {
        if matches_network_pattern(network, pattern) {
            return Some(entry);
        }
    }

    None
}

/// A version-tagged `PaymentRequired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRequiredEnum {
    /// V1 format.
    V1(Box<PaymentRequiredV1>),
    /// V2 format.
    V2(Box<PaymentRequired>),
}

impl PaymentRequiredEnum {
    /// Returns the protocol version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }
}

/// A version-tagged `PaymentPayload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentPayloadEnum {
    /// V1 format.
    V1(Box<PaymentPayloadV1>),
    /// V2 format.
    V2(Box<PaymentPayload>),
}

impl PaymentPayloadEnum {
    /// Returns the protocol version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        match self {
            Self::V1(p) => p.x402_version,
            Self::V2(p) => p.x402_version,
        }
    }

    /// Returns the payment scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        match self {
            Self::V1(p) => &p.scheme,
            Self::V2(p) => p.scheme(),
        }
    }

    /// Returns the network.
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            Self::V1(p) => &p.network,
            Self::V2(p) => p.network(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_versions() {
        assert_eq!(detect_version(&json!({"x402Version": 1})).unwrap(), 1);
        assert_eq!(detect_version(&json!({"x402Version": 2})).unwrap(), 2);
        assert!(detect_version(&json!({"x402Version": 3})).is_err());
        assert!(detect_version(&json!({})).is_err());
    }

    #[test]
    fn network_pattern_matching() {
        assert!(matches_network_pattern("eip155:8453", "eip155:8453"));
        assert!(matches_network_pattern("eip155:8453", "eip155:*"));
        assert!(!matches_network_pattern("solana:mainnet", "eip155:*"));
        assert!(!matches_network_pattern("eip155:8453", "eip155:1"));
    }

    #[test]
    fn v2_match_is_structural() {
        let requirements = PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:8453".into(),
            amount: "1000000".into(),
            pay_to: "0xPAY".into(),
            max_timeout_seconds: 300,
            asset: "0xUSDC".into(),
            extra: None,
        };
        let payload = PaymentPayload {
            x402_version: 2,
            accepted: requirements.clone(),
            payload: json!({}),
            resource: None,
            extensions: None,
        };
        assert!(matches_requirements_v2(&payload, &requirements));

        // Any field difference breaks the match, including the opaque extra.
        let mut other = requirements.clone();
        other.extra = Some(json!({"name": "USD Coin"}));
        assert!(!matches_requirements_v2(&payload, &other));

        let mut other = requirements;
        other.max_timeout_seconds = 600;
        assert!(!matches_requirements_v2(&payload, &other));
    }

    #[test]
    fn v1_match_ignores_asset() {
        let payload = PaymentPayloadV1 {
            x402_version: 1,
            scheme: "exact".into(),
            network: "base".into(),
            payload: json!({}),
        };
        let requirements = PaymentRequirementsV1 {
            scheme: "exact".into(),
            network: "base".into(),
            max_amount_required: "1".into(),
            resource: "/weather".into(),
            description: None,
            mime_type: None,
            pay_to: "0xPAY".into(),
            max_timeout_seconds: 300,
            asset: "0xANY".into(),
            output_schema: None,
            extra: None,
        };
        assert!(matches_requirements_v1(&payload, &requirements));
    }

    #[test]
    fn parses_payload_by_version() {
        let v1 = json!({"x402Version": 1, "scheme": "exact", "network": "base", "payload": {}});
        assert!(matches!(
            parse_payment_payload(&v1).unwrap(),
            PaymentPayloadEnum::V1(_)
        ));
    }
}

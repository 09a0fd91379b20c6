//! Facilitator response types.
//!
//! These travel between resource servers and facilitators during payment
//! verification and settlement, and back to clients in the
//! `PAYMENT-RESPONSE` header.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Extensions, Network};

/// Result of payment verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment authorization is valid.
    pub is_valid: bool,

    /// Machine-readable reason when `is_valid` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,

    /// Human-readable elaboration of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_message: Option<String>,

    /// The payer's address, if identified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// Creates a valid verification response.
    #[must_use]
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            invalid_message: None,
            payer: Some(payer.into()),
        }
    }

    /// Creates an invalid verification response with a stable reason kind.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            invalid_message: None,
            payer: None,
        }
    }

    /// Attaches a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.invalid_message = Some(message.into());
        self
    }

    /// Attaches the payer address.
    #[must_use]
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }
}

/// Result of payment settlement.
///
/// `transaction` is the on-chain reference; it is the empty string when
/// settlement failed before a transaction existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether settlement succeeded.
    pub success: bool,

    /// Machine-readable reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,

    /// Human-readable elaboration of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// The payer's address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,

    /// On-chain transaction reference (empty string on failure).
    pub transaction: String,

    /// Network where settlement occurred.
    pub network: Network,

    /// Headers the facilitator asks the server to propagate to the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    /// Optional protocol extensions returned by the facilitator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

impl SettleResponse {
    /// Creates a successful settlement response.
    #[must_use]
    pub fn success(
        transaction: impl Into<String>,
        network: impl Into<String>,
        payer: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            error_reason: None,
            error_message: None,
            payer: Some(payer.into()),
            transaction: transaction.into(),
            network: network.into(),
            headers: None,
            extensions: None,
        }
    }

    /// Creates a failed settlement response.
    #[must_use]
    pub fn error(reason: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            success: false,
            error_reason: Some(reason.into()),
            error_message: None,
            payer: None,
            transaction: String::new(),
            network: network.into(),
            headers: None,
            extensions: None,
        }
    }

    /// Attaches a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// A single (version, scheme, network) combination a facilitator supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version for this kind (1 or 2).
    pub x402_version: u32,

    /// Payment scheme identifier (e.g. `"exact"`).
    pub scheme: String,

    /// Network identifier (CAIP-2 chain ID for V2, name for V1). May be a
    /// namespace wildcard pattern such as `"eip155:*"`.
    pub network: Network,

    /// Additional scheme-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Everything a facilitator advertises about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// List of supported payment kinds.
    pub kinds: Vec<SupportedKind>,

    /// List of supported extension keys (e.g. `["sign-in-with-x"]`).
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Map of CAIP family pattern to signer addresses, e.g.
    /// `{"eip155:*": ["0xFacilitatorSigner"]}`.
    #[serde(default)]
    pub signers: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_response_wire_shape() {
        let valid = VerifyResponse::valid("0xPayer");
        let json = serde_json::to_string(&valid).unwrap();
        assert!(json.contains("\"isValid\":true"));
        assert!(!json.contains("invalidReason"));

        let invalid = VerifyResponse::invalid("insufficient_funds");
        let json = serde_json::to_string(&invalid).unwrap();
        assert!(json.contains("\"invalidReason\":\"insufficient_funds\""));
    }

    #[test]
    fn settle_failure_has_empty_transaction() {
        let response = SettleResponse::error("transaction_failed", "eip155:8453");
        assert_eq!(response.transaction, "");
        let json = serde_json::to_string(&response).unwrap();
        let back: SettleResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn supported_response_defaults() {
        let json = r#"{"kinds":[{"x402Version":2,"scheme":"exact","network":"eip155:8453"}]}"#;
        let supported: SupportedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(supported.kinds.len(), 1);
        assert!(supported.extensions.is_empty());
        assert!(supported.signers.is_empty());
    }
}

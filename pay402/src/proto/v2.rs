//! Protocol version 2 (current) wire types.
//!
//! V2 identifies networks by CAIP-2 chain ID, carries resource metadata in
//! a dedicated [`ResourceInfo`], and embeds the accepted requirements inside
//! the payment payload. That embedded copy is what enables the server-side
//! match rule: the `accepted` field must be structurally equal to one of the
//! advertised `accepts[]` entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Extensions, Network};

/// Payment terms offered by the seller for one resource.
///
/// `extra` is an opaque scheme-specific bag; for the EVM exact scheme it
/// carries the EIP-712 domain `name`/`version` and the asset transfer
/// method. Derives `Eq` because V2 payload matching is full structural
/// equality against the advertised list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme identifier (e.g. `"exact"`).
    pub scheme: String,

    /// CAIP-2 network identifier (e.g. `"eip155:8453"`).
    pub network: Network,

    /// Payment amount in the asset's smallest unit, as a decimal string.
    pub amount: String,

    /// Recipient address.
    pub pay_to: String,

    /// Maximum payment validity in seconds.
    pub max_timeout_seconds: u64,

    /// On-chain asset identifier.
    pub asset: String,

    /// Scheme-specific extra data, opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    /// Returns the payment amount as a string.
    #[must_use]
    pub fn amount(&self) -> &str {
        &self.amount
    }
}

/// Metadata about the resource being paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// URL of the resource.
    pub url: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type of the resource content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResourceInfo {
    /// Creates a resource info with only a URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: None,
            mime_type: None,
        }
    }
}

/// HTTP 402 response body for V2.
///
/// Created once per 402 turn and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 2).
    pub x402_version: u32,

    /// Optional error message describing why a prior attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Information about the resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,

    /// Ordered list of acceptable payment requirements.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,

    /// Optional protocol extension declarations, keyed by extension name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

/// A signed payment authorization from the buyer (V2).
///
/// `accepted` is an exact copy of the [`PaymentRequirements`] the client
/// chose from `accepts[]`; `payload` is the scheme-specific signed data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 2).
    pub x402_version: u32,

    /// The payment requirements the buyer accepted, copied verbatim.
    pub accepted: PaymentRequirements,

    /// Scheme-specific signed payload.
    pub payload: Value,

    /// Information about the resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,

    /// Optional protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

impl PaymentPayload {
    /// Returns the payment scheme of the accepted requirements.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.accepted.scheme
    }

    /// Returns the network of the accepted requirements.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.accepted.network
    }
}

/// Request to verify a V2 payment against its requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version (always 2).
    pub x402_version: u32,

    /// The payment payload to verify.
    pub payment_payload: PaymentPayload,

    /// The requirements to verify against.
    pub payment_requirements: PaymentRequirements,
}

/// Request to settle a verified V2 payment.
///
/// Structurally identical to [`VerifyRequest`]; kept distinct so the
/// compiler prevents passing one where the other is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Protocol version (always 2).
    pub x402_version: u32,

    /// The payment payload to settle.
    pub payment_payload: PaymentPayload,

    /// The requirements for settlement.
    pub payment_requirements: PaymentRequirements,
}

impl From<VerifyRequest> for SettleRequest {
    fn from(request: VerifyRequest) -> Self {
        Self {
            x402_version: request.x402_version,
            payment_payload: request.payment_payload,
            payment_requirements: request.payment_requirements,
        }
    }
}

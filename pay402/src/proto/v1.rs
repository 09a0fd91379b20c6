//! Protocol version 1 (legacy) wire types.
//!
//! V1 identifies networks by human-readable names (`"base-sepolia"`), puts
//! `scheme` and `network` at the top level of the payload, and carries
//! resource metadata inline in the requirements. Retained for compatibility
//! with clients that have not migrated to V2.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Network;

/// V1 payment requirements (legacy).
///
/// Uses `maxAmountRequired` instead of V2's `amount` and embeds the resource
/// URL directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsV1 {
    /// Payment scheme identifier (e.g. `"exact"`).
    pub scheme: String,

    /// Network name (legacy format, e.g. `"base-sepolia"`).
    pub network: Network,

    /// Maximum amount in smallest unit.
    pub max_amount_required: String,

    /// Resource URL.
    pub resource: String,

    /// Optional resource description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Recipient address.
    pub pay_to: String,

    /// Maximum payment validity in seconds.
    pub max_timeout_seconds: u64,

    /// Asset address/identifier.
    pub asset: String,

    /// Optional output schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Additional scheme-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirementsV1 {
    /// Returns the payment amount (V1 uses `maxAmountRequired`).
    #[must_use]
    pub fn amount(&self) -> &str {
        &self.max_amount_required
    }
}

/// V1 402 response body (legacy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredV1 {
    /// Protocol version (always 1).
    #[serde(default = "default_v1")]
    pub x402_version: u32,

    /// Optional error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// List of accepted payment requirements.
    pub accepts: Vec<PaymentRequirementsV1>,
}

/// V1 payment payload (legacy).
///
/// `scheme` and `network` live at the top level rather than inside an
/// `accepted` copy, so server-side matching can only compare those two
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayloadV1 {
    /// Protocol version (always 1).
    #[serde(default = "default_v1")]
    pub x402_version: u32,

    /// Payment scheme identifier.
    pub scheme: String,

    /// Network name.
    pub network: Network,

    /// Scheme-specific payload data.
    pub payload: Value,
}

/// V1 request to verify a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequestV1 {
    /// Protocol version (always 1).
    #[serde(default = "default_v1")]
    pub x402_version: u32,

    /// The payment payload to verify.
    pub payment_payload: PaymentPayloadV1,

    /// The requirements to verify against.
    pub payment_requirements: PaymentRequirementsV1,
}

/// V1 request to settle a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequestV1 {
    /// Protocol version (always 1).
    #[serde(default = "default_v1")]
    pub x402_version: u32,

    /// The payment payload to settle.
    pub payment_payload: PaymentPayloadV1,

    /// The requirements for settlement.
    pub payment_requirements: PaymentRequirementsV1,
}

const fn default_v1() -> u32 {
    1
}

//! Wire format types for the x402 payment protocol.
//!
//! Defines the serialization-level data structures for both protocol
//! versions. V2 (current) uses CAIP-2 chain IDs and nests the accepted
//! requirements inside the payment payload; V1 (legacy) uses human-readable
//! network names and a flat payload.
//!
//! All types serialize to camelCase JSON. The protocol version travels in
//! the `x402Version` field.
//!
//! # Modules
//!
//! - [`v2`] — Current protocol types
//! - [`v1`] — Legacy protocol types
//! - [`responses`] — Facilitator responses (verify/settle/supported)
//! - [`helpers`] — Version detection, parsing, and network pattern matching

pub mod helpers;
pub mod responses;
pub mod v1;
pub mod v2;

pub use responses::{SettleResponse, SupportedKind, SupportedResponse, VerifyResponse};
pub use v1::{PaymentPayloadV1, PaymentRequiredV1, PaymentRequirementsV1};
pub use v2::{
    PaymentPayload, PaymentRequired, PaymentRequirements, ResourceInfo, SettleRequest,
    VerifyRequest,
};

use std::collections::HashMap;

/// Current protocol version.
pub const X402_VERSION: u32 = 2;

/// CAIP-2 format network identifier (e.g. `"eip155:8453"`), or a legacy
/// network name in V1 contexts (e.g. `"base-sepolia"`).
pub type Network = String;

/// Protocol extension data attached to x402 wire types.
///
/// Keys are extension names (e.g. `"sign-in-with-x"`); values are arbitrary
/// JSON specific to each extension and opaque to the core.
pub type Extensions = HashMap<String, serde_json::Value>;

/// Errors that can occur when parsing x402 protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The `x402Version` field is missing from the JSON data.
    #[error("missing x402Version field")]
    MissingVersion,

    /// The `x402Version` field has an unsupported value.
    #[error("invalid x402Version: {0}")]
    InvalidVersion(u32),

    /// A required field is missing from the JSON data.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// JSON deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

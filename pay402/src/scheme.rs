//! Payment scheme protocol definitions.
//!
//! A *scheme* is a named cryptographic settlement method (e.g. `exact`)
//! bound to a network family. Scheme backends plug into the three protocol
//! roles through the traits here:
//!
//! - [`SchemeClient`] / [`SchemeClientV1`] — build a signed payload (buyer)
//! - [`SchemeServer`] — parse prices and enhance requirements (seller)
//! - [`SchemeFacilitator`] — verify and settle payments (facilitator)
//!
//! All I/O-bound methods are async-first, returning [`BoxFuture`] so the
//! traits stay dyn-compatible for dynamic registration. The scheme backend
//! is the only place that understands on-chain primitives; every other
//! component treats its payloads as opaque JSON.

use std::future::Future;
use std::pin::Pin;

use crate::proto::{
    PaymentPayload, PaymentRequirements, PaymentRequirementsV1, SettleResponse, SupportedKind,
    VerifyResponse,
};
use serde_json::Value;

/// Boxed, `Send` future — the standard dyn-compatible async return type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed error type used across scheme trait boundaries.
pub type SchemeError = Box<dyn std::error::Error + Send + Sync>;

/// V2 client-side payment mechanism.
///
/// Implementations produce the scheme-specific inner payload, which the
/// client core wraps into a full [`PaymentPayload`] with the accepted
/// requirements copied in.
pub trait SchemeClient: Send + Sync {
    /// Payment scheme identifier (e.g. `"exact"`).
    fn scheme(&self) -> &str;

    /// Creates the scheme-specific inner payload.
    ///
    /// Async because it may involve RPC calls or hardware wallet
    /// interactions.
    fn create_payment_payload<'a>(
        &'a self,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<Value, SchemeError>>;
}

/// V1 (legacy) client-side payment mechanism.
pub trait SchemeClientV1: Send + Sync {
    /// Payment scheme identifier.
    fn scheme(&self) -> &str;

    /// Creates the scheme-specific inner payload for V1.
    fn create_payment_payload<'a>(
        &'a self,
        requirements: &'a PaymentRequirementsV1,
    ) -> BoxFuture<'a, Result<Value, SchemeError>>;
}

/// V2 server-side payment mechanism.
///
/// Handles price parsing and requirement enhancement. Does **not**
/// verify or settle — that is delegated through the facilitator client.
/// Methods are sync because they perform pure computation.
pub trait SchemeServer: Send + Sync {
    /// Payment scheme identifier (e.g. `"exact"`).
    fn scheme(&self) -> &str;

    /// Converts a human-friendly price to an atomic asset amount.
    ///
    /// For example, `"1.50"` becomes `"1500000"` for a 6-decimal token.
    ///
    /// # Errors
    ///
    /// Returns an error if the price format is invalid or the network is
    /// unknown to this scheme.
    fn parse_price(&self, price: &Value, network: &str) -> Result<AssetAmount, SchemeError>;

    /// Adds scheme-specific fields to payment requirements.
    ///
    /// For EVM this fills the EIP-712 domain parameters (`name`, `version`)
    /// in `extra` for the target asset.
    fn enhance_payment_requirements(
        &self,
        requirements: PaymentRequirements,
        supported_kind: &SupportedKind,
        facilitator_extensions: &[String],
    ) -> PaymentRequirements;
}

/// V2 facilitator-side payment mechanism.
///
/// Implementations verify and settle payments for a specific scheme,
/// reporting failures through `is_valid = false` / `success = false`
/// responses rather than errors; errors are reserved for transport and
/// infrastructure faults.
pub trait SchemeFacilitator: Send + Sync {
    /// Payment scheme identifier (e.g. `"exact"`).
    fn scheme(&self) -> &str;

    /// CAIP family pattern served by this facilitator (e.g. `"eip155:*"`).
    fn caip_family(&self) -> String;

    /// The supported kinds this facilitator advertises.
    fn supported_kinds(&self) -> Vec<SupportedKind>;

    /// Signer addresses for the served family.
    fn signer_addresses(&self) -> Vec<String>;

    /// Verifies a payment asynchronously.
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, VerifyResponse>;

    /// Settles a payment on-chain asynchronously.
    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, SettleResponse>;
}

/// Amount in smallest unit with asset identifier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAmount {
    /// Amount in smallest unit (e.g. `"1500000"` for 1.5 USDC).
    pub amount: String,

    /// Asset address/identifier.
    pub asset: String,

    /// Optional additional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

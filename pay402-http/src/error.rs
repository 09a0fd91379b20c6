//! Error types for the HTTP transport layer.

use pay402::proto::ProtocolError;

/// Errors from encoding/decoding x402 HTTP messages and driving the
/// client retry loop.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Base64 decoding of a header value failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Protocol-level parse failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The 402 response could not be parsed at all.
    #[error("invalid 402 response: {0}")]
    InvalidPaymentRequired(String),

    /// The request already carried a payment header; refusing to retry.
    #[error("payment_already_attempted: request already carries a payment header")]
    PaymentAlreadyAttempted,

    /// The request body cannot be cloned for the retry.
    #[error("request body is not cloneable, cannot retry with payment")]
    RequestNotCloneable,

    /// Payment creation failed.
    #[error("payment creation failed: {0}")]
    PaymentCreation(String),
}

//! Error types for x402 payment operations.
//!
//! Every protocol-visible failure carries a stable kind string (see
//! [`kind`]) so clients and wallets can react programmatically. The kinds
//! travel in `VerifyResponse::invalid_reason`, `SettleResponse::error_reason`
//! and the JSON bodies of 402 responses.

use std::fmt;

/// Stable machine-readable failure kind strings.
pub mod kind {
    /// No scheme backend registered for the requested scheme.
    pub const UNSUPPORTED_SCHEME: &str = "unsupported_scheme";
    /// The payload's network does not match the requirements.
    pub const NETWORK_MISMATCH: &str = "network_mismatch";
    /// The facilitator call exceeded its timeout.
    pub const FACILITATOR_TIMEOUT: &str = "facilitator_timeout";
    /// No initialized facilitator advertises the combination.
    pub const NO_FACILITATOR_SUPPORT: &str = "no_facilitator_support";
    /// A settle hook aborted the settlement.
    pub const SETTLEMENT_ABORTED: &str = "settlement_aborted";
    /// The request already carried a payment header.
    pub const PAYMENT_ALREADY_ATTEMPTED: &str = "payment_already_attempted";
    /// The payer's on-chain balance is insufficient.
    pub const INSUFFICIENT_FUNDS: &str = "insufficient_funds";
    /// The on-chain settlement transaction reverted.
    pub const TRANSACTION_FAILED: &str = "transaction_failed";
    /// The settlement transaction is in an unexpected state.
    pub const INVALID_TRANSACTION_STATE: &str = "invalid_transaction_state";
}

/// Base error type for x402 payment operations.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Error during payment verification.
    #[error("{0}")]
    Verify(#[from] VerifyError),

    /// Error during payment settlement.
    #[error("{0}")]
    Settle(#[from] SettleError),

    /// No registered scheme found for a scheme/network combination.
    #[error("{0}")]
    SchemeNotFound(#[from] SchemeNotFoundError),

    /// No initialized facilitator advertises a combination.
    #[error("{0}")]
    UnsupportedByFacilitator(#[from] UnsupportedByFacilitatorError),

    /// No payment requirements match registered schemes.
    #[error("{0}")]
    NoMatchingRequirements(#[from] NoMatchingRequirementsError),

    /// Payment was aborted by a before hook.
    #[error("{0}")]
    Aborted(#[from] PaymentAbortedError),
}

/// Error during payment verification.
#[derive(Debug, Clone)]
pub struct VerifyError {
    /// Machine-readable reason for the error.
    pub invalid_reason: String,
    /// Human-readable message for the error.
    pub invalid_message: Option<String>,
    /// The payer's address (if known).
    pub payer: Option<String>,
}

impl VerifyError {
    /// Creates a new verification error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            invalid_reason: reason.into(),
            invalid_message: None,
            payer: None,
        }
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.invalid_message = Some(message.into());
        self
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = &self.invalid_message {
            write!(f, "{}: {}", self.invalid_reason, msg)
        } else {
            write!(f, "{}", self.invalid_reason)
        }
    }
}

impl std::error::Error for VerifyError {}

/// Error during payment settlement.
#[derive(Debug, Clone)]
pub struct SettleError {
    /// Machine-readable reason for the error.
    pub error_reason: String,
    /// Human-readable message for the error.
    pub error_message: Option<String>,
    /// Transaction hash/identifier (if one exists).
    pub transaction: Option<String>,
}

impl SettleError {
    /// Creates a new settlement error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            error_reason: reason.into(),
            error_message: None,
            transaction: None,
        }
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Sets the transaction hash.
    #[must_use]
    pub fn with_transaction(mut self, tx: impl Into<String>) -> Self {
        self.transaction = Some(tx.into());
        self
    }
}

impl fmt::Display for SettleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = &self.error_message {
            write!(f, "{}: {}", self.error_reason, msg)
        } else {
            write!(f, "{}", self.error_reason)
        }
    }
}

impl std::error::Error for SettleError {}

/// No registered scheme found for a scheme/network combination.
#[derive(Debug, Clone, thiserror::Error)]
#[error("No scheme '{scheme}' registered for network '{network}'")]
pub struct SchemeNotFoundError {
    /// The requested scheme.
    pub scheme: String,
    /// The requested network.
    pub network: String,
}

impl SchemeNotFoundError {
    /// Creates a new scheme-not-found error.
    #[must_use]
    pub fn new(scheme: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            network: network.into(),
        }
    }
}

/// No initialized facilitator advertises the requested combination.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "no_facilitator_support: no facilitator advertises (v{x402_version}, {network}, {scheme})"
)]
pub struct UnsupportedByFacilitatorError {
    /// The requested protocol version.
    pub x402_version: u32,
    /// The requested scheme.
    pub scheme: String,
    /// The requested network.
    pub network: String,
}

impl UnsupportedByFacilitatorError {
    /// Creates a new unsupported-by-facilitator error.
    #[must_use]
    pub fn new(x402_version: u32, scheme: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            x402_version,
            scheme: scheme.into(),
            network: network.into(),
        }
    }
}

/// No payment requirements match registered schemes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct NoMatchingRequirementsError {
    /// Reason for the error.
    pub reason: String,
}

impl NoMatchingRequirementsError {
    /// Creates a new no-matching-requirements error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Payment was aborted by a before hook.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Payment aborted: {reason}")]
pub struct PaymentAbortedError {
    /// The reason for aborting.
    pub reason: String,
}

impl PaymentAbortedError {
    /// Creates a new payment-aborted error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

//! Error types for the "exact" facilitator.
//!
//! Every variant maps to one of the protocol's stable kind strings via
//! [`ExactEvmError::kind`]; the kind travels in `invalidReason` /
//! `errorReason` so clients can react programmatically.

use alloy_transport::TransportError;

/// Failures from verifying or settling an "exact" EVM payment.
#[derive(Debug, thiserror::Error)]
pub enum ExactEvmError {
    /// The payload does not decode as an exact scheme payload.
    #[error("malformed exact payload: {0}")]
    InvalidPayload(String),

    /// The scheme is not `exact`.
    #[error("unsupported scheme")]
    UnsupportedScheme,

    /// The payload's network does not match the requirements or this
    /// facilitator's chain.
    #[error("network mismatch")]
    NetworkMismatch,

    /// The authorization recipient differs from the required `payTo`.
    #[error("authorization recipient does not match payTo")]
    RecipientMismatch,

    /// The EIP-712 signature is invalid.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The authorization has expired (`validBefore` too close or past).
    #[error("authorization expired (validBefore)")]
    ValidBefore,

    /// The authorization is not yet valid (`validAfter` in the future).
    #[error("authorization not yet valid (validAfter)")]
    ValidAfter,

    /// Smart-wallet signature without deployed code or EIP-6492 deploy data.
    #[error("smart wallet is not deployed and no EIP-6492 deploy data attached")]
    UndeployedSmartWallet,

    /// The authorized value does not cover the required amount.
    #[error("authorized value below required amount")]
    InsufficientValue,

    /// The payer's token balance does not cover the amount.
    #[error("insufficient on-chain balance")]
    InsufficientFunds,

    /// The Permit2 deadline has passed.
    #[error("permit2 deadline expired")]
    Permit2DeadlineExpired,

    /// The payer has not approved Permit2 for the token.
    #[error("permit2 allowance missing or too low")]
    Permit2AllowanceRequired,

    /// The permitted amount does not cover the required amount.
    #[error("permitted amount below required amount")]
    Permit2InsufficientAmount,

    /// The permitted token differs from the required asset.
    #[error("permitted token does not match required asset")]
    Permit2TokenMismatch,

    /// The Permit2 spender is not the x402 proxy.
    #[error("permit2 spender must be the x402Permit2Proxy")]
    InvalidPermit2Spender,

    /// The witness recipient differs from the required `payTo`.
    #[error("permit2 witness recipient does not match payTo")]
    InvalidPermit2Recipient,

    /// The Permit2 signature is invalid.
    #[error("invalid permit2 signature: {0}")]
    InvalidPermit2Signature(String),

    /// The settlement transaction reverted.
    #[error("settlement transaction failed: {0}")]
    TransactionFailed(String),

    /// The settlement transaction is in an unexpected state (e.g. a
    /// prerequisite deployment reverted).
    #[error("invalid transaction state: {0}")]
    InvalidTransactionState(String),

    /// RPC transport failure.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl ExactEvmError {
    /// Returns the stable kind string for this failure.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_exact_evm_payload",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::NetworkMismatch => "network_mismatch",
            Self::RecipientMismatch => "invalid_exact_evm_payload_recipient_mismatch",
            Self::InvalidSignature(_) => "invalid_exact_evm_payload_signature",
            Self::ValidBefore => "invalid_exact_evm_payload_authorization_valid_before",
            Self::ValidAfter => "invalid_exact_evm_payload_authorization_valid_after",
            Self::UndeployedSmartWallet => "invalid_exact_evm_payload_undeployed_smart_wallet",
            Self::InsufficientValue => "invalid_exact_evm_payload_authorization_value",
            Self::InsufficientFunds => "insufficient_funds",
            Self::Permit2DeadlineExpired => "permit2_deadline_expired",
            Self::Permit2AllowanceRequired => "permit2_allowance_required",
            Self::Permit2InsufficientAmount => "permit2_insufficient_amount",
            Self::Permit2TokenMismatch => "permit2_token_mismatch",
            Self::InvalidPermit2Spender => "invalid_permit2_spender",
            Self::InvalidPermit2Recipient => "invalid_permit2_recipient_mismatch",
            Self::InvalidPermit2Signature(_) => "invalid_permit2_signature",
            Self::TransactionFailed(_) => "transaction_failed",
            Self::InvalidTransactionState(_) => "invalid_transaction_state",
            Self::Rpc(_) => "unexpected_onchain_error",
        }
    }
}

impl From<TransportError> for ExactEvmError {
    fn from(e: TransportError) -> Self {
        Self::Rpc(e.to_string())
    }
}

impl From<alloy_contract::Error> for ExactEvmError {
    fn from(e: alloy_contract::Error) -> Self {
        match e {
            alloy_contract::Error::TransportError(e) => Self::Rpc(e.to_string()),
            other => Self::TransactionFailed(other.to_string()),
        }
    }
}

impl From<alloy_provider::PendingTransactionError> for ExactEvmError {
    fn from(e: alloy_provider::PendingTransactionError) -> Self {
        Self::InvalidTransactionState(e.to_string())
    }
}

impl From<super::signature::StructuredSignatureError> for ExactEvmError {
    fn from(e: super::signature::StructuredSignatureError) -> Self {
        Self::InvalidSignature(e.to_string())
    }
}

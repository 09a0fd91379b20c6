//! Hook result and context types.
//!
//! Lifecycle hooks are ordered lists of async functions, not inheritance.
//! A hook may return nothing (continue), an [`AbortResult`] (short-circuit
//! with a reason), or — for failure hooks — a recovery result that replaces
//! the error. The first terminal result wins.

use crate::proto::{
    PaymentPayload, PaymentPayloadV1, PaymentRequirements, PaymentRequirementsV1, SettleResponse,
    VerifyResponse,
};

/// Return from a before-hook to abort the operation.
#[derive(Debug, Clone)]
pub struct AbortResult {
    /// Human-readable reason for aborting.
    pub reason: String,
}

impl AbortResult {
    /// Creates a new abort result.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Return from a verify failure hook to recover with a substitute result.
#[derive(Debug, Clone)]
pub struct RecoveredVerifyResult {
    /// The recovered verify response.
    pub result: VerifyResponse,
}

/// Return from a settle failure hook to recover with a substitute result.
#[derive(Debug, Clone)]
pub struct RecoveredSettleResult {
    /// The recovered settle response.
    pub result: SettleResponse,
}

/// Version-agnostic view of a payment payload.
#[derive(Debug, Clone)]
pub enum PayloadView {
    /// V2 payload.
    V2(Box<PaymentPayload>),
    /// V1 payload.
    V1(Box<PaymentPayloadV1>),
}

impl PayloadView {
    /// Returns the payment scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        match self {
            Self::V2(p) => p.scheme(),
            Self::V1(p) => &p.scheme,
        }
    }

    /// Returns the network identifier.
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            Self::V2(p) => p.network(),
            Self::V1(p) => &p.network,
        }
    }

    /// Returns the resource URL the payment is for, when carried.
    #[must_use]
    pub fn resource_url(&self) -> Option<&str> {
        match self {
            Self::V2(p) => p.resource.as_ref().map(|r| r.url.as_str()),
            Self::V1(_) => None,
        }
    }
}

/// Version-agnostic view of payment requirements.
#[derive(Debug, Clone)]
pub enum RequirementsView {
    /// V2 requirements.
    V2(Box<PaymentRequirements>),
    /// V1 requirements.
    V1(Box<PaymentRequirementsV1>),
}

impl RequirementsView {
    /// Returns the scheme identifier.
    #[must_use]
    pub fn scheme(&self) -> &str {
        match self {
            Self::V2(r) => &r.scheme,
            Self::V1(r) => &r.scheme,
        }
    }

    /// Returns the network identifier.
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            Self::V2(r) => &r.network,
            Self::V1(r) => &r.network,
        }
    }

    /// Returns the payment amount as a string.
    #[must_use]
    pub fn amount(&self) -> &str {
        match self {
            Self::V2(r) => r.amount(),
            Self::V1(r) => r.amount(),
        }
    }
}

/// Context for verify hooks.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// The payment payload being verified.
    pub payment_payload: PayloadView,
    /// The requirements being verified against.
    pub requirements: RequirementsView,
}

/// Context passed to after-verify hooks.
#[derive(Debug, Clone)]
pub struct VerifyResultContext {
    /// The payment payload that was verified.
    pub payment_payload: PayloadView,
    /// The requirements verified against.
    pub requirements: RequirementsView,
    /// The verification result.
    pub result: VerifyResponse,
}

/// Context passed to verify failure hooks.
#[derive(Debug, Clone)]
pub struct VerifyFailureContext {
    /// The payment payload that failed verification.
    pub payment_payload: PayloadView,
    /// The requirements verified against.
    pub requirements: RequirementsView,
    /// Description of the error.
    pub error: String,
}

/// Context for settle hooks.
#[derive(Debug, Clone)]
pub struct SettleContext {
    /// The payment payload being settled.
    pub payment_payload: PayloadView,
    /// The requirements for settlement.
    pub requirements: RequirementsView,
}

/// Context passed to after-settle hooks.
#[derive(Debug, Clone)]
pub struct SettleResultContext {
    /// The payment payload that was settled.
    pub payment_payload: PayloadView,
    /// The requirements for settlement.
    pub requirements: RequirementsView,
    /// The settlement result.
    pub result: SettleResponse,
}

/// Context passed to settle failure hooks.
#[derive(Debug, Clone)]
pub struct SettleFailureContext {
    /// The payment payload that failed settlement.
    pub payment_payload: PayloadView,
    /// The requirements for settlement.
    pub requirements: RequirementsView,
    /// Description of the error.
    pub error: String,
}

//! The EVM "exact" payment scheme.
//!
//! - [`types`] — wire format payloads and EIP-712 typed-data structs
//! - [`client`] — buyer-side signing
//! - [`server`] — seller-side price parsing and requirement enhancement
//! - [`facilitator`] — verification and on-chain settlement

pub mod client;
pub mod facilitator;
pub mod server;
pub mod types;

pub use client::{ExactEvmClient, SignerLike};
pub use facilitator::ExactEvmFacilitator;
pub use server::ExactEvmServer;
pub use types::{
    AssetTransferMethod, Eip3009Authorization, Eip3009Payload, ExactPayload,
    PERMIT2_ADDRESS, PaymentRequirementsExtra, Permit2Authorization, Permit2Payload,
    Permit2TokenPermissions, Permit2Witness, SCHEME_EXACT, X402_PERMIT2_PROXY,
};

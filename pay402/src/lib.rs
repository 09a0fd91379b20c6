//! Core types and resource-server logic for the x402 payment protocol.
//!
//! The x402 protocol turns HTTP `402 Payment Required` into a payment
//! negotiation: a resource server advertises payment requirements, a client
//! answers with a signed authorization, and a *facilitator* verifies and
//! settles the payment on-chain. This crate is blockchain-agnostic; concrete
//! schemes (EVM, …) and transports (HTTP) live in sibling crates.
//!
//! # Modules
//!
//! - [`proto`] - Wire format types for protocol versions 1 and 2
//! - [`chain`] - CAIP-2 chain identifiers
//! - [`scheme`] - Pluggable payment scheme traits
//! - [`server`] - The transport-agnostic resource server
//! - [`client`] - Requirement selection and payload creation
//! - [`facilitator`] - In-process facilitator backed by scheme handlers
//! - [`extension`] - Named protocol extensions (e.g. Sign-In-With-X)
//! - [`hooks`] - Lifecycle hook result and context types
//! - [`networks`] - V1 network-name registry
//! - [`encoding`] / [`timestamp`] - Base64 and unix-timestamp wire utilities

pub mod chain;
pub mod client;
pub mod config;
pub mod encoding;
pub mod error;
pub mod extension;
pub mod facilitator;
pub mod hooks;
pub mod networks;
pub mod proto;
pub mod scheme;
pub mod server;
pub mod timestamp;

pub use proto::{
    PaymentPayload, PaymentPayloadV1, PaymentRequired, PaymentRequiredV1, PaymentRequirements,
    PaymentRequirementsV1, ResourceInfo, SettleResponse, SupportedKind, SupportedResponse,
    VerifyResponse,
};

//! Sign-In-With-X (CAIP-122) extension for the x402 protocol.
//!
//! A wallet that has already paid for a resource can re-authenticate
//! without paying again by signing a CAIP-122 message — the
//! chain-agnostic generalization of EIP-4361 "Sign-In With Ethereum".
//! The extension splices into the payment lifecycle at three points:
//!
//! - **402 enrichment** ([`SiwxExtension`]): each challenge regenerates a
//!   fresh nonce and `issuedAt`, derives the expected `domain` from the
//!   resource URL, and advertises the supported chains.
//! - **Protected-request hook**: an incoming `SIGN-IN-WITH-X` header is
//!   validated (domain, URI, time bounds, nonce freshness, signature) and
//!   checked against the storage's paid set; success grants access and
//!   burns the nonce. Any failure is logged and falls through to the
//!   normal payment flow.
//! - **Settlement hook**: after a successful settlement, the payer is
//!   recorded as having paid for the resource path.
//!
//! Verification supports `eip155:*` wallets (EIP-191 personal messages)
//! and `solana:*` wallets (Ed25519 over the raw UTF-8 message bytes).

pub mod client;
pub mod extension;
pub mod message;
pub mod payload;
pub mod storage;
pub mod verify;

pub use client::{EvmSiwxSigner, SiwxSigner, SolanaSiwxSigner, siwx_payment_required_hook};
pub use extension::{SiwxConfig, SiwxExtension};
pub use payload::{SIGN_IN_WITH_X_HEADER, SIWX_EXTENSION_KEY, SiwxError, SiwxPayload};
pub use storage::{InMemorySiwxStorage, NonceStore, SiwxStorage};

//! EVM "exact" payment scheme for the x402 protocol.
//!
//! Implements the `exact` scheme on `eip155:*` networks with two on-chain
//! settlement paths:
//!
//! - **EIP-3009** `transferWithAuthorization` — gasless transfers for
//!   tokens that implement it (USDC and friends); the recommended default.
//! - **Permit2** via the `x402Permit2Proxy` — a universal fallback for any
//!   ERC-20. The proxy is the sole approved spender and enforces that
//!   funds may only move to the witness-bound recipient.
//!
//! The crate provides all three protocol roles: [`exact::ExactEvmClient`]
//! signs payments, [`exact::ExactEvmServer`] parses prices and enhances
//! requirements, and [`exact::ExactEvmFacilitator`] verifies and settles.

pub mod chain;
pub mod exact;
pub mod networks;

pub use chain::{Eip155ChainReference, TokenAmount};
pub use exact::{ExactEvmClient, ExactEvmFacilitator, ExactEvmServer};

//! HTTP transport layer for the x402 payment protocol.
//!
//! Adds the wire encoding on top of [`pay402`]: payment headers, route
//! matching, the deferred-settlement resource server, a tower layer that
//! consumes it, the facilitator HTTP client, and the client-side retry
//! middleware for `reqwest`.
//!
//! # Server side
//!
//! [`server::HttpResourceServer`] matches requests against a route table,
//! decodes payment headers, and verifies payments — but never settles.
//! The outer integration (the provided [`layer::PaymentGateLayer`], or a
//! hand-rolled one) calls [`server::HttpResourceServer::process_settlement`]
//! only after the protected handler succeeded, so a customer is never
//! charged for a failed response.
//!
//! # Client side
//!
//! [`client::X402HttpClient`] is a `reqwest` middleware driving the
//! 402 → pay → 200 round-trip, with hooks that let extensions such as
//! Sign-In-With-X answer a 402 without paying.

pub mod client;
pub mod constants;
pub mod error;
pub mod facilitator;
pub mod headers;
pub mod layer;
pub mod paywall;
pub mod server;
pub mod types;

pub use client::X402HttpClient;
pub use facilitator::HttpFacilitatorClient;
pub use layer::PaymentGateLayer;
pub use server::HttpResourceServer;

//! Storage abstraction for the SIWX extension.
//!
//! Two required operations (`has_paid`, `record_payment`) and an optional
//! nonce-tracking pair. The pair is all-or-nothing by construction:
//! [`SiwxStorage::nonce_store`] hands out a [`NonceStore`] whose two
//! methods are both required, so a storage cannot implement
//! `has_used_nonce` without `record_nonce` or vice versa.
//!
//! [`InMemorySiwxStorage`] is the reference implementation: two concurrent
//! maps with per-entry guards and expiry sweeps on access. Anything
//! durable (Redis, SQL) implements the same traits externally.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use pay402::scheme::{BoxFuture, SchemeError};

/// Optional replay-nonce tracking.
///
/// A nonce must be recorded with a TTL at least as long as the challenge
/// expiry window, so a nonce can never fall out of the replay cache while
/// its challenge is still live.
pub trait NonceStore: Send + Sync {
    /// Returns whether a nonce was already used.
    fn has_used_nonce<'a>(&'a self, nonce: &'a str) -> BoxFuture<'a, Result<bool, SchemeError>>;

    /// Records a nonce as used for at least `ttl`.
    fn record_nonce<'a>(
        &'a self,
        nonce: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), SchemeError>>;
}

/// Storage consulted by the SIWX extension.
pub trait SiwxStorage: Send + Sync {
    /// Returns whether `address` has paid for `resource`.
    ///
    /// Addresses are stored lowercase.
    fn has_paid<'a>(
        &'a self,
        resource: &'a str,
        address: &'a str,
    ) -> BoxFuture<'a, Result<bool, SchemeError>>;

    /// Records that `address` paid for `resource`.
    fn record_payment<'a>(
        &'a self,
        resource: &'a str,
        address: &'a str,
    ) -> BoxFuture<'a, Result<(), SchemeError>>;

    /// Returns the nonce store when this storage tracks nonces.
    ///
    /// `None` disables replay defense (a fresh signature is still bounded
    /// by `maxAge`).
    fn nonce_store(&self) -> Option<&dyn NonceStore> {
        None
    }
}

/// In-memory reference storage.
///
/// Safe under concurrent read/write; expired nonces are swept on access.
#[derive(Debug, Default)]
pub struct InMemorySiwxStorage {
    paid_addresses: DashMap<String, HashSet<String>>,
    used_nonces: DashMap<String, u64>,
}

impl InMemorySiwxStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Drops every expired nonce entry.
    fn sweep_nonces(&self) {
        let now = Self::now_ms();
        self.used_nonces.retain(|_, expiry| *expiry > now);
    }
}

impl SiwxStorage for InMemorySiwxStorage {
    fn has_paid<'a>(
        &'a self,
        resource: &'a str,
        address: &'a str,
    ) -> BoxFuture<'a, Result<bool, SchemeError>> {
        Box::pin(async move {
            let paid = self
                .paid_addresses
                .get(resource)
                .is_some_and(|set| set.contains(&address.to_lowercase()));
            Ok(paid)
        })
    }

    fn record_payment<'a>(
        &'a self,
        resource: &'a str,
        address: &'a str,
    ) -> BoxFuture<'a, Result<(), SchemeError>> {
        Box::pin(async move {
            self.paid_addresses
                .entry(resource.to_owned())
                .or_default()
                .insert(address.to_lowercase());
            Ok(())
        })
    }

    fn nonce_store(&self) -> Option<&dyn NonceStore> {
        Some(self)
    }
}

impl NonceStore for InMemorySiwxStorage {
    fn has_used_nonce<'a>(&'a self, nonce: &'a str) -> BoxFuture<'a, Result<bool, SchemeError>> {
        Box::pin(async move {
            self.sweep_nonces();
            Ok(self.used_nonces.contains_key(nonce))
        })
    }

    fn record_nonce<'a>(
        &'a self,
        nonce: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), SchemeError>> {
        Box::pin(async move {
            self.sweep_nonces();
            let expiry = Self::now_ms().saturating_add(
                u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            );
            self.used_nonces.insert(nonce.to_owned(), expiry);
            Ok(())
        })
    }
}

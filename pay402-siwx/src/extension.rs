//! Server-side SIWX extension.
//!
//! [`SiwxExtension`] plugs into the resource server in three places: it
//! enriches the `sign-in-with-x` declaration on every 402 (fresh nonce and
//! timestamps), validates incoming `SIGN-IN-WITH-X` headers as a
//! protected-request hook, and records payers through an after-settle
//! hook.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use pay402::extension::ResourceServerExtension;
use pay402::proto::{PaymentRequired, SettleResponse};
use pay402::scheme::SchemeError;
use pay402::server::AfterSettleHook;
use pay402_http::server::{ProtectedRequestHook, ProtectedRequestOutcome};
use pay402_http::types::RequestContext;
use rand::RngExt;
use rand::rng;
use serde_json::{Map, Value, json};
use url::Url;

use crate::payload::{SIGN_IN_WITH_X_HEADER, SIWX_EXTENSION_KEY, SiwxError, SiwxPayload};
use crate::storage::SiwxStorage;
use crate::verify::verify_signature;

/// Configuration for the SIWX extension.
#[derive(Debug, Clone)]
pub struct SiwxConfig {
    /// CAIP-2 networks advertised in `supportedChains`.
    pub networks: Vec<String>,

    /// Fixed `domain` for challenges; derived from the resource URL host
    /// when unset.
    pub domain: Option<String>,

    /// Optional human-readable statement included in challenges.
    pub statement: Option<String>,

    /// Challenge lifetime. When set, each challenge carries
    /// `expirationTime = issuedAt + expiration_seconds`; when unset the
    /// challenge is non-expiring (still bounded by `max_age_seconds`).
    pub expiration_seconds: Option<u64>,

    /// Maximum accepted age of a signed message (default 300 s).
    pub max_age_seconds: u64,

    /// Minimum replay-cache TTL for used nonces (default 600 s).
    pub nonce_ttl_seconds: u64,
}

impl Default for SiwxConfig {
    fn default() -> Self {
        Self {
            networks: Vec::new(),
            domain: None,
            statement: None,
            expiration_seconds: None,
            max_age_seconds: 300,
            nonce_ttl_seconds: 600,
        }
    }
}

impl SiwxConfig {
    /// Creates a config advertising the given networks.
    #[must_use]
    pub fn new(networks: Vec<String>) -> Self {
        Self {
            networks,
            ..Self::default()
        }
    }
}

/// The Sign-In-With-X resource server extension.
pub struct SiwxExtension {
    config: SiwxConfig,
    storage: Arc<dyn SiwxStorage>,
}

impl std::fmt::Debug for SiwxExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiwxExtension")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SiwxExtension {
    /// Creates the extension over a storage backend.
    #[must_use]
    pub fn new(config: SiwxConfig, storage: Arc<dyn SiwxStorage>) -> Self {
        Self { config, storage }
    }

    /// Returns the protected-request hook that grants access to wallets
    /// that already paid.
    ///
    /// Any validation failure emits a tracing event and falls through to
    /// the payment flow.
    #[must_use]
    pub fn protected_request_hook(self: Arc<Self>) -> ProtectedRequestHook {
        let ext = self;
        Box::new(move |ctx| {
            let ext = Arc::clone(&ext);
            Box::pin(async move {
                match ext.authenticate(ctx).await {
                    Ok(Some(address)) => {
                        tracing::debug!(address = %address, path = %ctx.path, "sign-in accepted, granting access");
                        Some(ProtectedRequestOutcome::GrantAccess)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        tracing::debug!(error = %e, path = %ctx.path, "sign-in rejected, falling through to payment");
                        None
                    }
                }
            })
        })
    }

    /// Returns the after-settle hook recording the payer for the resource
    /// path.
    #[must_use]
    pub fn settlement_hook(self: Arc<Self>) -> AfterSettleHook {
        let ext = self;
        Box::new(move |ctx| {
            let ext = Arc::clone(&ext);
            let payer = ctx.result.payer.clone();
            let resource_url = ctx.payment_payload.resource_url().map(ToOwned::to_owned);
            Box::pin(async move {
                let (Some(payer), Some(url)) = (payer, resource_url) else {
                    return;
                };
                let path = Url::parse(&url)
                    .map(|u| u.path().to_owned())
                    .unwrap_or(url);
                if let Err(e) = ext.storage.record_payment(&path, &payer.to_lowercase()).await {
                    tracing::warn!(error = %e, path = %path, "failed to record payment for sign-in");
                }
            })
        })
    }

    /// Full validation chain for an incoming request.
    ///
    /// `Ok(Some(address))` grants access; `Ok(None)` means no header or no
    /// recorded payment; `Err` is a validation failure.
    async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<String>, SiwxError> {
        let Some(value) = ctx.headers.get(SIGN_IN_WITH_X_HEADER) else {
            return Ok(None);
        };
        let value = value
            .to_str()
            .map_err(|e| SiwxError::MalformedHeader(e.to_string()))?;
        let payload = SiwxPayload::decode_header(value)?;
        payload.validate_shape()?;

        let resource_url = Url::parse(&ctx.url)
            .map_err(|e| SiwxError::InvalidPayload(format!("unparseable resource url: {e}")))?;
        self.assert_domain(&payload, &resource_url)?;
        self.assert_time_bounds(&payload)?;

        if let Some(nonces) = self.storage.nonce_store() {
            let used = nonces
                .has_used_nonce(&payload.nonce)
                .await
                .map_err(|e| SiwxError::Storage(e.to_string()))?;
            if used {
                return Err(SiwxError::NonceReused);
            }
        }

        verify_signature(&payload)?;

        let address = payload.address.to_lowercase();
        let paid = self
            .storage
            .has_paid(&ctx.path, &address)
            .await
            .map_err(|e| SiwxError::Storage(e.to_string()))?;
        if !paid {
            tracing::debug!(address = %address, path = %ctx.path, "valid sign-in but no recorded payment");
            return Ok(None);
        }

        if let Some(nonces) = self.storage.nonce_store() {
            let ttl = Duration::from_secs(
                self.config
                    .nonce_ttl_seconds
                    .max(self.config.expiration_seconds.unwrap_or(0)),
            );
            nonces
                .record_nonce(&payload.nonce, ttl)
                .await
                .map_err(|e| SiwxError::Storage(e.to_string()))?;
        }

        Ok(Some(address))
    }

    /// `domain` must equal the resource host (with or without port);
    /// `uri` must start with the resource origin.
    fn assert_domain(&self, payload: &SiwxPayload, resource_url: &Url) -> Result<(), SiwxError> {
        let host = resource_url
            .host_str()
            .ok_or_else(|| SiwxError::InvalidPayload("resource url has no host".into()))?;
        let host_with_port = resource_url
            .port()
            .map(|port| format!("{host}:{port}"));

        let domain_matches = payload.domain == host
            || host_with_port.as_deref() == Some(payload.domain.as_str());
        if !domain_matches {
            return Err(SiwxError::DomainMismatch);
        }

        let origin = resource_url.origin().ascii_serialization();
        if !payload.uri.starts_with(&origin) {
            return Err(SiwxError::UriMismatch);
        }

        Ok(())
    }

    fn assert_time_bounds(&self, payload: &SiwxPayload) -> Result<(), SiwxError> {
        let now = Utc::now();

        let issued_at = parse_timestamp(&payload.issued_at)?;
        if issued_at > now {
            return Err(SiwxError::IssuedInFuture);
        }
        let max_age = TimeDelta::seconds(i64::try_from(self.config.max_age_seconds).unwrap_or(i64::MAX));
        if now - issued_at > max_age {
            return Err(SiwxError::TooOld);
        }

        if let Some(expiration_time) = &payload.expiration_time {
            let expiration = parse_timestamp(expiration_time)?;
            if expiration <= now {
                return Err(SiwxError::Expired);
            }
        }
        if let Some(not_before) = &payload.not_before {
            let not_before = parse_timestamp(not_before)?;
            if not_before > now {
                return Err(SiwxError::NotYetValid);
            }
        }

        Ok(())
    }

    fn signature_scheme_for(network: &str) -> Option<&'static str> {
        match network.split(':').next() {
            Some("eip155") => Some("eip191"),
            Some("solana") => Some("ed25519"),
            _ => None,
        }
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SiwxError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SiwxError::InvalidTimestamp(format!("{value}: {e}")))
}

impl ResourceServerExtension for SiwxExtension {
    fn key(&self) -> &str {
        SIWX_EXTENSION_KEY
    }

    /// Regenerates the time-based challenge fields on every 402.
    fn enrich_payment_required_response(
        &self,
        declaration: &Value,
        response: &PaymentRequired,
    ) -> Result<Value, SchemeError> {
        let mut declaration: Map<String, Value> =
            declaration.as_object().cloned().unwrap_or_default();

        declaration.insert("version".into(), json!("1"));

        let domain = self.config.domain.clone().or_else(|| {
            response
                .resource
                .as_ref()
                .and_then(|resource| Url::parse(&resource.url).ok())
                .and_then(|url| url.host_str().map(ToOwned::to_owned))
        });
        if let Some(domain) = domain {
            declaration.insert("domain".into(), json!(domain));
        }

        let nonce_bytes: [u8; 16] = rng().random();
        declaration.insert("nonce".into(), json!(hex::encode(nonce_bytes)));

        let now = Utc::now();
        declaration.insert(
            "issuedAt".into(),
            json!(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        match self.config.expiration_seconds {
            Some(secs) => {
                let expiration = now + TimeDelta::seconds(i64::try_from(secs).unwrap_or(i64::MAX));
                declaration.insert(
                    "expirationTime".into(),
                    json!(expiration.to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
            }
            // Non-expiring challenge: no expirationTime field at all.
            None => {
                declaration.remove("expirationTime");
            }
        }

        if let Some(statement) = &self.config.statement {
            declaration
                .entry("statement")
                .or_insert_with(|| json!(statement));
        }

        let supported_chains: Vec<Value> = self
            .config
            .networks
            .iter()
            .filter_map(|network| {
                Self::signature_scheme_for(network).map(|scheme| {
                    json!({ "chainId": network, "signatureScheme": scheme })
                })
            })
            .collect();
        declaration.insert("supportedChains".into(), Value::Array(supported_chains));

        Ok(Value::Object(declaration))
    }

    fn enrich_settlement_response(
        &self,
        declaration: &Value,
        _response: &SettleResponse,
    ) -> Result<Value, SchemeError> {
        // Settlement recording happens in the after-settle hook; the wire
        // slot just reports that sign-in is available from now on.
        let mut slot = declaration.as_object().cloned().unwrap_or_default();
        slot.insert("signInAvailable".into(), json!(true));
        Ok(Value::Object(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemorySiwxStorage;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use http::HeaderMap;
    use pay402::proto::ResourceInfo;

    fn extension(storage: Arc<InMemorySiwxStorage>) -> Arc<SiwxExtension> {
        Arc::new(SiwxExtension::new(
            SiwxConfig {
                networks: vec!["eip155:8453".into(), "solana:mainnet".into()],
                expiration_seconds: Some(300),
                ..SiwxConfig::default()
            },
            storage,
        ))
    }

    fn signed_payload(signer: &PrivateKeySigner, nonce: &str) -> SiwxPayload {
        let mut payload = SiwxPayload {
            domain: "api.example.com".into(),
            address: format!("{:#x}", signer.address()),
            statement: None,
            uri: "https://api.example.com/weather".into(),
            version: "1".into(),
            chain_id: "eip155:8453".into(),
            nonce: nonce.into(),
            issued_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            expiration_time: Some(
                (Utc::now() + TimeDelta::seconds(300))
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            not_before: None,
            request_id: None,
            resources: None,
            signature_scheme: Some("eip191".into()),
            signature: String::new(),
        };
        let message = crate::message::build_message(&payload);
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        payload.signature = format!("0x{}", hex::encode(signature.as_bytes()));
        payload
    }

    fn request_with(payload: &SiwxPayload) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::HeaderName::from_bytes(SIGN_IN_WITH_X_HEADER.as_bytes()).unwrap(),
            payload.encode_header().unwrap().parse().unwrap(),
        );
        RequestContext {
            method: "GET".into(),
            path: "/weather".into(),
            query: None,
            headers,
            url: "https://api.example.com/weather".into(),
        }
    }

    #[tokio::test]
    async fn paid_wallet_is_granted_access_once_per_nonce() {
        let storage = Arc::new(InMemorySiwxStorage::new());
        let signer = PrivateKeySigner::random();
        storage
            .record_payment("/weather", &format!("{:#x}", signer.address()))
            .await
            .unwrap();

        let ext = extension(Arc::clone(&storage));
        let hook = ext.protected_request_hook();

        let payload = signed_payload(&signer, "nonce-one");
        let ctx = request_with(&payload);

        // First use grants access.
        let outcome = hook(&ctx).await;
        assert!(matches!(outcome, Some(ProtectedRequestOutcome::GrantAccess)));

        // Replaying the exact same header is rejected (nonce burned).
        let outcome = hook(&ctx).await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn unpaid_wallet_falls_through() {
        let storage = Arc::new(InMemorySiwxStorage::new());
        let ext = extension(storage);
        let hook = ext.protected_request_hook();

        let signer = PrivateKeySigner::random();
        let payload = signed_payload(&signer, "nonce-two");
        let ctx = request_with(&payload);

        assert!(hook(&ctx).await.is_none());
    }

    #[tokio::test]
    async fn future_issued_at_is_rejected() {
        let storage = Arc::new(InMemorySiwxStorage::new());
        let signer = PrivateKeySigner::random();
        storage
            .record_payment("/weather", &format!("{:#x}", signer.address()))
            .await
            .unwrap();
        let ext = extension(storage);

        let mut payload = signed_payload(&signer, "nonce-three");
        payload.issued_at = (Utc::now() + TimeDelta::seconds(60))
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        // Re-sign over the modified message.
        payload.signature = String::new();
        let message = crate::message::build_message(&payload);
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        payload.signature = format!("0x{}", hex::encode(signature.as_bytes()));

        let hook = ext.protected_request_hook();
        assert!(hook(&request_with(&payload)).await.is_none());
    }

    #[tokio::test]
    async fn expired_message_is_rejected() {
        let storage = Arc::new(InMemorySiwxStorage::new());
        let signer = PrivateKeySigner::random();
        storage
            .record_payment("/weather", &format!("{:#x}", signer.address()))
            .await
            .unwrap();
        let ext = extension(storage);

        let mut payload = signed_payload(&signer, "nonce-four");
        payload.expiration_time = Some(
            (Utc::now() - TimeDelta::seconds(1)).to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        payload.signature = String::new();
        let message = crate::message::build_message(&payload);
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        payload.signature = format!("0x{}", hex::encode(signature.as_bytes()));

        let hook = ext.protected_request_hook();
        assert!(hook(&request_with(&payload)).await.is_none());
    }

    #[tokio::test]
    async fn wrong_domain_is_rejected() {
        let storage = Arc::new(InMemorySiwxStorage::new());
        let signer = PrivateKeySigner::random();
        storage
            .record_payment("/weather", &format!("{:#x}", signer.address()))
            .await
            .unwrap();
        let ext = extension(storage);

        let mut payload = signed_payload(&signer, "nonce-five");
        payload.domain = "evil.example.com".into();
        payload.signature = String::new();
        let message = crate::message::build_message(&payload);
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        payload.signature = format!("0x{}", hex::encode(signature.as_bytes()));

        let hook = ext.protected_request_hook();
        assert!(hook(&request_with(&payload)).await.is_none());
    }

    #[test]
    fn enrichment_regenerates_challenge_fields() {
        let storage = Arc::new(InMemorySiwxStorage::new());
        let ext = extension(storage);

        let response = PaymentRequired {
            x402_version: 2,
            error: None,
            resource: Some(ResourceInfo::new("https://api.example.com/weather")),
            accepts: Vec::new(),
            extensions: None,
        };

        let first = ext
            .enrich_payment_required_response(&json!({}), &response)
            .unwrap();
        let second = ext
            .enrich_payment_required_response(&json!({}), &response)
            .unwrap();

        assert_eq!(first["domain"], "api.example.com");
        assert_eq!(first["version"], "1");
        assert_eq!(first["nonce"].as_str().unwrap().len(), 32);
        assert_ne!(first["nonce"], second["nonce"]);
        assert!(first["expirationTime"].is_string());

        let chains = first["supportedChains"].as_array().unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0]["signatureScheme"], "eip191");
        assert_eq!(chains[1]["signatureScheme"], "ed25519");
    }

    #[test]
    fn non_expiring_challenge_omits_expiration() {
        let storage = Arc::new(InMemorySiwxStorage::new());
        let ext = Arc::new(SiwxExtension::new(
            SiwxConfig::new(vec!["eip155:8453".into()]),
            storage,
        ));

        let response = PaymentRequired {
            x402_version: 2,
            error: None,
            resource: Some(ResourceInfo::new("https://api.example.com/weather")),
            accepts: Vec::new(),
            extensions: None,
        };
        let declaration = ext
            .enrich_payment_required_response(&json!({}), &response)
            .unwrap();
        assert!(declaration.get("expirationTime").is_none());
    }
}

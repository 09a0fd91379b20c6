//! HTTP client for a remote x402 facilitator.
//!
//! [`HttpFacilitatorClient`] speaks the facilitator wire protocol —
//! `POST ./verify`, `POST ./settle`, `GET ./supported` — and implements
//! [`FacilitatorClient`] so an [`pay402::server::X402ResourceServer`] can
//! route through it. Calls are bounded by a configurable timeout (default
//! 30 s); a timed-out call surfaces the stable `facilitator_timeout` kind.

use std::time::Duration;

use http::{HeaderMap, StatusCode};
use pay402::error::kind;
use pay402::proto::v1::{SettleRequestV1, VerifyRequestV1};
use pay402::proto::v2::{SettleRequest, VerifyRequest};
use pay402::proto::{
    PaymentPayload, PaymentPayloadV1, PaymentRequirements, PaymentRequirementsV1, SettleResponse,
    SupportedResponse, VerifyResponse,
};
use pay402::scheme::{BoxFuture, SchemeError};
use pay402::server::FacilitatorClient;
use reqwest::Client;
use tokio::sync::RwLock;
use url::Url;

use crate::constants::DEFAULT_FACILITATOR_TIMEOUT_SECS;

/// TTL cache state for the `/supported` response.
#[derive(Clone, Debug)]
struct SupportedCacheState {
    response: SupportedResponse,
    expires_at: std::time::Instant,
}

/// An encapsulated TTL cache for the `/supported` endpoint response.
///
/// Each clone has an independent cache state.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    state: RwLock<Option<SupportedCacheState>>,
}

impl SupportedCache {
    /// Creates a new cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Returns the cached response if still fresh.
    pub async fn get(&self) -> Option<SupportedResponse> {
        let guard = self.state.read().await;
        let cache = guard.as_ref()?;
        (std::time::Instant::now() < cache.expires_at).then(|| cache.response.clone())
    }

    /// Stores a response with the configured TTL.
    pub async fn set(&self, response: SupportedResponse) {
        let mut guard = self.state.write().await;
        *guard = Some(SupportedCacheState {
            response,
            expires_at: std::time::Instant::now() + self.ttl,
        });
    }

    /// Clears the cache.
    pub async fn clear(&self) {
        let mut guard = self.state.write().await;
        *guard = None;
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// Errors from interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// URL construction failed.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The facilitator call exceeded its timeout.
    #[error("facilitator_timeout: {context}")]
    Timeout {
        /// Human-readable context.
        context: &'static str,
    },

    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// JSON deserialization of the response failed.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
}

impl FacilitatorClientError {
    /// Returns the stable failure kind for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => kind::FACILITATOR_TIMEOUT,
            _ => kind::NO_FACILITATOR_SUPPORT,
        }
    }
}

/// A client for a remote x402 facilitator.
#[derive(Clone, Debug)]
pub struct HttpFacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Duration,
    supported_cache: SupportedCache,
}

impl HttpFacilitatorClient {
    /// Default TTL for caching the `/supported` response (10 minutes).
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(600);

    /// Constructs a client from a facilitator base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError::UrlParse`] if endpoint URL
    /// construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url = base_url
            .join("./verify")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "Failed to construct ./verify URL",
                source: e,
            })?;
        let settle_url = base_url
            .join("./settle")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "Failed to construct ./settle URL",
                source: e,
            })?;
        let supported_url =
            base_url
                .join("./supported")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./supported URL",
                    source: e,
                })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            supported_url,
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(DEFAULT_FACILITATOR_TIMEOUT_SECS),
            supported_cache: SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL),
        })
    }

    /// Returns the facilitator base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Attaches custom headers to every request (e.g. auth tokens).
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the TTL for the `/supported` cache.
    #[must_use]
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache = SupportedCache::new(ttl);
        self
    }

    /// Disables `/supported` caching.
    #[must_use]
    pub fn without_supported_cache(self) -> Self {
        self.with_supported_cache_ttl(Duration::ZERO)
    }

    /// Sends `POST ./verify` for a V2 payment.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn verify_v2(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        let request = VerifyRequest {
            x402_version: 2,
            payment_payload: payload.clone(),
            payment_requirements: requirements.clone(),
        };
        self.post_json(&self.verify_url, "POST /verify", &request)
            .await
    }

    /// Sends `POST ./settle` for a V2 payment.
    ///
    /// Callers must not retry a settle on unknown failure; the on-chain
    /// transaction may have landed.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn settle_v2(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        let request = SettleRequest {
            x402_version: 2,
            payment_payload: payload.clone(),
            payment_requirements: requirements.clone(),
        };
        self.post_json(&self.settle_url, "POST /settle", &request)
            .await
    }

    /// Sends `GET ./supported`, with TTL caching.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        if let Some(response) = self.supported_cache.get().await {
            return Ok(response);
        }

        let response = self.supported_inner().await?;
        self.supported_cache.set(response.clone()).await;
        Ok(response)
    }

    /// Sends `GET ./supported`, bypassing the cache.
    async fn supported_inner(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        let context = "GET /supported";
        let mut req = self.client.get(self.supported_url.clone());
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        req = req.timeout(self.timeout);
        let http_response = req.send().await.map_err(|e| map_send_error(context, e))?;
        Self::decode_response(context, http_response).await
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        req = req.timeout(self.timeout);

        let http_response = req.send().await.map_err(|e| map_send_error(context, e))?;
        Self::decode_response(context, http_response).await
    }

    async fn decode_response<R>(
        context: &'static str,
        http_response: reqwest::Response,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response.text().await.unwrap_or_default();
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

fn map_send_error(context: &'static str, error: reqwest::Error) -> FacilitatorClientError {
    if error.is_timeout() {
        FacilitatorClientError::Timeout { context }
    } else {
        FacilitatorClientError::Http {
            context,
            source: error,
        }
    }
}

impl TryFrom<&str> for HttpFacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize to a single trailing slash so ./verify joins correctly.
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

impl FacilitatorClient for HttpFacilitatorClient {
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        Box::pin(async move {
            self.verify_v2(payload, requirements)
                .await
                .map_err(Into::into)
        })
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        Box::pin(async move {
            self.settle_v2(payload, requirements)
                .await
                .map_err(Into::into)
        })
    }

    fn verify_v1<'a>(
        &'a self,
        payload: &'a PaymentPayloadV1,
        requirements: &'a PaymentRequirementsV1,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        Box::pin(async move {
            let request = VerifyRequestV1 {
                x402_version: 1,
                payment_payload: payload.clone(),
                payment_requirements: requirements.clone(),
            };
            self.post_json(&self.verify_url, "POST /verify", &request)
                .await
                .map_err(Into::into)
        })
    }

    fn settle_v1<'a>(
        &'a self,
        payload: &'a PaymentPayloadV1,
        requirements: &'a PaymentRequirementsV1,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        Box::pin(async move {
            let request = SettleRequestV1 {
                x402_version: 1,
                payment_payload: payload.clone(),
                payment_requirements: requirements.clone(),
            };
            self.post_json(&self.settle_url, "POST /settle", &request)
                .await
                .map_err(Into::into)
        })
    }

    fn get_supported(&self) -> BoxFuture<'_, Result<SupportedResponse, SchemeError>> {
        Box::pin(async move { self.supported().await.map_err(Into::into) })
    }
}

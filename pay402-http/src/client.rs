//! Client-side x402 payment handling for `reqwest`.
//!
//! [`X402HttpClient`] is a `reqwest` middleware driving the
//! 402 → pay → 200 round-trip: it detects a `402 Payment Required`
//! response, decodes the challenge (header first, then JSON body for V1
//! compatibility), consults `on_payment_required` hooks — which may answer
//! the challenge without paying, e.g. with a `SIGN-IN-WITH-X` header —
//! and otherwise signs a payment through the wrapped
//! [`X402Client`] and retries once with the payment header attached.
//!
//! Bodies must be cloneable so the retry carries the same body. A request
//! that already carried a payment header is never retried
//! (`payment_already_attempted`), which keeps a misbehaving server from
//! draining a wallet in a retry loop.

use std::sync::Arc;

use http::{Extensions, HeaderMap};
use pay402::client::X402Client;
use pay402::proto::helpers::{PaymentRequiredEnum, parse_payment_required_bytes};
use pay402::scheme::BoxFuture;
use reqwest::{Request, Response, StatusCode};
use reqwest_middleware as rqm;

use crate::constants::{
    ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED_PAYMENT_HEADERS, PAYMENT_REQUIRED_HEADER,
    PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER,
};
use crate::error::HttpError;
use crate::headers::{decode_payment_required, encode_payment_signature, encode_x_payment};

/// Hook consulted when a 402 arrives, before any payment is signed.
///
/// The first hook returning a header set wins: its headers are attached
/// and the request retried once. If that retry still answers 402 the flow
/// continues to payment against the fresh challenge.
pub type PaymentRequiredHook = Box<
    dyn for<'a> Fn(&'a PaymentRequiredEnum) -> BoxFuture<'a, Option<HeaderMap>> + Send + Sync,
>;

/// `reqwest` middleware implementing the x402 client retry loop.
pub struct X402HttpClient {
    client: Arc<X402Client>,
    on_payment_required: Vec<PaymentRequiredHook>,
}

impl std::fmt::Debug for X402HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402HttpClient")
            .field("hooks_count", &self.on_payment_required.len())
            .finish_non_exhaustive()
    }
}

impl X402HttpClient {
    /// Wraps an [`X402Client`] for use as request middleware.
    #[must_use]
    pub fn new(client: Arc<X402Client>) -> Self {
        Self {
            client,
            on_payment_required: Vec::new(),
        }
    }

    /// Registers an `on_payment_required` hook. Hooks run in registration
    /// order.
    #[must_use]
    pub fn on_payment_required(mut self, hook: PaymentRequiredHook) -> Self {
        self.on_payment_required.push(hook);
        self
    }

    /// Builds the payment header for a decoded challenge.
    async fn payment_header(
        &self,
        payment_required: &PaymentRequiredEnum,
    ) -> Result<(&'static str, String), HttpError> {
        match payment_required {
            PaymentRequiredEnum::V2(required) => {
                let payload = self
                    .client
                    .create_payment_payload(required)
                    .await
                    .map_err(|e| HttpError::PaymentCreation(e.to_string()))?;
                Ok((PAYMENT_SIGNATURE_HEADER, encode_payment_signature(&payload)?))
            }
            PaymentRequiredEnum::V1(required) => {
                let payload = self
                    .client
                    .create_payment_payload_v1(required)
                    .await
                    .map_err(|e| HttpError::PaymentCreation(e.to_string()))?;
                Ok((X_PAYMENT_HEADER, encode_x_payment(&payload)?))
            }
        }
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for X402HttpClient {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let already_paid = req.headers().contains_key(PAYMENT_SIGNATURE_HEADER)
            || req.headers().contains_key(X_PAYMENT_HEADER);

        // Clone before the first send so retries carry the same body.
        let hook_retry = req.try_clone();
        let payment_retry = req.try_clone();

        let response = next.clone().run(req, extensions).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        if already_paid {
            return Err(rqm::Error::middleware(HttpError::PaymentAlreadyAttempted));
        }

        tracing::debug!(url = %response.url(), "received 402, negotiating payment");

        let mut payment_required = parse_payment_required(response).await.ok_or_else(|| {
            rqm::Error::middleware(HttpError::InvalidPaymentRequired(
                "no decodable PAYMENT-REQUIRED header or body".into(),
            ))
        })?;

        // Hook phase: the first hook producing headers gets one retry
        // before any payment is signed.
        for hook in &self.on_payment_required {
            let Some(headers) = hook(&payment_required).await else {
                continue;
            };

            let mut retry = hook_retry
                .ok_or_else(|| rqm::Error::middleware(HttpError::RequestNotCloneable))?;
            retry.headers_mut().extend(headers);
            let hook_response = next.clone().run(retry, extensions).await?;
            if hook_response.status() != StatusCode::PAYMENT_REQUIRED {
                return Ok(hook_response);
            }

            // Still 402: pick up the fresh challenge and pay.
            payment_required = parse_payment_required(hook_response).await.ok_or_else(|| {
                rqm::Error::middleware(HttpError::InvalidPaymentRequired(
                    "no decodable PAYMENT-REQUIRED after hook retry".into(),
                ))
            })?;
            break;
        }

        let (header_name, header_value) = self
            .payment_header(&payment_required)
            .await
            .map_err(rqm::Error::middleware)?;

        let mut retry =
            payment_retry.ok_or_else(|| rqm::Error::middleware(HttpError::RequestNotCloneable))?;
        let name = http::HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| rqm::Error::middleware(HttpError::PaymentCreation(e.to_string())))?;
        let value = header_value.parse().map_err(|_| {
            rqm::Error::middleware(HttpError::PaymentCreation(
                "payment header is not a valid header value".into(),
            ))
        })?;
        retry.headers_mut().insert(name, value);
        let expose = http::HeaderName::from_bytes(ACCESS_CONTROL_EXPOSE_HEADERS.as_bytes())
            .map_err(|e| rqm::Error::middleware(HttpError::PaymentCreation(e.to_string())))?;
        retry
            .headers_mut()
            .insert(expose, http::HeaderValue::from_static(EXPOSED_PAYMENT_HEADERS));

        next.run(retry, extensions).await
    }
}

/// Parses a 402 response into a version-tagged challenge.
///
/// Tries the `PAYMENT-REQUIRED` header first, then the JSON body (V1
/// compatibility).
pub async fn parse_payment_required(response: Response) -> Option<PaymentRequiredEnum> {
    if let Some(value) = response
        .headers()
        .get(PAYMENT_REQUIRED_HEADER)
        .and_then(|v| v.to_str().ok())
        && let Ok(required) = decode_payment_required(value)
    {
        return Some(required);
    }

    let body = response.bytes().await.ok()?;
    parse_payment_required_bytes(&body).ok()
}

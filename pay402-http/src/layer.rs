//! Tower middleware for automatic x402 payment gating.
//!
//! [`PaymentGateLayer`] wraps an inner service with the payment state
//! machine: unauthenticated requests to protected routes get a 402, valid
//! payments reach the inner service, and settlement runs only after the
//! inner service answered with a status below 400. A settlement failure
//! overrides the upstream response with a 402 so the customer neither pays
//! nor receives the resource.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::body::Body;
use http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use serde_json::json;
use tower::{Layer, Service};

use crate::server::HttpResourceServer;
use crate::types::{ProcessResult, RequestContext, SettleResult};

/// Tower [`Layer`] that adds x402 payment gating to an inner service.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use pay402::server::X402ResourceServer;
/// use pay402_http::{HttpResourceServer, PaymentGateLayer};
/// use pay402_http::types::{PaymentOption, RouteConfig, RoutesConfig};
///
/// let server = Arc::new(X402ResourceServer::new());
/// let mut routes = RoutesConfig::new();
/// routes.insert(
///     "GET /weather".into(),
///     RouteConfig::single(PaymentOption::new(
///         "exact",
///         "eip155:8453",
///         "0xRecipient",
///         serde_json::json!("0.01"),
///     )),
/// );
/// let http_server = Arc::new(HttpResourceServer::new(server, routes));
/// let layer = PaymentGateLayer::new(http_server);
/// // Apply to an Axum router: app.layer(layer)
/// ```
#[derive(Clone)]
pub struct PaymentGateLayer {
    server: Arc<HttpResourceServer>,
}

impl std::fmt::Debug for PaymentGateLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateLayer").finish_non_exhaustive()
    }
}

impl PaymentGateLayer {
    /// Creates a payment gate layer over an HTTP resource server.
    #[must_use]
    pub fn new(server: Arc<HttpResourceServer>) -> Self {
        Self { server }
    }
}

impl<S> Layer<S> for PaymentGateLayer {
    type Service = PaymentGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            inner,
            server: Arc::clone(&self.server),
        }
    }
}

/// Tower [`Service`] created by [`PaymentGateLayer`].
#[derive(Clone)]
pub struct PaymentGateService<S> {
    inner: S,
    server: Arc<HttpResourceServer>,
}

impl<S> std::fmt::Debug for PaymentGateService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateService").finish_non_exhaustive()
    }
}

impl<S> Service<Request<Body>> for PaymentGateService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
{
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = Arc::clone(&self.server);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let ctx = request_context(&req);

            match server.process_http_request(&ctx).await {
                ProcessResult::NoPaymentRequired | ProcessResult::AccessGranted => {
                    inner.call(req).await.map_err(Into::into)
                }
                ProcessResult::PaymentError {
                    status,
                    headers,
                    body,
                } => Ok(build_response(status, &headers, body)),
                ProcessResult::PaymentVerified(instructions) => {
                    let mut response = inner.call(req).await.map_err(Into::into)?;

                    // No charge on failure: an erroring upstream means the
                    // customer is not settled.
                    if response.status().as_u16() >= 400 {
                        return Ok(response);
                    }

                    let settle_result = server.process_settlement(&instructions).await;
                    if settle_result.success {
                        attach_headers(&mut response, &settle_result);
                        Ok(response)
                    } else {
                        // Settlement failed: override the upstream response
                        // so the resource is not delivered unpaid.
                        let reason = settle_result
                            .error_reason
                            .unwrap_or_else(|| "settlement failed".to_owned());
                        Ok(build_response(
                            402,
                            &[("Content-Type".to_owned(), "application/json".to_owned())],
                            json!({ "error": reason }).to_string(),
                        ))
                    }
                }
            }
        })
    }
}

/// Extracts the payment-relevant request context.
fn request_context(req: &Request<Body>) -> RequestContext {
    let uri = req.uri();
    let url = if uri.scheme().is_some() {
        uri.to_string()
    } else {
        let host = req
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{host}{}", uri.path())
    };

    RequestContext {
        method: req.method().as_str().to_uppercase(),
        path: uri.path().to_owned(),
        query: uri.query().map(ToOwned::to_owned),
        headers: req.headers().clone(),
        url,
    }
}

fn build_response(status: u16, headers: &[(String, String)], body: String) -> Response<Body> {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn attach_headers(response: &mut Response<Body>, settle_result: &SettleResult) {
    for (name, value) in &settle_result.headers {
        let Ok(name) = name.parse::<HeaderName>() else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        response.headers_mut().insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PAYMENT_RESPONSE_HEADER;
    use crate::headers::encode_payment_signature;
    use crate::types::{PaymentOption, RouteConfig, RoutesConfig};
    use pay402::proto::{
        PaymentPayload, PaymentRequirements, SettleResponse, SupportedKind, SupportedResponse,
        VerifyResponse,
    };
    use pay402::scheme::{AssetAmount, BoxFuture, SchemeError, SchemeServer};
    use pay402::server::{FacilitatorClient, X402ResourceServer};
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{ServiceExt, service_fn};

    struct TestFacilitator {
        settle_result: SettleResponse,
        settle_calls: Arc<AtomicUsize>,
    }

    impl FacilitatorClient for TestFacilitator {
        fn verify<'a>(
            &'a self,
            _payload: &'a PaymentPayload,
            _requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
            Box::pin(async { Ok(VerifyResponse::valid("0xCLIENT")) })
        }

        fn settle<'a>(
            &'a self,
            _payload: &'a PaymentPayload,
            _requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
            let result = self.settle_result.clone();
            Box::pin(async move { Ok(result) })
        }

        fn get_supported(&self) -> BoxFuture<'_, Result<SupportedResponse, SchemeError>> {
            Box::pin(async {
                Ok(SupportedResponse {
                    kinds: vec![SupportedKind {
                        x402_version: 2,
                        scheme: "exact".into(),
                        network: "eip155:*".into(),
                        extra: None,
                    }],
                    extensions: Vec::new(),
                    signers: HashMap::new(),
                })
            })
        }
    }

    struct PassthroughScheme;

    impl SchemeServer for PassthroughScheme {
        fn scheme(&self) -> &str {
            "exact"
        }

        fn parse_price(
            &self,
            price: &serde_json::Value,
            _network: &str,
        ) -> Result<AssetAmount, SchemeError> {
            Ok(AssetAmount {
                amount: price.as_str().unwrap_or_default().to_owned(),
                asset: "0xUSDC".into(),
                extra: None,
            })
        }

        fn enhance_payment_requirements(
            &self,
            requirements: PaymentRequirements,
            _supported_kind: &SupportedKind,
            _facilitator_extensions: &[String],
        ) -> PaymentRequirements {
            requirements
        }
    }

    async fn gate(
        settle_result: SettleResponse,
    ) -> (PaymentGateLayer, Arc<AtomicUsize>) {
        let settle_calls = Arc::new(AtomicUsize::new(0));
        let mut server = X402ResourceServer::new();
        server.add_facilitator(Box::new(TestFacilitator {
            settle_result,
            settle_calls: Arc::clone(&settle_calls),
        }));
        server.register("eip155:*", Box::new(PassthroughScheme));
        server.initialize().await.unwrap();

        let mut routes = RoutesConfig::new();
        routes.insert(
            "GET /api/protected".into(),
            RouteConfig::single(PaymentOption::new(
                "exact",
                "eip155:8453",
                "0xPAY",
                serde_json::json!("1000000"),
            )),
        );

        let http_server = Arc::new(HttpResourceServer::new(Arc::new(server), routes));
        (PaymentGateLayer::new(http_server), settle_calls)
    }

    fn signed_request(upstream_status: StatusCode) -> (Request<Body>, StatusCode) {
        let payload = PaymentPayload {
            x402_version: 2,
            accepted: PaymentRequirements {
                scheme: "exact".into(),
                network: "eip155:8453".into(),
                amount: "1000000".into(),
                pay_to: "0xPAY".into(),
                max_timeout_seconds: 300,
                asset: "0xUSDC".into(),
                extra: None,
            },
            payload: serde_json::json!({"signature": "0xsig"}),
            resource: None,
            extensions: None,
        };
        let header = encode_payment_signature(&payload).unwrap();
        let request = Request::builder()
            .method("GET")
            .uri("/api/protected")
            .header("payment-signature", header)
            .body(Body::empty())
            .unwrap();
        (request, upstream_status)
    }

    fn upstream(
        status: StatusCode,
    ) -> impl Service<Request<Body>, Response = Response<Body>, Error = Infallible, Future: Send>
    + Clone
    + Send
    + 'static {
        service_fn(move |_req: Request<Body>| async move {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(status)
                    .body(Body::from(r#"{"ok":true}"#))
                    .unwrap(),
            )
        })
    }

    #[tokio::test]
    async fn happy_path_settles_and_attaches_header() {
        let (layer, settle_calls) = gate(SettleResponse::success(
            "0xTX",
            "eip155:8453",
            "0xCLIENT",
        ))
        .await;
        let service = layer.layer(upstream(StatusCode::OK));

        let (request, _) = signed_request(StatusCode::OK);
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
        assert_eq!(settle_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upstream_failure_skips_settlement() {
        let (layer, settle_calls) = gate(SettleResponse::success(
            "0xTX",
            "eip155:8453",
            "0xCLIENT",
        ))
        .await;
        let service = layer.layer(upstream(StatusCode::INTERNAL_SERVER_ERROR));

        let (request, _) = signed_request(StatusCode::INTERNAL_SERVER_ERROR);
        let response = service.oneshot(request).await.unwrap();

        // The 500 passes through untouched and the facilitator is never
        // contacted for settlement.
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
        assert_eq!(settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn settlement_failure_overrides_upstream_body() {
        let (layer, settle_calls) =
            gate(SettleResponse::error("insufficient_funds", "eip155:8453")).await;
        let service = layer.layer(upstream(StatusCode::OK));

        let (request, _) = signed_request(StatusCode::OK);
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(!response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
        assert_eq!(settle_calls.load(Ordering::SeqCst), 1);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "insufficient_funds");
    }

    #[tokio::test]
    async fn missing_payment_yields_402_without_upstream() {
        let (layer, settle_calls) = gate(SettleResponse::success(
            "0xTX",
            "eip155:8453",
            "0xCLIENT",
        ))
        .await;
        // An upstream that answers 200; reaching it without payment would
        // make the assertions below fail.
        let service = layer.layer(upstream(StatusCode::OK));

        let request = Request::builder()
            .method("GET")
            .uri("/api/protected")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().contains_key("payment-required"));
        assert_eq!(settle_calls.load(Ordering::SeqCst), 0);
    }
}

//! The HTTP resource layer.
//!
//! [`HttpResourceServer`] holds a reference to exactly one
//! [`X402ResourceServer`] and owns its compiled route table. It drives one
//! request turn of the payment state machine: match the route, run
//! protected-request hooks, decode the payment header, build requirements,
//! match and verify the payload.
//!
//! **Deferred settlement contract.** [`HttpResourceServer::process_http_request`]
//! never settles. It returns [`ProcessResult::PaymentVerified`] carrying
//! [`SettleInstructions`]; the outer integration must call
//! [`HttpResourceServer::process_settlement`] only after the protected
//! handler produced a status < 400, so a failing upstream never charges the
//! customer.

use std::sync::Arc;

use pay402::config::ResourceConfig;
use pay402::networks::NetworkRegistry;
use pay402::proto::helpers::PaymentPayloadEnum;
use pay402::proto::{
    Extensions, PaymentRequired, PaymentRequirements, PaymentRequirementsV1, ResourceInfo,
};
use pay402::scheme::{BoxFuture, SchemeError};
use pay402::server::X402ResourceServer;
use serde_json::{Value, json};

use crate::constants::{
    ACCESS_CONTROL_EXPOSE_HEADERS, PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER,
    PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER,
};
use crate::headers::{decode_payment_payload, encode_payment_required, encode_payment_response};
use crate::paywall::{PaywallProvider, prefers_html};
use crate::types::{
    CompiledRoute, PaywallConfig, ProcessResult, RequestContext, RouteConfig, RoutesConfig,
    SettleInstructions, SettleResult, VerifiedPayment, select_route,
};

/// Outcome of a protected-request hook.
#[derive(Debug, Clone)]
pub enum ProtectedRequestOutcome {
    /// Serve the resource without consulting payment requirements.
    GrantAccess,
    /// Reject the request with the given reason.
    Abort {
        /// Human-readable rejection reason.
        reason: String,
    },
}

/// Hook consulted before payment verification on every protected request.
///
/// Returning `None` continues to the payment flow. Used by extensions such
/// as Sign-In-With-X to grant access to wallets that already paid.
pub type ProtectedRequestHook = Box<
    dyn for<'a> Fn(&'a RequestContext) -> BoxFuture<'a, Option<ProtectedRequestOutcome>>
        + Send
        + Sync,
>;

struct PaywallState {
    provider: Box<dyn PaywallProvider>,
    config: PaywallConfig,
}

/// HTTP-level x402 resource server.
///
/// See the module docs for the request lifecycle and the deferred
/// settlement contract.
pub struct HttpResourceServer {
    server: Arc<X402ResourceServer>,
    routes: Vec<CompiledRoute>,
    paywall: Option<PaywallState>,
    protected_request_hooks: Vec<ProtectedRequestHook>,
    network_registry: NetworkRegistry,
}

impl std::fmt::Debug for HttpResourceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResourceServer")
            .field("routes_count", &self.routes.len())
            .field("paywall", &self.paywall.is_some())
            .field("hooks_count", &self.protected_request_hooks.len())
            .finish_non_exhaustive()
    }
}

impl HttpResourceServer {
    /// Creates an HTTP resource server over a resource server and routes.
    #[must_use]
    pub fn new(server: Arc<X402ResourceServer>, routes: RoutesConfig) -> Self {
        let routes = routes
            .into_iter()
            .map(|(pattern, config)| CompiledRoute::new(&pattern, config))
            .collect();
        Self {
            server,
            routes,
            paywall: None,
            protected_request_hooks: Vec::new(),
            network_registry: NetworkRegistry::with_known_networks(),
        }
    }

    /// Registers a browser paywall provider.
    #[must_use]
    pub fn with_paywall(mut self, provider: Box<dyn PaywallProvider>, config: PaywallConfig) -> Self {
        self.paywall = Some(PaywallState { provider, config });
        self
    }

    /// Registers a protected-request hook. Hooks run in registration order
    /// before payment verification; the first terminal outcome wins.
    #[must_use]
    pub fn on_protected_request(mut self, hook: ProtectedRequestHook) -> Self {
        self.protected_request_hooks.push(hook);
        self
    }

    /// Returns the underlying resource server.
    #[must_use]
    pub fn resource_server(&self) -> &Arc<X402ResourceServer> {
        &self.server
    }

    /// Processes one protected request up to (and including) verification.
    ///
    /// Never settles; see the module docs.
    pub async fn process_http_request(&self, ctx: &RequestContext) -> ProcessResult {
        let Some(route) = select_route(&self.routes, &ctx.method, &ctx.path) else {
            return ProcessResult::NoPaymentRequired;
        };
        let config = route.config.clone();

        for hook in &self.protected_request_hooks {
            match hook(ctx).await {
                Some(ProtectedRequestOutcome::GrantAccess) => {
                    return ProcessResult::AccessGranted;
                }
                Some(ProtectedRequestOutcome::Abort { reason }) => {
                    return Self::error_response(402, &json!({ "error": reason }).to_string());
                }
                None => {}
            }
        }

        let resource_info = ResourceInfo {
            url: config.resource.clone().unwrap_or_else(|| ctx.url.clone()),
            description: config.description.clone(),
            mime_type: config.mime_type.clone(),
        };

        let requirements = match self.build_requirements(&config, ctx).await {
            Ok(reqs) => reqs,
            Err(e) => {
                tracing::error!(error = %e, path = %ctx.path, "failed to build payment requirements");
                return Self::error_response(
                    500,
                    &json!({ "error": format!("Failed to build payment requirements: {e}") })
                        .to_string(),
                );
            }
        };

        let extensions = self.enriched_route_extensions(&config, &resource_info, ctx);

        let header_value = ctx
            .headers
            .get(PAYMENT_SIGNATURE_HEADER)
            .or_else(|| ctx.headers.get(X_PAYMENT_HEADER))
            .and_then(|v| v.to_str().ok());

        let Some(header_value) = header_value else {
            return self.payment_required(
                requirements,
                resource_info,
                Some("Payment required".to_owned()),
                extensions,
                ctx,
            );
        };

        let payload = match decode_payment_payload(header_value) {
            Ok(payload) => payload,
            Err(e) => {
                return self.payment_required(
                    requirements,
                    resource_info,
                    Some(format!("Malformed payment header: {e}")),
                    extensions,
                    ctx,
                );
            }
        };

        match payload {
            PaymentPayloadEnum::V2(payload) => {
                let Some(matched) = self
                    .server
                    .find_matching_requirements(&requirements, &payload)
                    .cloned()
                else {
                    return self.payment_required(
                        requirements,
                        resource_info,
                        Some("No matching payment requirements".to_owned()),
                        extensions,
                        ctx,
                    );
                };

                match self.server.verify_payment(&payload, &matched).await {
                    Ok(response) if response.is_valid => {
                        ProcessResult::PaymentVerified(Box::new(SettleInstructions {
                            payment: VerifiedPayment::V2 {
                                payload: *payload,
                                requirements: matched,
                            },
                            extensions,
                        }))
                    }
                    Ok(response) => self.payment_required(
                        requirements,
                        resource_info,
                        response.invalid_reason,
                        extensions,
                        ctx,
                    ),
                    Err(e) => self.payment_required(
                        requirements,
                        resource_info,
                        Some(e.to_string()),
                        extensions,
                        ctx,
                    ),
                }
            }
            PaymentPayloadEnum::V1(payload) => {
                let v1_requirements: Vec<PaymentRequirementsV1> = requirements
                    .iter()
                    .map(|req| self.to_v1_requirements(req, &resource_info))
                    .collect();

                let Some(matched) = self
                    .server
                    .find_matching_requirements_v1(&v1_requirements, &payload)
                    .cloned()
                else {
                    return self.payment_required(
                        requirements,
                        resource_info,
                        Some("No matching payment requirements".to_owned()),
                        extensions,
                        ctx,
                    );
                };

                match self.server.verify_payment_v1(&payload, &matched).await {
                    Ok(response) if response.is_valid => {
                        ProcessResult::PaymentVerified(Box::new(SettleInstructions {
                            payment: VerifiedPayment::V1 {
                                payload: *payload,
                                requirements: matched,
                            },
                            extensions,
                        }))
                    }
                    Ok(response) => self.payment_required(
                        requirements,
                        resource_info,
                        response.invalid_reason,
                        extensions,
                        ctx,
                    ),
                    Err(e) => self.payment_required(
                        requirements,
                        resource_info,
                        Some(e.to_string()),
                        extensions,
                        ctx,
                    ),
                }
            }
        }
    }

    /// Settles a verified payment after the upstream handler succeeded.
    ///
    /// The returned [`SettleResult`] carries the `PAYMENT-RESPONSE` header
    /// on success; on failure the caller must answer 402 and override the
    /// upstream body.
    pub async fn process_settlement(&self, instructions: &SettleInstructions) -> SettleResult {
        let result = match &instructions.payment {
            VerifiedPayment::V2 {
                payload,
                requirements,
            } => {
                self.server
                    .settle_payment(payload, requirements, instructions.extensions.as_ref())
                    .await
            }
            VerifiedPayment::V1 {
                payload,
                requirements,
            } => self.server.settle_payment_v1(payload, requirements).await,
        };

        let response_header = match &instructions.payment {
            VerifiedPayment::V2 { .. } => PAYMENT_RESPONSE_HEADER,
            VerifiedPayment::V1 { .. } => X_PAYMENT_RESPONSE_HEADER,
        };

        match result {
            Ok(response) if response.success => {
                let mut headers = Vec::new();
                if let Ok(encoded) = encode_payment_response(&response) {
                    headers.push((response_header.to_owned(), encoded));
                    headers.push((
                        ACCESS_CONTROL_EXPOSE_HEADERS.to_owned(),
                        response_header.to_owned(),
                    ));
                }
                if let Some(extra) = &response.headers {
                    headers.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                SettleResult {
                    success: true,
                    error_reason: None,
                    headers,
                    transaction: Some(response.transaction),
                    network: Some(response.network),
                    payer: response.payer,
                }
            }
            Ok(response) => SettleResult {
                success: false,
                error_reason: response.error_reason,
                headers: Vec::new(),
                transaction: None,
                network: Some(response.network),
                payer: response.payer,
            },
            Err(e) => SettleResult {
                success: false,
                error_reason: Some(e.to_string()),
                headers: Vec::new(),
                transaction: None,
                network: None,
                payer: None,
            },
        }
    }

    /// Builds the advertised requirements for a route, resolving dynamic
    /// `payTo`/`price` once against the request context.
    async fn build_requirements(
        &self,
        config: &RouteConfig,
        ctx: &RequestContext,
    ) -> Result<Vec<PaymentRequirements>, SchemeError> {
        let mut all = Vec::new();
        for option in &config.accepts {
            let pay_to = option.pay_to.resolve(ctx).await?;
            let price = option.price.resolve(ctx).await?;
            let resource_config = ResourceConfig {
                scheme: option.scheme.clone(),
                pay_to,
                price,
                network: option.network.clone(),
                max_timeout_seconds: option.max_timeout_seconds,
            };
            all.extend(self.server.build_payment_requirements(&resource_config)?);
        }
        Ok(all)
    }

    /// Runs transport-context enrichment over the route's extension
    /// declarations.
    fn enriched_route_extensions(
        &self,
        config: &RouteConfig,
        resource_info: &ResourceInfo,
        ctx: &RequestContext,
    ) -> Option<Extensions> {
        let declared = config.extensions.clone()?;
        let transport_context = json!({
            "url": resource_info.url,
            "method": ctx.method,
            "path": ctx.path,
        });
        let declarations = Value::Object(declared.into_iter().collect());
        let enriched = self.server.enrich_extensions(&declarations, &transport_context);
        match enriched {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }

    /// Builds the 402 result, dispatching between JSON and the HTML
    /// paywall based on the `Accept` header.
    fn payment_required(
        &self,
        requirements: Vec<PaymentRequirements>,
        resource_info: ResourceInfo,
        error: Option<String>,
        extensions: Option<Extensions>,
        ctx: &RequestContext,
    ) -> ProcessResult {
        let payment_required = self.server.create_payment_required_response(
            requirements,
            Some(resource_info),
            error,
            extensions,
        );

        let encoded = encode_payment_required(&payment_required).unwrap_or_default();
        let mut headers = vec![
            (PAYMENT_REQUIRED_HEADER.to_owned(), encoded),
            (
                ACCESS_CONTROL_EXPOSE_HEADERS.to_owned(),
                PAYMENT_REQUIRED_HEADER.to_owned(),
            ),
        ];

        let body = if let Some(paywall) = self
            .paywall
            .as_ref()
            .filter(|_| prefers_html(&ctx.headers))
        {
            headers.push(("Content-Type".to_owned(), "text/html".to_owned()));
            paywall.provider.render(&payment_required, &paywall.config)
        } else {
            headers.push(("Content-Type".to_owned(), "application/json".to_owned()));
            serde_json::to_string(&payment_required).unwrap_or_default()
        };

        ProcessResult::PaymentError {
            status: 402,
            headers,
            body,
        }
    }

    fn error_response(status: u16, body: &str) -> ProcessResult {
        ProcessResult::PaymentError {
            status,
            headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
            body: body.to_owned(),
        }
    }

    /// Projects a built V2 requirement into the V1 wire shape, mapping the
    /// CAIP-2 chain ID back to its legacy network name when known.
    fn to_v1_requirements(
        &self,
        req: &PaymentRequirements,
        resource_info: &ResourceInfo,
    ) -> PaymentRequirementsV1 {
        let network = req
            .network
            .parse()
            .ok()
            .and_then(|chain_id| self.network_registry.name_by_chain_id(&chain_id))
            .map_or_else(|| req.network.clone(), ToOwned::to_owned);

        PaymentRequirementsV1 {
            scheme: req.scheme.clone(),
            network,
            max_amount_required: req.amount.clone(),
            resource: resource_info.url.clone(),
            description: resource_info.description.clone(),
            mime_type: resource_info.mime_type.clone(),
            pay_to: req.pay_to.clone(),
            max_timeout_seconds: req.max_timeout_seconds,
            asset: req.asset.clone(),
            output_schema: None,
            extra: req.extra.clone(),
        }
    }
}

/// Decodes the [`PaymentRequired`] carried in a [`ProcessResult::PaymentError`],
/// mainly for tests and diagnostics.
#[must_use]
pub fn payment_required_from_result(result: &ProcessResult) -> Option<PaymentRequired> {
    let ProcessResult::PaymentError { headers, .. } = result else {
        return None;
    };
    let (_, value) = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(PAYMENT_REQUIRED_HEADER))?;
    match crate::headers::decode_payment_required(value).ok()? {
        pay402::proto::helpers::PaymentRequiredEnum::V2(required) => Some(*required),
        pay402::proto::helpers::PaymentRequiredEnum::V1(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use pay402::proto::{
        PaymentPayload, SettleResponse, SupportedKind, SupportedResponse, VerifyResponse,
    };
    use pay402::scheme::{AssetAmount, SchemeServer};
    use pay402::server::FacilitatorClient;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFacilitator {
        verify_result: VerifyResponse,
        settle_calls: Arc<AtomicUsize>,
    }

    impl FacilitatorClient for CountingFacilitator {
        fn verify<'a>(
            &'a self,
            _payload: &'a PaymentPayload,
            _requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
            let result = self.verify_result.clone();
            Box::pin(async move { Ok(result) })
        }

        fn settle<'a>(
            &'a self,
            payload: &'a PaymentPayload,
            _requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
            let network = payload.network().to_owned();
            Box::pin(async move { Ok(SettleResponse::success("0xTX", network, "0xCLIENT")) })
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

    async fn http_server(
        verify_result: VerifyResponse,
    ) -> (HttpResourceServer, Arc<AtomicUsize>) {
        let settle_calls = Arc::new(AtomicUsize::new(0));
        let facilitator = CountingFacilitator {
            verify_result,
            settle_calls: Arc::clone(&settle_calls),
        };

        let mut server = X402ResourceServer::new();
        server.add_facilitator(Box::new(facilitator));
        server.register("eip155:*", Box::new(PassthroughScheme));
        server.initialize().await.unwrap();

        let mut routes = RoutesConfig::new();
        routes.insert(
            "GET /api/protected".into(),
            RouteConfig::single(crate::types::PaymentOption::new(
                "exact",
                "eip155:8453",
                "0xPAY",
                serde_json::json!("1000000"),
            )),
        );

        (HttpResourceServer::new(Arc::new(server), routes), settle_calls)
    }

    fn request(path: &str, headers: HeaderMap) -> RequestContext {
        RequestContext {
            method: "GET".into(),
            path: path.into(),
            query: None,
            headers,
            url: format!("http://localhost{path}"),
        }
    }

    fn signed_header(amount: &str) -> String {
        let payload = PaymentPayload {
            x402_version: 2,
            accepted: PaymentRequirements {
                scheme: "exact".into(),
                network: "eip155:8453".into(),
                amount: amount.into(),
                pay_to: "0xPAY".into(),
                max_timeout_seconds: 300,
                asset: "0xUSDC".into(),
                extra: None,
            },
            payload: serde_json::json!({"signature": "0xsig"}),
            resource: None,
            extensions: None,
        };
        crate::headers::encode_payment_signature(&payload).unwrap()
    }

    #[tokio::test]
    async fn unprotected_route_passes_through() {
        let (http, _) = http_server(VerifyResponse::valid("0xCLIENT")).await;
        let result = http.process_http_request(&request("/open", HeaderMap::new())).await;
        assert!(matches!(result, ProcessResult::NoPaymentRequired));
    }

    #[tokio::test]
    async fn missing_header_yields_402_with_payment_required() {
        let (http, settle_calls) = http_server(VerifyResponse::valid("0xCLIENT")).await;
        let result = http
            .process_http_request(&request("/api/protected", HeaderMap::new()))
            .await;

        let required = payment_required_from_result(&result).expect("402 with header");
        assert_eq!(required.accepts.len(), 1);
        assert_eq!(required.accepts[0].amount, "1000000");
        assert_eq!(settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verified_payment_is_returned_without_settling() {
        let (http, settle_calls) = http_server(VerifyResponse::valid("0xCLIENT")).await;

        let mut headers = HeaderMap::new();
        headers.insert("payment-signature", signed_header("1000000").parse().unwrap());
        let result = http
            .process_http_request(&request("/api/protected", headers))
            .await;

        assert!(matches!(result, ProcessResult::PaymentVerified(_)));
        // Deferred settlement: processing the request must not settle.
        assert_eq!(settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tampered_accepted_copy_is_rejected() {
        let (http, _) = http_server(VerifyResponse::valid("0xCLIENT")).await;

        let mut headers = HeaderMap::new();
        headers.insert("payment-signature", signed_header("999").parse().unwrap());
        let result = http
            .process_http_request(&request("/api/protected", headers))
            .await;

        let required = payment_required_from_result(&result).expect("402");
        assert_eq!(
            required.error.as_deref(),
            Some("No matching payment requirements")
        );
    }

    #[tokio::test]
    async fn invalid_verification_carries_reason() {
        let (http, _) = http_server(VerifyResponse::invalid("insufficient_funds")).await;

        let mut headers = HeaderMap::new();
        headers.insert("payment-signature", signed_header("1000000").parse().unwrap());
        let result = http
            .process_http_request(&request("/api/protected", headers))
            .await;

        let ProcessResult::PaymentError { status, body, .. } = result else {
            panic!("expected payment error");
        };
        assert_eq!(status, 402);
        assert!(body.contains("insufficient_funds"));
    }

    #[tokio::test]
    async fn settlement_produces_payment_response_header() {
        let (http, settle_calls) = http_server(VerifyResponse::valid("0xCLIENT")).await;

        let mut headers = HeaderMap::new();
        headers.insert("payment-signature", signed_header("1000000").parse().unwrap());
        let result = http
            .process_http_request(&request("/api/protected", headers))
            .await;
        let ProcessResult::PaymentVerified(instructions) = result else {
            panic!("expected verified payment");
        };

        let settle_result = http.process_settlement(&instructions).await;
        assert!(settle_result.success);
        assert_eq!(settle_calls.load(Ordering::SeqCst), 1);
        assert!(
            settle_result
                .headers
                .iter()
                .any(|(name, _)| name == PAYMENT_RESPONSE_HEADER)
        );
        assert_eq!(settle_result.payer.as_deref(), Some("0xCLIENT"));
    }

    #[tokio::test]
    async fn grant_access_hook_short_circuits() {
        let (http, settle_calls) = http_server(VerifyResponse::valid("0xCLIENT")).await;
        let http = http.on_protected_request(Box::new(|ctx| {
            let granted = ctx.headers.contains_key("x-api-key");
            Box::pin(async move {
                granted.then_some(ProtectedRequestOutcome::GrantAccess)
            })
        }));

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        let result = http
            .process_http_request(&request("/api/protected", headers))
            .await;

        assert!(matches!(result, ProcessResult::AccessGranted));
        assert_eq!(settle_calls.load(Ordering::SeqCst), 0);
    }
}

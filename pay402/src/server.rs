//! The transport-agnostic x402 resource server.
//!
//! [`X402ResourceServer`] owns the registries of scheme backends, protocol
//! extensions, facilitator clients and lifecycle hooks. It builds payment
//! requirements for protected resources, matches incoming payloads against
//! advertised requirements, and delegates verify/settle to the facilitator
//! routed by `(x402Version, network, scheme)`.
//!
//! Registration happens before [`X402ResourceServer::initialize`]; once
//! initialized the routing map and registries are read-only and the server
//! may be shared across request tasks.

use std::collections::HashMap;

use serde_json::Value;

use crate::config::ResourceConfig;
use crate::error::{
    SchemeNotFoundError, UnsupportedByFacilitatorError, kind,
};
use crate::extension::ResourceServerExtension;
use crate::hooks::{
    AbortResult, PayloadView, RecoveredSettleResult, RecoveredVerifyResult, RequirementsView,
    SettleContext, SettleFailureContext, SettleResultContext, VerifyContext, VerifyFailureContext,
    VerifyResultContext,
};
use crate::proto::helpers::matches_network_pattern;
use crate::proto::{
    Extensions, PaymentPayload, PaymentPayloadV1, PaymentRequired, PaymentRequirements,
    PaymentRequirementsV1, ResourceInfo, SettleResponse, SupportedKind, SupportedResponse,
    VerifyResponse,
};
use crate::scheme::{BoxFuture, SchemeError, SchemeServer};

/// Async facilitator client used by resource servers.
///
/// Resource servers delegate verify/settle to a facilitator through this
/// trait; the usual implementation makes HTTP calls to a remote facilitator
/// service. The V1 methods have default implementations that report the
/// legacy protocol as unsupported, so V2-only facilitators implement just
/// three methods.
pub trait FacilitatorClient: Send + Sync {
    /// Verifies a V2 payment.
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>>;

    /// Settles a V2 payment.
    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>>;

    /// Verifies a V1 (legacy) payment.
    fn verify_v1<'a>(
        &'a self,
        _payload: &'a PaymentPayloadV1,
        _requirements: &'a PaymentRequirementsV1,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        Box::pin(async { Err("x402 v1 is not supported by this facilitator client".into()) })
    }

    /// Settles a V1 (legacy) payment.
    fn settle_v1<'a>(
        &'a self,
        _payload: &'a PaymentPayloadV1,
        _requirements: &'a PaymentRequirementsV1,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        Box::pin(async { Err("x402 v1 is not supported by this facilitator client".into()) })
    }

    /// Returns the payment kinds this facilitator supports.
    ///
    /// Called during [`X402ResourceServer::initialize`] to build the
    /// routing map.
    fn get_supported(&self) -> BoxFuture<'_, Result<SupportedResponse, SchemeError>>;
}

/// Async hook called before verification. Return `Some(AbortResult)` to
/// short-circuit with `isValid = false`.
pub type BeforeVerifyHook =
    Box<dyn Fn(&VerifyContext) -> BoxFuture<'_, Option<AbortResult>> + Send + Sync>;

/// Async hook called after successful verification.
pub type AfterVerifyHook = Box<dyn Fn(&VerifyResultContext) -> BoxFuture<'_, ()> + Send + Sync>;

/// Async hook called on verification failure. Return a recovery result to
/// suppress the failure.
pub type OnVerifyFailureHook = Box<
    dyn Fn(&VerifyFailureContext) -> BoxFuture<'_, Option<RecoveredVerifyResult>> + Send + Sync,
>;

/// Async hook called before settlement. Return `Some(AbortResult)` to abort.
pub type BeforeSettleHook =
    Box<dyn Fn(&SettleContext) -> BoxFuture<'_, Option<AbortResult>> + Send + Sync>;

/// Async hook called after successful settlement.
pub type AfterSettleHook = Box<dyn Fn(&SettleResultContext) -> BoxFuture<'_, ()> + Send + Sync>;

/// Async hook called on settlement failure. Return a recovery result to
/// suppress the failure.
pub type OnSettleFailureHook = Box<
    dyn Fn(&SettleFailureContext) -> BoxFuture<'_, Option<RecoveredSettleResult>> + Send + Sync,
>;

/// Routing key for the facilitator map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FacilitatorKey {
    x402_version: u32,
    network: String,
    scheme: String,
}

impl FacilitatorKey {
    fn new(x402_version: u32, network: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self {
            x402_version,
            network: network.into(),
            scheme: scheme.into(),
        }
    }
}

/// Transport-agnostic x402 resource server.
///
/// Owns scheme backends, extensions, facilitator clients and hook lists for
/// its entire lifetime. See the module docs for the lifecycle.
pub struct X402ResourceServer {
    facilitator_clients: Vec<Box<dyn FacilitatorClient>>,
    schemes: HashMap<String, HashMap<String, Box<dyn SchemeServer>>>,
    facilitator_map: HashMap<FacilitatorKey, usize>,
    supported_responses: Vec<SupportedResponse>,
    extensions: HashMap<String, Box<dyn ResourceServerExtension>>,
    before_verify_hooks: Vec<BeforeVerifyHook>,
    after_verify_hooks: Vec<AfterVerifyHook>,
    on_verify_failure_hooks: Vec<OnVerifyFailureHook>,
    before_settle_hooks: Vec<BeforeSettleHook>,
    after_settle_hooks: Vec<AfterSettleHook>,
    on_settle_failure_hooks: Vec<OnSettleFailureHook>,
    initialized: bool,
}

impl std::fmt::Debug for X402ResourceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402ResourceServer")
            .field("facilitator_clients_count", &self.facilitator_clients.len())
            .field("schemes_networks", &self.schemes.keys().collect::<Vec<_>>())
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl Default for X402ResourceServer {
    fn default() -> Self {
        Self::new()
    }
}

impl X402ResourceServer {
    /// Creates a resource server with no facilitator clients.
    #[must_use]
    pub fn new() -> Self {
        Self {
            facilitator_clients: Vec::new(),
            schemes: HashMap::new(),
            facilitator_map: HashMap::new(),
            supported_responses: Vec::new(),
            extensions: HashMap::new(),
            before_verify_hooks: Vec::new(),
            after_verify_hooks: Vec::new(),
            on_verify_failure_hooks: Vec::new(),
            before_settle_hooks: Vec::new(),
            after_settle_hooks: Vec::new(),
            on_settle_failure_hooks: Vec::new(),
            initialized: false,
        }
    }

    /// Creates a resource server with one facilitator client.
    #[must_use]
    pub fn with_facilitator(client: Box<dyn FacilitatorClient>) -> Self {
        let mut server = Self::new();
        server.facilitator_clients.push(client);
        server
    }

    /// Adds a facilitator client. Clients are probed in registration order.
    pub fn add_facilitator(&mut self, client: Box<dyn FacilitatorClient>) -> &mut Self {
        self.facilitator_clients.push(client);
        self
    }

    /// Registers a scheme server for a network or namespace wildcard
    /// (`"eip155:*"`). Replaces any prior entry with the same key.
    pub fn register(&mut self, network: impl Into<String>, server: Box<dyn SchemeServer>) -> &mut Self {
        let scheme = server.scheme().to_owned();
        self.schemes
            .entry(network.into())
            .or_default()
            .insert(scheme, server);
        self
    }

    /// Registers a protocol extension. Re-registering the same key is
    /// idempotent.
    pub fn register_extension(&mut self, ext: Box<dyn ResourceServerExtension>) -> &mut Self {
        self.extensions.insert(ext.key().to_owned(), ext);
        self
    }

    /// Returns the registered extension for a key, if any.
    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&dyn ResourceServerExtension> {
        self.extensions.get(key).map(AsRef::as_ref)
    }

    /// Checks if a scheme is registered for a network (wildcard-aware).
    #[must_use]
    pub fn has_registered_scheme(&self, network: &str, scheme: &str) -> bool {
        self.find_scheme_server(network, scheme).is_some()
    }

    /// Registers a before-verify hook.
    pub fn on_before_verify(&mut self, hook: BeforeVerifyHook) -> &mut Self {
        self.before_verify_hooks.push(hook);
        self
    }

    /// Registers an after-verify hook.
    pub fn on_after_verify(&mut self, hook: AfterVerifyHook) -> &mut Self {
        self.after_verify_hooks.push(hook);
        self
    }

    /// Registers a verify-failure hook.
    pub fn on_verify_failure(&mut self, hook: OnVerifyFailureHook) -> &mut Self {
        self.on_verify_failure_hooks.push(hook);
        self
    }

    /// Registers a before-settle hook.
    pub fn on_before_settle(&mut self, hook: BeforeSettleHook) -> &mut Self {
        self.before_settle_hooks.push(hook);
        self
    }

    /// Registers an after-settle hook.
    pub fn on_after_settle(&mut self, hook: AfterSettleHook) -> &mut Self {
        self.after_settle_hooks.push(hook);
        self
    }

    /// Registers a settle-failure hook.
    pub fn on_settle_failure(&mut self, hook: OnSettleFailureHook) -> &mut Self {
        self.on_settle_failure_hooks.push(hook);
        self
    }

    /// Contacts every facilitator client and builds the routing map.
    ///
    /// The first facilitator to advertise a `(version, network, scheme)`
    /// combination wins; later facilitators keep their advertisements for
    /// fallback probing only. Must be called before any verify/settle.
    ///
    /// # Errors
    ///
    /// Returns an error if any facilitator fails to answer `getSupported`.
    pub async fn initialize(&mut self) -> Result<(), SchemeError> {
        self.facilitator_map.clear();
        self.supported_responses.clear();

        for (idx, client) in self.facilitator_clients.iter().enumerate() {
            let supported = client.get_supported().await?;

            for supported_kind in &supported.kinds {
                let key = FacilitatorKey::new(
                    supported_kind.x402_version,
                    supported_kind.network.clone(),
                    supported_kind.scheme.clone(),
                );
                self.facilitator_map.entry(key).or_insert(idx);
            }

            self.supported_responses.push(supported);
        }

        self.initialized = true;
        Ok(())
    }

    /// Returns whether [`Self::initialize`] has completed.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns the advertised kind for a `(version, network, scheme)`
    /// combination, if any initialized facilitator supports it.
    #[must_use]
    pub fn get_supported_kind(
        &self,
        version: u32,
        network: &str,
        scheme: &str,
    ) -> Option<&SupportedKind> {
        let idx = self.resolve_facilitator(version, network, scheme)?;
        self.supported_responses.get(idx)?.kinds.iter().find(|k| {
            k.x402_version == version
                && (k.scheme == scheme || k.scheme == "*")
                && (k.network == network || matches_network_pattern(network, &k.network))
        })
    }

    /// Builds payment requirements for a protected resource.
    ///
    /// Returns a single enhanced requirement.
    ///
    /// # Errors
    ///
    /// Fails when the server is not initialized, the scheme is not
    /// registered for the network, price parsing fails, or — with
    /// [`UnsupportedByFacilitatorError`] — when no initialized facilitator
    /// advertises the `(2, network, scheme)` combination.
    pub fn build_payment_requirements(
        &self,
        config: &ResourceConfig,
    ) -> Result<Vec<PaymentRequirements>, SchemeError> {
        if !self.initialized {
            return Err("Server not initialized. Call initialize() first.".into());
        }

        let server = self
            .find_scheme_server(&config.network, &config.scheme)
            .ok_or_else(|| SchemeNotFoundError::new(&config.scheme, &config.network))?;

        let facilitator_idx = self
            .resolve_facilitator(2, &config.network, &config.scheme)
            .ok_or_else(|| {
                UnsupportedByFacilitatorError::new(2, &config.scheme, &config.network)
            })?;

        let supported = &self.supported_responses[facilitator_idx];
        let supported_kind = self
            .get_supported_kind(2, &config.network, &config.scheme)
            .ok_or_else(|| {
                UnsupportedByFacilitatorError::new(2, &config.scheme, &config.network)
            })?;

        let asset_amount = server.parse_price(&config.price, &config.network)?;

        let base = PaymentRequirements {
            scheme: config.scheme.clone(),
            network: config.network.clone(),
            asset: asset_amount.asset,
            amount: asset_amount.amount,
            pay_to: config.pay_to.clone(),
            max_timeout_seconds: config.max_timeout_seconds.unwrap_or(300),
            extra: asset_amount.extra,
        };

        let enhanced =
            server.enhance_payment_requirements(base, supported_kind, &supported.extensions);

        Ok(vec![enhanced])
    }

    /// Creates a 402 Payment Required response.
    ///
    /// For each declared extension with a registered implementation,
    /// [`ResourceServerExtension::enrich_payment_required_response`] is
    /// invoked; a failing enrichment is logged and the declaration kept
    /// unchanged.
    #[must_use]
    pub fn create_payment_required_response(
        &self,
        requirements: Vec<PaymentRequirements>,
        resource: Option<ResourceInfo>,
        error: Option<String>,
        extensions: Option<Extensions>,
    ) -> PaymentRequired {
        let mut response = PaymentRequired {
            x402_version: 2,
            error,
            resource,
            accepts: requirements,
            extensions: extensions.clone(),
        };

        if let Some(declared) = extensions {
            let snapshot = response.clone();
            let mut enriched = declared;
            for (key, declaration) in enriched.clone() {
                if let Some(ext) = self.extensions.get(&key) {
                    match ext.enrich_payment_required_response(&declaration, &snapshot) {
                        Ok(value) => {
                            enriched.insert(key, value);
                        }
                        Err(e) => {
                            tracing::warn!(extension = %key, error = %e, "extension enrichment failed, keeping declaration");
                        }
                    }
                }
            }
            response.extensions = Some(enriched);
        }

        response
    }

    /// Finds the advertised requirement matching a V2 payload.
    ///
    /// V2 matching is full structural equality of `payload.accepted`
    /// against the advertised entry.
    #[must_use]
    pub fn find_matching_requirements<'a>(
        &self,
        available: &'a [PaymentRequirements],
        payload: &PaymentPayload,
    ) -> Option<&'a PaymentRequirements> {
        available.iter().find(|req| payload.accepted == **req)
    }

    /// Finds the advertised requirement matching a V1 payload.
    ///
    /// V1 matching compares `(scheme, network)` only.
    #[must_use]
    pub fn find_matching_requirements_v1<'a>(
        &self,
        available: &'a [PaymentRequirementsV1],
        payload: &PaymentPayloadV1,
    ) -> Option<&'a PaymentRequirementsV1> {
        available
            .iter()
            .find(|req| req.scheme == payload.scheme && req.network == payload.network)
    }

    /// Verifies a V2 payment with the full hook lifecycle.
    ///
    /// A `beforeVerify` abort short-circuits to an `isValid = false`
    /// response carrying the abort reason. A transport error from the
    /// routed facilitator falls through the remaining facilitators in
    /// registration order; an `isValid = false` answer does not.
    ///
    /// # Errors
    ///
    /// Returns an error when the server is not initialized or every
    /// facilitator errors (unless an `onVerifyFailure` hook recovers).
    pub async fn verify_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, SchemeError> {
        if !self.initialized {
            return Err("Server not initialized. Call initialize() first.".into());
        }

        let payload_view = PayloadView::V2(Box::new(payload.clone()));
        let requirements_view = RequirementsView::V2(Box::new(requirements.clone()));

        let ctx = VerifyContext {
            payment_payload: payload_view.clone(),
            requirements: requirements_view.clone(),
        };
        for hook in &self.before_verify_hooks {
            if let Some(abort) = hook(&ctx).await {
                return Ok(VerifyResponse::invalid(abort.reason));
            }
        }

        let result = self
            .route_verify(2, payload.network(), payload.scheme(), |client| {
                client.verify(payload, requirements)
            })
            .await;

        self.finish_verify(result, payload_view, requirements_view)
            .await
    }

    /// Verifies a V1 payment with the full hook lifecycle.
    ///
    /// # Errors
    ///
    /// Returns an error when the server is not initialized or the routed
    /// facilitator errors without hook recovery.
    pub async fn verify_payment_v1(
        &self,
        payload: &PaymentPayloadV1,
        requirements: &PaymentRequirementsV1,
    ) -> Result<VerifyResponse, SchemeError> {
        if !self.initialized {
            return Err("Server not initialized. Call initialize() first.".into());
        }

        let payload_view = PayloadView::V1(Box::new(payload.clone()));
        let requirements_view = RequirementsView::V1(Box::new(requirements.clone()));

        let ctx = VerifyContext {
            payment_payload: payload_view.clone(),
            requirements: requirements_view.clone(),
        };
        for hook in &self.before_verify_hooks {
            if let Some(abort) = hook(&ctx).await {
                return Ok(VerifyResponse::invalid(abort.reason));
            }
        }

        let result = self
            .route_verify(1, &payload.network, &payload.scheme, |client| {
                client.verify_v1(payload, requirements)
            })
            .await;

        self.finish_verify(result, payload_view, requirements_view)
            .await
    }

    /// Settles a V2 payment with the full hook lifecycle.
    ///
    /// A `beforeSettle` abort yields a failed settlement response with the
    /// `settlement_aborted` kind. After a successful settlement each
    /// declared extension may enrich the response.
    ///
    /// # Errors
    ///
    /// Returns an error when the server is not initialized, no facilitator
    /// serves the combination, or the facilitator call errors without hook
    /// recovery. Settlement is never retried on another facilitator.
    pub async fn settle_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        declared_extensions: Option<&Extensions>,
    ) -> Result<SettleResponse, SchemeError> {
        if !self.initialized {
            return Err("Server not initialized. Call initialize() first.".into());
        }

        let payload_view = PayloadView::V2(Box::new(payload.clone()));
        let requirements_view = RequirementsView::V2(Box::new(requirements.clone()));

        let ctx = SettleContext {
            payment_payload: payload_view.clone(),
            requirements: requirements_view.clone(),
        };
        for hook in &self.before_settle_hooks {
            if let Some(abort) = hook(&ctx).await {
                return Ok(SettleResponse::error(
                    kind::SETTLEMENT_ABORTED,
                    requirements.network.clone(),
                )
                .with_message(abort.reason));
            }
        }

        let client = self.settle_client(2, payload.network(), payload.scheme())?;
        let result = client.settle(payload, requirements).await;

        self.finish_settle(result, payload_view, requirements_view, declared_extensions)
            .await
    }

    /// Settles a V1 payment with the full hook lifecycle.
    ///
    /// # Errors
    ///
    /// As [`Self::settle_payment`].
    pub async fn settle_payment_v1(
        &self,
        payload: &PaymentPayloadV1,
        requirements: &PaymentRequirementsV1,
    ) -> Result<SettleResponse, SchemeError> {
        if !self.initialized {
            return Err("Server not initialized. Call initialize() first.".into());
        }

        let payload_view = PayloadView::V1(Box::new(payload.clone()));
        let requirements_view = RequirementsView::V1(Box::new(requirements.clone()));

        let ctx = SettleContext {
            payment_payload: payload_view.clone(),
            requirements: requirements_view.clone(),
        };
        for hook in &self.before_settle_hooks {
            if let Some(abort) = hook(&ctx).await {
                return Ok(SettleResponse::error(
                    kind::SETTLEMENT_ABORTED,
                    requirements.network.clone(),
                )
                .with_message(abort.reason));
            }
        }

        let client = self.settle_client(1, &payload.network, &payload.scheme)?;
        let result = client.settle_v1(payload, requirements).await;

        self.finish_settle(result, payload_view, requirements_view, None)
            .await
    }

    /// Resolves the facilitator index for `(version, network, scheme)`.
    ///
    /// Probe order: exact key, then namespace-wildcard network, then
    /// scheme wildcard, then both wildcards.
    fn resolve_facilitator(&self, version: u32, network: &str, scheme: &str) -> Option<usize> {
        let namespace_wildcard = network
            .split(':')
            .next()
            .map(|ns| format!("{ns}:*"))
            .unwrap_or_default();

        let probes = [
            FacilitatorKey::new(version, network, scheme),
            FacilitatorKey::new(version, namespace_wildcard.clone(), scheme),
            FacilitatorKey::new(version, network, "*"),
            FacilitatorKey::new(version, namespace_wildcard, "*"),
        ];

        probes
            .iter()
            .find_map(|key| self.facilitator_map.get(key).copied())
    }

    /// Runs a verify call against the routed facilitator, falling through
    /// the remaining facilitators on transport error.
    async fn route_verify<'a, F>(
        &'a self,
        version: u32,
        network: &str,
        scheme: &str,
        call: F,
    ) -> Result<VerifyResponse, SchemeError>
    where
        F: Fn(&'a dyn FacilitatorClient) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>>,
    {
        if self.facilitator_clients.is_empty() {
            return Err(format!("{}: no facilitator clients registered", kind::NO_FACILITATOR_SUPPORT).into());
        }

        let routed = self.resolve_facilitator(version, network, scheme);

        let order: Vec<usize> = match routed {
            Some(first) => std::iter::once(first)
                .chain((0..self.facilitator_clients.len()).filter(|i| *i != first))
                .collect(),
            None => (0..self.facilitator_clients.len()).collect(),
        };

        let mut last_error: Option<SchemeError> = None;
        for idx in order {
            match call(self.facilitator_clients[idx].as_ref()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(facilitator = idx, error = %e, "facilitator verify errored, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            format!("{}: all facilitators failed", kind::NO_FACILITATOR_SUPPORT).into()
        }))
    }

    /// Picks the single facilitator used for settlement. Settlement never
    /// falls through to another facilitator after a failure.
    fn settle_client(
        &self,
        version: u32,
        network: &str,
        scheme: &str,
    ) -> Result<&dyn FacilitatorClient, SchemeError> {
        let idx = self
            .resolve_facilitator(version, network, scheme)
            .unwrap_or(0);
        self.facilitator_clients
            .get(idx)
            .map(AsRef::as_ref)
            .ok_or_else(|| -> SchemeError {
                format!("{}: no facilitator clients registered", kind::NO_FACILITATOR_SUPPORT)
                    .into()
            })
    }

    /// Shared post-verify hook handling for both protocol versions.
    async fn finish_verify(
        &self,
        result: Result<VerifyResponse, SchemeError>,
        payload_view: PayloadView,
        requirements_view: RequirementsView,
    ) -> Result<VerifyResponse, SchemeError> {
        match result {
            Ok(response) if response.is_valid => {
                let result_ctx = VerifyResultContext {
                    payment_payload: payload_view,
                    requirements: requirements_view,
                    result: response.clone(),
                };
                for hook in &self.after_verify_hooks {
                    hook(&result_ctx).await;
                }
                Ok(response)
            }
            Ok(response) => {
                let failure_ctx = VerifyFailureContext {
                    payment_payload: payload_view,
                    requirements: requirements_view,
                    error: response.invalid_reason.clone().unwrap_or_default(),
                };
                for hook in &self.on_verify_failure_hooks {
                    if let Some(recovered) = hook(&failure_ctx).await {
                        return Ok(recovered.result);
                    }
                }
                Ok(response)
            }
            Err(e) => {
                let failure_ctx = VerifyFailureContext {
                    payment_payload: payload_view,
                    requirements: requirements_view,
                    error: e.to_string(),
                };
                for hook in &self.on_verify_failure_hooks {
                    if let Some(recovered) = hook(&failure_ctx).await {
                        return Ok(recovered.result);
                    }
                }
                Err(e)
            }
        }
    }

    /// Shared post-settle hook and extension handling.
    async fn finish_settle(
        &self,
        result: Result<SettleResponse, SchemeError>,
        payload_view: PayloadView,
        requirements_view: RequirementsView,
        declared_extensions: Option<&Extensions>,
    ) -> Result<SettleResponse, SchemeError> {
        match result {
            Ok(response) if response.success => {
                let result_ctx = SettleResultContext {
                    payment_payload: payload_view,
                    requirements: requirements_view,
                    result: response.clone(),
                };
                for hook in &self.after_settle_hooks {
                    hook(&result_ctx).await;
                }
                Ok(self.enrich_settlement(response, declared_extensions))
            }
            Ok(response) => {
                let failure_ctx = SettleFailureContext {
                    payment_payload: payload_view,
                    requirements: requirements_view,
                    error: response.error_reason.clone().unwrap_or_default(),
                };
                for hook in &self.on_settle_failure_hooks {
                    if let Some(recovered) = hook(&failure_ctx).await {
                        return Ok(recovered.result);
                    }
                }
                Ok(response)
            }
            Err(e) => {
                let failure_ctx = SettleFailureContext {
                    payment_payload: payload_view,
                    requirements: requirements_view,
                    error: e.to_string(),
                };
                for hook in &self.on_settle_failure_hooks {
                    if let Some(recovered) = hook(&failure_ctx).await {
                        return Ok(recovered.result);
                    }
                }
                Err(e)
            }
        }
    }

    /// Grafts extension enrichment into a successful settlement response.
    fn enrich_settlement(
        &self,
        mut response: SettleResponse,
        declared_extensions: Option<&Extensions>,
    ) -> SettleResponse {
        let Some(declared) = declared_extensions else {
            return response;
        };

        let snapshot = response.clone();
        for (key, declaration) in declared {
            if let Some(ext) = self.extensions.get(key) {
                match ext.enrich_settlement_response(declaration, &snapshot) {
                    Ok(value) => {
                        response
                            .extensions
                            .get_or_insert_with(Extensions::default)
                            .insert(key.clone(), value);
                    }
                    Err(e) => {
                        tracing::warn!(extension = %key, error = %e, "settlement enrichment failed, skipping");
                    }
                }
            }
        }

        response
    }

    /// Looks up the scheme server for `(network, scheme)` with wildcard
    /// fallback on the network.
    fn find_scheme_server(&self, network: &str, scheme: &str) -> Option<&dyn SchemeServer> {
        if let Some(schemes) = self.schemes.get(network)
            && let Some(server) = schemes.get(scheme)
        {
            return Some(server.as_ref());
        }

        for (pattern, schemes) in &self.schemes {
            if matches_network_pattern(network, pattern)
                && let Some(server) = schemes.get(scheme)
            {
                return Some(server.as_ref());
            }
        }

        None
    }

    /// Enriches extension declarations with transport-specific data.
    ///
    /// For each declared key with a registered extension,
    /// [`ResourceServerExtension::enrich_declaration`] is invoked with the
    /// given transport context; failures are logged and skipped.
    #[must_use]
    pub fn enrich_extensions(&self, declarations: &Value, transport_context: &Value) -> Value {
        let Some(obj) = declarations.as_object() else {
            return declarations.clone();
        };

        let mut result = obj.clone();
        for (key, value) in obj {
            if let Some(ext) = self.extensions.get(key) {
                match ext.enrich_declaration(value, transport_context) {
                    Ok(enriched) => {
                        result.insert(key.clone(), enriched);
                    }
                    Err(e) => {
                        tracing::warn!(extension = %key, error = %e, "declaration enrichment failed, skipping");
                    }
                }
            }
        }

        Value::Object(result)
    }
}

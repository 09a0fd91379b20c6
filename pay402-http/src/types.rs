//! HTTP-specific types for the x402 resource server.
//!
//! Route configuration, dynamic pay-to/price resolution, request context,
//! and the processing result types exchanged between
//! [`super::server::HttpResourceServer`] and outer integrations.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::HeaderMap;
use pay402::proto::{
    Extensions, PaymentPayload, PaymentPayloadV1, PaymentRequirements, PaymentRequirementsV1,
};
use pay402::scheme::SchemeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Route configuration map: pattern → [`RouteConfig`].
///
/// Keys are route patterns like `"GET /weather"`, `"/api/*"` or
/// `"/files/**"`.
pub type RoutesConfig = HashMap<String, RouteConfig>;

/// Opaque request context handed to dynamic resolvers and hooks.
///
/// Carries the request line and headers; bodies are never exposed to the
/// payment layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method, uppercase.
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    /// Raw query string, when present.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Full URL of the requested resource.
    pub url: String,
}

/// Boxed async resolver used for dynamic `payTo` and `price` values.
pub type ResolverFn<T> = Arc<
    dyn for<'a> Fn(
            &'a RequestContext,
        ) -> Pin<Box<dyn Future<Output = Result<T, SchemeError>> + Send + 'a>>
        + Send
        + Sync,
>;

/// A configuration value that is either static or resolved per request.
///
/// Resolution happens once per request, at the moment the payment
/// requirements are constructed.
#[derive(Clone)]
pub enum Resolvable<T> {
    /// A fixed value.
    Value(T),
    /// A resolver invoked with the request context.
    Resolver(ResolverFn<T>),
}

impl<T: Clone> Resolvable<T> {
    /// Resolves the value for the given request.
    ///
    /// # Errors
    ///
    /// Propagates the resolver's error.
    pub async fn resolve(&self, ctx: &RequestContext) -> Result<T, SchemeError> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Resolver(f) => f(ctx).await,
        }
    }

    /// Creates a resolver-backed value from an async closure.
    pub fn resolver<F, Fut>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SchemeError>> + Send + 'static,
        T: 'static,
    {
        Self::Resolver(Arc::new(move |ctx| Box::pin(f(ctx))))
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Resolvable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Resolver(_) => f.debug_tuple("Resolver").field(&"<fn>").finish(),
        }
    }
}

impl From<&str> for Resolvable<String> {
    fn from(value: &str) -> Self {
        Self::Value(value.to_owned())
    }
}

impl From<String> for Resolvable<String> {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<Value> for Resolvable<Value> {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A payment option accepted by a protected route.
///
/// `pay_to` and `price` may be static values or per-request resolvers.
#[derive(Debug, Clone)]
pub struct PaymentOption {
    /// Payment scheme identifier (e.g. `"exact"`).
    pub scheme: String,

    /// CAIP-2 network identifier (e.g. `"eip155:8453"`).
    pub network: String,

    /// Recipient address.
    pub pay_to: Resolvable<String>,

    /// Price — a money string (`"1.50"`) or structured amount.
    pub price: Resolvable<Value>,

    /// Maximum payment validity in seconds (defaults to 300).
    pub max_timeout_seconds: Option<u64>,
}

impl PaymentOption {
    /// Creates a static payment option.
    #[must_use]
    pub fn new(
        scheme: impl Into<String>,
        network: impl Into<String>,
        pay_to: impl Into<Resolvable<String>>,
        price: impl Into<Resolvable<Value>>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            network: network.into(),
            pay_to: pay_to.into(),
            price: price.into(),
            max_timeout_seconds: None,
        }
    }
}

/// Configuration for a payment-protected route.
#[derive(Debug, Clone, Default)]
pub struct RouteConfig {
    /// Accepted payment options for this route.
    pub accepts: Vec<PaymentOption>,

    /// Override resource URL (defaults to the request URL).
    pub resource: Option<String>,

    /// Human-readable description of the resource.
    pub description: Option<String>,

    /// MIME type of the resource.
    pub mime_type: Option<String>,

    /// Extension declarations for this route, keyed by extension name.
    pub extensions: Option<Extensions>,
}

impl RouteConfig {
    /// Creates a route config with a single payment option.
    #[must_use]
    pub fn single(option: PaymentOption) -> Self {
        Self {
            accepts: vec![option],
            ..Self::default()
        }
    }

    /// Creates a route config with multiple payment options.
    #[must_use]
    pub fn multi(options: Vec<PaymentOption>) -> Self {
        Self {
            accepts: options,
            ..Self::default()
        }
    }

    /// Sets the resource URL override.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets the resource description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Declares an extension for this route.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, declaration: Value) -> Self {
        self.extensions
            .get_or_insert_with(Extensions::default)
            .insert(key.into(), declaration);
        self
    }
}

/// A verified payment of either protocol version.
#[derive(Debug, Clone)]
pub enum VerifiedPayment {
    /// V2 payment.
    V2 {
        /// The verified payload.
        payload: PaymentPayload,
        /// The matched requirements.
        requirements: PaymentRequirements,
    },
    /// V1 payment.
    V1 {
        /// The verified payload.
        payload: PaymentPayloadV1,
        /// The matched requirements.
        requirements: PaymentRequirementsV1,
    },
}

/// Everything the outer integration needs to settle after upstream success.
#[derive(Debug, Clone)]
pub struct SettleInstructions {
    /// The verified payment.
    pub payment: VerifiedPayment,
    /// Enriched extension declarations for the route.
    pub extensions: Option<Extensions>,
}

/// Result of processing an HTTP request through the payment layer.
///
/// Settlement is deliberately absent here: `process_http_request` never
/// settles. See [`super::server::HttpResourceServer::process_settlement`].
#[derive(Debug)]
pub enum ProcessResult {
    /// Route does not require payment — pass through.
    NoPaymentRequired,

    /// A protected-request hook granted access without payment.
    AccessGranted,

    /// Payment verified; settle with the carried instructions after the
    /// upstream handler succeeds.
    PaymentVerified(Box<SettleInstructions>),

    /// Payment missing or invalid — respond without calling upstream.
    PaymentError {
        /// HTTP status code (typically 402 or 500).
        status: u16,
        /// Response headers to include.
        headers: Vec<(String, String)>,
        /// Response body.
        body: String,
    },
}

/// Result of settlement processing after a successful upstream response.
#[derive(Debug, Clone)]
pub struct SettleResult {
    /// Whether settlement succeeded.
    pub success: bool,
    /// Error reason if settlement failed.
    pub error_reason: Option<String>,
    /// Headers to add to the response (e.g. `PAYMENT-RESPONSE`).
    pub headers: Vec<(String, String)>,
    /// Transaction hash/ID.
    pub transaction: Option<String>,
    /// Network identifier.
    pub network: Option<String>,
    /// Payer address.
    pub payer: Option<String>,
}

/// Paywall UI configuration for browser-facing 402 responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaywallConfig {
    /// Application name to display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    /// URL to the application logo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_logo: Option<String>,

    /// Whether this is a testnet deployment.
    #[serde(default)]
    pub testnet: bool,
}

/// A compiled route entry mapping a method + path pattern to its config.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRoute {
    /// HTTP method (uppercase) or `"*"` for any method.
    pub method: String,
    /// Path pattern (e.g. `/weather`, `/api/*`, `/files/**`).
    pub path_pattern: String,
    /// Whether the pattern contains no wildcards.
    pub is_literal: bool,
    /// Length of the literal prefix before the first wildcard, used to
    /// disambiguate between overlapping glob routes.
    pub literal_prefix_len: usize,
    /// Payment configuration for this route.
    pub config: RouteConfig,
}

impl CompiledRoute {
    pub fn new(pattern: &str, config: RouteConfig) -> Self {
        let (method, path) = parse_route_pattern(pattern);
        let is_literal = !path.contains('*');
        let literal_prefix_len = path.find('*').unwrap_or(path.len());
        Self {
            method,
            path_pattern: path,
            is_literal,
            literal_prefix_len,
            config,
        }
    }

    /// Checks whether this route matches the given method and path.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if self.method != "*" && !self.method.eq_ignore_ascii_case(method) {
            return false;
        }
        match_path_pattern(&self.path_pattern, path)
    }
}

/// Selects the best matching route: literal matches win over globs, and
/// among globs the longest literal prefix wins.
pub(crate) fn select_route<'a>(
    routes: &'a [CompiledRoute],
    method: &str,
    path: &str,
) -> Option<&'a CompiledRoute> {
    let mut best: Option<&CompiledRoute> = None;
    for route in routes.iter().filter(|r| r.matches(method, path)) {
        best = match best {
            None => Some(route),
            Some(current) => {
                let better = (route.is_literal, route.literal_prefix_len)
                    > (current.is_literal, current.literal_prefix_len);
                if better { Some(route) } else { Some(current) }
            }
        };
    }
    best
}

/// Glob-style path matching.
///
/// - `*` matches exactly one path segment
/// - `**` matches any suffix (must be the final pattern segment)
/// - literal segments compare case-insensitively
/// - a bare `*` pattern matches every path
pub(crate) fn match_path_pattern(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let path = path.split('?').next().unwrap_or(path);
    let pattern_segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let mut i = 0;
    for (idx, pattern_segment) in pattern_segments.iter().enumerate() {
        if *pattern_segment == "**" {
            // Suffix wildcard: everything from here on matches, including
            // the empty remainder.
            return idx == pattern_segments.len() - 1;
        }
        let Some(path_segment) = path_segments.get(i) else {
            return false;
        };
        if *pattern_segment != "*" && !pattern_segment.eq_ignore_ascii_case(path_segment) {
            return false;
        }
        i += 1;
    }

    i == path_segments.len()
}

/// Parses a route pattern string into method + path.
///
/// - `"GET /weather"` → method `GET`, path `/weather`
/// - `"/weather"` → method `*`, path `/weather`
/// - `"*"` → method `*`, path `*`
pub(crate) fn parse_route_pattern(pattern: &str) -> (String, String) {
    let trimmed = pattern.trim();
    if let Some((method, path)) = trimmed.split_once(char::is_whitespace) {
        (method.to_uppercase(), path.trim().to_owned())
    } else {
        ("*".to_owned(), trimmed.to_owned())
    }
}

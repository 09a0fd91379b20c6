//! x402 client core.
//!
//! [`X402Client`] holds the registry of scheme clients, filters the
//! advertised requirements through payment policies, picks one with the
//! configured selector (first registered match by default), and produces a
//! [`PaymentPayload`] whose `accepted` field is an exact copy of the chosen
//! requirement — the copy the server's V2 deep-equality match relies on.

use std::collections::HashMap;

use crate::error::{NoMatchingRequirementsError, SchemeNotFoundError};
use crate::proto::helpers::find_by_network;
use crate::proto::{
    Network, PaymentPayload, PaymentPayloadV1, PaymentRequired, PaymentRequiredV1,
    PaymentRequirements, PaymentRequirementsV1,
};
use crate::scheme::{SchemeClient, SchemeClientV1, SchemeError};

/// Policy function that filters and reorders requirements.
///
/// Takes the protocol version and the requirement views, returns the
/// filtered/reordered list. Policies run in registration order before the
/// selector.
pub type PaymentPolicy =
    Box<dyn Fn(u32, Vec<RequirementsView>) -> Vec<RequirementsView> + Send + Sync>;

/// Selector function that picks the final requirement from a filtered list.
pub type PaymentRequirementsSelector = Box<dyn Fn(u32, &[RequirementsView]) -> usize + Send + Sync>;

/// A version-agnostic view of payment requirements for use in policies.
#[derive(Debug, Clone)]
pub enum RequirementsView {
    /// V2 requirements.
    V2(PaymentRequirements),
    /// V1 requirements.
    V1(PaymentRequirementsV1),
}

impl RequirementsView {
    /// Returns the scheme identifier.
    #[must_use]
    pub fn scheme(&self) -> &str {
        match self {
            Self::V2(r) => &r.scheme,
            Self::V1(r) => &r.scheme,
        }
    }

    /// Returns the network identifier.
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            Self::V2(r) => &r.network,
            Self::V1(r) => &r.network,
        }
    }

    /// Returns the payment amount as a string.
    #[must_use]
    pub fn amount(&self) -> &str {
        match self {
            Self::V2(r) => r.amount(),
            Self::V1(r) => r.amount(),
        }
    }
}

/// Creates a policy that prefers a specific network.
///
/// Requirements matching the given network are placed first.
#[must_use]
pub fn prefer_network(network: Network) -> PaymentPolicy {
    Box::new(move |_version, reqs| {
        let (mut preferred, others): (Vec<_>, Vec<_>) =
            reqs.into_iter().partition(|r| r.network() == network);
        preferred.extend(others);
        preferred
    })
}

/// Creates a policy that prefers a specific scheme.
#[must_use]
pub fn prefer_scheme(scheme: String) -> PaymentPolicy {
    Box::new(move |_version, reqs| {
        let (mut preferred, others): (Vec<_>, Vec<_>) =
            reqs.into_iter().partition(|r| r.scheme() == scheme);
        preferred.extend(others);
        preferred
    })
}

/// Creates a policy that filters by maximum amount (in base units).
#[must_use]
pub fn max_amount(max_value: u128) -> PaymentPolicy {
    Box::new(move |_version, reqs| {
        reqs.into_iter()
            .filter(|r| r.amount().parse::<u128>().is_ok_and(|a| a <= max_value))
            .collect()
    })
}

/// Default selector: the first requirement in the filtered list.
const fn default_selector(_version: u32, _reqs: &[RequirementsView]) -> usize {
    0
}

/// x402 client with scheme registration, policy, and selection logic.
pub struct X402Client {
    schemes_v2: HashMap<Network, HashMap<String, Box<dyn SchemeClient>>>,
    schemes_v1: HashMap<Network, HashMap<String, Box<dyn SchemeClientV1>>>,
    policies: Vec<PaymentPolicy>,
    selector: PaymentRequirementsSelector,
}

impl std::fmt::Debug for X402Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Client")
            .field(
                "schemes_v2_networks",
                &self.schemes_v2.keys().collect::<Vec<_>>(),
            )
            .field(
                "schemes_v1_networks",
                &self.schemes_v1.keys().collect::<Vec<_>>(),
            )
            .field("policies_count", &self.policies.len())
            .finish_non_exhaustive()
    }
}

impl Default for X402Client {
    fn default() -> Self {
        Self::new()
    }
}

impl X402Client {
    /// Creates a client with the default (first-match) selector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemes_v2: HashMap::new(),
            schemes_v1: HashMap::new(),
            policies: Vec::new(),
            selector: Box::new(default_selector),
        }
    }

    /// Creates a client with a custom selector.
    #[must_use]
    pub fn with_selector(selector: PaymentRequirementsSelector) -> Self {
        Self {
            schemes_v2: HashMap::new(),
            schemes_v1: HashMap::new(),
            policies: Vec::new(),
            selector,
        }
    }

    /// Registers a V2 scheme client for a network or namespace wildcard.
    pub fn register(
        &mut self,
        network: impl Into<Network>,
        client: Box<dyn SchemeClient>,
    ) -> &mut Self {
        let scheme = client.scheme().to_owned();
        self.schemes_v2
            .entry(network.into())
            .or_default()
            .insert(scheme, client);
        self
    }

    /// Registers a V1 scheme client for a network.
    pub fn register_v1(
        &mut self,
        network: impl Into<Network>,
        client: Box<dyn SchemeClientV1>,
    ) -> &mut Self {
        let scheme = client.scheme().to_owned();
        self.schemes_v1
            .entry(network.into())
            .or_default()
            .insert(scheme, client);
        self
    }

    /// Adds a requirement filter policy.
    pub fn register_policy(&mut self, policy: PaymentPolicy) -> &mut Self {
        self.policies.push(policy);
        self
    }

    /// Selects V2 requirements using registered schemes, policies, and the
    /// selector.
    ///
    /// # Errors
    ///
    /// Returns [`NoMatchingRequirementsError`] if nothing survives.
    pub fn select_requirements(
        &self,
        requirements: &[PaymentRequirements],
    ) -> Result<PaymentRequirements, NoMatchingRequirementsError> {
        let supported: Vec<RequirementsView> = requirements
            .iter()
            .filter(|req| {
                find_by_network(&self.schemes_v2, &req.network)
                    .is_some_and(|schemes| schemes.contains_key(&req.scheme))
            })
            .cloned()
            .map(RequirementsView::V2)
            .collect();

        let filtered = self.apply_policies(2, supported)?;
        let idx = (self.selector)(2, &filtered);
        match filtered.into_iter().nth(idx) {
            Some(RequirementsView::V2(r)) => Ok(r),
            _ => Err(NoMatchingRequirementsError::new(
                "Selector returned invalid index",
            )),
        }
    }

    /// Selects V1 requirements using registered schemes, policies, and the
    /// selector.
    ///
    /// # Errors
    ///
    /// Returns [`NoMatchingRequirementsError`] if nothing survives.
    pub fn select_requirements_v1(
        &self,
        requirements: &[PaymentRequirementsV1],
    ) -> Result<PaymentRequirementsV1, NoMatchingRequirementsError> {
        let supported: Vec<RequirementsView> = requirements
            .iter()
            .filter(|req| {
                find_by_network(&self.schemes_v1, &req.network)
                    .is_some_and(|schemes| schemes.contains_key(&req.scheme))
            })
            .cloned()
            .map(RequirementsView::V1)
            .collect();

        let filtered = self.apply_policies(1, supported)?;
        let idx = (self.selector)(1, &filtered);
        match filtered.into_iter().nth(idx) {
            Some(RequirementsView::V1(r)) => Ok(r),
            _ => Err(NoMatchingRequirementsError::new(
                "Selector returned invalid index",
            )),
        }
    }

    /// Creates a V2 payment payload from a 402 response.
    ///
    /// The returned payload's `accepted` field is the chosen requirement
    /// copied verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if requirement selection or payload creation fails.
    pub async fn create_payment_payload(
        &self,
        payment_required: &PaymentRequired,
    ) -> Result<PaymentPayload, SchemeError> {
        let selected = self.select_requirements(&payment_required.accepts)?;

        let schemes = find_by_network(&self.schemes_v2, &selected.network)
            .ok_or_else(|| SchemeNotFoundError::new(&selected.scheme, &selected.network))?;

        let client = schemes
            .get(&selected.scheme)
            .ok_or_else(|| SchemeNotFoundError::new(&selected.scheme, &selected.network))?;

        let inner_payload = client.create_payment_payload(&selected).await?;

        Ok(PaymentPayload {
            x402_version: 2,
            payload: inner_payload,
            resource: payment_required.resource.clone(),
            extensions: None,
            accepted: selected,
        })
    }

    /// Creates a V1 payment payload from a V1 402 response.
    ///
    /// # Errors
    ///
    /// Returns an error if requirement selection or payload creation fails.
    pub async fn create_payment_payload_v1(
        &self,
        payment_required: &PaymentRequiredV1,
    ) -> Result<PaymentPayloadV1, SchemeError> {
        let selected = self.select_requirements_v1(&payment_required.accepts)?;

        let schemes = find_by_network(&self.schemes_v1, &selected.network)
            .ok_or_else(|| SchemeNotFoundError::new(&selected.scheme, &selected.network))?;

        let client = schemes
            .get(&selected.scheme)
            .ok_or_else(|| SchemeNotFoundError::new(&selected.scheme, &selected.network))?;

        let inner_payload = client.create_payment_payload(&selected).await?;

        Ok(PaymentPayloadV1 {
            x402_version: 1,
            scheme: selected.scheme,
            network: selected.network,
            payload: inner_payload,
        })
    }

    fn apply_policies(
        &self,
        version: u32,
        supported: Vec<RequirementsView>,
    ) -> Result<Vec<RequirementsView>, NoMatchingRequirementsError> {
        if supported.is_empty() {
            return Err(NoMatchingRequirementsError::new(
                "No payment requirements match registered schemes",
            ));
        }

        let mut filtered = supported;
        for policy in &self.policies {
            filtered = policy(version, filtered);
            if filtered.is_empty() {
                return Err(NoMatchingRequirementsError::new(
                    "All requirements filtered out by policies",
                ));
            }
        }
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::BoxFuture;
    use serde_json::Value;

    struct StubScheme {
        scheme: &'static str,
    }

    impl SchemeClient for StubScheme {
        fn scheme(&self) -> &str {
            self.scheme
        }

        fn create_payment_payload<'a>(
            &'a self,
            requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, Result<Value, SchemeError>> {
            let network = requirements.network.clone();
            Box::pin(async move { Ok(serde_json::json!({"signedFor": network})) })
        }
    }

    fn requirement(network: &str, amount: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: network.into(),
            amount: amount.into(),
            pay_to: "0xPAY".into(),
            max_timeout_seconds: 300,
            asset: "0xUSDC".into(),
            extra: None,
        }
    }

    fn payment_required(accepts: Vec<PaymentRequirements>) -> PaymentRequired {
        PaymentRequired {
            x402_version: 2,
            error: None,
            resource: None,
            accepts,
            extensions: None,
        }
    }

    #[tokio::test]
    async fn accepted_is_exact_copy_of_selection() {
        let mut client = X402Client::new();
        client.register("eip155:*", Box::new(StubScheme { scheme: "exact" }));

        let required = payment_required(vec![requirement("eip155:8453", "1000000")]);
        let payload = client.create_payment_payload(&required).await.unwrap();

        assert_eq!(payload.accepted, required.accepts[0]);
        assert_eq!(payload.x402_version, 2);
    }

    #[tokio::test]
    async fn default_selector_picks_first_registered() {
        let mut client = X402Client::new();
        client.register("eip155:8453", Box::new(StubScheme { scheme: "exact" }));

        // First entry is on an unregistered network; selection skips it.
        let required = payment_required(vec![
            requirement("solana:mainnet", "5"),
            requirement("eip155:8453", "1000000"),
        ]);
        let payload = client.create_payment_payload(&required).await.unwrap();
        assert_eq!(payload.accepted.network, "eip155:8453");
    }

    #[tokio::test]
    async fn policies_filter_before_selection() {
        let mut client = X402Client::new();
        client.register("eip155:*", Box::new(StubScheme { scheme: "exact" }));
        client.register_policy(max_amount(500_000));

        let required = payment_required(vec![
            requirement("eip155:8453", "1000000"),
            requirement("eip155:84532", "100"),
        ]);
        let payload = client.create_payment_payload(&required).await.unwrap();
        assert_eq!(payload.accepted.network, "eip155:84532");
    }

    #[tokio::test]
    async fn no_registered_scheme_errors() {
        let client = X402Client::new();
        let required = payment_required(vec![requirement("eip155:8453", "1")]);
        assert!(client.create_payment_payload(&required).await.is_err());
    }
}

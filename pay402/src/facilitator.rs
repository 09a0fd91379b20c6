//! In-process facilitator backed by scheme handlers.
//!
//! [`LocalFacilitator`] implements [`FacilitatorClient`] over registered
//! [`SchemeFacilitator`] instances, routing each request by the payload's
//! `(scheme, network)`. It lets a resource server verify and settle
//! without a remote facilitator service — the deployment shape used in
//! tests and self-hosted setups.

use std::collections::HashMap;

use crate::error::kind;
use crate::proto::helpers::matches_network_pattern;
use crate::proto::{
    PaymentPayload, PaymentRequirements, SettleResponse, SupportedResponse, VerifyResponse,
};
use crate::scheme::{BoxFuture, SchemeError, SchemeFacilitator};
use crate::server::FacilitatorClient;

/// A facilitator that runs scheme handlers in-process.
pub struct LocalFacilitator {
    handlers: Vec<Box<dyn SchemeFacilitator>>,
}

impl std::fmt::Debug for LocalFacilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFacilitator")
            .field("handlers_count", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl Default for LocalFacilitator {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFacilitator {
    /// Creates an empty local facilitator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Registers a scheme handler. Handlers are probed in registration
    /// order; the first whose scheme and CAIP family match wins.
    pub fn register(&mut self, handler: Box<dyn SchemeFacilitator>) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    /// Builder-style [`Self::register`].
    #[must_use]
    pub fn with_handler(mut self, handler: Box<dyn SchemeFacilitator>) -> Self {
        self.handlers.push(handler);
        self
    }

    fn find_handler(&self, scheme: &str, network: &str) -> Option<&dyn SchemeFacilitator> {
        self.handlers
            .iter()
            .find(|h| h.scheme() == scheme && matches_network_pattern(network, &h.caip_family()))
            .map(AsRef::as_ref)
    }
}

impl FacilitatorClient for LocalFacilitator {
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        Box::pin(async move {
            match self.find_handler(payload.scheme(), payload.network()) {
                Some(handler) => Ok(handler.verify(payload, requirements).await),
                None => Ok(VerifyResponse::invalid(kind::UNSUPPORTED_SCHEME)),
            }
        })
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        Box::pin(async move {
            match self.find_handler(payload.scheme(), payload.network()) {
                Some(handler) => Ok(handler.settle(payload, requirements).await),
                None => Ok(SettleResponse::error(
                    kind::UNSUPPORTED_SCHEME,
                    payload.network().to_owned(),
                )),
            }
        })
    }

    fn get_supported(&self) -> BoxFuture<'_, Result<SupportedResponse, SchemeError>> {
        Box::pin(async move {
            let mut kinds = Vec::new();
            let mut signers: HashMap<String, Vec<String>> = HashMap::new();
            for handler in &self.handlers {
                kinds.extend(handler.supported_kinds());
                signers
                    .entry(handler.caip_family())
                    .or_insert_with(|| handler.signer_addresses());
            }
            Ok(SupportedResponse {
                kinds,
                extensions: Vec::new(),
                signers,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::SupportedKind;

    struct AlwaysValid;

    impl SchemeFacilitator for AlwaysValid {
        fn scheme(&self) -> &str {
            "exact"
        }

        fn caip_family(&self) -> String {
            "eip155:*".into()
        }

        fn supported_kinds(&self) -> Vec<SupportedKind> {
            vec![SupportedKind {
                x402_version: 2,
                scheme: "exact".into(),
                network: "eip155:*".into(),
                extra: None,
            }]
        }

        fn signer_addresses(&self) -> Vec<String> {
            vec!["0xSIGNER".into()]
        }

        fn verify<'a>(
            &'a self,
            _payload: &'a PaymentPayload,
            _requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, VerifyResponse> {
            Box::pin(async { VerifyResponse::valid("0xPAYER") })
        }

        fn settle<'a>(
            &'a self,
            payload: &'a PaymentPayload,
            _requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, SettleResponse> {
            let network = payload.network().to_owned();
            Box::pin(async move { SettleResponse::success("0xTX", network, "0xPAYER") })
        }
    }

    fn payload(network: &str) -> PaymentPayload {
        PaymentPayload {
            x402_version: 2,
            accepted: PaymentRequirements {
                scheme: "exact".into(),
                network: network.into(),
                amount: "1".into(),
                pay_to: "0xPAY".into(),
                max_timeout_seconds: 300,
                asset: "0xUSDC".into(),
                extra: None,
            },
            payload: serde_json::json!({}),
            resource: None,
            extensions: None,
        }
    }

    #[tokio::test]
    async fn routes_by_scheme_and_family() {
        let facilitator = LocalFacilitator::new().with_handler(Box::new(AlwaysValid));

        let p = payload("eip155:8453");
        let response = facilitator.verify(&p, &p.accepted.clone()).await.unwrap();
        assert!(response.is_valid);

        let p = payload("solana:mainnet");
        let response = facilitator.verify(&p, &p.accepted.clone()).await.unwrap();
        assert!(!response.is_valid);
        assert_eq!(response.invalid_reason.as_deref(), Some("unsupported_scheme"));
    }

    #[tokio::test]
    async fn aggregates_supported_kinds_and_signers() {
        let facilitator = LocalFacilitator::new().with_handler(Box::new(AlwaysValid));
        let supported = facilitator.get_supported().await.unwrap();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.signers["eip155:*"], vec!["0xSIGNER".to_owned()]);
    }
}

//! Facilitator-side verification and settlement for the "exact" scheme.
//!
//! [`ExactEvmFacilitator`] implements [`SchemeFacilitator`] for one EVM
//! chain. Verification is a pure function of the payload, the requirements
//! and chain reads; settlement re-verifies and then submits the transfer.
//! Both are idempotent per `(payload, requirements)` thanks to EIP-3009 /
//! Permit2 nonces: a second settlement of the same authorization reverts
//! on-chain instead of double-charging.

mod contract;
mod error;
mod settle;
mod signature;
mod verify;

pub use contract::{IEIP3009, IERC20, IValidator6492, IX402Permit2Proxy};
pub use error::ExactEvmError;
pub use signature::{StructuredSignature, StructuredSignatureError};

use alloy_provider::Provider;
use pay402::proto::{
    PaymentPayload, PaymentRequirements, SettleResponse, SupportedKind, VerifyResponse,
};
use pay402::scheme::{BoxFuture, SchemeFacilitator};

use crate::chain::Eip155ChainReference;
use crate::exact::types::{ExactPayload, SCHEME_EXACT};

/// Default clock skew tolerance for `validBefore` (seconds).
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 6;

/// Facilitator for "exact" payments on a single EVM chain.
///
/// The provider must carry a wallet filler for settlement transactions.
pub struct ExactEvmFacilitator<P> {
    provider: P,
    chain: Eip155ChainReference,
    signer_addresses: Vec<String>,
    clock_skew_secs: u64,
    deploy_smart_wallets: bool,
}

impl<P> std::fmt::Debug for ExactEvmFacilitator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExactEvmFacilitator")
            .field("chain", &self.chain)
            .field("signer_addresses", &self.signer_addresses)
            .finish_non_exhaustive()
    }
}

impl<P> ExactEvmFacilitator<P> {
    /// Creates a facilitator for the given chain.
    pub fn new(provider: P, chain: Eip155ChainReference, signer_addresses: Vec<String>) -> Self {
        Self {
            provider,
            chain,
            signer_addresses,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            deploy_smart_wallets: true,
        }
    }

    /// Overrides the clock skew tolerance.
    #[must_use]
    pub const fn with_clock_skew(mut self, secs: u64) -> Self {
        self.clock_skew_secs = secs;
        self
    }

    /// Configures whether counterfactual smart wallets are deployed during
    /// settlement. When disabled, EIP-6492 payments against undeployed
    /// wallets fail to settle.
    #[must_use]
    pub const fn with_smart_wallet_deployment(mut self, enabled: bool) -> Self {
        self.deploy_smart_wallets = enabled;
        self
    }

    fn parse_payload(payload: &PaymentPayload) -> Result<ExactPayload, ExactEvmError> {
        serde_json::from_value(payload.payload.clone())
            .map_err(|e| ExactEvmError::InvalidPayload(e.to_string()))
    }
}

impl<P> SchemeFacilitator for ExactEvmFacilitator<P>
where
    P: Provider + Send + Sync + 'static,
{
    fn scheme(&self) -> &str {
        SCHEME_EXACT
    }

    fn caip_family(&self) -> String {
        "eip155:*".into()
    }

    fn supported_kinds(&self) -> Vec<SupportedKind> {
        vec![SupportedKind {
            x402_version: 2,
            scheme: SCHEME_EXACT.into(),
            network: self.chain.to_string(),
            extra: None,
        }]
    }

    fn signer_addresses(&self) -> Vec<String> {
        self.signer_addresses.clone()
    }

    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, VerifyResponse> {
        Box::pin(async move {
            let exact = match Self::parse_payload(payload) {
                Ok(exact) => exact,
                Err(e) => {
                    return VerifyResponse::invalid(e.kind()).with_message(e.to_string());
                }
            };
            let payer = exact.from_address().to_string();

            let result = match &exact {
                ExactPayload::Eip3009(eip3009) => verify::verify_eip3009(
                    &self.provider,
                    &self.chain,
                    eip3009,
                    payload,
                    requirements,
                    self.clock_skew_secs,
                )
                .await
                .map(|(payer, _, _)| payer),
                ExactPayload::Permit2(permit2) => verify::verify_permit2(
                    &self.provider,
                    &self.chain,
                    permit2,
                    payload,
                    requirements,
                    self.clock_skew_secs,
                )
                .await
                .map(|(payer, _)| payer),
            };

            match result {
                Ok(address) => VerifyResponse::valid(address.to_string()),
                Err(e) => {
                    tracing::debug!(error = %e, kind = e.kind(), "exact payment verification failed");
                    VerifyResponse::invalid(e.kind())
                        .with_message(e.to_string())
                        .with_payer(payer)
                }
            }
        })
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, SettleResponse> {
        Box::pin(async move {
            let network = requirements.network.clone();

            let exact = match Self::parse_payload(payload) {
                Ok(exact) => exact,
                Err(e) => {
                    return SettleResponse::error(e.kind(), network).with_message(e.to_string());
                }
            };

            // Settlement re-verifies: the payload may have expired or been
            // spent since the verify turn.
            let result = match &exact {
                ExactPayload::Eip3009(eip3009) => {
                    match verify::verify_eip3009(
                        &self.provider,
                        &self.chain,
                        eip3009,
                        payload,
                        requirements,
                        self.clock_skew_secs,
                    )
                    .await
                    {
                        Ok((payer, domain, signature)) => settle::settle_eip3009(
                            &self.provider,
                            eip3009,
                            &domain,
                            signature,
                            eip3009_asset(requirements),
                            self.deploy_smart_wallets,
                        )
                        .await
                        .map(|tx| (payer, tx)),
                        Err(e) => Err(e),
                    }
                }
                ExactPayload::Permit2(permit2) => {
                    match verify::verify_permit2(
                        &self.provider,
                        &self.chain,
                        permit2,
                        payload,
                        requirements,
                        self.clock_skew_secs,
                    )
                    .await
                    {
                        Ok((payer, _signature)) => settle::settle_permit2(&self.provider, permit2)
                            .await
                            .map(|tx| (payer, tx)),
                        Err(e) => Err(e),
                    }
                }
            };

            match result {
                Ok((payer, tx_hash)) => {
                    SettleResponse::success(tx_hash.to_string(), network, payer.to_string())
                }
                Err(e) => {
                    tracing::warn!(error = %e, kind = e.kind(), "exact payment settlement failed");
                    SettleResponse::error(e.kind(), network).with_message(e.to_string())
                }
            }
        })
    }
}

/// Parses the requirement's asset address; verification has already
/// validated it.
fn eip3009_asset(requirements: &PaymentRequirements) -> alloy_primitives::Address {
    requirements.asset.parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TokenAmount;
    use crate::exact::types::{Eip3009Authorization, Eip3009Payload};
    use alloy_primitives::{Address, B256, Bytes};
    use pay402::timestamp::UnixTimestamp;

    fn facilitator() -> ExactEvmFacilitator<impl Provider> {
        let provider = alloy_provider::ProviderBuilder::new()
            .connect_http("http://127.0.0.1:1".parse().unwrap());
        ExactEvmFacilitator::new(
            provider,
            Eip155ChainReference::new(8453),
            vec!["0xFacilitator".into()],
        )
    }

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:8453".into(),
            amount: "1000000".into(),
            pay_to: format!("{}", Address::repeat_byte(0x22)),
            max_timeout_seconds: 300,
            asset: format!("{}", Address::repeat_byte(0x33)),
            extra: None,
        }
    }

    fn payload_with(authorization: Eip3009Authorization) -> PaymentPayload {
        let exact = ExactPayload::Eip3009(Eip3009Payload {
            signature: Bytes::from(vec![0x01; 65]),
            authorization,
        });
        PaymentPayload {
            x402_version: 2,
            accepted: requirements(),
            payload: serde_json::to_value(exact).unwrap(),
            resource: None,
            extensions: None,
        }
    }

    #[tokio::test]
    async fn recipient_mismatch_kind() {
        let facilitator = facilitator();
        let now = UnixTimestamp::now();
        let payload = payload_with(Eip3009Authorization {
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x99),
            value: TokenAmount::from(1_000_000u64),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(now.as_secs() + 300),
            nonce: B256::repeat_byte(0x42),
        });

        let response = facilitator.verify(&payload, &requirements()).await;
        assert!(!response.is_valid);
        assert_eq!(
            response.invalid_reason.as_deref(),
            Some("invalid_exact_evm_payload_recipient_mismatch")
        );
    }

    #[tokio::test]
    async fn expired_authorization_kind() {
        let facilitator = facilitator();
        let payload = payload_with(Eip3009Authorization {
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x22),
            value: TokenAmount::from(1_000_000u64),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(1),
            nonce: B256::repeat_byte(0x42),
        });

        let response = facilitator.verify(&payload, &requirements()).await;
        assert_eq!(
            response.invalid_reason.as_deref(),
            Some("invalid_exact_evm_payload_authorization_valid_before")
        );
    }

    #[tokio::test]
    async fn insufficient_value_kind() {
        let facilitator = facilitator();
        let now = UnixTimestamp::now();
        let payload = payload_with(Eip3009Authorization {
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x22),
            value: TokenAmount::from(10u64),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(now.as_secs() + 300),
            nonce: B256::repeat_byte(0x42),
        });

        let response = facilitator.verify(&payload, &requirements()).await;
        assert_eq!(
            response.invalid_reason.as_deref(),
            Some("invalid_exact_evm_payload_authorization_value")
        );
    }

    #[tokio::test]
    async fn malformed_payload_kind() {
        let facilitator = facilitator();
        let payload = PaymentPayload {
            x402_version: 2,
            accepted: requirements(),
            payload: serde_json::json!({"not": "an exact payload"}),
            resource: None,
            extensions: None,
        };

        let response = facilitator.verify(&payload, &requirements()).await;
        assert_eq!(
            response.invalid_reason.as_deref(),
            Some("invalid_exact_evm_payload")
        );
    }

    #[test]
    fn advertises_its_chain() {
        let facilitator = facilitator();
        let kinds = facilitator.supported_kinds();
        assert_eq!(kinds.len(), 1);
        assert_eq!(kinds[0].network, "eip155:8453");
        assert_eq!(facilitator.caip_family(), "eip155:*");
    }
}

//! Buyer-side payment signing for the EVM "exact" scheme.
//!
//! [`ExactEvmClient`] implements [`SchemeClient`]: given the accepted
//! requirements it selects the transfer method from
//! `extra.assetTransferMethod` (EIP-3009 by default), builds the
//! authorization with its validity window, and signs the EIP-712 typed
//! data.

use alloy_primitives::{Address, B256, Bytes, FixedBytes, Signature, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain};
use pay402::proto::PaymentRequirements;
use pay402::scheme::{BoxFuture, SchemeClient, SchemeError};
use pay402::timestamp::UnixTimestamp;
use rand::RngExt;
use rand::rng;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::chain::{Eip155ChainReference, TokenAmount};
use crate::exact::types::{
    AssetTransferMethod, Eip3009Authorization, Eip3009Payload, ExactPayload, PERMIT2_ADDRESS,
    PaymentRequirementsExtra, Permit2Authorization, Permit2Payload, Permit2TokenPermissions,
    Permit2Witness, PermitWitnessTransferFrom, SCHEME_EXACT, TokenPermissions as SolTokenPermissions,
    TransferWithAuthorization, Witness as SolWitness, X402_PERMIT2_PROXY,
};

/// Clock slack subtracted from `validAfter` so a freshly signed payment is
/// immediately valid even across skewed clocks.
const VALID_AFTER_SLACK_SECS: u64 = 10 * 60;

/// Abstracts signing so both owned signers and `Arc`-shared signers work.
///
/// Alloy's `Signer` trait is not implemented for `Arc<T>`, but callers
/// often share one signer across scheme clients.
pub trait SignerLike: Send + Sync {
    /// Returns the signer's address.
    fn address(&self) -> Address;

    /// Signs the given 32-byte hash.
    fn sign_hash(
        &self,
        hash: &FixedBytes<32>,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: SignerLike + Send + Sync> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Parameters for signing an ERC-3009 authorization.
#[derive(Debug, Clone)]
pub struct Eip3009SigningParams {
    /// Numeric EIP-155 chain ID.
    pub chain_id: u64,
    /// Token contract address (EIP-712 verifying contract).
    pub asset_address: Address,
    /// Recipient address.
    pub pay_to: Address,
    /// Transfer amount.
    pub amount: U256,
    /// Authorization validity window in seconds.
    pub max_timeout_seconds: u64,
    /// EIP-712 domain name/version of the token.
    pub extra: Option<PaymentRequirementsExtra>,
}

/// Signs an ERC-3009 `TransferWithAuthorization` as EIP-712 typed data.
///
/// The authorization window is `now - 600s … now + max_timeout_seconds`
/// with a random 32-byte nonce.
///
/// # Errors
///
/// Returns an error if signing fails.
pub async fn sign_erc3009_authorization<S: SignerLike + Sync>(
    signer: &S,
    params: &Eip3009SigningParams,
) -> Result<Eip3009Payload, SchemeError> {
    let (name, version) = params.extra.as_ref().map_or_else(
        || (String::new(), String::new()),
        |extra| (extra.name.clone(), extra.version.clone()),
    );

    let domain = eip712_domain! {
        name: name,
        version: version,
        chain_id: params.chain_id,
        verifying_contract: params.asset_address,
    };

    let now = UnixTimestamp::now();
    let valid_after = UnixTimestamp::from_secs(now.as_secs().saturating_sub(VALID_AFTER_SLACK_SECS));
    let valid_before = now + params.max_timeout_seconds;
    let nonce: [u8; 32] = rng().random();
    let nonce = B256::from(nonce);

    let authorization = Eip3009Authorization {
        from: signer.address(),
        to: params.pay_to,
        value: TokenAmount(params.amount),
        valid_after,
        valid_before,
        nonce,
    };

    // The facilitator reconstructs this struct from the wire
    // authorization; the values must line up exactly.
    let transfer_with_authorization = TransferWithAuthorization {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.into(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
    };

    let eip712_hash = transfer_with_authorization.eip712_signing_hash(&domain);
    let signature = signer
        .sign_hash(&eip712_hash)
        .await
        .map_err(|e| -> SchemeError { format!("EIP-712 signing failed: {e}").into() })?;

    Ok(Eip3009Payload {
        signature: signature.as_bytes().into(),
        authorization,
    })
}

/// Parameters for signing a Permit2 authorization.
#[derive(Debug, Clone, Copy)]
pub struct Permit2SigningParams {
    /// Numeric EIP-155 chain ID.
    pub chain_id: u64,
    /// Token contract address.
    pub asset_address: Address,
    /// Recipient address, bound into the witness.
    pub pay_to: Address,
    /// Transfer amount.
    pub amount: U256,
    /// Authorization validity window in seconds.
    pub max_timeout_seconds: u64,
}

/// Signs a Permit2 `PermitWitnessTransferFrom` as EIP-712 typed data.
///
/// The domain is the canonical Permit2 domain (name `"Permit2"`, no
/// version); `spender` is the deterministic proxy address, the recipient
/// is bound via `witness.to`, and the nonce is a random 256-bit integer.
///
/// # Errors
///
/// Returns an error if signing fails.
pub async fn sign_permit2_authorization<S: SignerLike + Sync>(
    signer: &S,
    params: &Permit2SigningParams,
) -> Result<Permit2Payload, SchemeError> {
    let domain = eip712_domain! {
        name: "Permit2",
        chain_id: params.chain_id,
        verifying_contract: PERMIT2_ADDRESS,
    };

    let now = UnixTimestamp::now();
    let valid_after_secs = now.as_secs().saturating_sub(VALID_AFTER_SLACK_SECS);
    let deadline_secs = now.as_secs() + params.max_timeout_seconds;

    let nonce_bytes: [u8; 32] = rng().random();
    let nonce = U256::from_be_bytes(nonce_bytes);

    let permit_witness = PermitWitnessTransferFrom {
        permitted: SolTokenPermissions {
            token: params.asset_address,
            amount: params.amount,
        },
        spender: X402_PERMIT2_PROXY,
        nonce,
        deadline: U256::from(deadline_secs),
        witness: SolWitness {
            to: params.pay_to,
            validAfter: U256::from(valid_after_secs),
            extra: Bytes::new(),
        },
    };

    let eip712_hash = permit_witness.eip712_signing_hash(&domain);
    let signature = signer
        .sign_hash(&eip712_hash)
        .await
        .map_err(|e| -> SchemeError { format!("EIP-712 signing failed: {e}").into() })?;

    Ok(Permit2Payload {
        signature: signature.as_bytes().into(),
        permit2_authorization: Permit2Authorization {
            from: signer.address(),
            permitted: Permit2TokenPermissions {
                token: params.asset_address,
                amount: TokenAmount(params.amount),
            },
            spender: X402_PERMIT2_PROXY,
            nonce: TokenAmount(nonce),
            deadline: TokenAmount::from(deadline_secs),
            witness: Permit2Witness {
                to: params.pay_to,
                valid_after: TokenAmount::from(valid_after_secs),
                extra: Bytes::new(),
            },
        },
    })
}

/// Scheme client signing EVM "exact" payments.
#[derive(Debug)]
pub struct ExactEvmClient<S> {
    signer: S,
}

impl<S> ExactEvmClient<S> {
    /// Creates a client with the given signer.
    pub const fn new(signer: S) -> Self {
        Self { signer }
    }
}

impl<S> SchemeClient for ExactEvmClient<S>
where
    S: SignerLike + 'static,
{
    fn scheme(&self) -> &str {
        SCHEME_EXACT
    }

    fn create_payment_payload<'a>(
        &'a self,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<Value, SchemeError>> {
        Box::pin(async move {
            let chain = Eip155ChainReference::try_from(requirements.network.as_str())?;
            let asset_address: Address = requirements
                .asset
                .parse()
                .map_err(|_| -> SchemeError {
                    format!("invalid asset address: {}", requirements.asset).into()
                })?;
            let pay_to: Address = requirements
                .pay_to
                .parse()
                .map_err(|_| -> SchemeError {
                    format!("invalid payTo address: {}", requirements.pay_to).into()
                })?;
            let amount: TokenAmount = requirements
                .amount
                .parse()
                .map_err(|_| -> SchemeError {
                    format!("invalid amount: {}", requirements.amount).into()
                })?;
            let extra: Option<PaymentRequirementsExtra> = requirements
                .extra
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok());

            let use_permit2 = extra
                .as_ref()
                .and_then(|e| e.asset_transfer_method)
                == Some(AssetTransferMethod::Permit2);

            let payload = if use_permit2 {
                let params = Permit2SigningParams {
                    chain_id: chain.inner(),
                    asset_address,
                    pay_to,
                    amount: amount.into(),
                    max_timeout_seconds: requirements.max_timeout_seconds,
                };
                ExactPayload::Permit2(sign_permit2_authorization(&self.signer, &params).await?)
            } else {
                let params = Eip3009SigningParams {
                    chain_id: chain.inner(),
                    asset_address,
                    pay_to,
                    amount: amount.into(),
                    max_timeout_seconds: requirements.max_timeout_seconds,
                    extra,
                };
                ExactPayload::Eip3009(sign_erc3009_authorization(&self.signer, &params).await?)
            };

            Ok(serde_json::to_value(payload)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements(extra: Option<Value>) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:84532".into(),
            amount: "1000000".into(),
            pay_to: "0x2222222222222222222222222222222222222222".into(),
            max_timeout_seconds: 300,
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".into(),
            extra,
        }
    }

    #[tokio::test]
    async fn signs_eip3009_by_default() {
        let signer = PrivateKeySigner::random();
        let signer_address = SignerLike::address(&signer);
        let client = ExactEvmClient::new(signer);

        let value = client
            .create_payment_payload(&requirements(Some(
                serde_json::json!({"name": "USDC", "version": "2"}),
            )))
            .await
            .unwrap();
        let payload: ExactPayload = serde_json::from_value(value).unwrap();

        let ExactPayload::Eip3009(eip3009) = payload else {
            panic!("expected EIP-3009 payload");
        };
        assert_eq!(eip3009.authorization.from, signer_address);
        assert_eq!(
            eip3009.authorization.to.to_string().to_lowercase(),
            "0x2222222222222222222222222222222222222222"
        );
        assert_eq!(eip3009.authorization.value, TokenAmount::from(1_000_000u64));
        assert!(eip3009.authorization.valid_before > eip3009.authorization.valid_after);
        assert_eq!(eip3009.signature.len(), 65);
    }

    #[tokio::test]
    async fn eip3009_signature_recovers_signer() {
        let signer = PrivateKeySigner::random();
        let signer_address = SignerLike::address(&signer);

        let params = Eip3009SigningParams {
            chain_id: 84532,
            asset_address: Address::repeat_byte(0x11),
            pay_to: Address::repeat_byte(0x22),
            amount: U256::from(1_000_000u64),
            max_timeout_seconds: 300,
            extra: Some(PaymentRequirementsExtra {
                name: "USDC".into(),
                version: "2".into(),
                asset_transfer_method: None,
            }),
        };
        let payload = sign_erc3009_authorization(&signer, &params).await.unwrap();

        let domain = eip712_domain! {
            name: "USDC",
            version: "2",
            chain_id: 84532,
            verifying_contract: Address::repeat_byte(0x11),
        };
        let message = TransferWithAuthorization {
            from: payload.authorization.from,
            to: payload.authorization.to,
            value: payload.authorization.value.into(),
            validAfter: U256::from(payload.authorization.valid_after.as_secs()),
            validBefore: U256::from(payload.authorization.valid_before.as_secs()),
            nonce: payload.authorization.nonce,
        };
        let hash = message.eip712_signing_hash(&domain);

        let signature = Signature::from_raw(&payload.signature).unwrap();
        let recovered = signature.recover_address_from_prehash(&hash).unwrap();
        assert_eq!(recovered, signer_address);
    }

    #[tokio::test]
    async fn permit2_flow_binds_recipient_and_spender() {
        let signer = PrivateKeySigner::random();
        let client = ExactEvmClient::new(signer);

        let value = client
            .create_payment_payload(&requirements(Some(
                serde_json::json!({"name": "", "version": "", "assetTransferMethod": "permit2"}),
            )))
            .await
            .unwrap();
        let payload: ExactPayload = serde_json::from_value(value).unwrap();

        let ExactPayload::Permit2(permit2) = payload else {
            panic!("expected Permit2 payload");
        };
        let auth = &permit2.permit2_authorization;
        assert_eq!(auth.spender, X402_PERMIT2_PROXY);
        assert_eq!(
            auth.witness.to.to_string().to_lowercase(),
            "0x2222222222222222222222222222222222222222"
        );
        assert_eq!(auth.permitted.amount, TokenAmount::from(1_000_000u64));
    }
}

//! Verification for the "exact" facilitator.
//!
//! Pure precondition checks run first (scheme, network, recipient, time
//! bounds, value) so a bad payload is rejected before any RPC round-trip;
//! chain reads (domain, balance, allowance) and signature validation follow.

use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain};
use pay402::proto::{PaymentPayload, PaymentRequirements};
use pay402::timestamp::UnixTimestamp;

use super::contract::{IEIP3009, IERC20, IValidator6492};
use super::error::ExactEvmError;
use super::signature::StructuredSignature;
use crate::chain::Eip155ChainReference;
use crate::exact::types::{
    Eip3009Payload, PERMIT2_ADDRESS, PaymentRequirementsExtra, Permit2Payload,
    PermitWitnessTransferFrom, SCHEME_EXACT, TokenPermissions as SolTokenPermissions,
    TransferWithAuthorization, VALIDATOR_ADDRESS, Witness as SolWitness, X402_PERMIT2_PROXY,
};

/// Parsed requirement fields shared by both transfer methods.
pub(super) struct RequiredPayment {
    pub pay_to: Address,
    pub asset: Address,
    pub amount: U256,
}

/// Validates scheme and network agreement between the payload, the
/// requirements, and this facilitator's chain, then parses the typed
/// requirement fields.
pub(super) fn assert_requirements(
    chain: &Eip155ChainReference,
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<RequiredPayment, ExactEvmError> {
    if requirements.scheme != SCHEME_EXACT || payload.accepted.scheme != SCHEME_EXACT {
        return Err(ExactEvmError::UnsupportedScheme);
    }

    let required_chain = Eip155ChainReference::try_from(requirements.network.as_str())
        .map_err(|_| ExactEvmError::NetworkMismatch)?;
    if required_chain != *chain || payload.accepted.network != requirements.network {
        return Err(ExactEvmError::NetworkMismatch);
    }

    let pay_to: Address = requirements
        .pay_to
        .parse()
        .map_err(|_| ExactEvmError::InvalidPayload("invalid payTo address".into()))?;
    let asset: Address = requirements
        .asset
        .parse()
        .map_err(|_| ExactEvmError::InvalidPayload("invalid asset address".into()))?;
    let amount: crate::chain::TokenAmount = requirements
        .amount
        .parse()
        .map_err(|_| ExactEvmError::InvalidPayload("invalid amount".into()))?;

    Ok(RequiredPayment {
        pay_to,
        asset,
        amount: amount.into(),
    })
}

/// Validates the EIP-3009 authorization time window.
///
/// `validBefore` must lie beyond `now + clock_skew` and `validAfter` must
/// not be in the future.
pub(super) fn assert_time(
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
    clock_skew: u64,
) -> Result<(), ExactEvmError> {
    let now = UnixTimestamp::now();
    if valid_before.as_secs() <= now.as_secs() + clock_skew {
        return Err(ExactEvmError::ValidBefore);
    }
    if valid_after > now {
        return Err(ExactEvmError::ValidAfter);
    }
    Ok(())
}

/// Constructs the EIP-712 domain, reading `name`/`version` from the token
/// contract when the requirements' `extra` does not carry them.
pub(super) async fn resolve_domain<P: Provider>(
    chain: &Eip155ChainReference,
    token: &IEIP3009::IEIP3009Instance<P>,
    asset: Address,
    extra: Option<&PaymentRequirementsExtra>,
) -> Result<Eip712Domain, ExactEvmError> {
    let name = match extra.filter(|e| !e.name.is_empty()) {
        Some(extra) => extra.name.clone(),
        None => token.name().call().await?,
    };
    let version = match extra.filter(|e| !e.version.is_empty()) {
        Some(extra) => extra.version.clone(),
        None => token.version().call().await?,
    };

    Ok(eip712_domain! {
        name: name,
        version: version,
        chain_id: chain.inner(),
        verifying_contract: asset,
    })
}

/// Verifies a structured signature against the signer and hash.
///
/// EOA signatures were already recovered during parsing. Contract-wallet
/// and EIP-6492 signatures are validated through the universal validator;
/// a plain EIP-1271 signature against an undeployed wallet is the
/// spec-mandated `undeployed_smart_wallet` failure.
pub(super) async fn assert_signature_valid<P: Provider>(
    provider: &P,
    signer: Address,
    hash: alloy_primitives::B256,
    signature: &StructuredSignature,
    invalid: impl Fn(String) -> ExactEvmError,
) -> Result<(), ExactEvmError> {
    match signature {
        StructuredSignature::Eoa(_) => Ok(()),
        StructuredSignature::Eip1271(bytes) => {
            let code = provider.get_code_at(signer).await?;
            if code.is_empty() {
                // An EOA-sized signature that did not recover is a plain
                // bad signature; only longer smart-wallet signatures may
                // demand EIP-6492 deploy data.
                if bytes.len() <= super::signature::MAX_EOA_SIGNATURE_LEN {
                    return Err(invalid("signature does not recover to the payer".into()));
                }
                return Err(ExactEvmError::UndeployedSmartWallet);
            }
            let validator = IValidator6492::new(VALIDATOR_ADDRESS, provider);
            let is_valid = validator
                .isValidSigWithSideEffects(signer, hash, bytes.clone())
                .call()
                .await?;
            if is_valid {
                Ok(())
            } else {
                Err(invalid("chain reported signature invalid".into()))
            }
        }
        StructuredSignature::Eip6492 { original, .. } => {
            let validator = IValidator6492::new(VALIDATOR_ADDRESS, provider);
            let is_valid = validator
                .isValidSigWithSideEffects(signer, hash, original.clone())
                .call()
                .await?;
            if is_valid {
                Ok(())
            } else {
                Err(invalid("chain reported signature invalid".into()))
            }
        }
    }
}

/// Runs the full EIP-3009 verification and returns the payer plus the
/// material settlement needs.
pub(super) async fn verify_eip3009<P: Provider>(
    provider: &P,
    chain: &Eip155ChainReference,
    eip3009: &Eip3009Payload,
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
    clock_skew: u64,
) -> Result<(Address, Eip712Domain, StructuredSignature), ExactEvmError> {
    let required = assert_requirements(chain, payload, requirements)?;
    let authorization = &eip3009.authorization;

    if authorization.to != required.pay_to {
        return Err(ExactEvmError::RecipientMismatch);
    }
    assert_time(authorization.valid_after, authorization.valid_before, clock_skew)?;
    if U256::from(authorization.value.0) < required.amount {
        return Err(ExactEvmError::InsufficientValue);
    }

    let token = IEIP3009::new(required.asset, provider);
    let extra: Option<PaymentRequirementsExtra> = requirements
        .extra
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    let domain = resolve_domain(chain, &token, required.asset, extra.as_ref()).await?;

    let message = TransferWithAuthorization {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.into(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
    };
    let hash = message.eip712_signing_hash(&domain);

    let signature =
        StructuredSignature::parse(eip3009.signature.clone(), authorization.from, &hash)?;
    assert_signature_valid(
        provider,
        authorization.from,
        hash,
        &signature,
        ExactEvmError::InvalidSignature,
    )
    .await?;

    let balance = token.balanceOf(authorization.from).call().await?;
    if balance < required.amount {
        return Err(ExactEvmError::InsufficientFunds);
    }

    Ok((authorization.from, domain, signature))
}

/// Runs the full Permit2 verification and returns the payer plus the
/// signature settlement needs.
///
/// The pure witness checks (spender, recipient, deadline, amount, token)
/// run before any chain read, so a witness bound to the wrong recipient
/// fails without an RPC call.
pub(super) async fn verify_permit2<P: Provider>(
    provider: &P,
    chain: &Eip155ChainReference,
    permit2: &Permit2Payload,
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
    clock_skew: u64,
) -> Result<(Address, StructuredSignature), ExactEvmError> {
    let required = assert_requirements(chain, payload, requirements)?;
    let auth = &permit2.permit2_authorization;

    if auth.spender != X402_PERMIT2_PROXY {
        return Err(ExactEvmError::InvalidPermit2Spender);
    }
    if auth.witness.to != required.pay_to {
        return Err(ExactEvmError::InvalidPermit2Recipient);
    }

    let now = UnixTimestamp::now();
    let deadline: U256 = auth.deadline.into();
    if deadline < U256::from(now.as_secs() + clock_skew) {
        return Err(ExactEvmError::Permit2DeadlineExpired);
    }
    let valid_after: U256 = auth.witness.valid_after.into();
    if valid_after > U256::from(now.as_secs()) {
        return Err(ExactEvmError::ValidAfter);
    }

    let permitted_amount: U256 = auth.permitted.amount.into();
    if permitted_amount < required.amount {
        return Err(ExactEvmError::Permit2InsufficientAmount);
    }
    if auth.permitted.token != required.asset {
        return Err(ExactEvmError::Permit2TokenMismatch);
    }

    let erc20 = IERC20::new(required.asset, provider);
    let allowance = erc20.allowance(auth.from, PERMIT2_ADDRESS).call().await?;
    if allowance < required.amount {
        return Err(ExactEvmError::Permit2AllowanceRequired);
    }
    let balance = erc20.balanceOf(auth.from).call().await?;
    if balance < required.amount {
        return Err(ExactEvmError::InsufficientFunds);
    }

    let domain = eip712_domain! {
        name: "Permit2",
        chain_id: chain.inner(),
        verifying_contract: PERMIT2_ADDRESS,
    };
    let message = PermitWitnessTransferFrom {
        permitted: SolTokenPermissions {
            token: auth.permitted.token,
            amount: permitted_amount,
        },
        spender: auth.spender,
        nonce: auth.nonce.into(),
        deadline,
        witness: SolWitness {
            to: auth.witness.to,
            validAfter: valid_after,
            extra: auth.witness.extra.clone(),
        },
    };
    let hash = message.eip712_signing_hash(&domain);

    let signature = StructuredSignature::parse(permit2.signature.clone(), auth.from, &hash)
        .map_err(|e| ExactEvmError::InvalidPermit2Signature(e.to_string()))?;
    assert_signature_valid(
        provider,
        auth.from,
        hash,
        &signature,
        ExactEvmError::InvalidPermit2Signature,
    )
    .await?;

    Ok((auth.from, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TokenAmount;
    use alloy_primitives::{B256, Bytes};
    use pay402::proto::PaymentRequirements as Requirements;

    fn requirements() -> Requirements {
        Requirements {
            scheme: "exact".into(),
            network: "eip155:8453".into(),
            amount: "1000000".into(),
            pay_to: format!("{}", Address::repeat_byte(0x22)),
            max_timeout_seconds: 300,
            asset: format!("{}", Address::repeat_byte(0x33)),
            extra: None,
        }
    }

    fn payload_for(reqs: &Requirements) -> PaymentPayload {
        PaymentPayload {
            x402_version: 2,
            accepted: reqs.clone(),
            payload: serde_json::json!({}),
            resource: None,
            extensions: None,
        }
    }

    #[test]
    fn scheme_and_network_checks() {
        let chain = Eip155ChainReference::new(8453);
        let reqs = requirements();
        let payload = payload_for(&reqs);
        assert!(assert_requirements(&chain, &payload, &reqs).is_ok());

        let mut wrong_scheme = reqs.clone();
        wrong_scheme.scheme = "upto".into();
        let payload = payload_for(&wrong_scheme);
        assert!(matches!(
            assert_requirements(&chain, &payload, &wrong_scheme),
            Err(ExactEvmError::UnsupportedScheme)
        ));

        let other_chain = Eip155ChainReference::new(1);
        let payload = payload_for(&reqs);
        assert!(matches!(
            assert_requirements(&other_chain, &payload, &reqs),
            Err(ExactEvmError::NetworkMismatch)
        ));
    }

    #[test]
    fn time_bounds_use_clock_skew() {
        let now = UnixTimestamp::now();

        // validBefore must clear now + skew.
        let err = assert_time(
            UnixTimestamp::from_secs(0),
            UnixTimestamp::from_secs(now.as_secs() + 3),
            6,
        )
        .unwrap_err();
        assert!(matches!(err, ExactEvmError::ValidBefore));

        // validAfter in the future is rejected.
        let err = assert_time(
            UnixTimestamp::from_secs(now.as_secs() + 60),
            UnixTimestamp::from_secs(now.as_secs() + 600),
            6,
        )
        .unwrap_err();
        assert!(matches!(err, ExactEvmError::ValidAfter));

        assert!(
            assert_time(
                UnixTimestamp::from_secs(now.as_secs().saturating_sub(600)),
                UnixTimestamp::from_secs(now.as_secs() + 300),
                6,
            )
            .is_ok()
        );
    }

    #[tokio::test]
    async fn permit2_witness_binding_fails_before_any_rpc() {
        // A provider pointed at a dead endpoint: if verification touched
        // the chain the call would error instead of reporting the
        // recipient mismatch.
        let provider = alloy_provider::ProviderBuilder::new()
            .connect_http("http://127.0.0.1:1".parse().unwrap());

        let chain = Eip155ChainReference::new(8453);
        let reqs = requirements();
        let payload = payload_for(&reqs);

        let permit2 = Permit2Payload {
            signature: Bytes::from(vec![0x01; 65]),
            permit2_authorization: crate::exact::types::Permit2Authorization {
                from: Address::repeat_byte(0x01),
                permitted: crate::exact::types::Permit2TokenPermissions {
                    token: Address::repeat_byte(0x33),
                    amount: TokenAmount::from(1_000_000u64),
                },
                spender: X402_PERMIT2_PROXY,
                nonce: TokenAmount::from(7u64),
                deadline: TokenAmount::from(UnixTimestamp::now().as_secs() + 300),
                witness: crate::exact::types::Permit2Witness {
                    // Attacker-controlled recipient instead of payTo.
                    to: Address::repeat_byte(0xAA),
                    valid_after: TokenAmount::ZERO,
                    extra: Bytes::new(),
                },
            },
        };

        let err = verify_permit2(&provider, &chain, &permit2, &payload, &reqs, 6)
            .await
            .unwrap_err();
        assert!(matches!(err, ExactEvmError::InvalidPermit2Recipient));
        assert_eq!(err.kind(), "invalid_permit2_recipient_mismatch");
    }

    #[tokio::test]
    async fn permit2_wrong_spender_is_rejected() {
        let provider = alloy_provider::ProviderBuilder::new()
            .connect_http("http://127.0.0.1:1".parse().unwrap());
        let chain = Eip155ChainReference::new(8453);
        let reqs = requirements();
        let payload = payload_for(&reqs);

        let permit2 = Permit2Payload {
            signature: Bytes::from(vec![0x01; 65]),
            permit2_authorization: crate::exact::types::Permit2Authorization {
                from: Address::repeat_byte(0x01),
                permitted: crate::exact::types::Permit2TokenPermissions {
                    token: Address::repeat_byte(0x33),
                    amount: TokenAmount::from(1_000_000u64),
                },
                spender: Address::repeat_byte(0xBB),
                nonce: TokenAmount::from(7u64),
                deadline: TokenAmount::from(UnixTimestamp::now().as_secs() + 300),
                witness: crate::exact::types::Permit2Witness {
                    to: Address::repeat_byte(0x22),
                    valid_after: TokenAmount::ZERO,
                    extra: Bytes::new(),
                },
            },
        };

        let err = verify_permit2(&provider, &chain, &permit2, &payload, &reqs, 6)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_permit2_spender");
    }

    #[test]
    fn eip712_hash_is_deterministic() {
        let domain = eip712_domain! {
            name: "USD Coin",
            version: "2",
            chain_id: 8453u64,
            verifying_contract: Address::repeat_byte(0x33),
        };
        let message = TransferWithAuthorization {
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x22),
            value: U256::from(1_000_000u64),
            validAfter: U256::ZERO,
            validBefore: U256::from(2_000_000_000u64),
            nonce: B256::repeat_byte(0x42),
        };
        assert_eq!(
            message.eip712_signing_hash(&domain),
            message.eip712_signing_hash(&domain)
        );
    }
}

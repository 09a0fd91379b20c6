//! On-chain settlement for the "exact" facilitator.
//!
//! EOA signatures use the split (v, r, s) `transferWithAuthorization`
//! overload; contract wallets use the bytes overload. An EIP-6492 payload
//! against an undeployed wallet deploys the wallet first (when the
//! facilitator is configured to) and then transfers. Settlement succeeds
//! iff the receipt status is success.

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, B256, TxHash, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::Eip712Domain;

use super::contract::{IEIP3009, IX402Permit2Proxy};
use super::error::ExactEvmError;
use super::signature::StructuredSignature;
use crate::exact::types::{Eip3009Payload, Permit2Payload, X402_PERMIT2_PROXY};

/// Sends the ERC-3009 transfer for a verified payment.
///
/// `signature` must be the structured signature produced during
/// verification against `domain`.
pub(super) async fn settle_eip3009<P: Provider>(
    provider: &P,
    eip3009: &Eip3009Payload,
    _domain: &Eip712Domain,
    signature: StructuredSignature,
    asset: Address,
    deploy_smart_wallets: bool,
) -> Result<TxHash, ExactEvmError> {
    let authorization = &eip3009.authorization;
    let token = IEIP3009::new(asset, provider);

    let from = authorization.from;
    let to = authorization.to;
    let value: U256 = authorization.value.into();
    let valid_after = U256::from(authorization.valid_after.as_secs());
    let valid_before = U256::from(authorization.valid_before.as_secs());
    let nonce = authorization.nonce;

    let receipt = match signature {
        StructuredSignature::Eoa(signature) => {
            let v = 27 + u8::from(signature.v());
            let r = B256::from(signature.r());
            let s = B256::from(signature.s());
            token
                .transferWithAuthorization_1(
                    from,
                    to,
                    value,
                    valid_after,
                    valid_before,
                    nonce,
                    v,
                    r,
                    s,
                )
                .send()
                .await?
                .get_receipt()
                .await?
        }
        StructuredSignature::Eip1271(bytes) => {
            token
                .transferWithAuthorization_0(
                    from,
                    to,
                    value,
                    valid_after,
                    valid_before,
                    nonce,
                    bytes,
                )
                .send()
                .await?
                .get_receipt()
                .await?
        }
        StructuredSignature::Eip6492 {
            factory,
            factory_calldata,
            inner,
            original: _,
        } => {
            let code = provider.get_code_at(from).await?;
            if code.is_empty() {
                if !deploy_smart_wallets {
                    return Err(ExactEvmError::UndeployedSmartWallet);
                }
                tracing::info!(wallet = %from, factory = %factory, "deploying counterfactual wallet before settlement");
                let deploy_tx = TransactionRequest::default()
                    .with_to(factory)
                    .with_input(factory_calldata);
                let deploy_receipt = provider
                    .send_transaction(deploy_tx)
                    .await?
                    .get_receipt()
                    .await?;
                if !deploy_receipt.status() {
                    return Err(ExactEvmError::InvalidTransactionState(format!(
                        "wallet deployment {} reverted",
                        deploy_receipt.transaction_hash
                    )));
                }
            }
            token
                .transferWithAuthorization_0(
                    from,
                    to,
                    value,
                    valid_after,
                    valid_before,
                    nonce,
                    inner,
                )
                .send()
                .await?
                .get_receipt()
                .await?
        }
    };

    if receipt.status() {
        tracing::info!(tx = %receipt.transaction_hash, "transferWithAuthorization succeeded");
        Ok(receipt.transaction_hash)
    } else {
        tracing::warn!(tx = %receipt.transaction_hash, "transferWithAuthorization reverted");
        Err(ExactEvmError::TransactionFailed(format!(
            "transaction {} reverted",
            receipt.transaction_hash
        )))
    }
}

/// Settles a verified Permit2 payment through `x402Permit2Proxy.settle()`.
pub(super) async fn settle_permit2<P: Provider>(
    provider: &P,
    permit2: &Permit2Payload,
) -> Result<TxHash, ExactEvmError> {
    let auth = &permit2.permit2_authorization;
    let proxy = IX402Permit2Proxy::new(X402_PERMIT2_PROXY, provider);

    let permit = IX402Permit2Proxy::ProxyPermit {
        permitted: IX402Permit2Proxy::ProxyTokenPermissions {
            token: auth.permitted.token,
            amount: auth.permitted.amount.into(),
        },
        nonce: auth.nonce.into(),
        deadline: auth.deadline.into(),
    };
    let witness = IX402Permit2Proxy::ProxyWitness {
        to: auth.witness.to,
        validAfter: auth.witness.valid_after.into(),
        extra: auth.witness.extra.clone(),
    };

    let receipt = proxy
        .settle(permit, auth.from, witness, permit2.signature.clone())
        .send()
        .await?
        .get_receipt()
        .await?;

    if receipt.status() {
        tracing::info!(tx = %receipt.transaction_hash, "permit2 settle succeeded");
        Ok(receipt.transaction_hash)
    } else {
        tracing::warn!(tx = %receipt.transaction_hash, "permit2 settle reverted");
        Err(ExactEvmError::TransactionFailed(format!(
            "transaction {} reverted",
            receipt.transaction_hash
        )))
    }
}

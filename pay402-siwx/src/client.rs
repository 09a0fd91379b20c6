//! Client-side SIWX signing.
//!
//! [`siwx_payment_required_hook`] plugs into
//! [`X402HttpClient`](pay402_http::X402HttpClient): when a 402 carries a
//! `sign-in-with-x` declaration, the hook builds the CAIP-122 message for
//! the chain matching the first advertised requirement, signs it with the
//! wallet, and answers with the `SIGN-IN-WITH-X` header — re-authenticating
//! a wallet that already paid without signing a new payment.

use std::sync::Arc;

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use http::{HeaderMap, HeaderName};
use pay402::proto::helpers::PaymentRequiredEnum;
use pay402::scheme::{BoxFuture, SchemeError};
use pay402_http::client::PaymentRequiredHook;
use serde_json::Value;
use solana_keypair::Keypair;
use solana_signer::Signer as SolanaSigner;

use crate::message::build_message;
use crate::payload::{SIGN_IN_WITH_X_HEADER, SIWX_EXTENSION_KEY, SiwxPayload};

/// A wallet that can sign CAIP-122 messages for one chain namespace.
pub trait SiwxSigner: Send + Sync {
    /// The signing address in the chain's canonical form.
    fn address(&self) -> String;

    /// The CAIP-2 namespace this signer serves (`"eip155"` or `"solana"`).
    fn chain_namespace(&self) -> &str;

    /// The signature scheme this signer produces.
    fn signature_scheme(&self) -> &str;

    /// Signs the message, returning the wire-form signature (hex for EVM,
    /// Base58 for Solana).
    fn sign_message<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<String, SchemeError>>;
}

/// EVM signer producing EIP-191 personal-message signatures.
#[derive(Debug)]
pub struct EvmSiwxSigner {
    signer: PrivateKeySigner,
}

impl EvmSiwxSigner {
    /// Wraps a local private-key signer.
    #[must_use]
    pub const fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }
}

impl SiwxSigner for EvmSiwxSigner {
    fn address(&self) -> String {
        format!("{:#x}", self.signer.address())
    }

    fn chain_namespace(&self) -> &str {
        "eip155"
    }

    fn signature_scheme(&self) -> &str {
        "eip191"
    }

    fn sign_message<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<String, SchemeError>> {
        Box::pin(async move {
            let signature = self
                .signer
                .sign_message(message.as_bytes())
                .await
                .map_err(|e| -> SchemeError { format!("eip191 signing failed: {e}").into() })?;
            Ok(format!("0x{}", hex::encode(signature.as_bytes())))
        })
    }
}

/// Solana signer producing Ed25519 signatures over raw message bytes.
pub struct SolanaSiwxSigner {
    keypair: Keypair,
}

impl std::fmt::Debug for SolanaSiwxSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaSiwxSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl SolanaSiwxSigner {
    /// Wraps a Solana keypair.
    #[must_use]
    pub const fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

impl SiwxSigner for SolanaSiwxSigner {
    fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    fn chain_namespace(&self) -> &str {
        "solana"
    }

    fn signature_scheme(&self) -> &str {
        "ed25519"
    }

    fn sign_message<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<String, SchemeError>> {
        Box::pin(async move {
            Ok(self.keypair.sign_message(message.as_bytes()).to_string())
        })
    }
}

/// Builds the `on_payment_required` hook for a signer.
///
/// The hook returns `None` — continuing straight to payment — when the
/// 402 carries no usable `sign-in-with-x` declaration or the declaration's
/// chains do not cover the first advertised requirement.
#[must_use]
pub fn siwx_payment_required_hook(signer: Arc<dyn SiwxSigner>) -> PaymentRequiredHook {
    Box::new(move |required| {
        let signer = Arc::clone(&signer);
        Box::pin(async move { build_sign_in_header(signer.as_ref(), required).await })
    })
}

async fn build_sign_in_header(
    signer: &dyn SiwxSigner,
    required: &PaymentRequiredEnum,
) -> Option<HeaderMap> {
    let PaymentRequiredEnum::V2(required) = required else {
        return None;
    };
    let declaration = required.extensions.as_ref()?.get(SIWX_EXTENSION_KEY)?;

    // The chain is picked to match the first advertised requirement.
    let chain_id = required.accepts.first()?.network.clone();
    if chain_id.split(':').next() != Some(signer.chain_namespace()) {
        return None;
    }
    let supported = declaration.get("supportedChains")?.as_array()?;
    supported
        .iter()
        .find(|chain| chain.get("chainId").and_then(Value::as_str) == Some(chain_id.as_str()))?;

    let uri = required.resource.as_ref().map(|r| r.url.clone())?;

    let mut payload = SiwxPayload {
        domain: declaration.get("domain")?.as_str()?.to_owned(),
        address: signer.address(),
        statement: declaration
            .get("statement")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        uri,
        version: "1".to_owned(),
        chain_id,
        nonce: declaration.get("nonce")?.as_str()?.to_owned(),
        issued_at: declaration.get("issuedAt")?.as_str()?.to_owned(),
        expiration_time: declaration
            .get("expirationTime")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        not_before: None,
        request_id: None,
        resources: None,
        signature_scheme: Some(signer.signature_scheme().to_owned()),
        signature: String::new(),
    };

    let message = build_message(&payload);
    match signer.sign_message(&message).await {
        Ok(signature) => payload.signature = signature,
        Err(e) => {
            tracing::debug!(error = %e, "sign-in signing failed, falling through to payment");
            return None;
        }
    }

    let header_value = payload.encode_header().ok()?;
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_bytes(SIGN_IN_WITH_X_HEADER.as_bytes()).ok()?,
        header_value.parse().ok()?,
    );
    Some(headers)
}

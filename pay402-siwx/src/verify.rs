//! Signature verification for SIWX payloads.
//!
//! Dispatches on the CAIP-2 namespace: `eip155:*` uses EIP-191 personal
//! message recovery, `solana:*` uses Ed25519 over the raw UTF-8 message
//! bytes.

use alloy_primitives::Signature;
use solana_signature::Signature as SolanaSignature;

use crate::message::build_message;
use crate::payload::{SOLANA_SIGNATURE_LEN, SiwxError, SiwxPayload};

/// Verifies the payload's signature over its CAIP-122 message.
///
/// # Errors
///
/// Returns [`SiwxError`] when the signature does not verify for the
/// payload's address, or the namespace is unsupported.
pub fn verify_signature(payload: &SiwxPayload) -> Result<(), SiwxError> {
    let message = build_message(payload);
    match payload.namespace() {
        "eip155" => verify_eip191(payload, &message),
        "solana" => verify_ed25519(payload, &message),
        other => Err(SiwxError::UnsupportedNamespace(other.to_owned())),
    }
}

/// EIP-191 personal-message verification: recover the signer address and
/// compare case-insensitively against the payload address.
fn verify_eip191(payload: &SiwxPayload, message: &str) -> Result<(), SiwxError> {
    let signature_hex = payload.signature.trim_start_matches("0x");
    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| SiwxError::InvalidSignature(format!("signature is not hex: {e}")))?;
    let signature = Signature::from_raw(&signature_bytes)
        .map_err(|e| SiwxError::InvalidSignature(format!("malformed signature: {e}")))?;

    let recovered = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| SiwxError::InvalidSignature(format!("recovery failed: {e}")))?;

    if format!("{recovered:#x}") == payload.address.to_lowercase() {
        Ok(())
    } else {
        Err(SiwxError::InvalidSignature(
            "recovered address does not match payload address".into(),
        ))
    }
}

/// Ed25519 verification over the raw message bytes.
fn verify_ed25519(payload: &SiwxPayload, message: &str) -> Result<(), SiwxError> {
    let pubkey_bytes = bs58::decode(&payload.address)
        .into_vec()
        .map_err(|e| SiwxError::InvalidSignature(format!("address is not base58: {e}")))?;
    let signature_bytes = bs58::decode(&payload.signature)
        .into_vec()
        .map_err(|e| SiwxError::InvalidSignature(format!("signature is not base58: {e}")))?;

    let signature_array: [u8; SOLANA_SIGNATURE_LEN] = signature_bytes
        .try_into()
        .map_err(|_| SiwxError::InvalidSignature("signature must be 64 bytes".into()))?;
    let signature = SolanaSignature::from(signature_array);

    if signature.verify(&pubkey_bytes, message.as_bytes()) {
        Ok(())
    } else {
        Err(SiwxError::InvalidSignature(
            "ed25519 signature does not verify".into(),
        ))
    }
}

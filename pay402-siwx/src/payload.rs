//! The Sign-In-With-X wire payload.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Serialize};

/// The extension key under which SIWX declarations travel.
pub const SIWX_EXTENSION_KEY: &str = "sign-in-with-x";

/// HTTP header carrying the signed sign-in payload (client → server).
pub const SIGN_IN_WITH_X_HEADER: &str = "SIGN-IN-WITH-X";

/// Expected length of a Base58-decoded Solana address.
pub const SOLANA_ADDRESS_LEN: usize = 32;

/// Expected length of a Base58-decoded Ed25519 signature.
pub const SOLANA_SIGNATURE_LEN: usize = 64;

/// A signed CAIP-122 sign-in payload.
///
/// Wire format is `base64(JSON(payload))` in the `SIGN-IN-WITH-X` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiwxPayload {
    /// The authority requesting the signing (RFC 4501 `dnsauthority`).
    pub domain: String,

    /// The signing address, in the chain's canonical form.
    pub address: String,

    /// Optional human-readable statement shown to the signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,

    /// The URI the sign-in applies to.
    pub uri: String,

    /// Message format version; always `"1"`.
    #[serde(default = "default_version")]
    pub version: String,

    /// CAIP-2 chain identifier (e.g. `"eip155:8453"`).
    pub chain_id: String,

    /// Server-issued replay nonce.
    pub nonce: String,

    /// ISO-8601 issuance timestamp.
    pub issued_at: String,

    /// ISO-8601 expiry of the challenge, when the server bounds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,

    /// ISO-8601 time before which the message is not valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    /// Opaque request correlation ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Resources the sign-in refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,

    /// Signature scheme hint (`"eip191"` or `"ed25519"`); the chain
    /// namespace is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_scheme: Option<String>,

    /// The signature: hex for EVM, Base58 for Solana.
    pub signature: String,
}

fn default_version() -> String {
    "1".to_owned()
}

/// Failures from decoding, validating, or verifying a SIWX payload.
///
/// All of these are "soft" on the server side: the request hook logs them
/// and falls through to the payment flow.
#[derive(Debug, thiserror::Error)]
pub enum SiwxError {
    /// The header is not valid base64(JSON).
    #[error("malformed SIGN-IN-WITH-X header: {0}")]
    MalformedHeader(String),

    /// A structural invariant is violated.
    #[error("invalid sign-in payload: {0}")]
    InvalidPayload(String),

    /// The chain namespace is not supported.
    #[error("unsupported chain namespace: {0}")]
    UnsupportedNamespace(String),

    /// The payload domain does not match the resource host.
    #[error("domain does not match resource host")]
    DomainMismatch,

    /// The payload URI is outside the resource origin.
    #[error("uri is outside the resource origin")]
    UriMismatch,

    /// A timestamp failed to parse.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// `issuedAt` lies in the future.
    #[error("issuedAt is in the future")]
    IssuedInFuture,

    /// The signature is older than the accepted window.
    #[error("sign-in message is too old")]
    TooOld,

    /// `expirationTime` has passed.
    #[error("sign-in message has expired")]
    Expired,

    /// `notBefore` has not been reached.
    #[error("sign-in message is not yet valid")]
    NotYetValid,

    /// The nonce was already used.
    #[error("nonce has already been used")]
    NonceReused,

    /// Signature verification failed.
    #[error("invalid sign-in signature: {0}")]
    InvalidSignature(String),

    /// The storage backend failed.
    #[error("sign-in storage error: {0}")]
    Storage(String),
}

impl SiwxPayload {
    /// Validates the structural invariants of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`SiwxError`] when the nonce is empty, the namespace is
    /// unsupported, or Solana address/signature fields do not Base58
    /// decode to their expected lengths.
    pub fn validate_shape(&self) -> Result<(), SiwxError> {
        if self.nonce.is_empty() {
            return Err(SiwxError::InvalidPayload("nonce must be non-empty".into()));
        }

        let namespace = self
            .chain_id
            .split(':')
            .next()
            .unwrap_or_default()
            .to_owned();
        match namespace.as_str() {
            "eip155" => Ok(()),
            "solana" => {
                let address = bs58::decode(&self.address)
                    .into_vec()
                    .map_err(|e| SiwxError::InvalidPayload(format!("address is not base58: {e}")))?;
                if address.len() != SOLANA_ADDRESS_LEN {
                    return Err(SiwxError::InvalidPayload(format!(
                        "solana address must decode to {SOLANA_ADDRESS_LEN} bytes"
                    )));
                }
                let signature = bs58::decode(&self.signature)
                    .into_vec()
                    .map_err(|e| SiwxError::InvalidPayload(format!("signature is not base58: {e}")))?;
                if signature.len() != SOLANA_SIGNATURE_LEN {
                    return Err(SiwxError::InvalidPayload(format!(
                        "solana signature must decode to {SOLANA_SIGNATURE_LEN} bytes"
                    )));
                }
                Ok(())
            }
            other => Err(SiwxError::UnsupportedNamespace(other.to_owned())),
        }
    }

    /// Returns the CAIP-2 namespace of the signing chain.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.chain_id.split(':').next().unwrap_or_default()
    }

    /// Encodes the payload for the `SIGN-IN-WITH-X` header.
    ///
    /// # Errors
    ///
    /// Returns [`SiwxError::InvalidPayload`] if serialization fails.
    pub fn encode_header(&self) -> Result<String, SiwxError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| SiwxError::InvalidPayload(e.to_string()))?;
        Ok(b64.encode(&json))
    }

    /// Decodes a `SIGN-IN-WITH-X` header value.
    ///
    /// # Errors
    ///
    /// Returns [`SiwxError::MalformedHeader`] on base64 or JSON failure.
    pub fn decode_header(value: &str) -> Result<Self, SiwxError> {
        let bytes = b64
            .decode(value.trim())
            .map_err(|e| SiwxError::MalformedHeader(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| SiwxError::MalformedHeader(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn evm_payload() -> SiwxPayload {
        SiwxPayload {
            domain: "api.example.com".into(),
            address: "0x9b2055d370f73ec7d8a03e965129118dc8f5bf83".into(),
            statement: None,
            uri: "https://api.example.com/weather".into(),
            version: "1".into(),
            chain_id: "eip155:8453".into(),
            nonce: "32891756".into(),
            issued_at: "2026-08-01T00:00:00.000Z".into(),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: None,
            signature_scheme: Some("eip191".into()),
            signature: "0xdeadbeef".into(),
        }
    }

    #[test]
    fn header_round_trip() {
        let payload = evm_payload();
        let header = payload.encode_header().unwrap();
        let decoded = SiwxPayload::decode_header(&header).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn empty_nonce_is_invalid() {
        let mut payload = evm_payload();
        payload.nonce = String::new();
        assert!(payload.validate_shape().is_err());
    }

    #[test]
    fn unknown_namespace_is_rejected() {
        let mut payload = evm_payload();
        payload.chain_id = "cosmos:cosmoshub-4".into();
        assert!(matches!(
            payload.validate_shape(),
            Err(SiwxError::UnsupportedNamespace(_))
        ));
    }

    #[test]
    fn solana_base58_lengths_are_enforced() {
        let mut payload = evm_payload();
        payload.chain_id = "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp".into();
        payload.address = bs58::encode([7u8; 32]).into_string();
        payload.signature = bs58::encode([9u8; 64]).into_string();
        assert!(payload.validate_shape().is_ok());

        payload.address = bs58::encode([7u8; 20]).into_string();
        assert!(payload.validate_shape().is_err());
    }

    #[test]
    fn version_defaults_to_one() {
        let json = serde_json::json!({
            "domain": "api.example.com",
            "address": "0xabc",
            "uri": "https://api.example.com/",
            "chainId": "eip155:1",
            "nonce": "n",
            "issuedAt": "2026-08-01T00:00:00Z",
            "signature": "0x00",
        });
        let payload: SiwxPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.version, "1");
    }
}

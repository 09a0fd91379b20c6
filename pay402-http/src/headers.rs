//! Header encoding and decoding for x402 protocol messages.
//!
//! Every payment header carries `base64(JSON(message))`. Decoding a payment
//! payload auto-detects the protocol version so a single code path handles
//! both `PAYMENT-SIGNATURE` (V2) and `X-PAYMENT` (V1) values.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use pay402::proto::helpers::{
    PaymentPayloadEnum, PaymentRequiredEnum, parse_payment_payload_bytes,
    parse_payment_required_bytes,
};
use pay402::proto::{
    PaymentPayload, PaymentPayloadV1, PaymentRequired, PaymentRequiredV1, SettleResponse,
};

use crate::error::HttpError;

/// Encodes a V2 [`PaymentPayload`] for the `PAYMENT-SIGNATURE` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_signature(payload: &PaymentPayload) -> Result<String, HttpError> {
    let json = serde_json::to_vec(payload)?;
    Ok(b64.encode(&json))
}

/// Encodes a V1 [`PaymentPayloadV1`] for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_x_payment(payload: &PaymentPayloadV1) -> Result<String, HttpError> {
    let json = serde_json::to_vec(payload)?;
    Ok(b64.encode(&json))
}

/// Decodes a payment header value into a version-tagged payload.
///
/// # Errors
///
/// Returns [`HttpError`] on base64 or JSON decode failure.
pub fn decode_payment_payload(header_value: &str) -> Result<PaymentPayloadEnum, HttpError> {
    let bytes = b64.decode(header_value.trim())?;
    parse_payment_payload_bytes(&bytes).map_err(HttpError::Protocol)
}

/// Encodes a V2 [`PaymentRequired`] for the `PAYMENT-REQUIRED` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_required(required: &PaymentRequired) -> Result<String, HttpError> {
    let json = serde_json::to_vec(required)?;
    Ok(b64.encode(&json))
}

/// Encodes a V1 [`PaymentRequiredV1`] for the `PAYMENT-REQUIRED` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_required_v1(required: &PaymentRequiredV1) -> Result<String, HttpError> {
    let json = serde_json::to_vec(required)?;
    Ok(b64.encode(&json))
}

/// Decodes a `PAYMENT-REQUIRED` header value into a version-tagged enum.
///
/// # Errors
///
/// Returns [`HttpError`] on base64 or JSON decode failure.
pub fn decode_payment_required(header_value: &str) -> Result<PaymentRequiredEnum, HttpError> {
    let bytes = b64.decode(header_value.trim())?;
    parse_payment_required_bytes(&bytes).map_err(HttpError::Protocol)
}

/// Encodes a [`SettleResponse`] for the `PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_response(response: &SettleResponse) -> Result<String, HttpError> {
    let json = serde_json::to_vec(response)?;
    Ok(b64.encode(&json))
}

/// Decodes a `PAYMENT-RESPONSE` header value into a [`SettleResponse`].
///
/// # Errors
///
/// Returns [`HttpError`] on base64 or JSON decode failure.
pub fn decode_payment_response(header_value: &str) -> Result<SettleResponse, HttpError> {
    let bytes = b64.decode(header_value.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pay402::proto::PaymentRequirements;

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:8453".into(),
            amount: "1000000".into(),
            pay_to: "0xPAY".into(),
            max_timeout_seconds: 300,
            asset: "0xUSDC".into(),
            extra: None,
        }
    }

    #[test]
    fn payment_signature_round_trip() {
        let payload = PaymentPayload {
            x402_version: 2,
            accepted: requirements(),
            payload: serde_json::json!({"signature": "0xsig"}),
            resource: None,
            extensions: None,
        };
        let encoded = encode_payment_signature(&payload).unwrap();
        match decode_payment_payload(&encoded).unwrap() {
            PaymentPayloadEnum::V2(decoded) => assert_eq!(*decoded, payload),
            PaymentPayloadEnum::V1(_) => panic!("wrong version detected"),
        }
    }

    #[test]
    fn x_payment_round_trip() {
        let payload = PaymentPayloadV1 {
            x402_version: 1,
            scheme: "exact".into(),
            network: "base".into(),
            payload: serde_json::json!({}),
        };
        let encoded = encode_x_payment(&payload).unwrap();
        match decode_payment_payload(&encoded).unwrap() {
            PaymentPayloadEnum::V1(decoded) => assert_eq!(*decoded, payload),
            PaymentPayloadEnum::V2(_) => panic!("wrong version detected"),
        }
    }

    #[test]
    fn payment_required_round_trip() {
        let required = PaymentRequired {
            x402_version: 2,
            error: None,
            resource: None,
            accepts: vec![requirements()],
            extensions: None,
        };
        let encoded = encode_payment_required(&required).unwrap();
        match decode_payment_required(&encoded).unwrap() {
            PaymentRequiredEnum::V2(decoded) => assert_eq!(*decoded, required),
            PaymentRequiredEnum::V1(_) => panic!("wrong version detected"),
        }
    }

    #[test]
    fn garbage_header_is_rejected() {
        assert!(decode_payment_payload("not base64!!").is_err());
        let encoded = b64.encode(b"not json");
        assert!(decode_payment_payload(&encoded).is_err());
    }
}

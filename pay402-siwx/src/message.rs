//! CAIP-122 message construction.
//!
//! For `eip155:*` chains the message is the EIP-4361 form; for `solana:*`
//! the same ABNF with the Solana preamble and the genesis-hash reference
//! (or its human alias for well-known networks) as the Chain ID.

use std::fmt::Write;

use crate::payload::SiwxPayload;

/// Solana mainnet genesis-hash reference (CAIP-2 truncated form).
pub const SOLANA_MAINNET_REFERENCE: &str = "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";

/// Solana devnet genesis-hash reference.
pub const SOLANA_DEVNET_REFERENCE: &str = "EtWTRABZaYq6iMfeYKouRu166VU2xqa1";

/// Solana testnet genesis-hash reference.
pub const SOLANA_TESTNET_REFERENCE: &str = "4uhcVJyU9pJkvQyS88uRDiswHXSCkY3z";

/// Returns the human alias for a well-known Solana network reference.
#[must_use]
pub fn solana_network_alias(reference: &str) -> Option<&'static str> {
    match reference {
        SOLANA_MAINNET_REFERENCE => Some("mainnet"),
        SOLANA_DEVNET_REFERENCE => Some("devnet"),
        SOLANA_TESTNET_REFERENCE => Some("testnet"),
        _ => None,
    }
}

/// Builds the CAIP-122 message for a payload.
///
/// The returned string is exactly what the wallet signs: EIP-191 over it
/// for EVM, Ed25519 over its raw UTF-8 bytes for Solana.
#[must_use]
pub fn build_message(payload: &SiwxPayload) -> String {
    let (account_kind, chain_id_field) = match payload.namespace() {
        "solana" => {
            let reference = payload.chain_id.split(':').nth(1).unwrap_or_default();
            let chain_id = solana_network_alias(reference)
                .map_or_else(|| reference.to_owned(), ToOwned::to_owned);
            ("Solana", chain_id)
        }
        _ => {
            let reference = payload.chain_id.split(':').nth(1).unwrap_or_default();
            ("Ethereum", reference.to_owned())
        }
    };

    let mut message = format!(
        "{} wants you to sign in with your {} account:\n{}\n\n",
        payload.domain, account_kind, payload.address
    );

    if let Some(statement) = &payload.statement {
        message.push_str(statement);
        message.push('\n');
    }
    message.push('\n');

    let _ = write!(message, "URI: {}", payload.uri);
    let _ = write!(message, "\nVersion: {}", payload.version);
    let _ = write!(message, "\nChain ID: {chain_id_field}");
    let _ = write!(message, "\nNonce: {}", payload.nonce);
    let _ = write!(message, "\nIssued At: {}", payload.issued_at);

    if let Some(expiration_time) = &payload.expiration_time {
        let _ = write!(message, "\nExpiration Time: {expiration_time}");
    }
    if let Some(not_before) = &payload.not_before {
        let _ = write!(message, "\nNot Before: {not_before}");
    }
    if let Some(request_id) = &payload.request_id {
        let _ = write!(message, "\nRequest ID: {request_id}");
    }
    if let Some(resources) = &payload.resources {
        message.push_str("\nResources:");
        for resource in resources {
            let _ = write!(message, "\n- {resource}");
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> SiwxPayload {
        SiwxPayload {
            domain: "api.example.com".into(),
            address: "0x9b2055d370f73ec7d8a03e965129118dc8f5bf83".into(),
            statement: Some("Sign in to access paid content.".into()),
            uri: "https://api.example.com/weather".into(),
            version: "1".into(),
            chain_id: "eip155:8453".into(),
            nonce: "32891756".into(),
            issued_at: "2026-08-01T00:00:00.000Z".into(),
            expiration_time: Some("2026-08-01T00:05:00.000Z".into()),
            not_before: None,
            request_id: None,
            resources: Some(vec!["https://api.example.com/weather".into()]),
            signature_scheme: Some("eip191".into()),
            signature: String::new(),
        }
    }

    #[test]
    fn evm_message_matches_eip4361_form() {
        let message = build_message(&payload());
        let expected = "api.example.com wants you to sign in with your Ethereum account:\n\
0x9b2055d370f73ec7d8a03e965129118dc8f5bf83\n\
\n\
Sign in to access paid content.\n\
\n\
URI: https://api.example.com/weather\n\
Version: 1\n\
Chain ID: 8453\n\
Nonce: 32891756\n\
Issued At: 2026-08-01T00:00:00.000Z\n\
Expiration Time: 2026-08-01T00:05:00.000Z\n\
Resources:\n\
- https://api.example.com/weather";
        assert_eq!(message, expected);
    }

    #[test]
    fn statement_is_optional() {
        let mut p = payload();
        p.statement = None;
        p.expiration_time = None;
        p.resources = None;
        let message = build_message(&p);
        assert!(message.contains("account:\n0x9b2055d370f73ec7d8a03e965129118dc8f5bf83\n\n\nURI:"));
        assert!(!message.contains("Expiration Time:"));
    }

    #[test]
    fn solana_message_uses_alias_for_known_networks() {
        let mut p = payload();
        p.chain_id = format!("solana:{SOLANA_MAINNET_REFERENCE}");
        p.address = bs58::encode([7u8; 32]).into_string();
        let message = build_message(&p);
        assert!(message.starts_with(
            "api.example.com wants you to sign in with your Solana account:"
        ));
        assert!(message.contains("\nChain ID: mainnet\n"));
    }

    #[test]
    fn solana_message_keeps_unknown_reference() {
        let mut p = payload();
        p.chain_id = "solana:SomeCustomGenesisHashReference".into();
        let message = build_message(&p);
        assert!(message.contains("\nChain ID: SomeCustomGenesisHashReference\n"));
    }
}

//! Structured signature parsing.
//!
//! An "exact" payment signature is one of three shapes: a plain EOA
//! signature (64 or 65 bytes), an EIP-1271 contract-wallet signature
//! (arbitrary bytes), or an EIP-6492 envelope carrying deployment data for
//! a counterfactual wallet plus the inner signature.

use alloy_primitives::{Address, B256, Bytes, Signature, hex};
use alloy_sol_types::SolValue;

use super::contract::Sig6492;

/// The fixed 32-byte magic suffix defined by EIP-6492.
const EIP6492_MAGIC_SUFFIX: [u8; 32] =
    hex!("6492649264926492649264926492649264926492649264926492649264926492");

/// An EOA signature is at most 65 bytes; anything longer is a smart-wallet
/// signature.
pub const MAX_EOA_SIGNATURE_LEN: usize = 65;

/// A structured representation of a payment signature.
#[derive(Debug, Clone)]
pub enum StructuredSignature {
    /// An EIP-6492 envelope for a (possibly undeployed) smart wallet.
    Eip6492 {
        /// Wallet factory to deploy through.
        factory: Address,
        /// Factory calldata deploying the wallet.
        factory_calldata: Bytes,
        /// The inner signature the deployed wallet validates.
        inner: Bytes,
        /// The full envelope, as received.
        original: Bytes,
    },
    /// A recovered EOA signature.
    Eoa(Signature),
    /// A plain EIP-1271 contract-wallet signature.
    Eip1271(Bytes),
}

/// Errors from parsing a structured signature.
#[derive(Debug, thiserror::Error)]
pub enum StructuredSignatureError {
    /// The EIP-6492 envelope could not be decoded.
    #[error("invalid EIP-6492 envelope: {0}")]
    InvalidEip6492(alloy_sol_types::Error),
}

impl StructuredSignature {
    /// Parses raw signature bytes, recovering EOA signatures against the
    /// expected signer and pre-hash.
    ///
    /// A 64/65-byte signature that does not recover to `expected_signer`
    /// is treated as an EIP-1271 signature rather than rejected — some
    /// contract wallets produce 65-byte signatures.
    ///
    /// # Errors
    ///
    /// Returns [`StructuredSignatureError`] if an EIP-6492 envelope is
    /// malformed.
    pub fn parse(
        bytes: Bytes,
        expected_signer: Address,
        prehash: &B256,
    ) -> Result<Self, StructuredSignatureError> {
        let is_eip6492 = bytes.len() >= 32 && bytes[bytes.len() - 32..] == EIP6492_MAGIC_SUFFIX;
        if is_eip6492 {
            let body = &bytes[..bytes.len() - 32];
            let sig6492 =
                Sig6492::abi_decode_params(body).map_err(StructuredSignatureError::InvalidEip6492)?;
            return Ok(Self::Eip6492 {
                factory: sig6492.factory,
                factory_calldata: sig6492.factoryCalldata,
                inner: sig6492.innerSig,
                original: bytes,
            });
        }

        let eoa_signature = if bytes.len() == 65 {
            Signature::from_raw(&bytes).ok().map(Signature::normalized_s)
        } else if bytes.len() == 64 {
            Some(Signature::from_erc2098(&bytes).normalized_s())
        } else {
            None
        };

        Ok(match eoa_signature {
            None => Self::Eip1271(bytes),
            Some(signature) => {
                let is_expected_signer = signature
                    .recover_address_from_prehash(prehash)
                    .ok()
                    .is_some_and(|recovered| recovered == expected_signer);
                if is_expected_signer {
                    Self::Eoa(signature)
                } else {
                    Self::Eip1271(bytes)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    #[test]
    fn recovers_eoa_signature() {
        let signer = PrivateKeySigner::random();
        let hash = B256::repeat_byte(0x42);
        let signature = signer.sign_hash_sync(&hash).unwrap();
        let bytes: Bytes = signature.as_bytes().into();

        let parsed = StructuredSignature::parse(bytes, signer.address(), &hash).unwrap();
        assert!(matches!(parsed, StructuredSignature::Eoa(_)));
    }

    #[test]
    fn wrong_signer_falls_back_to_eip1271() {
        let signer = PrivateKeySigner::random();
        let hash = B256::repeat_byte(0x42);
        let signature = signer.sign_hash_sync(&hash).unwrap();
        let bytes: Bytes = signature.as_bytes().into();

        let other = Address::repeat_byte(0x99);
        let parsed = StructuredSignature::parse(bytes, other, &hash).unwrap();
        assert!(matches!(parsed, StructuredSignature::Eip1271(_)));
    }

    #[test]
    fn long_signature_is_eip1271() {
        let bytes = Bytes::from(vec![0xab; 96]);
        let parsed =
            StructuredSignature::parse(bytes, Address::ZERO, &B256::ZERO).unwrap();
        assert!(matches!(parsed, StructuredSignature::Eip1271(_)));
    }

    #[test]
    fn eip6492_envelope_is_unwrapped() {
        let envelope = Sig6492 {
            factory: Address::repeat_byte(0x11),
            factoryCalldata: Bytes::from(vec![0x01, 0x02]),
            innerSig: Bytes::from(vec![0xaa; 65]),
        };
        let mut bytes = envelope.abi_encode_params();
        bytes.extend_from_slice(&EIP6492_MAGIC_SUFFIX);

        let parsed =
            StructuredSignature::parse(Bytes::from(bytes), Address::ZERO, &B256::ZERO).unwrap();
        let StructuredSignature::Eip6492 {
            factory, inner, ..
        } = parsed
        else {
            panic!("expected EIP-6492 signature");
        };
        assert_eq!(factory, Address::repeat_byte(0x11));
        assert_eq!(inner, Bytes::from(vec![0xaa; 65]));
    }
}

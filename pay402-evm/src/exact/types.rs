//! Wire format types for the EVM "exact" scheme.
//!
//! Covers both transfer methods: EIP-3009 `transferWithAuthorization` and
//! Permit2 through the `x402Permit2Proxy`. The `sol!` structs at the bottom
//! are the EIP-712 typed-data shapes reconstructed by both the signing
//! client and the verifying facilitator; their field order must match the
//! on-chain definitions.

use alloy_primitives::{Address, B256, Bytes, address};
use alloy_sol_types::sol;
use pay402::timestamp::UnixTimestamp;
use serde::{Deserialize, Serialize};

use crate::chain::TokenAmount;

/// The scheme identifier.
pub const SCHEME_EXACT: &str = "exact";

/// Canonical Uniswap Permit2 contract address (same on all EVM chains via
/// CREATE2).
pub const PERMIT2_ADDRESS: Address = address!("000000000022D473030F116dDEE9F6B43aC78BA3");

/// The x402 Permit2 proxy. Deployed deterministically to the same vanity
/// address on every supported chain; it is the sole approved spender and
/// its `settle` enforces witness-bound recipients.
pub const X402_PERMIT2_PROXY: Address = address!("4020B671C4c523a852c11a5EC58F27F235e80001");

/// Signature verifier for EIP-6492, EIP-1271 and EOA signatures,
/// universally deployed on the supported EVM chains.
pub const VALIDATOR_ADDRESS: Address = address!("dAcD51A54883eb67D95FAEb2BBfdC4a9a6BD2a3B");

/// Which on-chain mechanism moves the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetTransferMethod {
    /// EIP-3009 `transferWithAuthorization` (USDC and compatible tokens).
    Eip3009,
    /// Uniswap Permit2 via the `x402Permit2Proxy`.
    Permit2,
}

/// Unified exact payment payload — either EIP-3009 or Permit2.
///
/// Deserialization is `#[serde(untagged)]`: the Permit2 variant is tried
/// first because it carries the unique `permit2Authorization` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExactPayload {
    /// Permit2-based payment (tried first during deserialization).
    Permit2(Permit2Payload),
    /// EIP-3009-based payment.
    Eip3009(Eip3009Payload),
}

impl ExactPayload {
    /// Returns the transfer method used by this payload.
    #[must_use]
    pub const fn transfer_method(&self) -> AssetTransferMethod {
        match self {
            Self::Eip3009(_) => AssetTransferMethod::Eip3009,
            Self::Permit2(_) => AssetTransferMethod::Permit2,
        }
    }

    /// Returns the sender (`from`) address of this payment.
    #[must_use]
    pub const fn from_address(&self) -> Address {
        match self {
            Self::Eip3009(p) => p.authorization.from,
            Self::Permit2(p) => p.permit2_authorization.from,
        }
    }

    /// Returns the raw signature bytes.
    #[must_use]
    pub const fn signature(&self) -> &Bytes {
        match self {
            Self::Eip3009(p) => &p.signature,
            Self::Permit2(p) => &p.signature,
        }
    }
}

/// EIP-3009 `transferWithAuthorization` payment payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Payload {
    /// The signature authorizing the transfer.
    ///
    /// Either an EOA signature (64–65 bytes), an EIP-1271 contract-wallet
    /// signature (arbitrary length), or an EIP-6492 envelope wrapping
    /// deployment data for a counterfactual wallet.
    pub signature: Bytes,

    /// The structured authorization that was signed.
    pub authorization: Eip3009Authorization,
}

/// The EIP-712 message of an ERC-3009 transfer authorization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// The address authorizing the transfer (token owner).
    pub from: Address,

    /// The recipient of the transfer.
    pub to: Address,

    /// The amount to transfer, in the token's smallest unit.
    pub value: TokenAmount,

    /// Not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,

    /// Expires at this timestamp (exclusive).
    pub valid_before: UnixTimestamp,

    /// Unique 32-byte nonce preventing replay.
    pub nonce: B256,
}

/// Permit2 token permissions — which token and how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit2TokenPermissions {
    /// Token contract address.
    pub token: Address,
    /// Amount in smallest unit.
    pub amount: TokenAmount,
}

/// Witness data enforced on-chain by the `x402Permit2Proxy`.
///
/// Included in the EIP-712 signature and checked by the proxy; the upper
/// time bound is Permit2's own `deadline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit2Witness {
    /// Destination address for the funds.
    pub to: Address,
    /// Payment invalid before this unix timestamp.
    pub valid_after: TokenAmount,
    /// Extra data (typically empty `0x`).
    pub extra: Bytes,
}

/// Permit2 authorization parameters — the `PermitWitnessTransferFrom`
/// message in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit2Authorization {
    /// Signer / owner address.
    pub from: Address,
    /// Token and amount permitted.
    pub permitted: Permit2TokenPermissions,
    /// Must be the `x402Permit2Proxy` address.
    pub spender: Address,
    /// Unique uint256 nonce, as a decimal string.
    pub nonce: TokenAmount,
    /// Signature expires after this unix timestamp.
    pub deadline: TokenAmount,
    /// Witness data verified by the proxy.
    pub witness: Permit2Witness,
}

/// Permit2 payment payload sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit2Payload {
    /// EIP-712 signature over the `PermitWitnessTransferFrom`.
    pub signature: Bytes,
    /// Authorization parameters that were signed.
    pub permit2_authorization: Permit2Authorization,
}

/// Extra payment requirements data for the EVM exact scheme.
///
/// Carries the EIP-712 domain parameters of the asset and the selected
/// transfer method.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    /// Token name as used in the EIP-712 domain (required for EIP-3009).
    #[serde(default)]
    pub name: String,

    /// Token version as used in the EIP-712 domain (required for EIP-3009).
    #[serde(default)]
    pub version: String,

    /// Which on-chain transfer mechanism to use.
    ///
    /// `None` defaults to EIP-3009.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_transfer_method: Option<AssetTransferMethod>,
}

sol!(
    /// ERC-3009 `TransferWithAuthorization` typed-data struct.
    ///
    /// The facilitator reconstructs this struct from the wire
    /// authorization to verify the signature, so the values must match
    /// exactly what the client signed.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

sol!(
    /// EIP-712 struct for Permit2 token permissions.
    #[derive(Serialize, Deserialize)]
    struct TokenPermissions {
        address token;
        uint256 amount;
    }

    /// EIP-712 struct for the x402 Permit2 witness.
    ///
    /// Field order MUST match the on-chain proxy definition.
    #[derive(Serialize, Deserialize)]
    struct Witness {
        address to;
        uint256 validAfter;
        bytes extra;
    }

    /// EIP-712 struct for Permit2 `PermitWitnessTransferFrom`.
    ///
    /// The domain uses `name = "Permit2"`, no version, and
    /// `verifyingContract = PERMIT2_ADDRESS`.
    #[derive(Serialize, Deserialize)]
    struct PermitWitnessTransferFrom {
        TokenPermissions permitted;
        address spender;
        uint256 nonce;
        uint256 deadline;
        Witness witness;
    }
);

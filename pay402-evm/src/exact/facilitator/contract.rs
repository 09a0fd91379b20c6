//! On-chain interfaces used by the "exact" facilitator.

use alloy_sol_types::sol;

sol! {
    /// ERC-3009 token interface.
    ///
    /// Both `transferWithAuthorization` overloads are declared: the split
    /// (v, r, s) form used for EOA signatures and the bytes form used for
    /// contract-wallet signatures.
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IEIP3009 {
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external;

        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;

        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function name() external view returns (string);
        function version() external view returns (string);
    }

    /// Minimal ERC-20 surface for Permit2 precondition checks.
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    /// Universal signature validator supporting EOA, EIP-1271 and EIP-6492
    /// signatures, including counterfactual (undeployed) smart wallets.
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IValidator6492 {
        function isValidSigWithSideEffects(
            address signer,
            bytes32 hash,
            bytes signature
        ) external returns (bool);
    }

    /// The x402 Permit2 proxy. Its `settle` enforces that funds may only
    /// move to `witness.to`.
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IX402Permit2Proxy {
        struct ProxyTokenPermissions {
            address token;
            uint256 amount;
        }

        struct ProxyPermit {
            ProxyTokenPermissions permitted;
            uint256 nonce;
            uint256 deadline;
        }

        struct ProxyWitness {
            address to;
            uint256 validAfter;
            bytes extra;
        }

        function settle(
            ProxyPermit calldata permit,
            address owner,
            ProxyWitness calldata witness,
            bytes calldata signature
        ) external;
    }

    /// The ABI-encoded tuple wrapped by an EIP-6492 signature envelope.
    #[allow(missing_docs)]
    struct Sig6492 {
        address factory;
        bytes factoryCalldata;
        bytes innerSig;
    }
}

//! Known EVM network configurations and USDC token deployments.

use alloy_primitives::{Address, address};

use crate::chain::{AssetInfo, NetworkConfig};

/// Base Mainnet chain ID.
pub const BASE_MAINNET: u64 = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: u64 = 84532;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: u64 = 1;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: u64 = 137;

/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: u64 = 80002;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: u64 = 43114;

/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: u64 = 43113;

/// USDC contract address on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// USDC contract address on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// USDC contract address on Polygon Mainnet.
pub const USDC_POLYGON: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

/// USDC contract address on Polygon Amoy (Circle native).
pub const USDC_POLYGON_AMOY: Address = address!("41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582");

/// USDC contract address on Avalanche C-Chain.
pub const USDC_AVALANCHE: Address = address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");

/// USDC contract address on Avalanche Fuji.
pub const USDC_AVALANCHE_FUJI: Address = address!("5425890298aed601595a70AB815c96711a31Bc65");

/// Default EIP-712 domain name for USDC.
pub const DEFAULT_USDC_NAME: &str = "USD Coin";

/// Default EIP-712 domain version for USDC.
pub const DEFAULT_USDC_VERSION: &str = "2";

/// Default token decimals for USDC.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// Returns network configurations for all known EVM networks.
#[must_use]
pub fn known_networks() -> Vec<NetworkConfig> {
    vec![
        network(BASE_MAINNET, USDC_BASE, DEFAULT_USDC_NAME),
        // Base Sepolia USDC returns "USDC" from name(), not "USD Coin".
        network(BASE_SEPOLIA, USDC_BASE_SEPOLIA, "USDC"),
        network(ETHEREUM_MAINNET, USDC_ETHEREUM, DEFAULT_USDC_NAME),
        network(POLYGON_MAINNET, USDC_POLYGON, DEFAULT_USDC_NAME),
        // Polygon Amoy uses the newer FiatTokenV2_2 with name() = "USDC".
        network(POLYGON_AMOY, USDC_POLYGON_AMOY, "USDC"),
        network(AVALANCHE_MAINNET, USDC_AVALANCHE, DEFAULT_USDC_NAME),
        network(AVALANCHE_FUJI, USDC_AVALANCHE_FUJI, "USD Coin"),
    ]
}

/// Returns all CAIP-2 network identifiers for known EVM networks.
#[must_use]
pub fn known_network_ids() -> Vec<String> {
    known_networks().into_iter().map(|n| n.network).collect()
}

fn network(chain_id: u64, usdc: Address, eip712_name: &str) -> NetworkConfig {
    NetworkConfig {
        network: format!("eip155:{chain_id}"),
        chain_id,
        assets: vec![AssetInfo {
            address: usdc,
            decimals: DEFAULT_TOKEN_DECIMALS,
            name: eip712_name.to_owned(),
            version: DEFAULT_USDC_VERSION.to_owned(),
        }],
    }
}

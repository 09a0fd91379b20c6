//! Seller-side "exact" scheme implementation.
//!
//! [`ExactEvmServer`] implements [`SchemeServer`]: it converts
//! human-friendly prices (money strings, structured amounts) into atomic
//! token amounts and enhances payment requirements with the EIP-712 domain
//! parameters EVM clients need to construct valid signatures.

use pay402::proto::{PaymentRequirements, SupportedKind};
use pay402::scheme::{AssetAmount, SchemeError, SchemeServer};
use serde_json::Value;

use crate::chain::{AssetInfo, NetworkConfig};
use crate::exact::types::SCHEME_EXACT;
use crate::networks::known_networks;

/// EVM server implementation for the "exact" payment scheme.
pub struct ExactEvmServer {
    networks: Vec<NetworkConfig>,
}

impl ExactEvmServer {
    /// Creates a server scheme covering all known EVM networks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            networks: known_networks(),
        }
    }

    /// Creates a server scheme with custom network configurations.
    #[must_use]
    pub const fn with_networks(networks: Vec<NetworkConfig>) -> Self {
        Self { networks }
    }

    fn find_network(&self, network: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.network == network)
    }

    fn find_asset<'a>(config: &'a NetworkConfig, asset_address: &str) -> Option<&'a AssetInfo> {
        let address = asset_address.parse().ok()?;
        config.find_asset(address)
    }

    /// Converts a decimal money amount to the default asset's atomic units.
    fn default_money_conversion(
        &self,
        amount: f64,
        network: &str,
    ) -> Result<AssetAmount, SchemeError> {
        let config = self
            .find_network(network)
            .ok_or_else(|| -> SchemeError { format!("Unknown network: {network}").into() })?;

        let asset = config
            .assets
            .first()
            .ok_or_else(|| -> SchemeError { format!("No default asset for {network}").into() })?;

        let multiplier = 10u128.pow(u32::from(asset.decimals));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let token_amount = (amount * multiplier as f64).round() as u128;

        Ok(AssetAmount {
            amount: token_amount.to_string(),
            asset: format!("{}", asset.address),
            extra: Some(serde_json::json!({
                "name": asset.name,
                "version": asset.version,
            })),
        })
    }
}

impl Default for ExactEvmServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExactEvmServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExactEvmServer")
            .field("networks_count", &self.networks.len())
            .finish_non_exhaustive()
    }
}

impl SchemeServer for ExactEvmServer {
    fn scheme(&self) -> &str {
        SCHEME_EXACT
    }

    fn parse_price(&self, price: &Value, network: &str) -> Result<AssetAmount, SchemeError> {
        // Already a structured AssetAmount.
        if let Some(obj) = price.as_object()
            && let Some(amount) = obj.get("amount")
        {
            let asset = obj
                .get("asset")
                .and_then(Value::as_str)
                .ok_or_else(|| -> SchemeError {
                    format!("Asset address required for structured amount on {network}").into()
                })?;

            return Ok(AssetAmount {
                amount: amount
                    .as_str()
                    .map_or_else(|| amount.to_string(), String::from),
                asset: asset.to_owned(),
                extra: obj.get("extra").cloned(),
            });
        }

        // Money string ("1.50", "$0.01") or bare number.
        let decimal_amount = if let Some(s) = price.as_str() {
            parse_money_string(s)?
        } else if let Some(n) = price.as_f64() {
            n
        } else {
            return Err("Invalid price format".into());
        };

        self.default_money_conversion(decimal_amount, network)
    }

    fn enhance_payment_requirements(
        &self,
        mut requirements: PaymentRequirements,
        _supported_kind: &SupportedKind,
        _facilitator_extensions: &[String],
    ) -> PaymentRequirements {
        let Some(config) = self.find_network(&requirements.network) else {
            return requirements;
        };

        // Default asset when the config left it empty.
        if requirements.asset.is_empty()
            && let Some(default_asset) = config.assets.first()
        {
            requirements.asset = format!("{}", default_asset.address);
        }

        let asset_info = Self::find_asset(config, &requirements.asset);

        // Convert a decimal amount to the asset's smallest unit if needed.
        if requirements.amount.contains('.')
            && let Some(info) = asset_info
            && let Ok(atomic) = parse_decimal_to_atomic(&requirements.amount, info.decimals)
        {
            requirements.amount = atomic;
        }

        // Fill EIP-712 domain parameters into extra.
        if let Some(info) = asset_info {
            let extra = requirements
                .extra
                .get_or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Some(extra) = extra.as_object_mut() {
                extra
                    .entry("name")
                    .or_insert_with(|| Value::String(info.name.clone()));
                extra
                    .entry("version")
                    .or_insert_with(|| Value::String(info.version.clone()));
            }
        }

        requirements
    }
}

/// Parses a money string (`"1.50"`, `"$1.50"`, `"0.01"`) into `f64`.
fn parse_money_string(s: &str) -> Result<f64, SchemeError> {
    let cleaned = s.trim().trim_start_matches('$').trim();
    cleaned
        .parse::<f64>()
        .map_err(|e| -> SchemeError { format!("Invalid money string '{s}': {e}").into() })
}

/// Converts a decimal string to atomic units.
///
/// `"1.50"` with 6 decimals becomes `"1500000"`.
fn parse_decimal_to_atomic(amount: &str, decimals: u8) -> Result<String, SchemeError> {
    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };

    let whole_val: u128 = whole
        .parse()
        .map_err(|e| -> SchemeError { format!("Invalid amount '{amount}': {e}").into() })?;

    let decimal_places = u32::from(decimals);
    let multiplier = 10u128.pow(decimal_places);

    let frac_val = if frac.is_empty() {
        0u128
    } else {
        let padded = format!("{frac:0<width$}", width = decimal_places as usize);
        let truncated = &padded[..decimal_places as usize];
        truncated
            .parse()
            .map_err(|e| -> SchemeError { format!("Invalid fractional amount: {e}").into() })?
    };

    Ok((whole_val * multiplier + frac_val).to_string())
}

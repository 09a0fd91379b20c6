//! Configuration for protected resources.

use crate::proto::Network;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a resource server charges for one endpoint via one payment method.
///
/// # Example
///
/// ```rust
/// use pay402::config::ResourceConfig;
///
/// let config = ResourceConfig {
///     scheme: "exact".into(),
///     pay_to: "0xRecipient".into(),
///     price: serde_json::json!("1.50"),
///     network: "eip155:8453".into(),
///     max_timeout_seconds: Some(300),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Payment scheme identifier (e.g. `"exact"`).
    pub scheme: String,

    /// Recipient address.
    pub pay_to: String,

    /// Price for the resource — a money string (`"1.50"`) or an
    /// [`AssetAmount`](crate::scheme::AssetAmount) object.
    pub price: Value,

    /// CAIP-2 network identifier (e.g. `"eip155:8453"`).
    pub network: Network,

    /// Maximum payment validity in seconds. Defaults to 300 when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
}

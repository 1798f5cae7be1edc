//! Remote balance endpoint port
//!
//! Defines the interface for fetching the account balance document from the
//! remote API. The balance client uses this trait without knowing the HTTP
//! details (or that there is HTTP at all, in tests).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::result::Result;

/// Balance document returned by the remote endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceResponse {
    #[serde(default)]
    pub is_available: bool,
    #[serde(default)]
    pub balance_infos: Vec<BalanceInfo>,
}

/// One currency entry of a [`BalanceResponse`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub currency: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub total_balance: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub granted_balance: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub topped_up_balance: Option<Decimal>,
}

/// Deserialize amount that can be a decimal string, a number or null
fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<JsonValue> = Option::deserialize(deserializer)?;
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid decimal: {}", e))),
        Some(JsonValue::Number(n)) => n
            .to_string()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid decimal: {}", e))),
        Some(_) => Err(D::Error::custom("expected number or string for amount")),
    }
}

/// Remote balance endpoint
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Provider name (e.g., "deepseek")
    fn name(&self) -> &str;

    /// Perform one authenticated balance request with `api_key`
    ///
    /// Fails with `AuthRejected` when the key is refused and with
    /// `TransportFailure` for anything else that is not a usable document.
    async fn fetch(&self, api_key: &str) -> Result<BalanceResponse>;
}

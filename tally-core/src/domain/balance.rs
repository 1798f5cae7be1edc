//! Balance snapshot and refresh schedule domain models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ports::{BalanceInfo, BalanceResponse};

/// Refresh interval used when nothing is stored yet
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

/// Upper bound accepted from the settings surface (one day)
pub const MAX_INTERVAL_MINUTES: u32 = 1440;

/// The most recently fetched balance
///
/// All three amounts always come from the same successful fetch. Amounts are
/// kept at scale 2 so they serialize as `"1234.00"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub total: Decimal,
    pub topped_up: Decimal,
    pub granted: Decimal,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// Create a snapshot, normalizing every amount to two fractional digits
    pub fn new(
        total: Decimal,
        topped_up: Decimal,
        granted: Decimal,
        currency: impl Into<String>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            total: to_cents(total),
            topped_up: to_cents(topped_up),
            granted: to_cents(granted),
            currency: currency.into(),
            last_updated,
        }
    }

    /// Select the entry for `currency` from a remote response
    ///
    /// A missing entry (or a missing amount inside it) counts as zero.
    pub fn from_response(response: &BalanceResponse, currency: &str, now: DateTime<Utc>) -> Self {
        let entry = response
            .balance_infos
            .iter()
            .find(|info| info.currency.eq_ignore_ascii_case(currency));

        match entry {
            Some(BalanceInfo {
                total_balance,
                topped_up_balance,
                granted_balance,
                ..
            }) => Self::new(
                total_balance.unwrap_or_default(),
                topped_up_balance.unwrap_or_default(),
                granted_balance.unwrap_or_default(),
                currency,
                now,
            ),
            None => Self::new(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, currency, now),
        }
    }
}

fn to_cents(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded
}

/// Periodic refresh cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSchedule {
    pub interval_minutes: u32,
}

impl RefreshSchedule {
    /// Build a schedule, clamping into `[1, MAX_INTERVAL_MINUTES]`
    pub fn clamped(minutes: i64) -> Self {
        let minutes = minutes.clamp(1, MAX_INTERVAL_MINUTES as i64) as u32;
        Self {
            interval_minutes: minutes,
        }
    }

    /// Interpret a stored value; anything unreadable falls back to the default
    pub fn from_stored(value: Option<&serde_json::Value>) -> Self {
        let minutes = value.and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        });

        match minutes {
            Some(m) if m != 0 => Self::clamped(m),
            _ => Self::default(),
        }
    }

    pub fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

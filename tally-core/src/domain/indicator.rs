//! Badge presentation derived from the current balance state

use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::balance::BalanceSnapshot;

/// Balances below this are flagged as low unless configured otherwise
pub const DEFAULT_LOW_BALANCE_THRESHOLD: Decimal = Decimal::TEN;

pub const TOOLTIP_NO_CREDENTIAL: &str = "API key not set";
pub const TOOLTIP_FETCH_FAILED: &str = "Failed to fetch balance";
pub const TOOLTIP_MALFORMED: &str = "Invalid balance state";

/// Badge background colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeColor {
    /// Something needs the user's attention (no key)
    Alert,
    /// Balance below the low-balance threshold
    Low,
    Normal,
}

impl BadgeColor {
    pub fn hex(&self) -> &'static str {
        match self {
            BadgeColor::Alert => "#FFA500",
            BadgeColor::Low => "#FF6B6B",
            BadgeColor::Normal => "#4ECDC4",
        }
    }
}

/// What the indicator surface should show
///
/// `color: None` means "leave the current color alone".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub text: String,
    pub color: Option<BadgeColor>,
    pub tooltip: String,
}

/// Inputs the indicator can be derived from
#[derive(Debug, Clone, Copy)]
pub enum IndicatorInput<'a> {
    Snapshot(&'a BalanceSnapshot),
    NoCredential,
    Error,
}

impl Indicator {
    /// Derive the badge for `input`
    pub fn derive(input: IndicatorInput<'_>, low_threshold: Decimal) -> Self {
        match input {
            IndicatorInput::NoCredential => Self {
                text: "!".to_string(),
                color: Some(BadgeColor::Alert),
                tooltip: TOOLTIP_NO_CREDENTIAL.to_string(),
            },
            IndicatorInput::Error => Self {
                text: String::new(),
                color: None,
                tooltip: TOOLTIP_FETCH_FAILED.to_string(),
            },
            IndicatorInput::Snapshot(snapshot) => Self::for_total(
                &snapshot.total.to_string(),
                &snapshot.currency,
                snapshot.last_updated,
                low_threshold,
            ),
        }
    }

    /// Derive the badge from a textual total
    pub fn for_total(
        total: &str,
        currency: &str,
        updated: DateTime<Utc>,
        low_threshold: Decimal,
    ) -> Self {
        let amount = match Decimal::from_str(total.trim()) {
            Ok(amount) => amount,
            Err(_) => {
                tracing::error!(total, "balance total is not numeric");
                return Self {
                    text: String::new(),
                    color: None,
                    tooltip: TOOLTIP_MALFORMED.to_string(),
                };
            }
        };

        let color = if amount < low_threshold {
            BadgeColor::Low
        } else {
            BadgeColor::Normal
        };

        Self {
            text: badge_text(total, amount),
            color: Some(color),
            tooltip: format!(
                "Balance: {} {} | Last updated: {}",
                total,
                currency,
                updated.with_timezone(&Local).format("%H:%M:%S")
            ),
        }
    }
}

fn badge_text(raw: &str, amount: Decimal) -> String {
    if amount >= Decimal::ONE_THOUSAND {
        let thousands = (amount / Decimal::ONE_THOUSAND)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        format!("{}k", thousands.normalize())
    } else if raw.chars().count() <= 4 {
        raw.to_string()
    } else {
        let mut one_digit = amount.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
        one_digit.rescale(1);
        one_digit.to_string()
    }
}

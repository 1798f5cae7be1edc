//! Configuration management
//!
//! `settings.json` in the data directory, every field optional:
//! ```json
//! {
//!   "apiBaseUrl": "https://api.deepseek.com",
//!   "currency": "CNY",
//!   "requestTimeoutSecs": 30,
//!   "keepAliveMinutes": 4,
//!   "lowBalanceThreshold": "10"
//! }
//! ```
//! Fields this crate does not know about are kept as they are on save.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::adapters::deepseek::DEEPSEEK_PRODUCTION_URL;
use crate::domain::indicator::DEFAULT_LOW_BALANCE_THRESHOLD;

const SETTINGS_FILENAME: &str = "settings.json";

/// Environment variable overriding the API base URL (staging or mock server)
pub const API_BASE_URL_ENV: &str = "TALLY_API_BASE_URL";

const DEFAULT_CURRENCY: &str = "CNY";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_KEEP_ALIVE_MINUTES: u64 = 4;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keep_alive_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    low_balance_threshold: Option<Decimal>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Tally configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub currency: String,
    pub request_timeout: Duration,
    pub keep_alive: Duration,
    pub low_balance_threshold: Decimal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEEPSEEK_PRODUCTION_URL.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_MINUTES * 60),
            low_balance_threshold: DEFAULT_LOW_BALANCE_THRESHOLD,
        }
    }
}

impl Config {
    /// Load config from the data directory
    ///
    /// The base URL can also come from `TALLY_API_BASE_URL`, which wins over
    /// the file.
    pub fn load(tally_dir: &Path) -> Result<Self> {
        let raw = read_settings(&tally_dir.join(SETTINGS_FILENAME))?;
        let env_url = std::env::var(API_BASE_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());

        let defaults = Self::default();
        let config = Self {
            api_base_url: env_url
                .or(raw.api_base_url)
                .unwrap_or(defaults.api_base_url),
            currency: raw
                .currency
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.currency),
            request_timeout: raw
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            keep_alive: raw
                .keep_alive_minutes
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.keep_alive),
            low_balance_threshold: raw
                .low_balance_threshold
                .unwrap_or(defaults.low_balance_threshold),
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to the data directory, preserving fields it does not manage
    pub fn save(&self, tally_dir: &Path) -> Result<()> {
        let settings_path = tally_dir.join(SETTINGS_FILENAME);
        let mut settings = read_settings(&settings_path)?;

        settings.api_base_url = Some(self.api_base_url.clone());
        settings.currency = Some(self.currency.clone());
        settings.request_timeout_secs = Some(self.request_timeout.as_secs());
        settings.keep_alive_minutes = Some(self.keep_alive.as_secs() / 60);
        settings.low_balance_threshold = Some(self.low_balance_threshold);

        std::fs::create_dir_all(tally_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {:?}", settings_path))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid apiBaseUrl '{}'", self.api_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("apiBaseUrl must use http or https, got '{}'", url.scheme());
        }
        if self.request_timeout.is_zero() {
            bail!("requestTimeoutSecs must be at least 1");
        }
        if self.keep_alive.is_zero() {
            bail!("keepAliveMinutes must be at least 1");
        }
        if self.low_balance_threshold.is_sign_negative() {
            bail!("lowBalanceThreshold cannot be negative");
        }
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    if content.trim().is_empty() {
        return Ok(SettingsFile::default());
    }
    serde_json::from_str(&content).with_context(|| format!("Invalid settings file {:?}", path))
}

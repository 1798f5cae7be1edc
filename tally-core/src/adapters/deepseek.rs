//! DeepSeek balance API client
//!
//! Handles the authenticated `GET /user/balance` call.
//!
//! API Documentation: https://api-docs.deepseek.com/api/get-user-balance

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::domain::result::{Error, Result};
use crate::ports::{BalanceProvider, BalanceResponse};

/// Default production API URL
pub const DEEPSEEK_PRODUCTION_URL: &str = "https://api.deepseek.com";

/// Path of the balance endpoint, relative to the base URL
pub const BALANCE_PATH: &str = "/user/balance";

/// DeepSeek API client
#[derive(Debug, Clone)]
pub struct DeepSeekClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl DeepSeekClient {
    /// Create a client for the production API
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::new_with_base_url(DEEPSEEK_PRODUCTION_URL, timeout)
    }

    /// Create a client against a custom base URL (staging or a mock server)
    pub fn new_with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", base_url, e)))?;

        if !matches!(parsed.scheme(), "https" | "http") {
            return Err(Error::Config(format!(
                "API base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tally/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")
            .map_err(|e| Error::Config(format!("{:#}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn balance_url(&self) -> String {
        format!("{}{}", self.base_url, BALANCE_PATH)
    }

    /// Map request errors to user-friendly messages
    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::transport(format!(
                "Connection timed out after {} seconds",
                self.timeout.as_secs()
            ))
        } else if error.is_connect() {
            Error::transport("Unable to connect to the DeepSeek API")
        } else if error.is_builder() {
            Error::validation(format!("API key cannot be sent as a header: {}", error))
        } else {
            Error::transport(format!("DeepSeek request failed: {}", error))
        }
    }

    /// Check response status and return appropriate errors
    fn check_response_status(status: StatusCode) -> Result<()> {
        match status.as_u16() {
            200..=299 => Ok(()),
            401 | 403 => Err(Error::AuthRejected(format!(
                "HTTP {}; the API key may be invalid or revoked",
                status.as_u16()
            ))),
            402 => Err(Error::transport("DeepSeek reports insufficient balance (HTTP 402)")),
            429 => Err(Error::transport(
                "DeepSeek rate limit exceeded. Please wait a moment and try again.",
            )),
            code => Err(Error::transport(format!("DeepSeek API error: HTTP {}", code))),
        }
    }
}

#[async_trait]
impl BalanceProvider for DeepSeekClient {
    fn name(&self) -> &str {
        "deepseek"
    }

    async fn fetch(&self, api_key: &str) -> Result<BalanceResponse> {
        if api_key.trim().is_empty() {
            return Err(Error::validation("API key cannot be empty"));
        }

        let response = self
            .client
            .get(self.balance_url())
            .bearer_auth(api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        Self::check_response_status(response.status())?;

        response
            .json::<BalanceResponse>()
            .await
            .map_err(|e| Error::transport(format!("Failed to parse balance response: {}", e)))
    }
}

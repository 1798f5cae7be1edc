//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
///
/// The first five variants are the conditions callers are expected to act on.
/// The rest are ambient failures of the host capabilities.
#[derive(Error, Debug)]
pub enum Error {
    #[error("API key is not set")]
    CredentialMissing,

    #[error("API key was rejected: {0}")]
    AuthRejected(String),

    #[error("Balance request failed: {0}")]
    TransportFailure(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Encryption key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportFailure(msg.into())
    }

    /// Create a storage error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the user has to act (enter or replace the key) before a retry can help
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, Self::CredentialMissing | Self::AuthRejected(_))
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Attach a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_result() {
        let err: Result<i32> = Err(Error::AuthRejected("HTTP 401".to_string()));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("rejected"));
    }

    #[test]
    fn test_with_context() {
        let result: OperationResult<()> =
            OperationResult::ok(()).with_context("interval", serde_json::json!(5));
        assert_eq!(result.context.unwrap()["interval"], 5);
    }

    #[test]
    fn test_user_actionable() {
        assert!(Error::CredentialMissing.is_user_actionable());
        assert!(Error::AuthRejected("x".into()).is_user_actionable());
        assert!(!Error::transport("timeout").is_user_actionable());
    }
}

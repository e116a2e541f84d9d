use std::io;

use crate::client::Operation;

/// Custom error type for appcenter_actions operations
#[derive(Debug, thiserror::Error)]
pub enum AppCenterError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("App Center rejected {operation}: {message}")]
    RemoteApi { operation: Operation, message: String },

    #[error("Unexpected response to {operation} (HTTP {status}): {message}")]
    InvalidResponse {
        operation: Operation,
        status: u16,
        message: String,
    },

    #[error("App record is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Failure to retrieve the organization's app roster. Aborts the run.
#[derive(Debug, thiserror::Error)]
#[error("Failed to list apps for organization '{organization}': {source}")]
pub struct ListError {
    pub organization: String,
    #[source]
    pub source: AppCenterError,
}

/// Failure of a single per-app dispatch. Logged and skipped.
#[derive(Debug, thiserror::Error)]
#[error("Dispatch for app '{display_name}' failed: {source}")]
pub struct DispatchError {
    pub display_name: String,
    #[source]
    pub source: AppCenterError,
}

/// Helper type for Results that use AppCenterError
pub type Result<T> = std::result::Result<T, AppCenterError>;

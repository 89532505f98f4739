//! Unified error types for the GA4 reporting client.

use reqwest::StatusCode;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token request failed with status {status}: {body}")]
    TokenRequestFailed { status: StatusCode, body: String },

    #[error("Token parse error: {0}")]
    TokenParse(String),

    #[error("Failed to read credentials file {path}: {reason}")]
    Credentials { path: String, reason: String },

    #[error("Unsupported credentials type: {0}")]
    UnsupportedCredentials(String),

    #[error("Failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),
}

/// Analytics Data API request/response errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("Google API error {status} [{code}]: {message}")]
    GoogleError {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),
}

/// The single failure kind surfaced by report entry points.
///
/// Whatever went wrong while building the request or talking to the
/// backend is kept as the error source.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report query failed")]
    QueryFailed(#[from] ApiError),
}

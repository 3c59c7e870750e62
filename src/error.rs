use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::types::QuotaStatus;

pub type Result<T> = std::result::Result<T, Error>;

/// Construction-time validation failures. The first violated constraint wins.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown agent `{0}` (expected `yalidine` or `guepex`)")]
    UnknownAgent(String),
    #[error("missing API id")]
    MissingApiId,
    #[error("missing API token")]
    MissingApiToken,
    #[error("credential `{0}` is not a valid header value")]
    InvalidCredential(&'static str),
    #[error("timeout must be positive, got {0}ms")]
    InvalidTimeout(i64),
    #[error("retries must be non-negative, got {0}")]
    InvalidRetries(i64),
    #[error("invalid base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("{var} is not a number: `{value}`")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        quota: QuotaStatus,
    },

    /// Non-2xx response, or a response whose body could not be parsed.
    /// `body` holds the parsed payload, or the raw text as a JSON string.
    #[error("api error {status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        body: Value,
    },

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration_error",
            Error::Timeout { .. } => "timeout",
            Error::Network { .. } => "network_error",
            Error::RateLimited { .. } => "rate_limited",
            Error::Api { status, .. } => api_error_code(*status),
            Error::Initialization(_) => "initialization_error",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Only transport-level failures are retried by the engine.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Network { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            _ => None,
        }
    }
}

pub fn api_error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::CONFLICT => "conflict",
        StatusCode::TOO_MANY_REQUESTS => "rate_limited",
        s if s.is_server_error() => "upstream_error",
        _ => "api_error",
    }
}

/// Failures raised by cache store backends.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache file `{path}` is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

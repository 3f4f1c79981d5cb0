//! Error types for CRM clients.

use thiserror::Error;

/// Result type for CRM operations.
pub type Result<T> = std::result::Result<T, CrmError>;

/// CRM error types.
#[derive(Debug, Error)]
pub enum CrmError {
    /// The entity being created already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication error (invalid or revoked token).
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Retry after {retry_after:?} seconds")]
    RateLimit { retry_after: Option<u64> },

    /// The CRM rejected the request.
    #[error("Invalid request: {status} - {message}")]
    InvalidRequest { status: u16, message: String },

    /// Server error from the CRM.
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CrmError {
    /// Create a server error.
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(status: u16, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            status,
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the failure is a network/transport condition worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::Network(_) => true,
            Self::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

//! Bridge error types.

use std::time::Duration;
use thiserror::Error;
use wabridge_store::StoreError;

/// Errors surfaced by the bridge engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A mapping already exists for the key. A concurrency signal, not a failure.
    #[error("Mapping already exists for session '{session_id}', message '{native_message_id}'")]
    Duplicate {
        session_id: String,
        native_message_id: String,
    },

    /// Contact or conversation resolution failed; delivery abandoned for this message.
    #[error("Identity unresolvable: {0}")]
    IdentityUnresolvable(String),

    /// Native send or CRM call failed at the transport layer.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Required fields could not be extracted from a webhook payload.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The event carries no phone to address the native message to.
    #[error("Cannot address message: {0}")]
    Unaddressable(String),

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Session not registered.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No mapping with this id in the session.
    #[error("Mapping not found: {0}")]
    MappingNotFound(String),

    /// Mapping store error.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Create an identity error.
    pub fn identity(message: impl Into<String>) -> Self {
        Self::IdentityUnresolvable(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure(message.into())
    }

    /// Create a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether an operator-triggered retry of the same event may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure(_) | Self::Timeout { .. })
    }
}

impl From<StoreError> for BridgeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate {
                session_id,
                native_message_id,
            } => Self::Duplicate {
                session_id,
                native_message_id,
            },
            other => Self::Store(other),
        }
    }
}

//! Gateway error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use wabridge_bridge::BridgeError;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameters.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Bridge error.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status for the error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParams(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Bridge(e) => match e {
                BridgeError::SessionNotFound(_) | BridgeError::MappingNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                BridgeError::IdentityUnresolvable(_) | BridgeError::Unaddressable(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                BridgeError::MalformedPayload(_) | BridgeError::Config(_) => StatusCode::BAD_REQUEST,
                BridgeError::TransportFailure(_) => StatusCode::BAD_GATEWAY,
                BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                BridgeError::Duplicate { .. } => StatusCode::CONFLICT,
                BridgeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "invalid_params",
            Self::Auth(_) => "unauthorized",
            Self::Bridge(e) => match e {
                BridgeError::SessionNotFound(_) => "session_not_found",
                BridgeError::MappingNotFound(_) => "mapping_not_found",
                BridgeError::IdentityUnresolvable(_) => "identity_unresolvable",
                BridgeError::Unaddressable(_) => "unaddressable",
                BridgeError::MalformedPayload(_) => "malformed_payload",
                BridgeError::Config(_) => "invalid_request",
                BridgeError::TransportFailure(_) => "transport_failure",
                BridgeError::Timeout { .. } => "timeout",
                BridgeError::Duplicate { .. } => "duplicate",
                BridgeError::Store(_) => "store",
            },
            Self::Io(_) | Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

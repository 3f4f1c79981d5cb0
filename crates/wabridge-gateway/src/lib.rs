//! HTTP gateway for wabridge.
//!
//! Routes:
//! - `GET /health`
//! - `POST /webhook/:session_id`: CRM webhooks, acknowledged immediately
//! - `POST /sessions/:session_id/inbound`: native messages from the session manager
//! - `GET /sessions/:session_id/stats`
//! - `GET /sessions/:session_id/failed`
//! - `POST /sessions/:session_id/retry`
//! - `POST /sessions/:session_id/mappings/:mapping_id/resync`
//! - `POST /sessions/:session_id/cleanup`

pub mod error;
pub mod handlers;
pub mod server;

pub use error::GatewayError;
pub use server::{Gateway, GatewayState};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

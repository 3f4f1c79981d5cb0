//! Store error types.

use crate::model::MappingStatus;
use thiserror::Error;

/// Errors that can occur during mapping store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A pending or synced mapping already exists for the key.
    #[error("Mapping already exists for session '{session_id}', message '{native_message_id}'")]
    Duplicate {
        session_id: String,
        native_message_id: String,
    },

    /// Mapping not found.
    #[error("Mapping not found: {0}")]
    NotFound(String),

    /// The requested state change is not allowed from the mapping's current state.
    #[error("Invalid transition for mapping {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: MappingStatus,
        to: MappingStatus,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn duplicate(session_id: impl Into<String>, native_message_id: impl Into<String>) -> Self {
        Self::Duplicate {
            session_id: session_id.into(),
            native_message_id: native_message_id.into(),
        }
    }

    /// Whether the error is the duplicate-key concurrency signal.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

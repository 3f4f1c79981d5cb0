//! Error types for wabridge core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON5 parse error: {0}")]
    Json5(String),

    /// One or more problems, joined with `; `.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown regional phone rule: {0}")]
    UnknownPhoneRule(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Whether the error only means no config file exists yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

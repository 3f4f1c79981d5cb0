//! # wabridge-core
//!
//! Core types, configuration, and pure utilities for wabridge.
//!
//! This crate provides shared functionality used across all wabridge crates:
//!
//! - **Configuration**: Loading, validation, and persistence of the JSON5 config file
//! - **Types**: Message kinds, directions, and the native inbound message shape
//! - **Phone**: Canonical phone keys with pluggable regional merge rules
//! - **Format**: Markup translation and placeholders between the messaging side and the CRM
//! - **Utilities**: Path resolution, ID generation, and environment handling

pub mod config;
pub mod types;
pub mod error;
pub mod paths;
pub mod env;
pub mod id;
pub mod phone;
pub mod format;

// Re-exports for convenience
pub use config::Config;
pub use error::ConfigError;
pub use format::ContentFormatter;
pub use phone::{BrazilNinthDigit, PhoneNormalizer, RegionalRule};
pub use types::*;

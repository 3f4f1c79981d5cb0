//! CLI command implementations.

pub mod config;
pub mod maintenance;
pub mod phone;
pub mod serve;

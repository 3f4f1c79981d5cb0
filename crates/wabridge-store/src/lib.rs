//! Message mapping storage for wabridge.
//!
//! This crate provides:
//! - The `MessageMapping` record and its `pending -> synced | failed` lifecycle
//! - The `MappingStore` contract the bridge uses as its idempotency gate
//! - In-memory and SQLite implementations

pub mod error;
pub mod model;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use model::{MappingStats, MappingStatus, MessageMapping, NewMapping, RemoteIds};
pub use sqlite::SqliteMappingStore;
pub use store::{MappingStore, MemoryMappingStore};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

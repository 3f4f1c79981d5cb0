//! Core types shared across wabridge crates.

mod message;

pub use message::*;

//! HTTP handlers.

mod admin;
mod health;
mod inbound;
mod webhook;

pub use admin::{cleanup, failed, resync, retry, stats};
pub use health::health;
pub use inbound::{inbound, InboundEvent};
pub use webhook::webhook;

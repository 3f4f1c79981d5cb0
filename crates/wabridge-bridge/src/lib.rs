//! Reconciliation engine bridging messaging sessions and a CRM.
//!
//! Native messages flow into the CRM through [`BridgeEngine::process_inbound`];
//! CRM webhooks flow back through [`BridgeEngine::process_outbound_webhook`].
//! A durable [`wabridge_store::MappingStore`] correlates both sides and gates
//! every delivery so each message is bridged at most once.

pub mod classifier;
pub mod engine;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod registry;

#[cfg(test)]
mod testing;

pub use classifier::{Attachment, BridgeEvent, Decision, EventClassifier, SkipReason, WebhookMessageType};
pub use engine::{BridgeEngine, InboundOutcome, RetryReport, WebhookOutcome};
pub use error::BridgeError;
pub use identity::{IdentityError, IdentityResolver};
pub use messaging::{
    HttpMessagingManager, InboundHandler, MessagingError, MessagingManager, OutboundNative, ReadResult,
    SendReceipt,
};
pub use registry::{ChatwootFactory, ConversationCache, CrmClientFactory, SessionContext, SessionRegistry};

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

//! CRM client contract for wabridge.
//!
//! The bridge consumes the CRM through [`CrmClient`]. [`ChatwootClient`]
//! implements it against the Chatwoot application API.
//!
//! # Example
//!
//! ```rust,ignore
//! use wabridge_crm::{ChatwootClient, CrmClient, MessageType, NewRemoteMessage};
//!
//! let client = ChatwootClient::new("https://app.chatwoot.com", 1, "token")?;
//! if let Some(contact) = client.find_contact("5511987654321", 7).await? {
//!     let conversation = client.find_conversation(contact.crm_contact_id, 7).await?;
//! }
//! ```

mod chatwoot;
mod error;
mod types;

pub use chatwoot::ChatwootClient;
pub use error::{CrmError, Result};
pub use types::*;

use async_trait::async_trait;

/// Operations the bridge needs from the CRM.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Find a contact by canonical phone key.
    async fn find_contact(&self, phone_key: &str, inbox_id: u64) -> Result<Option<ContactIdentity>>;

    /// Create a contact. Fails with [`CrmError::AlreadyExists`] when the phone is taken.
    async fn create_contact(&self, contact: NewContact) -> Result<ContactIdentity>;

    /// Rename a contact.
    async fn update_contact_name(&self, contact_id: u64, name: &str) -> Result<()>;

    /// Find a conversation of the contact in the inbox, preferring unresolved ones.
    async fn find_conversation(
        &self,
        contact_id: u64,
        inbox_id: u64,
    ) -> Result<Option<ConversationHandle>>;

    /// Create a conversation for the contact in the inbox.
    async fn create_conversation(
        &self,
        contact_id: u64,
        inbox_id: u64,
        source_id: Option<&str>,
    ) -> Result<ConversationHandle>;

    /// Post a message, returning the CRM message id.
    async fn post_message(&self, conversation_id: u64, message: NewRemoteMessage) -> Result<u64>;
}

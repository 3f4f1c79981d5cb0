//! Types shared by CRM clients.

use serde::{Deserialize, Serialize};

/// A CRM contact resolved for a phone key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactIdentity {
    /// Canonical phone key.
    pub phone_key: String,

    /// Name shown in the CRM.
    pub display_name: Option<String>,

    /// CRM contact id.
    pub crm_contact_id: u64,
}

/// Conversation status as reported by the CRM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Snoozed,
    Resolved,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Snoozed => "snoozed",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "pending" => Some(Self::Pending),
            "snoozed" => Some(Self::Snoozed),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

/// A conversation of one contact in one inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHandle {
    pub crm_conversation_id: u64,
    pub crm_contact_id: u64,
    pub crm_inbox_id: u64,
    #[serde(default)]
    pub status: ConversationStatus,
}

/// Request to create a contact.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub inbox_id: u64,
    /// Canonical phone key (digits only).
    pub phone_key: String,
    pub name: String,
}

/// Timeline side of a posted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Written by the contact.
    Incoming,
    /// Written on the business side.
    Outgoing,
}

/// Request to post a message into a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct NewRemoteMessage {
    pub content: String,
    pub message_type: MessageType,
    pub private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl NewRemoteMessage {
    pub fn new(content: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            content: content.into(),
            message_type,
            private: false,
            source_id: None,
        }
    }

    /// Tag the message with a source id.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// Digits of a phone string, e.g. `+55 11 9...` -> `55119...`.
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

//! Mapping records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use wabridge_core::{Direction, MessageKind};

/// Lifecycle state of a mapping. `Synced` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    Pending,
    Synced,
    Failed,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a row in this state takes part in the per-key uniqueness rule.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Synced)
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown mapping status: {}", other)),
        }
    }
}

/// Durable correlation between a native message and its CRM counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMapping {
    pub id: String,
    pub session_id: String,
    pub native_message_id: String,
    pub remote_message_id: Option<String>,
    pub remote_conversation_id: Option<String>,
    /// Canonical phone key of the human participant.
    pub counterpart_phone: String,
    pub direction: Direction,
    pub status: MappingStatus,
    pub kind: MessageKind,
    /// Original body, kept so an unconfirmed inbound delivery can be re-posted.
    pub content: Option<String>,
    pub display_name: Option<String>,
    /// Whether the session owner sent the native message.
    pub from_self: bool,
    /// When the messaging side reports the native message was sent.
    pub sent_at: Option<DateTime<Utc>>,
    /// Phone rule set that produced `counterpart_phone`, e.g. `br-ninth-digit@1`.
    pub phone_rules: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageMapping {
    /// Build a fresh record from a request.
    pub(crate) fn from_new(new: NewMapping, status: MappingStatus) -> Self {
        let now = Utc::now();
        Self {
            id: wabridge_core::id::uuid(),
            session_id: new.session_id,
            native_message_id: new.native_message_id,
            remote_message_id: None,
            remote_conversation_id: None,
            counterpart_phone: new.counterpart_phone,
            direction: new.direction,
            status,
            kind: new.kind,
            content: new.content,
            display_name: new.display_name,
            from_self: new.from_self,
            sent_at: new.sent_at,
            phone_rules: new.phone_rules,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to create a mapping.
#[derive(Debug, Clone)]
pub struct NewMapping {
    pub session_id: String,
    pub native_message_id: String,
    pub direction: Direction,
    pub counterpart_phone: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub display_name: Option<String>,
    pub from_self: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub phone_rules: String,
}

impl NewMapping {
    pub fn new(
        session_id: impl Into<String>,
        native_message_id: impl Into<String>,
        direction: Direction,
        counterpart_phone: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            native_message_id: native_message_id.into(),
            direction,
            counterpart_phone: counterpart_phone.into(),
            kind: MessageKind::Text,
            content: None,
            display_name: None,
            from_self: false,
            sent_at: None,
            phone_rules: String::new(),
        }
    }

    /// Keep the message payload on the mapping.
    pub fn with_payload(mut self, kind: MessageKind, content: impl Into<String>) -> Self {
        self.kind = kind;
        self.content = Some(content.into());
        self
    }

    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    pub fn from_self(mut self, from_self: bool) -> Self {
        self.from_self = from_self;
        self
    }

    pub fn sent_at(mut self, at: DateTime<Utc>) -> Self {
        self.sent_at = Some(at);
        self
    }

    pub fn with_phone_rules(mut self, fingerprint: impl Into<String>) -> Self {
        self.phone_rules = fingerprint.into();
        self
    }

    /// A fresh request carrying the same message as `mapping`.
    pub fn replay_of(mapping: &MessageMapping) -> Self {
        Self {
            session_id: mapping.session_id.clone(),
            native_message_id: mapping.native_message_id.clone(),
            direction: mapping.direction,
            counterpart_phone: mapping.counterpart_phone.clone(),
            kind: mapping.kind,
            content: mapping.content.clone(),
            display_name: mapping.display_name.clone(),
            from_self: mapping.from_self,
            sent_at: mapping.sent_at,
            phone_rules: mapping.phone_rules.clone(),
        }
    }
}

/// CRM identifiers confirmed by a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIds {
    pub message_id: String,
    pub conversation_id: String,
}

impl RemoteIds {
    pub fn new(message_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

/// Mapping counts for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStats {
    pub pending: u64,
    pub synced: u64,
    pub failed: u64,
}

impl MappingStats {
    pub fn total(&self) -> u64 {
        self.pending + self.synced + self.failed
    }

    pub(crate) fn add(&mut self, status: MappingStatus, count: u64) {
        match status {
            MappingStatus::Pending => self.pending += count,
            MappingStatus::Synced => self.synced += count,
            MappingStatus::Failed => self.failed += count,
        }
    }
}

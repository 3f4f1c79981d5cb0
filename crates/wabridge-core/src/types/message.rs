//! Message types exchanged between the messaging side and the CRM.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a message body on the messaging side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contact,
    Reaction,
    Unknown,
}

impl MessageKind {
    /// Stable lowercase name, used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Location => "location",
            Self::Contact => "contact",
            Self::Reaction => "reaction",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the kind carries a media payload.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Video | Self::Audio | Self::Document | Self::Sticker
        )
    }

    /// Map a CRM attachment `file_type` onto a message kind.
    ///
    /// Unrecognized file types are sent as documents.
    pub fn from_file_type(file_type: &str) -> Self {
        match file_type.to_ascii_lowercase().as_str() {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "location" => Self::Location,
            "contact" => Self::Contact,
            _ => Self::Document,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "conversation" | "extendedText" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" | "ptt" | "voice" => Ok(Self::Audio),
            "document" | "file" => Ok(Self::Document),
            "sticker" => Ok(Self::Sticker),
            "location" => Ok(Self::Location),
            "contact" | "vcard" => Ok(Self::Contact),
            "reaction" => Ok(Self::Reaction),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown message kind: {}", other)),
        }
    }
}

/// Direction of a bridged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Messaging side to CRM.
    Inbound,
    /// CRM to messaging side.
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// A message observed on the messaging side for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Messaging session the message arrived on.
    pub session_id: String,

    /// Native message identifier.
    pub native_message_id: String,

    /// Phone or JID of the sender.
    pub from_phone: String,

    /// Phone or JID of the remote chat. Identifies the counterpart of self-sent messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_phone: Option<String>,

    /// Push name of the sender, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Body text or caption.
    #[serde(default)]
    pub content: String,

    /// Message kind.
    #[serde(default)]
    pub kind: MessageKind,

    /// Timestamp reported by the messaging side.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Whether the session owner sent the message from another device.
    #[serde(default)]
    pub is_from_self: bool,

    /// Tag the bridge attached when it sent this message itself, echoed back by the session manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_tag: Option<String>,
}

impl InboundMessage {
    /// Create a text message from a counterpart.
    pub fn text(
        session_id: impl Into<String>,
        native_message_id: impl Into<String>,
        from_phone: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            native_message_id: native_message_id.into(),
            from_phone: from_phone.into(),
            chat_phone: None,
            display_name: None,
            content: content.into(),
            kind: MessageKind::Text,
            timestamp: Utc::now(),
            is_from_self: false,
            echo_tag: None,
        }
    }

    /// Set the sender display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the message kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark as sent by the session owner to `chat_phone`.
    pub fn from_self(mut self, chat_phone: impl Into<String>) -> Self {
        self.is_from_self = true;
        self.chat_phone = Some(chat_phone.into());
        self
    }

    /// Phone of the human participant: the chat for self-sent messages, the sender otherwise.
    pub fn counterpart_phone(&self) -> Option<&str> {
        if self.is_from_self {
            self.chat_phone.as_deref().filter(|p| !p.is_empty())
        } else {
            Some(self.from_phone.as_str()).filter(|p| !p.is_empty())
        }
    }
}

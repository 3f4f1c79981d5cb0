//! CRM webhook classification.
//!
//! Webhooks arrive in two shapes: a legacy one with the message nested under
//! `message`, and a flat one where the message fields sit at the top level
//! next to `event`. [`PayloadShape::detect`] picks the shape explicitly, then
//! [`EventClassifier::classify`] extracts a [`BridgeEvent`] and applies the
//! decision table.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use wabridge_core::id::is_echo_tag;
use wabridge_crm::ConversationStatus;

use crate::error::BridgeError;
use crate::Result;

/// Webhook event names the bridge understands.
pub mod events {
    pub const MESSAGE_CREATED: &str = "message_created";
    pub const MESSAGE_UPDATED: &str = "message_updated";
    pub const CONVERSATION_STATUS_CHANGED: &str = "conversation_status_changed";
    pub const TYPING_ON: &str = "conversation_typing_on";
    pub const TYPING_OFF: &str = "conversation_typing_off";
}

/// Message type as tagged by the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookMessageType {
    Incoming,
    Outgoing,
    Activity,
    Template,
    Unknown,
}

impl WebhookMessageType {
    fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Incoming,
            1 => Self::Outgoing,
            2 => Self::Activity,
            3 => Self::Template,
            _ => Self::Unknown,
        }
    }

    fn from_name(name: &str) -> Self {
        let name = name.trim();
        if let Ok(code) = name.parse::<u64>() {
            return Self::from_code(code);
        }
        match name.to_ascii_lowercase().as_str() {
            "incoming" => Self::Incoming,
            "outgoing" => Self::Outgoing,
            "activity" => Self::Activity,
            "template" => Self::Template,
            _ => Self::Unknown,
        }
    }
}

/// Why a webhook was not acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Internal note.
    Private,
    /// Edit of an existing message.
    Update,
    /// Typing indicator.
    Typing,
    /// Event the bridge does not handle.
    UnsupportedEvent,
    /// Message written by the contact, already delivered from the native side.
    Incoming,
    /// CRM system message.
    Activity,
    /// Nothing to deliver.
    EmptyContent,
    /// Message the bridge posted itself.
    Echo,
    /// Required fields missing.
    Malformed,
    /// Session has bridging disabled.
    SessionDisabled,
    /// No mapping correlates the event to a native message.
    Unmapped,
    /// `message_type` the bridge does not recognise.
    UnknownType,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Update => "update",
            Self::Typing => "typing",
            Self::UnsupportedEvent => "unsupported_event",
            Self::Incoming => "incoming",
            Self::Activity => "activity",
            Self::EmptyContent => "empty_content",
            Self::Echo => "echo",
            Self::Malformed => "malformed",
            Self::SessionDisabled => "session_disabled",
            Self::Unmapped => "unmapped",
            Self::UnknownType => "unknown_type",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine should do with a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Deliver to the native side.
    Forward,
    /// Do nothing.
    Skip(SkipReason),
    /// Record the conversation status only.
    StatusChange,
    /// Revoke the native counterpart of a deleted message.
    Deletion,
}

impl Decision {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

/// First attachment of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_type: String,
    pub data_url: String,
}

/// Normalized view of a CRM webhook.
#[derive(Debug, Clone)]
pub struct BridgeEvent {
    pub event: String,
    pub decision: Decision,
    pub content: String,
    pub message_type: WebhookMessageType,
    pub sender_is_agent: bool,
    pub is_private: bool,
    /// `source_id` of the CRM message; bridge-posted messages carry the echo tag here.
    pub source_message_id: Option<String>,
    /// CRM message id.
    pub remote_message_id: Option<u64>,
    pub conversation_id: Option<u64>,
    pub conversation_status: Option<ConversationStatus>,
    pub contact_phone: Option<String>,
    pub contact_name: Option<String>,
    /// Replying agent, for signing.
    pub sender_name: Option<String>,
    pub attachment: Option<Attachment>,
}

// ---------------------------------------------------------------------------
// Wire models
// ---------------------------------------------------------------------------

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Number(n)) => Some(n),
        Some(Id::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawMessageType {
    Code(u64),
    Name(String),
}

impl From<&RawMessageType> for WebhookMessageType {
    fn from(raw: &RawMessageType) -> Self {
        match raw {
            RawMessageType::Code(code) => WebhookMessageType::from_code(*code),
            RawMessageType::Name(name) => WebhookMessageType::from_name(name),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawParty {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl RawParty {
    fn phone(&self) -> Option<&str> {
        self.phone_number.as_deref().filter(|p| !p.trim().is_empty())
    }

    fn is(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConversationMeta {
    #[serde(default)]
    sender: Option<RawParty>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LastMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawConversation {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<u64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    meta: Option<ConversationMeta>,
    #[serde(default)]
    messages: Option<Vec<LastMessage>>,
}

impl RawConversation {
    fn sender(&self) -> Option<&RawParty> {
        self.meta.as_ref().and_then(|m| m.sender.as_ref())
    }

    fn last_content(&self) -> Option<&str> {
        self.messages
            .as_deref()
            .unwrap_or_default()
            .iter()
            .rev()
            .find_map(|m| non_empty(m.content.as_deref()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawAttachment {
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    data_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawMessage {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<u64>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    message_type: Option<RawMessageType>,
    #[serde(default)]
    private: Option<bool>,
    #[serde(default)]
    source_id: Option<String>,
    #[serde(default)]
    content_attributes: Option<Value>,
    #[serde(default)]
    sender: Option<RawParty>,
    #[serde(default)]
    attachments: Option<Vec<RawAttachment>>,
}

impl RawMessage {
    fn attribute(&self, key: &str) -> Option<Value> {
        match self.content_attributes.as_ref()? {
            Value::Object(map) => map.get(key).cloned(),
            // Some CRM versions send the attributes JSON-encoded.
            Value::String(s) => serde_json::from_str::<Value>(s).ok()?.get(key).cloned(),
            _ => None,
        }
    }

    fn is_deleted(&self) -> bool {
        matches!(self.attribute("deleted"), Some(Value::Bool(true)))
    }

    fn first_attachment(&self) -> Option<Attachment> {
        self.attachments.as_ref()?.iter().find_map(|a| {
            let data_url = non_empty(a.data_url.as_deref())?;
            Some(Attachment {
                file_type: a.file_type.clone().unwrap_or_else(|| "file".to_string()),
                data_url: data_url.to_string(),
            })
        })
    }
}

/// Legacy shape: `{ "event", "message": {...}, "conversation", "contact" }`.
#[derive(Debug, Clone, Deserialize)]
struct NestedPayload {
    event: String,
    message: RawMessage,
    #[serde(default)]
    conversation: Option<RawConversation>,
    #[serde(default)]
    contact: Option<RawParty>,
}

/// Flat shape: message fields next to `event`; conversation events carry the
/// conversation itself at the top level.
#[derive(Debug, Clone, Deserialize)]
struct FlatPayload {
    event: String,
    #[serde(flatten)]
    message: RawMessage,
    #[serde(default)]
    conversation: Option<RawConversation>,
    #[serde(default)]
    contact: Option<RawParty>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    meta: Option<ConversationMeta>,
}

/// Detected payload shape.
#[derive(Debug, Clone)]
enum PayloadShape {
    Nested(NestedPayload),
    Flat(FlatPayload),
}

impl PayloadShape {
    /// Nested when `message` is an object, flat otherwise.
    fn detect(payload: &Value) -> Result<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| BridgeError::malformed("payload is not a JSON object"))?;

        match object.get("event") {
            Some(Value::String(_)) => {}
            Some(_) => return Err(BridgeError::malformed("'event' is not a string")),
            None => return Err(BridgeError::malformed("missing 'event'")),
        }

        if object.get("message").map(Value::is_object).unwrap_or(false) {
            serde_json::from_value(payload.clone())
                .map(Self::Nested)
                .map_err(|e| BridgeError::malformed(format!("nested payload: {}", e)))
        } else {
            serde_json::from_value(payload.clone())
                .map(Self::Flat)
                .map_err(|e| BridgeError::malformed(format!("flat payload: {}", e)))
        }
    }
}

/// Fields extracted from either shape.
struct Extracted {
    event: String,
    message: RawMessage,
    conversation_id: Option<u64>,
    conversation_status: Option<String>,
    contact_phone: Option<String>,
    contact_name: Option<String>,
    fallback_content: Option<String>,
}

impl From<PayloadShape> for Extracted {
    fn from(shape: PayloadShape) -> Self {
        match shape {
            PayloadShape::Nested(p) => {
                let conversation = p.conversation.unwrap_or_default();
                let meta_sender = conversation.sender();

                let contact_phone = p
                    .contact
                    .as_ref()
                    .and_then(RawParty::phone)
                    .or_else(|| meta_sender.and_then(RawParty::phone))
                    .map(str::to_string);
                let contact_name = p
                    .contact
                    .as_ref()
                    .and_then(|c| c.name.clone())
                    .or_else(|| meta_sender.and_then(|s| s.name.clone()));

                Self {
                    event: p.event,
                    message: p.message,
                    conversation_id: conversation.id,
                    conversation_status: conversation.status.clone(),
                    contact_phone,
                    contact_name,
                    fallback_content: conversation.last_content().map(str::to_string),
                }
            }
            PayloadShape::Flat(p) => {
                let conversation = p.conversation.unwrap_or_default();
                let top_sender = p.meta.as_ref().and_then(|m| m.sender.as_ref());
                let message_sender = p.message.sender.as_ref().filter(|s| s.is("contact"));

                let candidates = [
                    conversation.sender(),
                    top_sender,
                    p.contact.as_ref(),
                    message_sender,
                ];
                let contact_phone = candidates
                    .iter()
                    .copied()
                    .flatten()
                    .find_map(|party| party.phone())
                    .map(str::to_string);
                let contact_name = candidates
                    .iter()
                    .copied()
                    .flatten()
                    .find_map(|party| party.name.clone());

                // Conversation events are the conversation object itself.
                let is_conversation_event = p.event.starts_with("conversation_");
                let conversation_id = conversation
                    .id
                    .or(if is_conversation_event { p.message.id } else { None });
                let conversation_status = conversation.status.clone().or(p.status);

                Self {
                    event: p.event,
                    message: p.message,
                    conversation_id,
                    conversation_status,
                    contact_phone,
                    contact_name,
                    fallback_content: conversation.last_content().map(str::to_string),
                }
            }
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Turns raw CRM webhooks into decisions.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    echo_prefix: String,
}

impl EventClassifier {
    /// Create a classifier recognizing `echo_prefix` source ids as bridge echoes.
    pub fn new(echo_prefix: impl Into<String>) -> Self {
        Self {
            echo_prefix: echo_prefix.into(),
        }
    }

    pub fn echo_prefix(&self) -> &str {
        &self.echo_prefix
    }

    /// Classify a webhook body.
    pub fn classify_bytes(&self, raw: &[u8]) -> Result<BridgeEvent> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| BridgeError::malformed(format!("invalid JSON: {}", e)))?;
        self.classify(&value)
    }

    /// Classify a decoded webhook.
    ///
    /// Rules, first match wins: private note, edit (deletions excepted),
    /// status change, typing, unsupported event, incoming, activity, empty
    /// content, echo-tagged source id, forward.
    pub fn classify(&self, payload: &Value) -> Result<BridgeEvent> {
        let extracted = Extracted::from(PayloadShape::detect(payload)?);
        let message = &extracted.message;

        let message_type = message
            .message_type
            .as_ref()
            .map(WebhookMessageType::from)
            .unwrap_or(WebhookMessageType::Unknown);
        let is_private = message.private.unwrap_or(false);
        let sender = message.sender.as_ref();
        let sender_is_agent = sender.map(|s| s.is("user")).unwrap_or(false)
            || message_type == WebhookMessageType::Outgoing;
        let sender_name = sender.filter(|s| s.is("user")).and_then(|s| s.name.clone());

        let content = non_empty(message.content.as_deref())
            .map(str::to_string)
            .or_else(|| match message.attribute("text") {
                Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
                _ => None,
            })
            .or_else(|| extracted.fallback_content.clone())
            .unwrap_or_default();
        let attachment = message.first_attachment();
        let source_message_id = non_empty(message.source_id.as_deref()).map(str::to_string);

        let decision = self.decide(
            &extracted,
            message_type,
            is_private,
            &content,
            attachment.is_some(),
            source_message_id.as_deref(),
        )?;

        Ok(BridgeEvent {
            decision,
            content,
            message_type,
            sender_is_agent,
            is_private,
            source_message_id,
            remote_message_id: message.id,
            conversation_id: extracted.conversation_id,
            conversation_status: extracted
                .conversation_status
                .as_deref()
                .and_then(ConversationStatus::parse),
            contact_phone: extracted.contact_phone,
            contact_name: extracted.contact_name,
            sender_name,
            attachment,
            event: extracted.event,
        })
    }

    fn decide(
        &self,
        extracted: &Extracted,
        message_type: WebhookMessageType,
        is_private: bool,
        content: &str,
        has_attachment: bool,
        source_id: Option<&str>,
    ) -> Result<Decision> {
        if is_private {
            return Ok(Decision::Skip(SkipReason::Private));
        }

        match extracted.event.as_str() {
            events::MESSAGE_UPDATED => {
                return Ok(if extracted.message.is_deleted() {
                    Decision::Deletion
                } else {
                    Decision::Skip(SkipReason::Update)
                });
            }
            events::CONVERSATION_STATUS_CHANGED => {
                if extracted.conversation_id.is_none() {
                    return Err(BridgeError::malformed("status change without conversation id"));
                }
                return Ok(Decision::StatusChange);
            }
            events::TYPING_ON | events::TYPING_OFF => return Ok(Decision::Skip(SkipReason::Typing)),
            events::MESSAGE_CREATED => {}
            _ => return Ok(Decision::Skip(SkipReason::UnsupportedEvent)),
        }

        if extracted.message.message_type.is_none() {
            return Err(BridgeError::malformed("message without message_type"));
        }

        // Only agent-authored types reach the native side.
        match message_type {
            WebhookMessageType::Outgoing | WebhookMessageType::Template => {}
            WebhookMessageType::Incoming => return Ok(Decision::Skip(SkipReason::Incoming)),
            WebhookMessageType::Activity => return Ok(Decision::Skip(SkipReason::Activity)),
            WebhookMessageType::Unknown => return Ok(Decision::Skip(SkipReason::UnknownType)),
        }

        if content.trim().is_empty() && !has_attachment {
            return Ok(Decision::Skip(SkipReason::EmptyContent));
        }

        if source_id.map(|id| is_echo_tag(&self.echo_prefix, id)).unwrap_or(false) {
            return Ok(Decision::Skip(SkipReason::Echo));
        }

        Ok(Decision::Forward)
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new("WAID:")
    }
}

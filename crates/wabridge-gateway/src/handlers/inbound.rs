use crate::server::GatewayState;
use crate::Result;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use wabridge_bridge::InboundOutcome;
use wabridge_core::types::{InboundMessage, MessageKind};

/// Native message event posted by the session manager.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    #[serde(alias = "id")]
    pub native_message_id: String,

    #[serde(alias = "from")]
    pub from_phone: String,

    #[serde(default)]
    pub chat_phone: Option<String>,

    #[serde(default, alias = "push_name")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub kind: MessageKind,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, alias = "from_me")]
    pub is_from_self: bool,

    #[serde(default)]
    pub echo_tag: Option<String>,
}

impl InboundEvent {
    pub fn into_message(self, session_id: String) -> InboundMessage {
        InboundMessage {
            session_id,
            native_message_id: self.native_message_id,
            from_phone: self.from_phone,
            chat_phone: self.chat_phone,
            display_name: self.display_name,
            content: self.content,
            kind: self.kind,
            timestamp: self.timestamp,
            is_from_self: self.is_from_self,
            echo_tag: self.echo_tag,
        }
    }
}

/// Bridge one native message into the CRM.
pub async fn inbound(
    State(state): State<Arc<GatewayState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(event): Json<InboundEvent>,
) -> Result<Json<InboundOutcome>> {
    state.authorize(&headers)?;
    let outcome = state
        .engine
        .process_inbound(event.into_message(session_id))
        .await?;
    Ok(Json(outcome))
}

use crate::server::GatewayState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// CRM webhook receiver.
///
/// Always answers 200 so the CRM never retries; the payload is processed in
/// the background after the configured delay.
pub async fn webhook(
    State(state): State<Arc<GatewayState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Json<Value> {
    let engine = state.engine.clone();
    tokio::spawn(async move {
        match engine.process_outbound_webhook_bytes(&session_id, &body).await {
            Ok(outcome) => debug!(session_id = %session_id, ?outcome, "Webhook processed"),
            Err(e) => warn!(session_id = %session_id, "Webhook failed: {}", e),
        }
    });

    Json(json!({ "status": "accepted" }))
}

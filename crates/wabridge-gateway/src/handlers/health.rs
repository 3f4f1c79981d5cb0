use crate::server::GatewayState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Liveness check with the number of bridged sessions.
pub async fn health(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    let sessions = state.engine.registry().list().await.len();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "sessions": sessions,
    }))
}

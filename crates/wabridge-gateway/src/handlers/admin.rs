//! Operator endpoints.

use crate::error::GatewayError;
use crate::server::GatewayState;
use crate::Result;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use wabridge_bridge::{InboundOutcome, RetryReport};

const DEFAULT_RETRY_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
struct RetryParams {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailedParams {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CleanupParams {
    days: Option<u32>,
}

/// Optional JSON body; an empty body means defaults.
fn params<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| GatewayError::InvalidParams(e.to_string()))
}

pub async fn stats(
    State(state): State<Arc<GatewayState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    state.authorize(&headers)?;
    let stats = state.engine.mapping_stats(&session_id).await?;
    Ok(Json(json!({
        "pending": stats.pending,
        "synced": stats.synced,
        "failed": stats.failed,
        "total": stats.total(),
    })))
}

/// Re-drive pending inbound mappings.
pub async fn retry(
    State(state): State<Arc<GatewayState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RetryReport>> {
    state.authorize(&headers)?;
    let params: RetryParams = params(&body)?;
    let limit = params.limit.unwrap_or(DEFAULT_RETRY_LIMIT);

    let report = state.engine.retry_pending(&session_id, limit).await?;
    info!(
        session_id = %session_id,
        processed = report.processed,
        failed = report.failed,
        skipped = report.skipped,
        "Retry sweep finished"
    );
    Ok(Json(report))
}

/// Failed mappings, most recent first, with the ids `resync` takes.
pub async fn failed(
    State(state): State<Arc<GatewayState>>,
    Path(session_id): Path<String>,
    Query(params): Query<FailedParams>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    state.authorize(&headers)?;
    let limit = params.limit.unwrap_or(DEFAULT_RETRY_LIMIT);
    let mappings = state.engine.failed_mappings(&session_id, limit).await?;

    let items: Vec<Value> = mappings
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "native_message_id": m.native_message_id,
                "direction": m.direction.as_str(),
                "kind": m.kind.as_str(),
                "counterpart_phone": m.counterpart_phone,
                "failed_at": m.updated_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(Json(json!({ "failed": items })))
}

/// Deliver a failed inbound mapping again.
pub async fn resync(
    State(state): State<Arc<GatewayState>>,
    Path((session_id, mapping_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<InboundOutcome>> {
    state.authorize(&headers)?;
    let outcome = state.engine.resync_failed(&session_id, &mapping_id).await?;
    info!(session_id = %session_id, mapping_id = %mapping_id, ?outcome, "Resync finished");
    Ok(Json(outcome))
}

/// Delete mappings older than `days`, defaulting to the configured retention.
pub async fn cleanup(
    State(state): State<Arc<GatewayState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    state.authorize(&headers)?;
    let params: CleanupParams = params(&body)?;
    let days = params.days.unwrap_or(state.retention_days);

    let deleted = state.engine.cleanup_older_than(&session_id, days).await?;
    Ok(Json(json!({ "deleted": deleted, "days": days })))
}

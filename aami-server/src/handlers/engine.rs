//! Metrics-engine control endpoints (§6: `POST /prometheus/reload`, `GET /prometheus/status`).

use std::collections::HashMap;

use aami_service::error::Result;
use aami_service::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Triggers a reload of the metrics engine and waits for it to report healthy again.
pub async fn reload(State(state): State<AppState>) -> Result<StatusCode> {
    state.engine_client().reload(&CancellationToken::new()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Proxies the metrics engine's runtime-info endpoint.
pub async fn status(State(state): State<AppState>) -> Result<Json<HashMap<String, Value>>> {
    Ok(Json(state.engine_client().get_status().await?))
}

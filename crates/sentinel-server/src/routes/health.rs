//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use sentinel_core::reasoning::BackendHealth;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_session: Option<String>,
    pub backends: Vec<BackendHealth>,
}

/// Health check endpoint.
/// GET /health
///
/// `degraded` when no reasoning backend answers its health check.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let backends = state.gateway().health().await;
    let active_session = state.engine.active_session().await.map(|s| s.session_id);

    let status = if backends.iter().any(|b| b.healthy) {
        "healthy"
    } else {
        "degraded"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_session,
        backends,
    }))
}

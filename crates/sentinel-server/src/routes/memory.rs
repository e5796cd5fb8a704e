//! Conversation memory endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use sentinel_core::types::Turn;

use super::presence::LimitQuery;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body for similarity search.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Number of results (default 5).
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Turn>,
}

/// GET /memory/recent?limit=
pub async fn recent_turns(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Turn>>> {
    Ok(Json(state.store().recent_turns(query.limit_or(20))?))
}

/// Embed the query and return the nearest stored turns.
/// POST /memory/search
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let embedder = state
        .embedder()
        .ok_or_else(|| ApiError::unavailable("No embedder configured"))?;

    let vector = embedder.embed(&request.query).await?;
    let k = request.k.unwrap_or(5).clamp(1, 100);
    let results = state.store().search_similar(&vector, k)?;
    Ok(Json(SearchResponse { results }))
}

//! Presence history.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use sentinel_core::types::PresenceEvent;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, 500)
    }
}

/// GET /presence/recent?limit=
pub async fn recent_presence(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<PresenceEvent>>> {
    Ok(Json(state.store().recent_presence(query.limit_or(20))?))
}

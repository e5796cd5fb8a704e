//! Free-form chat endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use sentinel_core::ChatReply;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body for a chat message.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    /// Continue an earlier chat. A new one is started when absent.
    pub chat_id: Option<String>,
}

/// POST /chat
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let reply = state.chat.send(request.chat_id.as_deref(), &request.text).await?;
    Ok(Json(reply))
}

/// Forget a chat's rolling history. Stored turns are kept.
/// DELETE /chat/:id
pub async fn end_chat(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    if state.chat.end(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("Chat '{}' not found", id)))
    }
}

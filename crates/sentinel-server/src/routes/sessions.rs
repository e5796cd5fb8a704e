//! Session endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use sentinel_core::types::{ConversationSession, NextStep, StartedSession, Turn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body for submitting an answer.
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub text: String,
    /// The question being answered. Required so a redelivered answer is
    /// rejected with 409 instead of answering whatever comes next.
    pub question_index: usize,
}

/// Start a session manually.
/// POST /sessions
pub async fn start_session(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<StartedSession>)> {
    let started = state.engine.start_session().await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// GET /sessions/active
pub async fn active_session(State(state): State<AppState>) -> ApiResult<Json<ConversationSession>> {
    state
        .engine
        .active_session()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No session is open"))
}

/// GET /sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationSession>> {
    state
        .engine
        .session(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Session '{}' not found", id)))
}

/// GET /sessions/:id/turns
pub async fn get_turns(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Vec<Turn>>> {
    if state.engine.session(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("Session '{}' not found", id)));
    }
    Ok(Json(state.engine.transcript(&id)?))
}

/// POST /sessions/:id/answers
pub async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<Json<NextStep>> {
    let step = state
        .engine
        .submit_answer_for(&id, request.question_index, &request.text)
        .await?;
    Ok(Json(step))
}

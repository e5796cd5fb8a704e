//! Inbound answers from the remote chat transport.
//!
//! The remote side POSTs `{session_id, question_index, text}` signed with the
//! same secret the outbound webhook uses.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::warn;

use sentinel_core::channels::verify_signature;
use sentinel_core::types::NextStep;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "X-Sentinel-Signature";

#[derive(Debug, Deserialize)]
pub struct InboundAnswer {
    pub session_id: String,
    pub question_index: usize,
    pub text: String,
}

/// POST /channels/webhook/answers
pub async fn inbound_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<NextStep>> {
    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Inbound webhook is not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(&body, secret, signature) {
        warn!("Rejected inbound answer with bad signature");
        return Err(ApiError::unauthorized("Invalid signature"));
    }

    let answer: InboundAnswer =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Invalid answer payload: {}", e)))?;

    let step = state
        .engine
        .submit_answer_for(&answer.session_id, answer.question_index, &answer.text)
        .await?;
    Ok(Json(step))
}

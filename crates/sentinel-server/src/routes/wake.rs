//! Forced heartbeat tick.

use axum::{extract::State, http::StatusCode};
use tracing::info;

use crate::state::AppState;

/// POST /wake
pub async fn wake(State(state): State<AppState>) -> StatusCode {
    info!("Wake requested over HTTP");
    state.wake.notify_one();
    StatusCode::ACCEPTED
}

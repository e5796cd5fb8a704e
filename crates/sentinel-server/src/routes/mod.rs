//! Route definitions for the HTTP API.

mod chat;
mod health;
mod memory;
mod presence;
mod sessions;
mod wake;
mod webhook;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Heartbeat
        .route("/wake", post(wake::wake))
        // Sessions
        .route("/sessions", post(sessions::start_session))
        .route("/sessions/active", get(sessions::active_session))
        .route("/sessions/:id", get(sessions::get_session))
        .route("/sessions/:id/turns", get(sessions::get_turns))
        .route("/sessions/:id/answers", post(sessions::submit_answer))
        // Chat
        .route("/chat", post(chat::send_message))
        .route("/chat/:id", delete(chat::end_chat))
        // Memory
        .route("/memory/recent", get(memory::recent_turns))
        .route("/memory/search", post(memory::search))
        .route("/presence/recent", get(presence::recent_presence))
        // Inbound remote chat
        .route("/channels/webhook/answers", post(webhook::inbound_answer))
        // Attach state
        .with_state(state)
}

pub use chat::*;
pub use health::*;
pub use memory::*;
pub use presence::*;
pub use sessions::*;
pub use wake::*;
pub use webhook::*;

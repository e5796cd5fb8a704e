//! sentinel-server - HTTP surface and process wiring for the sentinel.
//!
//! The router exposes session, memory and presence endpoints over the
//! shared [`ConversationEngine`](sentinel_core::ConversationEngine), free-form
//! chat through [`ChatService`](sentinel_core::ChatService), and a signed
//! inbound endpoint for the remote chat channel.
//!
//! # Example
//!
//! ```ignore
//! use sentinel_server::{create_server, factory::create_runtime, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = create_runtime(SentinelConfig::from_env())?;
//!     runtime.start().await?;
//!     let state = AppState::new(runtime.engine().clone(), runtime.wake_handle());
//!     let app = create_server(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod error;
pub mod factory;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use factory::{create_chat, create_engine, create_runtime};
pub use state::AppState;

use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

/// Create the server with all routes and middleware.
pub fn create_server(state: AppState) -> Router {
    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}

/// Create the server with bearer-token authentication.
pub fn create_server_with_auth(state: AppState) -> Router {
    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::auth_middleware))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}

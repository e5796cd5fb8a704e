//! Middleware for the HTTP API.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Create CORS middleware.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Request logging middleware.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// Bearer-token authentication, active when `SENTINEL_REQUIRE_AUTH` is set.
///
/// `/health` and the signed inbound webhook stay open; the webhook carries
/// its own HMAC check.
pub async fn auth_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let path = request.uri().path();
    if path == "/health" || path.starts_with("/channels/") {
        return Ok(next.run(request).await);
    }

    if std::env::var("SENTINEL_REQUIRE_AUTH").is_ok() {
        let expected_key = std::env::var("SENTINEL_API_KEY").unwrap_or_default();
        if !expected_key.is_empty() {
            let token = request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("Token ")));

            if token != Some(expected_key.as_str()) {
                warn!(path, "Rejected unauthenticated request");
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    }

    Ok(next.run(request).await)
}

//! Error handling for the HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use sentinel_core::error::SentinelError;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<SentinelError> for ApiError {
    fn from(err: SentinelError) -> Self {
        let code = err.code().as_str();
        let status = match &err {
            SentinelError::Conflict { .. } => StatusCode::CONFLICT,
            SentinelError::NotFound { .. } => StatusCode::NOT_FOUND,
            SentinelError::Validation { .. } => StatusCode::BAD_REQUEST,
            SentinelError::Configuration(_) => StatusCode::BAD_REQUEST,
            SentinelError::BackendUnavailable { .. }
            | SentinelError::Llm { .. }
            | SentinelError::Embedding { .. }
            | SentinelError::Network { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SentinelError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut details = serde_json::Map::new();
        match &err {
            SentinelError::Conflict {
                session_id: Some(id), ..
            }
            | SentinelError::NotFound {
                session_id: Some(id), ..
            } => {
                details.insert("session_id".into(), id.as_str().into());
            }
            SentinelError::BackendUnavailable { attempts, .. } => {
                details.insert("attempts".into(), serde_json::json!(attempts));
            }
            _ => {}
        }
        if let Some(suggestion) = err.suggestion() {
            details.insert("suggestion".into(), suggestion.into());
        }

        let api = ApiError::new(status, code, err.to_string());
        if details.is_empty() {
            api
        } else {
            api.with_details(serde_json::Value::Object(details))
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let conflict: ApiError = SentinelError::conflict("busy", Some("s1".to_string())).into();
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(conflict.details.unwrap()["session_id"], "s1");

        let missing: ApiError = SentinelError::session_not_found("s2").into();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let down: ApiError = SentinelError::backend_unavailable(vec!["ollama: timeout".into()]).into();
        assert_eq!(down.status, StatusCode::SERVICE_UNAVAILABLE);

        let bad: ApiError = SentinelError::validation("empty").into();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    }
}

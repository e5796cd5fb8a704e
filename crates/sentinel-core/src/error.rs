//! Error types for sentinel operations.
//!
//! This module provides the error hierarchy shared by every crate in the
//! workspace, with structured error codes and suggestions for resolution.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for sentinel operations.
pub type SentinelResult<T> = Result<T, SentinelError>;

/// Main error type for all sentinel operations.
#[derive(Error, Debug)]
pub enum SentinelError {
    /// The detector collaborator failed to produce a sample.
    #[error("Detector failure: {message}")]
    DetectorFailure {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation conflicts with the active conversation session.
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        code: ErrorCode,
        session_id: Option<String>,
    },

    /// Session not found, or no longer accepting answers.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        session_id: Option<String>,
    },

    /// Every configured reasoning backend failed.
    #[error("No reasoning backend available: {message}")]
    BackendUnavailable {
        message: String,
        code: ErrorCode,
        attempts: Vec<String>,
    },

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
        suggestion: Option<String>,
    },

    /// LLM operation failed.
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding generation failed.
    #[error("Embedding error: {message}")]
    Embedding {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database operation failed.
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network error.
    #[error("Network error: {message}")]
    Network {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external call exceeded its time budget.
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Detector (DET_xxx)
    DetCommandFailed,
    DetInvalidOutput,

    // Session (SES_xxx)
    SesConflict,
    SesNotFound,
    SesTerminal,

    // Reasoning (RSN_xxx)
    RsnAllBackendsFailed,

    // Validation (VAL_xxx)
    ValInvalidInput,

    // LLM (LLM_xxx)
    LlmConnectionFailed,
    LlmGenerationFailed,
    LlmInvalidResponse,

    // Embedding (EMB_xxx)
    EmbConnectionFailed,
    EmbGenerationFailed,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Network (NET_xxx)
    NetTimeout,
    NetConnectionFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DetCommandFailed => "DET_001",
            ErrorCode::DetInvalidOutput => "DET_002",
            ErrorCode::SesConflict => "SES_001",
            ErrorCode::SesNotFound => "SES_002",
            ErrorCode::SesTerminal => "SES_003",
            ErrorCode::RsnAllBackendsFailed => "RSN_001",
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::LlmConnectionFailed => "LLM_001",
            ErrorCode::LlmGenerationFailed => "LLM_002",
            ErrorCode::LlmInvalidResponse => "LLM_003",
            ErrorCode::EmbConnectionFailed => "EMB_001",
            ErrorCode::EmbGenerationFailed => "EMB_002",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::NetTimeout => "NET_001",
            ErrorCode::NetConnectionFailed => "NET_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl SentinelError {
    /// Create a detector failure.
    pub fn detector(message: impl Into<String>) -> Self {
        Self::DetectorFailure {
            message: message.into(),
            code: ErrorCode::DetCommandFailed,
            source: None,
        }
    }

    /// Create a detector failure for output that could not be interpreted.
    pub fn detector_output(message: impl Into<String>) -> Self {
        Self::DetectorFailure {
            message: message.into(),
            code: ErrorCode::DetInvalidOutput,
            source: None,
        }
    }

    /// Create a conflict error for an operation against a busy engine.
    pub fn conflict(message: impl Into<String>, session_id: Option<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            code: ErrorCode::SesConflict,
            session_id,
        }
    }

    /// Create a not found error for an unknown session.
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        let id = session_id.into();
        Self::NotFound {
            message: format!("Session '{}' not found", id),
            code: ErrorCode::SesNotFound,
            session_id: Some(id),
        }
    }

    /// Create a not found error for a session that already reached a terminal state.
    pub fn session_terminal(session_id: impl Into<String>) -> Self {
        let id = session_id.into();
        Self::NotFound {
            message: format!("Session '{}' is no longer accepting answers", id),
            code: ErrorCode::SesTerminal,
            session_id: Some(id),
        }
    }

    /// Create a backend-unavailable error listing each failed attempt.
    pub fn backend_unavailable(attempts: Vec<String>) -> Self {
        Self::BackendUnavailable {
            message: format!("all {} reasoning backends failed", attempts.len()),
            code: ErrorCode::RsnAllBackendsFailed,
            attempts,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create an LLM error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmGenerationFailed,
            source: None,
        }
    }

    /// Create an LLM error for a backend that could not be reached.
    pub fn llm_connection(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmConnectionFailed,
            source: None,
        }
    }

    /// Create an LLM error for a response that could not be used.
    pub fn llm_invalid_response(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmInvalidResponse,
            source: None,
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            code: ErrorCode::EmbGenerationFailed,
            source: None,
        }
    }

    /// Create an embedding error for a provider that could not be reached.
    pub fn embedding_connection(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            code: ErrorCode::EmbConnectionFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create a persistence error for a database that could not be opened.
    pub fn db_connection(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            code: ErrorCode::DbConnectionFailed,
            source: None,
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a network error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            code: ErrorCode::NetConnectionFailed,
            source: None,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: after.as_millis() as u64,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DetectorFailure { code, .. } => *code,
            Self::Conflict { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::BackendUnavailable { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::Llm { code, .. } => *code,
            Self::Embedding { code, .. } => *code,
            Self::Persistence { code, .. } => *code,
            Self::Network { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            Self::Timeout { .. } => ErrorCode::NetTimeout,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error is a persistence failure.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::DetectorFailure { .. } => Some("Check the detector command and camera device"),
            Self::Conflict { .. } => Some("Finish or wait out the active session before starting another"),
            Self::NotFound { .. } => Some("Check the session ID and ensure the session is still open"),
            Self::BackendUnavailable { .. } => {
                Some("Check that Ollama is running or that a remote API key is configured")
            }
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::Llm { .. } => Some("Please check your LLM provider configuration"),
            Self::Embedding { .. } => Some("Please check your embedding provider configuration"),
            Self::Persistence { .. } => Some("Check that the database path is writable"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SentinelError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = SentinelError::validation("Invalid input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("Invalid input"));
    }

    #[test]
    fn test_session_errors() {
        let err = SentinelError::session_not_found("abc");
        assert_eq!(err.code(), ErrorCode::SesNotFound);
        assert!(err.suggestion().is_some());

        let err = SentinelError::session_terminal("abc");
        assert!(matches!(err, SentinelError::NotFound { .. }));
        assert_eq!(err.code().as_str(), "SES_003");
    }

    #[test]
    fn test_backend_unavailable_lists_attempts() {
        let err = SentinelError::backend_unavailable(vec!["ollama: timeout".into(), "anthropic: 500".into()]);
        assert_eq!(err.code().as_str(), "RSN_001");
        assert!(err.to_string().contains("all 2 reasoning backends failed"));
    }

    #[test]
    fn test_timeout_and_connection_codes() {
        let err = SentinelError::timeout("detector", std::time::Duration::from_secs(30));
        assert_eq!(err.code(), ErrorCode::NetTimeout);
        assert_eq!(err.code().as_str(), "NET_001");
        assert_eq!(SentinelError::llm_connection("refused").code().as_str(), "LLM_001");
        assert_eq!(SentinelError::embedding_connection("refused").code().as_str(), "EMB_001");
        assert_eq!(SentinelError::db_connection("locked").code().as_str(), "DB_001");
    }

    #[test]
    fn test_sqlite_error_is_persistence() {
        let err: SentinelError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.is_persistence());
        assert_eq!(err.code(), ErrorCode::DbOperationFailed);
    }
}

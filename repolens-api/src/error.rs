//! Error Types for the Repolens API
//!
//! This module defines error handling for the HTTP layer:
//! - ErrorCode enum for categorizing errors
//! - ApiError struct carried by handlers
//! - IntoResponse implementation producing the `{"status":"error",...}` body
//!
//! Gateway errors are mapped onto the HTTP contract in one place,
//! `From<GatewayError> for ApiError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use repolens_core::{ConfigError, GatewayError, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and a fixed
/// client-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Required query parameter is missing or blank
    MissingField,

    /// Analyzer found no such repository
    RepositoryNotFound,

    /// Repository exists but cannot be analyzed
    AnalysisFailed,

    /// Internal server error
    InternalError,

    /// A collaborator is unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            ErrorCode::RepositoryNotFound | ErrorCode::AnalysisFailed => StatusCode::NOT_FOUND,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MissingField => "GitHub URL is required. Use ?github=username/repository",
            ErrorCode::RepositoryNotFound | ErrorCode::AnalysisFailed => {
                "Repository analysis failed or repository not found"
            }
            ErrorCode::InternalError => "Error analyzing repository",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Error returned by API handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Underlying failure detail, exposed for server errors only
    pub error: Option<String>,
}

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            error: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Attach the underlying failure detail.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Body sent to the client.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            status: "error".to_string(),
            message: self.message.clone(),
            error: self.error.clone(),
        }
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create a MissingField error for the `github` query parameter.
    pub fn missing_repository() -> Self {
        Self::from_code(ErrorCode::MissingField)
    }

    /// Create a RepositoryNotFound error.
    pub fn repository_not_found() -> Self {
        Self::from_code(ErrorCode::RepositoryNotFound)
    }

    /// Create an AnalysisFailed error.
    pub fn analysis_failed() -> Self {
        Self::from_code(ErrorCode::AnalysisFailed)
    }

    /// Create an InternalError carrying `detail`.
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::InternalError).with_error(detail)
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::ServiceUnavailable).with_error(detail)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(detail) => write!(f, "{}: {} ({})", self.code, self.message, detail),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.body())).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidRequest { .. } => ApiError::missing_repository(),
            GatewayError::NotFound { .. } => ApiError::repository_not_found(),
            GatewayError::AnalysisFailed { .. } => ApiError::analysis_failed(),
            GatewayError::Store(inner) => ApiError::internal_error(inner.to_string()),
            GatewayError::Analyzer(inner) => ApiError::internal_error(inner.to_string()),
            GatewayError::Internal { reason } => ApiError::internal_error(reason),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Store error");
        match err {
            StoreError::Unavailable { reason } => ApiError::service_unavailable(reason),
            other => ApiError::internal_error(other.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(format!("Invalid configuration: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

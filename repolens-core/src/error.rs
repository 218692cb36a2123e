//! Error types for repolens operations

use thiserror::Error;

/// Store collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Analyzer collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("Resource {key} cannot be analyzed: {reason}")]
    Unanalyzable { key: String, reason: String },

    #[error("Upstream request failed with status {status:?}: {message}")]
    Upstream { status: Option<u16>, message: String },

    #[error("Rate limited upstream, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Invalid upstream response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Analysis timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors surfaced by the gateway to its caller.
///
/// Store write failures never appear here: they are logged and absorbed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Resource not found: {key}")]
    NotFound { key: String },

    #[error("Analysis failed for {key}: {reason}")]
    AnalysisFailed { key: String, reason: String },

    #[error("Store lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("Analyzer failed: {0}")]
    Analyzer(AnalyzerError),

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

/// Caller-facing classification of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    InvalidRequest,
    NotFound,
    AnalysisFailed,
    Internal,
}

impl GatewayErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayErrorKind::InvalidRequest => "invalid",
            GatewayErrorKind::NotFound => "not_found",
            GatewayErrorKind::AnalysisFailed => "analysis_failed",
            GatewayErrorKind::Internal => "internal",
        }
    }
}

impl GatewayError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Map an analyzer failure for `key` onto the caller-facing taxonomy.
    pub fn from_analyzer(key: &str, err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::Unanalyzable { reason, .. } => Self::AnalysisFailed {
                key: key.to_string(),
                reason,
            },
            other => Self::Analyzer(other),
        }
    }

    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::InvalidRequest { .. } => GatewayErrorKind::InvalidRequest,
            GatewayError::NotFound { .. } => GatewayErrorKind::NotFound,
            GatewayError::AnalysisFailed { .. } => GatewayErrorKind::AnalysisFailed,
            GatewayError::Store(_) | GatewayError::Analyzer(_) | GatewayError::Internal { .. } => {
                GatewayErrorKind::Internal
            }
        }
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

// =============================================================================
// TESTS
// =============================================================================

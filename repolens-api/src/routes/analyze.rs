//! Repository Analysis Endpoints
//!
//! - `GET /test` - connectivity check
//! - `GET /analyze?github=owner/repo` - cache-aside analysis (also `/api/analyze`)

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use repolens_core::{AnalysisRead, AnalysisSource, GatewayErrorKind};
use repolens_storage::Gateway;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::telemetry::METRICS;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeQuery {
    /// Short repository reference, `owner/repo`.
    pub github: Option<String>,
}

/// Successful analysis response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub status: String,
    /// The reference exactly as the client sent it.
    pub repository: String,
    /// When the analysis was produced, not when it was read.
    pub timestamp: String,
    pub analysis: serde_json::Value,
    /// `"cache"` for stored results; absent for fresh ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl AnalyzeResponse {
    pub fn from_read(repository: String, read: AnalysisRead) -> Self {
        let source = match read.source {
            AnalysisSource::Cache => Some(AnalysisSource::Cache.as_str().to_string()),
            AnalysisSource::Fresh => None,
        };
        Self {
            status: "success".to_string(),
            repository,
            timestamp: format_timestamp(read.created_at),
            analysis: read.payload.into_value(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// RFC 3339 UTC with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /test - Connectivity check; touches no collaborator.
pub async fn connectivity_check() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "API is working".to_string(),
    })
}

/// GET /analyze - Serve a repository analysis, from the store when possible.
///
/// A query string that does not parse (for example a repeated `github`
/// parameter) is answered like a missing reference.
pub async fn analyze(
    State(gateway): State<Arc<Gateway>>,
    query: Result<Query<AnalyzeQuery>, QueryRejection>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected analysis query string");
            record_outcome(GatewayErrorKind::InvalidRequest.as_str());
            return Err(ApiError::missing_repository());
        }
    };

    if let Some(reference) = query.github.as_deref() {
        tracing::info!(repository = reference, "Starting analysis for repository");
    }

    match gateway.handle(query.github.as_deref()).await {
        Ok(read) => {
            record_outcome(read.source.as_str());
            let repository = query.github.unwrap_or_default();
            Ok(Json(AnalyzeResponse::from_read(repository, read)))
        }
        Err(err) => {
            let kind = err.kind();
            record_outcome(kind.as_str());
            match kind {
                GatewayErrorKind::Internal => {
                    tracing::error!(error = %err, "Error during analysis")
                }
                GatewayErrorKind::NotFound | GatewayErrorKind::AnalysisFailed => {
                    tracing::info!(error = %err, "Analysis unavailable")
                }
                GatewayErrorKind::InvalidRequest => {}
            }
            Err(err.into())
        }
    }
}

fn record_outcome(outcome: &str) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_outcome(outcome);
    }
}

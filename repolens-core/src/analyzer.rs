//! The analyzer collaborator.

use async_trait::async_trait;

use crate::error::AnalyzerError;
use crate::key::ResourceKey;
use crate::record::AnalysisPayload;

/// Produces an analysis for a canonical resource.
///
/// The boundary between outcomes is explicit:
/// - `Ok(Some(payload))`: analysis produced.
/// - `Ok(None)`: the resource does not exist.
/// - `Err(AnalyzerError::Unanalyzable { .. })`: the resource exists (or the
///   key is well formed) but no usable analysis can be produced.
/// - any other `Err`: an unexpected failure, surfaced as an internal error.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, key: &ResourceKey) -> Result<Option<AnalysisPayload>, AnalyzerError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "analyzer"
    }
}

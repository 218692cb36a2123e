//! Repolens Core - Shared Types
//!
//! Types shared by every repolens crate: the canonical resource key, the
//! persisted analysis record, the [`Analyzer`] collaborator trait, and the
//! error taxonomy used across the gateway.

pub mod analyzer;
pub mod error;
pub mod key;
pub mod record;

pub use analyzer::Analyzer;
pub use error::{
    AnalyzerError, ConfigError, GatewayError, GatewayErrorKind, GatewayResult, StoreError,
};
pub use key::{ResourceKey, ResourceOrigin, DEFAULT_RESOURCE_ORIGIN};
pub use record::{AnalysisPayload, AnalysisRead, AnalysisRecord, AnalysisSource};

//! Repolens API - HTTP Layer
//!
//! Serves repository analyses over HTTP. Requests go through the
//! cache-aside [`Gateway`](repolens_storage::Gateway): stored analyses are
//! returned as-is, misses are analyzed through GitHub and written back.

pub mod config;
pub mod error;
pub mod macros;
pub mod providers;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ApiConfig, GithubConfig, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorBody, ErrorCode};
pub use providers::GithubAnalyzer;
pub use routes::create_api_router;
pub use state::{build_store, AppState};

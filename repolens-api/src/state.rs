//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use repolens_storage::{AnalysisStore, Gateway, InMemoryStore, LmdbStore, PostgrestStore};

use crate::config::StoreBackend;
use crate::error::{ApiError, ApiResult};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Cache-aside gateway serving analysis requests.
    pub gateway: Arc<Gateway>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<Gateway>, gateway);
crate::impl_from_ref!(Instant, start_time);

/// Open the configured store.
pub fn build_store(backend: &StoreBackend) -> ApiResult<Arc<dyn AnalysisStore>> {
    let store: Arc<dyn AnalysisStore> = match backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::Lmdb { path, max_size_mb } => {
            Arc::new(LmdbStore::new(path, *max_size_mb).map_err(|e| {
                ApiError::internal_error(format!(
                    "Failed to open LMDB store at {}: {}",
                    path.display(),
                    e
                ))
            })?)
        }
        StoreBackend::Postgrest(config) => Arc::new(PostgrestStore::new(config.clone())?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_build_memory_store() {
        let store = build_store(&StoreBackend::Memory).unwrap();
        assert_eq!(store.name(), "memory");
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_build_lmdb_store() {
        let dir = TempDir::new().unwrap();
        let store = build_store(&StoreBackend::Lmdb {
            path: dir.path().join("store"),
            max_size_mb: 16,
        })
        .unwrap();
        assert_eq!(store.name(), "lmdb");
    }
}

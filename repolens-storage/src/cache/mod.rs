//! Cache-aside layer.
//!
//! The store is the cache: the gateway reads it first, computes on miss, and
//! writes the result back. Nothing here keeps analyses in process memory
//! beyond a single request, except [`InMemoryStore`] when it is the
//! configured backend.
//!
//! # Example
//!
//! ```ignore
//! let gateway = Gateway::new(store, analyzer, GatewayConfig::default());
//!
//! let read = gateway.handle(Some("tokio-rs/axum")).await?;
//! if read.is_cache_hit() {
//!     tracing::debug!(created_at = %read.created_at, "served from store");
//! }
//! ```

pub mod gateway;
pub mod lmdb_backend;
pub mod memory;
pub mod postgrest;
pub mod single_flight;
pub mod traits;

pub use gateway::{Gateway, GatewayConfig, GatewayStats};
pub use lmdb_backend::{LmdbStore, LmdbStoreError};
pub use memory::InMemoryStore;
pub use postgrest::{PostgrestConfig, PostgrestStore};
pub use single_flight::{FlightRole, FlightStats, SingleFlight};
pub use traits::{AnalysisStore, StoreStats};

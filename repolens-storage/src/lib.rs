//! Repolens Storage - Analysis Stores and the Cache-Aside Gateway
//!
//! Defines the [`AnalysisStore`] abstraction with in-memory, LMDB and
//! PostgREST backends, plus the [`Gateway`] that coordinates lookups,
//! analyzer invocations and write-back with per-key single-flight.

pub mod cache;

pub use cache::{
    AnalysisStore, Gateway, GatewayConfig, GatewayStats, InMemoryStore, LmdbStore, LmdbStoreError,
    FlightRole, FlightStats, PostgrestConfig, PostgrestStore, SingleFlight, StoreStats,
};

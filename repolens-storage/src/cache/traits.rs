//! Store trait and usage statistics.
//!
//! This module defines the narrow interface the gateway needs from a
//! persistence backend: point lookup and insert by [`ResourceKey`].

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use repolens_core::{AnalysisRecord, ResourceKey, StoreError};

/// Key-value persistence for analysis records.
///
/// Implementations must be safe to share across tasks and must write a
/// record atomically: a cancelled or failed insert may leave no record,
/// never a partial one.
///
/// # Insert semantics
///
/// `insert` may be a plain insert or insert-if-absent. Backends that can
/// enforce it cheaply keep the first record for a key and report success
/// for later inserts of the same key.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Look up the record for `key`, or `None` if nothing is stored.
    async fn lookup(&self, key: &ResourceKey) -> Result<Option<AnalysisRecord>, StoreError>;

    /// Persist a record.
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    /// Probe backend connectivity.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Usage statistics.
    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Short backend name used in logs and health output.
    fn name(&self) -> &'static str;
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Lookups that found a record.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Records written (insert-if-absent backends count only new records).
    pub inserts: u64,
    /// Number of records held, when the backend can tell cheaply.
    pub entry_count: Option<u64>,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl StatCounters {
    pub(crate) fn record_lookup(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: Option<u64>) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            entry_count,
        }
    }
}

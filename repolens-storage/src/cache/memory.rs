//! In-process store backed by a concurrent map.
//!
//! Used for development and tests. Records live as long as the process.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use repolens_core::{AnalysisRecord, ResourceKey, StoreError};

use super::traits::{AnalysisStore, StatCounters, StoreStats};

/// Insert-if-absent store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<ResourceKey, AnalysisRecord>,
    counters: StatCounters,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = AnalysisRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.records.insert(record.key.clone(), record);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn lookup(&self, key: &ResourceKey) -> Result<Option<AnalysisRecord>, StoreError> {
        let found = self.records.get(key).map(|entry| entry.value().clone());
        self.counters.record_lookup(found.is_some());
        Ok(found)
    }

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        if let Entry::Vacant(slot) = self.records.entry(record.key.clone()) {
            slot.insert(record.clone());
            self.counters.record_insert();
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self.counters.snapshot(Some(self.records.len() as u64)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

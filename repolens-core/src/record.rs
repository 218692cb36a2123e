//! Persisted analysis records and per-request read outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::ResourceKey;

/// Opaque analysis result.
///
/// The gateway moves payloads between the analyzer, the store and the
/// caller without looking inside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisPayload(serde_json::Value);

impl AnalysisPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for AnalysisPayload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// The persisted unit: one analysis per key, never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub key: ResourceKey,
    pub payload: AnalysisPayload,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(key: ResourceKey, payload: AnalysisPayload, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            payload,
            created_at,
        }
    }
}

/// Where a served analysis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    /// Read back from the store.
    Cache,
    /// Computed by the analyzer for this request (or the flight it joined).
    Fresh,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::Cache => "cache",
            AnalysisSource::Fresh => "fresh",
        }
    }
}

/// Outcome of a successful gateway call.
///
/// `created_at` is the time the analysis was originally produced: for a
/// cache hit this is the stored record's timestamp, never the read time.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRead {
    pub key: ResourceKey,
    pub payload: AnalysisPayload,
    pub created_at: DateTime<Utc>,
    pub source: AnalysisSource,
}

impl AnalysisRead {
    /// A read served from a stored record.
    pub fn from_cache(record: AnalysisRecord) -> Self {
        Self {
            key: record.key,
            payload: record.payload,
            created_at: record.created_at,
            source: AnalysisSource::Cache,
        }
    }

    /// A read produced by a fresh analysis.
    pub fn fresh(key: ResourceKey, payload: AnalysisPayload, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            payload,
            created_at,
            source: AnalysisSource::Fresh,
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        self.source == AnalysisSource::Cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_from_cache_keeps_original_timestamp() {
        let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let record = AnalysisRecord::new(
            ResourceKey::from_canonical("https://github.com/a/b"),
            AnalysisPayload::new(json!({"stars": 3})),
            created_at,
        );

        let read = AnalysisRead::from_cache(record);
        assert!(read.is_cache_hit());
        assert_eq!(read.created_at, created_at);
        assert_eq!(read.payload.as_value(), &json!({"stars": 3}));
    }

    #[test]
    fn test_fresh_read_is_not_a_cache_hit() {
        let read = AnalysisRead::fresh(
            ResourceKey::from_canonical("https://github.com/a/b"),
            AnalysisPayload::new(json!(null)),
            Utc::now(),
        );
        assert!(!read.is_cache_hit());
        assert_eq!(read.source.as_str(), "fresh");
    }

    #[test]
    fn test_record_json_shape() {
        let record = AnalysisRecord::new(
            ResourceKey::from_canonical("https://github.com/a/b"),
            AnalysisPayload::new(json!({"languages": {"Rust": 100}})),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["key"], "https://github.com/a/b");
        assert_eq!(value["payload"]["languages"]["Rust"], 100);

        let back: AnalysisRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}

//! LMDB-backed analysis store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep analysis records in
//! a memory-mapped key-value file that survives restarts.
//!
//! # Record Format
//!
//! Keys are the UTF-8 bytes of the canonical [`ResourceKey`]. Values are
//! `[created_at millis: 8 bytes LE][payload JSON]`.
//!
//! # Thread Safety
//!
//! LMDB transactions are blocking, so every operation runs on the blocking
//! pool. An insert is a single write transaction that checks for an
//! existing record before writing, which makes it insert-if-absent and
//! atomic: an interrupted insert commits nothing.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use repolens_core::{AnalysisPayload, AnalysisRecord, ResourceKey, StoreError};

use super::traits::{AnalysisStore, StatCounters, StoreStats};

const TIMESTAMP_LEN: usize = 8;
const BYTES_PER_MB: usize = 1024 * 1024;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// LMDB reported an error inside a transaction.
    #[error("Transaction error: {0}")]
    Transaction(#[from] heed::Error),

    /// Payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored value could not be decoded.
    #[error("Corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StoreError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Corrupt { key, reason } => StoreError::Corrupt { key, reason },
            LmdbStoreError::Serialization(reason) => StoreError::Serialization { reason },
            other => StoreError::Backend {
                backend: "lmdb".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// LMDB-backed, insert-if-absent store.
///
/// # Example
///
/// ```ignore
/// let store = LmdbStore::new("./data/repolens", 256)?;
/// store.insert(&record).await?;
/// let found = store.lookup(&record.key).await?;
/// ```
pub struct LmdbStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    counters: StatCounters,
}

impl LmdbStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let map_size = Self::map_size_bytes(max_size_mb).ok_or_else(|| {
            LmdbStoreError::EnvOpen(format!("map size of {} MB is out of range", max_size_mb))
        })?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this process and
        // opened once; heed requires the caller to uphold that.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn()?;
        let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None)?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db,
            counters: StatCounters::default(),
        })
    }

    /// Map size in bytes for `max_size_mb`, or `None` when it is zero or
    /// does not fit in `usize`.
    pub fn map_size_bytes(max_size_mb: usize) -> Option<usize> {
        max_size_mb
            .checked_mul(BYTES_PER_MB)
            .filter(|bytes| *bytes > 0)
    }
}

fn encode_value(record: &AnalysisRecord) -> Result<Vec<u8>, LmdbStoreError> {
    let payload = serde_json::to_vec(&record.payload)
        .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;

    let mut bytes = Vec::with_capacity(TIMESTAMP_LEN + payload.len());
    bytes.extend_from_slice(&record.created_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode_value(key: ResourceKey, bytes: &[u8]) -> Result<AnalysisRecord, LmdbStoreError> {
    let corrupt = |reason: &str| LmdbStoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if bytes.len() < TIMESTAMP_LEN {
        return Err(corrupt("value shorter than timestamp header"));
    }
    let (timestamp, payload) = bytes.split_at(TIMESTAMP_LEN);
    let millis = i64::from_le_bytes(
        timestamp
            .try_into()
            .map_err(|_| corrupt("invalid timestamp header"))?,
    );
    let created_at: DateTime<Utc> =
        DateTime::from_timestamp_millis(millis).ok_or_else(|| corrupt("timestamp out of range"))?;
    let payload: AnalysisPayload =
        serde_json::from_slice(payload).map_err(|e| corrupt(&e.to_string()))?;

    Ok(AnalysisRecord::new(key, payload, created_at))
}

/// Run an LMDB closure on the blocking pool.
async fn run_blocking<T, F>(op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LmdbStoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StoreError::Backend {
            backend: "lmdb".to_string(),
            reason: format!("blocking task failed: {}", e),
        })?
        .map_err(StoreError::from)
}

#[async_trait]
impl AnalysisStore for LmdbStore {
    async fn lookup(&self, key: &ResourceKey) -> Result<Option<AnalysisRecord>, StoreError> {
        let env = self.env.clone();
        let db = self.db;
        let key = key.clone();

        let found = run_blocking(move || {
            let rtxn = env.read_txn()?;
            match db.get(&rtxn, key.as_str().as_bytes())? {
                Some(bytes) => decode_value(key, bytes).map(Some),
                None => Ok(None),
            }
        })
        .await?;

        self.counters.record_lookup(found.is_some());
        Ok(found)
    }

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let env = self.env.clone();
        let db = self.db;
        let key = record.key.clone();
        let value = encode_value(record)?;

        let written = run_blocking(move || {
            let mut wtxn = env.write_txn()?;
            if db.get(&wtxn, key.as_str().as_bytes())?.is_some() {
                return Ok(false);
            }
            db.put(&mut wtxn, key.as_str().as_bytes(), &value)?;
            wtxn.commit()?;
            Ok(true)
        })
        .await?;

        if written {
            self.counters.record_insert();
        } else {
            tracing::debug!(key = %record.key, "record already present, keeping existing");
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let env = self.env.clone();
        run_blocking(move || {
            env.read_txn()?;
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let env = self.env.clone();
        let db = self.db;
        let entries = run_blocking(move || {
            let rtxn = env.read_txn()?;
            Ok(db.len(&rtxn)?)
        })
        .await?;
        Ok(self.counters.snapshot(Some(entries)))
    }

    fn name(&self) -> &'static str {
        "lmdb"
    }
}

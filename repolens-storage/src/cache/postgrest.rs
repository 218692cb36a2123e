//! PostgREST (Supabase) store.
//!
//! Records live in a table with the columns `gitlink` (the canonical key),
//! `data` (the payload, JSON) and `created_at` (timestamptz). Lookups return
//! the oldest row for a key; inserts are plain inserts, so a table without a
//! unique constraint on `gitlink` may accumulate duplicates.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use repolens_core::{AnalysisPayload, AnalysisRecord, ResourceKey, StoreError};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::traits::{AnalysisStore, StatCounters, StoreStats};

const BACKEND: &str = "postgrest";

/// Connection settings for a PostgREST endpoint.
#[derive(Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Service or anon key, sent as `apikey` and bearer token.
    pub api_key: SecretString,
    /// Table holding analysis rows.
    pub table: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl PostgrestConfig {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            table: "gitdata".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        )
    }
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("table", &self.table)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    gitlink: String,
    data: serde_json::Value,
    created_at: String,
}

#[derive(Debug, Serialize)]
struct NewRow<'a> {
    gitlink: &'a str,
    data: &'a AnalysisPayload,
    created_at: String,
}

/// Store backed by a PostgREST table.
pub struct PostgrestStore {
    client: Client,
    config: PostgrestConfig,
    counters: StatCounters,
}

impl PostgrestStore {
    pub fn new(config: PostgrestConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| backend_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            counters: StatCounters::default(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.config.api_key.expose_secret();
        request
            .header("apikey", key)
            .header("Authorization", format!("Bearer {}", key))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(match status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                StoreError::Unavailable {
                    reason: format!("{}: {}", status, body),
                }
            }
            _ => backend_error(format!("{}: {}", status, body)),
        })
    }
}

fn backend_error(reason: String) -> StoreError {
    StoreError::Backend {
        backend: BACKEND.to_string(),
        reason,
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_connect() || err.is_timeout() {
        StoreError::Unavailable {
            reason: err.to_string(),
        }
    } else {
        backend_error(err.to_string())
    }
}

/// Parse a PostgREST timestamp. `timestamptz` columns carry an offset;
/// plain `timestamp` columns do not and are read as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn row_to_record(row: Row) -> Result<AnalysisRecord, StoreError> {
    let created_at = parse_timestamp(&row.created_at).ok_or_else(|| StoreError::Corrupt {
        key: row.gitlink.clone(),
        reason: format!("unparseable created_at {:?}", row.created_at),
    })?;
    Ok(AnalysisRecord::new(
        ResourceKey::from_canonical(row.gitlink),
        AnalysisPayload::new(row.data),
        created_at,
    ))
}

#[async_trait]
impl AnalysisStore for PostgrestStore {
    async fn lookup(&self, key: &ResourceKey) -> Result<Option<AnalysisRecord>, StoreError> {
        let request = self
            .client
            .get(self.config.table_url())
            .query(&[
                ("select", "gitlink,data,created_at".to_string()),
                ("gitlink", format!("eq.{}", key)),
                ("order", "created_at.asc".to_string()),
                ("limit", "1".to_string()),
            ]);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;
        let rows: Vec<Row> = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Serialization {
                reason: format!("Failed to parse rows: {}", e),
            })?;

        let found = rows.into_iter().next().map(row_to_record).transpose()?;
        self.counters.record_lookup(found.is_some());
        Ok(found)
    }

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let row = NewRow {
            gitlink: record.key.as_str(),
            data: &record.payload,
            created_at: record.created_at.to_rfc3339(),
        };
        let request = self
            .client
            .post(self.config.table_url())
            .header("Prefer", "return=minimal")
            .json(&row);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(response).await?;

        self.counters.record_insert();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let request = self
            .client
            .get(self.config.table_url())
            .query(&[("select", "gitlink"), ("limit", "1")]);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self.counters.snapshot(None))
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

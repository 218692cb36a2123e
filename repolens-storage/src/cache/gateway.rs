//! Cache-aside gateway with per-key single-flight.
//!
//! The gateway answers "give me the analysis for this reference" by reading
//! the store first and only invoking the analyzer on a miss. Concurrent
//! misses for the same key share a single analyzer invocation and a single
//! write-back.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use repolens_core::{
    AnalysisPayload, AnalysisRead, AnalysisRecord, Analyzer, AnalyzerError, GatewayError,
    GatewayResult, ResourceKey, ResourceOrigin,
};
use tracing::{debug, error, info, warn};

use super::single_flight::{FlightRole, SingleFlight};
use super::traits::AnalysisStore;

/// Configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Origin used to canonicalize short references.
    pub origin: ResourceOrigin,
    /// Coalesce concurrent misses for the same key into one analysis.
    ///
    /// When disabled every miss runs its own analysis and write, which
    /// permits duplicate work under concurrency.
    pub coalesce: bool,
    /// Upper bound on a single analyzer call.
    pub analyze_timeout: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            origin: ResourceOrigin::default(),
            coalesce: true,
            analyze_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl GatewayConfig {
    /// Create a new gateway config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the canonicalization origin.
    pub fn with_origin(mut self, origin: ResourceOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Enable or disable single-flight coalescing.
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce = enabled;
        self
    }

    /// Set the analyzer timeout (`None` waits indefinitely).
    pub fn with_analyze_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.analyze_timeout = timeout;
        self
    }
}

/// Snapshot of gateway activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Analyses currently running.
    pub in_flight: usize,
    /// Requests that waited on another request's analysis.
    pub coalesced: u64,
    /// Write-backs that failed and were absorbed.
    pub store_write_failures: u64,
}

/// Everything a miss needs, cheap to clone into a detached flight.
#[derive(Clone)]
struct MissResolver {
    store: Arc<dyn AnalysisStore>,
    analyzer: Arc<dyn Analyzer>,
    analyze_timeout: Option<Duration>,
    write_failures: Arc<AtomicU64>,
}

impl MissResolver {
    /// Analyze `key`, write the result back, and return it.
    ///
    /// With `recheck` the store is consulted once more first, which catches
    /// a record written by a flight that finished after this request's
    /// initial lookup.
    async fn resolve(&self, key: ResourceKey, recheck: bool) -> GatewayResult<AnalysisRead> {
        if recheck {
            if let Some(record) = self.store.lookup(&key).await? {
                debug!(key = %key, "record appeared while waiting to lead");
                return Ok(AnalysisRead::from_cache(record));
            }
        }

        let payload = match self.analyze(&key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(key = %key, analyzer = self.analyzer.name(), "resource not found");
                return Err(GatewayError::NotFound {
                    key: key.into_string(),
                });
            }
            Err(err) => {
                warn!(key = %key, analyzer = self.analyzer.name(), error = %err, "analysis failed");
                return Err(GatewayError::from_analyzer(key.as_str(), err));
            }
        };

        let record = AnalysisRecord::new(key, payload, Utc::now());
        if let Err(err) = self.store.insert(&record).await {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                key = %record.key,
                store = self.store.name(),
                error = %err,
                "failed to store analysis, serving fresh result anyway"
            );
        }

        Ok(AnalysisRead::fresh(record.key, record.payload, record.created_at))
    }

    async fn analyze(
        &self,
        key: &ResourceKey,
    ) -> Result<Option<AnalysisPayload>, AnalyzerError> {
        debug!(key = %key, analyzer = self.analyzer.name(), "starting analysis");
        match self.analyze_timeout {
            Some(limit) => tokio::time::timeout(limit, self.analyzer.analyze(key))
                .await
                .map_err(|_| AnalyzerError::Timeout {
                    after_ms: limit.as_millis() as u64,
                })?,
            None => self.analyzer.analyze(key).await,
        }
    }
}

/// Cache-aside gateway.
///
/// Collaborators are injected at construction; the gateway holds no
/// analysis state of its own beyond the analyses currently in flight.
///
/// # Example
///
/// ```ignore
/// let gateway = Gateway::new(
///     Arc::new(InMemoryStore::new()),
///     Arc::new(my_analyzer),
///     GatewayConfig::default(),
/// );
/// let read = gateway.handle(Some("owner/repo")).await?;
/// ```
pub struct Gateway {
    resolver: MissResolver,
    flights: SingleFlight<ResourceKey, GatewayResult<AnalysisRead>>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        analyzer: Arc<dyn Analyzer>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            resolver: MissResolver {
                store,
                analyzer,
                analyze_timeout: config.analyze_timeout,
                write_failures: Arc::new(AtomicU64::new(0)),
            },
            flights: SingleFlight::new(),
            config,
        }
    }

    /// Create a gateway with default configuration.
    pub fn with_defaults(store: Arc<dyn AnalysisStore>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self::new(store, analyzer, GatewayConfig::default())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.resolver.store
    }

    /// Derive the cache key for a reference.
    pub fn resource_key(&self, reference: &str) -> ResourceKey {
        self.config.origin.canonicalize(reference)
    }

    /// Serve the analysis for `raw_reference`.
    ///
    /// Returns a cached record when the store has one, otherwise analyzes,
    /// writes back (best effort) and returns the fresh result. A missing or
    /// blank reference fails with `InvalidRequest` before any collaborator
    /// is contacted.
    pub async fn handle(&self, raw_reference: Option<&str>) -> GatewayResult<AnalysisRead> {
        let reference = raw_reference.map(str::trim).unwrap_or_default();
        if reference.is_empty() {
            return Err(GatewayError::invalid_request("repository reference is required"));
        }

        let key = self.resource_key(reference);
        if self.config.origin.relative_path(&key) == Some("") {
            return Err(GatewayError::invalid_request(
                "repository reference has no path",
            ));
        }

        if let Some(record) = self.resolver.store.lookup(&key).await? {
            debug!(key = %key, "cache hit");
            return Ok(AnalysisRead::from_cache(record));
        }
        debug!(key = %key, "cache miss");

        if !self.config.coalesce {
            return self.resolver.resolve(key, false).await;
        }

        let resolver = self.resolver.clone();
        let flight_key = key.clone();
        let (result, role) = self
            .flights
            .run(key, move || async move {
                AssertUnwindSafe(resolver.resolve(flight_key, true))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(GatewayError::internal("analysis task panicked")))
            })
            .await;

        if role == FlightRole::Follower {
            debug!("joined in-flight analysis");
        }
        result
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            in_flight: self.flights.in_flight(),
            coalesced: self.flights.stats().joined,
            store_write_failures: self.resolver.write_failures.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

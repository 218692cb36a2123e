//! Repolens Test Utilities
//!
//! Shared test infrastructure for the Repolens workspace:
//! - Scripted analyzers with call counting and gating
//! - Store wrappers that count calls and inject failures
//! - Fixtures for common records and payloads
//! - Proptest generators for references

pub use repolens_core::{
    AnalysisPayload, AnalysisRecord, Analyzer, AnalyzerError, ResourceKey, ResourceOrigin,
    StoreError,
};
pub use repolens_storage::{AnalysisStore, InMemoryStore, StoreStats};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::Semaphore;

// ============================================================================
// SCRIPTED ANALYZER
// ============================================================================

type Outcome = Result<Option<AnalysisPayload>, AnalyzerError>;

/// Analyzer that replays scripted outcomes.
///
/// Outcomes are consumed in order; once the script runs out the fallback
/// outcome is returned for every further call. A gate can hold every call
/// open until the test releases permits, which makes concurrent misses
/// overlap deterministically.
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: AtomicUsize,
    started: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedAnalyzer {
    /// Analyzer that always returns `payload`.
    pub fn returning(payload: AnalysisPayload) -> Self {
        Self::with_fallback(Ok(Some(payload)))
    }

    /// Analyzer that always reports the resource as absent.
    pub fn not_found() -> Self {
        Self::with_fallback(Ok(None))
    }

    /// Analyzer that always fails with `err`.
    pub fn failing(err: AnalyzerError) -> Self {
        Self::with_fallback(Err(err))
    }

    pub fn with_fallback(fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Queue an outcome ahead of the fallback.
    pub fn then(self, outcome: Outcome) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push_back(outcome);
        self
    }

    /// Hold every call until a permit is available on `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Calls that returned an outcome.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that entered the analyzer, including ones still gated.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, _key: &ResourceKey) -> Outcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            // Permits are consumed so each release admits exactly one call.
            let permit = gate
                .acquire()
                .await
                .map_err(|_| AnalyzerError::Timeout { after_ms: 0 })?;
            permit.forget();
        }
        let outcome = self
            .script
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ============================================================================
// COUNTING STORE
// ============================================================================

/// Store wrapper that counts calls and can be told to fail.
///
/// Reports the wrapped store's name, so health output is unchanged.
#[derive(Debug, Default)]
pub struct CountingStore<S = InMemoryStore> {
    inner: S,
    lookups: AtomicUsize,
    inserts: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_inserts: AtomicBool,
}

impl CountingStore<InMemoryStore> {
    pub fn new() -> Self {
        Self::wrap(InMemoryStore::new())
    }
}

impl<S: AnalysisStore> CountingStore<S> {
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            fail_lookups: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Lookup calls made, including failed ones.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Insert calls made, including failed ones.
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: AnalysisStore> AnalysisStore for CountingStore<S> {
    async fn lookup(&self, key: &ResourceKey) -> Result<Option<AnalysisRecord>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "injected lookup failure".to_string(),
            });
        }
        self.inner.lookup(key).await
    }

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                backend: self.inner.name().to_string(),
                reason: "injected insert failure".to_string(),
            });
        }
        self.inner.insert(record).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.stats().await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// A representative analysis payload.
    pub fn payload(name: &str) -> AnalysisPayload {
        AnalysisPayload::new(json!({
            "name": name,
            "stars": 128,
            "forks": 12,
            "languages": [
                {"name": "Rust", "bytes": 9000, "percentage": 90.0},
                {"name": "Shell", "bytes": 1000, "percentage": 10.0},
            ],
            "contributors": [{"login": "octocat", "contributions": 40}],
        }))
    }

    /// A fixed timestamp well in the past.
    pub fn stored_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }

    /// Canonical key for `owner/repo` under the default origin.
    pub fn key(reference: &str) -> ResourceKey {
        ResourceOrigin::default().canonicalize(reference)
    }

    /// A stored record for `reference` created at [`stored_at`].
    pub fn record(reference: &str) -> AnalysisRecord {
        AnalysisRecord::new(key(reference), payload(reference), stored_at())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;

    /// A GitHub-style name segment.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[A-Za-z0-9][A-Za-z0-9_.-]{0,15}"
    }

    /// A canonical `owner/repo` reference.
    pub fn arb_repo_ref() -> impl Strategy<Value = String> {
        (arb_segment(), arb_segment()).prop_map(|(owner, repo)| format!("{owner}/{repo}"))
    }

    /// A reference to `owner/repo` in one of the spellings clients send.
    pub fn arb_repo_ref_variant(owner_repo: String) -> impl Strategy<Value = String> {
        (
            "[ ]{0,2}",
            prop_oneof![Just(""), Just("/"), Just("https://github.com/")],
            prop_oneof![Just(""), Just("/")],
            "[ ]{0,2}",
        )
            .prop_map(move |(lead, prefix, trail, tail)| {
                format!("{lead}{prefix}{owner_repo}{trail}{tail}")
            })
    }

    /// A reference with no usable path.
    pub fn arb_blank_ref() -> impl Strategy<Value = String> {
        "[ /]{0,6}"
    }
}

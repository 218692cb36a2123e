//! HTTP Contract Tests
//!
//! Drives the full router with `tower::ServiceExt::oneshot` and checks every
//! status code and body shape of the public surface, using scripted
//! collaborators so each outcome can be forced.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use proptest::prelude::*;
use repolens_api::{create_api_router, ApiConfig};
use repolens_core::AnalyzerError;
use repolens_storage::{Gateway, GatewayConfig};
use repolens_test_utils::{fixtures, generators, CountingStore, InMemoryStore, ScriptedAnalyzer};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tower::ServiceExt;

// ============================================================================
// TEST HARNESS
// ============================================================================

struct Harness {
    app: Router,
    store: Arc<CountingStore>,
    analyzer: Arc<ScriptedAnalyzer>,
}

impl Harness {
    fn new(store: CountingStore, analyzer: ScriptedAnalyzer) -> Self {
        let store = Arc::new(store);
        let analyzer = Arc::new(analyzer);
        let gateway = Arc::new(Gateway::new(
            store.clone(),
            analyzer.clone(),
            GatewayConfig::default(),
        ));
        let app = create_api_router(gateway, &ApiConfig::default());
        Self {
            app,
            store,
            analyzer,
        }
    }

    fn analyzing(name: &str) -> Self {
        Self::new(
            CountingStore::new(),
            ScriptedAnalyzer::returning(fixtures::payload(name)),
        )
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .method("GET")
            .body(Body::empty())
            .expect("request");
        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body).into_owned())
            })
        };
        (status, json)
    }
}

/// Percent-encode a query value.
fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// /test
// ============================================================================

#[tokio::test]
async fn test_endpoint_reports_working_without_collaborators() {
    let harness = Harness::analyzing("owner/repo");

    let (status, body) = harness.get("/test").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "API is working"}));
    assert_eq!(harness.store.lookups(), 0);
    assert_eq!(harness.analyzer.started(), 0);
}

// ============================================================================
// /analyze
// ============================================================================

#[tokio::test]
async fn missing_reference_is_bad_request() {
    let harness = Harness::analyzing("owner/repo");
    let expected = json!({
        "status": "error",
        "message": "GitHub URL is required. Use ?github=username/repository",
    });

    for uri in ["/analyze", "/analyze?github=", "/analyze?github=%20%20", "/api/analyze"] {
        let (status, body) = harness.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {uri}");
        assert_eq!(body, expected, "uri {uri}");
    }

    assert_eq!(harness.store.lookups(), 0);
    assert_eq!(harness.store.inserts(), 0);
    assert_eq!(harness.analyzer.started(), 0);
}

#[tokio::test]
async fn malformed_query_string_keeps_error_body_shape() {
    let harness = Harness::analyzing("owner/repo");

    let (status, body) = harness.get("/analyze?github=a/b&github=c/d").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "status": "error",
            "message": "GitHub URL is required. Use ?github=username/repository",
        })
    );
    assert_eq!(harness.store.lookups(), 0);
    assert_eq!(harness.analyzer.started(), 0);
}

#[tokio::test]
async fn fresh_analysis_has_no_source_and_is_written_back() {
    let harness = Harness::analyzing("owner/repo");

    let (status, body) = harness.get("/analyze?github=owner/repo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["repository"], "owner/repo");
    assert_eq!(body["analysis"], *fixtures::payload("owner/repo").as_value());
    assert!(body.get("source").is_none());
    assert_eq!(harness.analyzer.calls(), 1);
    assert_eq!(harness.store.inserts(), 1);

    let stored = harness.store.inner().len();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn cache_hit_returns_stored_timestamp() {
    let harness = Harness::new(
        CountingStore::wrap(InMemoryStore::with_records([fixtures::record("owner/repo")])),
        ScriptedAnalyzer::not_found(),
    );

    let (status, body) = harness.get("/analyze?github=owner/repo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "success",
            "repository": "owner/repo",
            "timestamp": "2024-01-15T09:30:00.000Z",
            "analysis": fixtures::payload("owner/repo").as_value(),
            "source": "cache",
        })
    );
    assert_eq!(harness.analyzer.started(), 0);
    assert_eq!(harness.store.inserts(), 0);
}

#[tokio::test]
async fn legacy_api_path_serves_the_same_contract() {
    let harness = Harness::new(
        CountingStore::wrap(InMemoryStore::with_records([fixtures::record("owner/repo")])),
        ScriptedAnalyzer::not_found(),
    );

    let (status, body) = harness.get("/api/analyze?github=owner/repo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "cache");
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let harness = Harness::analyzing("owner/repo");

    let (_, first) = harness.get("/analyze?github=owner/repo").await;
    let (status, second) = harness.get("/analyze?github=owner/repo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["analysis"], first["analysis"]);
    assert_eq!(second["timestamp"], first["timestamp"]);
    assert_eq!(second["source"], "cache");
    assert_eq!(harness.analyzer.calls(), 1);
}

#[tokio::test]
async fn not_found_is_404_and_not_stored() {
    let harness = Harness::new(CountingStore::new(), ScriptedAnalyzer::not_found());

    let (status, body) = harness.get("/analyze?github=owner/missing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({
            "status": "error",
            "message": "Repository analysis failed or repository not found",
        })
    );
    assert_eq!(harness.store.inserts(), 0);
}

#[tokio::test]
async fn unanalyzable_repository_is_404() {
    let harness = Harness::new(
        CountingStore::new(),
        ScriptedAnalyzer::failing(AnalyzerError::Unanalyzable {
            key: fixtures::key("owner/empty").into_string(),
            reason: "repository is empty".to_string(),
        }),
    );

    let (status, body) = harness.get("/analyze?github=owner/empty").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Repository analysis failed or repository not found");
    assert_eq!(harness.store.inserts(), 0);
}

#[tokio::test]
async fn analyzer_failure_is_500_with_detail() {
    let harness = Harness::new(
        CountingStore::new(),
        ScriptedAnalyzer::failing(AnalyzerError::Upstream {
            status: Some(502),
            message: "upstream exploded".to_string(),
        }),
    );

    let (status, body) = harness.get("/analyze?github=owner/repo").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Error analyzing repository");
    assert!(body["error"]
        .as_str()
        .is_some_and(|detail| detail.contains("upstream exploded")));
}

#[tokio::test]
async fn store_lookup_failure_is_500() {
    let store = CountingStore::new();
    store.fail_lookups(true);
    let harness = Harness::new(store, ScriptedAnalyzer::returning(fixtures::payload("x")));

    let (status, body) = harness.get("/analyze?github=owner/repo").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Error analyzing repository");
    assert!(body["error"].is_string());
    assert_eq!(harness.analyzer.started(), 0);
}

#[tokio::test]
async fn store_write_failure_still_returns_fresh_result() {
    let store = CountingStore::new();
    store.fail_inserts(true);
    let harness = Harness::new(store, ScriptedAnalyzer::returning(fixtures::payload("owner/repo")));

    let (status, body) = harness.get("/analyze?github=owner/repo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["analysis"], *fixtures::payload("owner/repo").as_value());
    assert!(body.get("source").is_none());
    assert_eq!(harness.store.inserts(), 1);
    assert!(harness.store.inner().is_empty());
}

// ============================================================================
// OPERATIONAL ENDPOINTS
// ============================================================================

#[tokio::test]
async fn health_endpoints_respond() {
    let harness = Harness::analyzing("owner/repo");

    let (status, body) = harness.get("/health/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("pong".to_string()));

    let (status, body) = harness.get("/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = harness.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["store"]["name"], "memory");
    assert_eq!(body["details"]["analyses_in_flight"], 0);
}

#[tokio::test]
async fn cors_allows_any_origin_by_default() {
    let harness = Harness::analyzing("owner/repo");
    let request = Request::builder()
        .uri("/test")
        .header("origin", "https://dashboard.example.com")
        .body(Body::empty())
        .expect("request");

    let response = harness.app.clone().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn metrics_endpoint_exposes_gateway_outcomes() {
    let harness = Harness::analyzing("owner/repo");
    harness.get("/analyze?github=owner/repo").await;

    let (status, body) = harness.get("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap_or_default().to_string();
    assert!(text.contains("repolens_gateway_outcomes_total"));
    assert!(text.contains("repolens_http_requests_total"));
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every spelling of the same repository shares one cache entry.
    #[test]
    fn prop_reference_spellings_share_cache(
        (owner_repo, variant) in generators::arb_repo_ref()
            .prop_flat_map(|r| (Just(r.clone()), generators::arb_repo_ref_variant(r)))
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let harness = Harness::analyzing(&owner_repo);

            let (status, first) = harness
                .get(&format!("/analyze?github={}", encode(&owner_repo)))
                .await;
            prop_assert_eq!(status, StatusCode::OK);

            let (status, second) = harness
                .get(&format!("/analyze?github={}", encode(&variant)))
                .await;
            prop_assert_eq!(status, StatusCode::OK);
            prop_assert_eq!(&second["source"], "cache");
            prop_assert_eq!(&second["repository"], &Value::String(variant.clone()));
            prop_assert_eq!(&second["timestamp"], &first["timestamp"]);
            prop_assert_eq!(harness.analyzer.calls(), 1);
            Ok(())
        })?;
    }

    /// Blank references are rejected before any collaborator is touched.
    #[test]
    fn prop_blank_reference_touches_nothing(blank in generators::arb_blank_ref()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let harness = Harness::analyzing("owner/repo");

            let (status, body) = harness
                .get(&format!("/analyze?github={}", encode(&blank)))
                .await;
            prop_assert_eq!(status, StatusCode::BAD_REQUEST);
            prop_assert_eq!(&body["status"], "error");
            prop_assert_eq!(harness.analyzer.started(), 0);
            prop_assert_eq!(harness.store.inserts(), 0);
            Ok(())
        })?;
    }
}

//! HTTP Routes Module
//!
//! Includes:
//! - Repository analysis (`/analyze`, `/api/analyze`) and the `/test` probe
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics at `/metrics`
//! - CORS support for browser-based clients

pub mod analyze;
pub mod health;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use repolens_storage::Gateway;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Create the complete API router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS - handles preflight requests
/// 2. TraceLayer - request spans from tower-http
/// 3. Observability - metrics and completion logs
pub fn create_api_router(gateway: Arc<Gateway>, config: &ApiConfig) -> Router {
    let state = AppState::new(gateway);

    Router::new()
        .route("/test", get(analyze::connectivity_check))
        .route("/analyze", get(analyze::analyze))
        .route("/api/analyze", get(analyze::analyze))
        .route("/metrics", get(metrics_handler))
        .nest(
            "/health",
            health::create_router(state.gateway.clone(), state.start_time),
        )
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
        .with_state(state)
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// With no configured origins every origin is allowed; otherwise only the
/// configured ones.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_cors_restricted() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

//! Repolens API Server Entry Point
//!
//! Bootstraps configuration, wires the store and analyzer into the gateway,
//! and starts the Axum HTTP server.

use std::sync::Arc;

use repolens_api::telemetry::{init_tracing, TelemetryConfig};
use repolens_api::{build_store, create_api_router, ApiConfig, ApiError, ApiResult, GithubAnalyzer};
use repolens_storage::Gateway;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = ApiConfig::from_env()?;
    tracing::debug!(?config, "Configuration loaded");

    let store = build_store(&config.store)?;
    if let Err(e) = store.health_check().await {
        tracing::warn!(store = store.name(), error = %e, "Store is not reachable at startup");
    }

    let analyzer = GithubAnalyzer::new(&config.github, config.resource_origin.clone())
        .map_err(|e| ApiError::internal_error(format!("Failed to initialize analyzer: {}", e)))?;

    let gateway = Arc::new(Gateway::new(
        store,
        Arc::new(analyzer),
        config.gateway_config(),
    ));

    let app = create_api_router(gateway, &config);

    let addr = config.bind_addr()?;
    tracing::info!(
        %addr,
        store = config.store.name(),
        single_flight = config.single_flight,
        "Starting repolens API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

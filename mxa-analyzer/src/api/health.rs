//! Health check endpoint
//!
//! Real uptime, capability flags and the last analysis error for diagnostics

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::registry::CapabilityFlags;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" with every artifact loaded, "degraded" otherwise
    pub status: String,
    /// Module name ("mxa-analyzer")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Short git commit hash of the build
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub capabilities: CapabilityFlags,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Service description for `GET /`
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub module: String,
    pub version: String,
    pub endpoints: Vec<&'static str>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let capabilities = state.analyzer.read().await.capabilities().flags;
    let last_error = state.last_error.read().await.clone();

    let status = if capabilities.is_complete() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "mxa-analyzer".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        uptime_seconds,
        capabilities,
        last_error,
    })
}

/// GET /
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        module: "mxa-analyzer".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "GET /health",
            "GET /api/methods",
            "POST /api/analyze",
            "GET /api/results",
            "GET /api/statistics",
            "GET /api/capabilities",
            "POST /api/models/reload",
        ],
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
}

//! Model artifact endpoints
//!
//! GET /api/capabilities, POST /api/models/reload

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::analyzer::Capabilities;
use crate::error::{ApiError, ApiResult};
use crate::registry::CapabilityFlags;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: String,
    pub capabilities: CapabilityFlags,
}

/// GET /api/capabilities
pub async fn get_capabilities(State(state): State<AppState>) -> Json<Capabilities> {
    Json(state.analyzer.read().await.capabilities())
}

/// POST /api/models/reload
///
/// Artifacts are read on the blocking pool while analyses keep running. The
/// write lock is held only to swap in the new registry.
pub async fn reload_models(State(state): State<AppState>) -> ApiResult<Json<ReloadResponse>> {
    tracing::info!("Reloading model artifacts");
    let source = state.analyzer.read().await.model_source();

    let capabilities = match source {
        Some(source) => {
            let registry = tokio::task::spawn_blocking(move || source.load())
                .await
                .map_err(|e| ApiError::Internal(format!("Model reload failed: {}", e)))?;
            state.analyzer.write().await.install_registry(registry)
        }
        None => state.analyzer.write().await.reload_models(),
    };

    Ok(Json(ReloadResponse {
        status: "reloaded".to_string(),
        capabilities,
    }))
}

pub fn model_routes() -> Router<AppState> {
    Router::new()
        .route("/api/capabilities", get(get_capabilities))
        .route("/api/models/reload", post(reload_models))
}

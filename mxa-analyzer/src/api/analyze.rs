//! Image analysis endpoint
//!
//! POST /api/analyze with `{ "image": <base64>, "filename"?, "methods"? }`.
//! A `data:` URL prefix on the image is accepted and stripped.

use axum::{extract::State, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::types::{AnalysisRecord, ImageRef};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Base64-encoded image bytes
    pub image: Option<String>,
    pub filename: Option<String>,
    /// Method identifiers; the configured default list when absent
    pub methods: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    /// Reference under which the results were stored
    pub image: String,
    pub requested: usize,
    pub completed: usize,
    pub results: Vec<AnalysisRecord>,
}

/// POST /api/analyze
pub async fn analyze_image(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let encoded = request
        .image
        .as_deref()
        .filter(|image| !image.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No image data provided".to_string()))?;

    let data = decode_image_payload(encoded)?;
    let image = ImageRef::Bytes {
        name: format!("upload_{}", Uuid::new_v4()),
        filename: request.filename.clone(),
        data,
    };

    let analyzer = state.analyzer.read().await;
    let requested = request
        .methods
        .as_ref()
        .map(Vec::len)
        .unwrap_or_else(|| analyzer.default_methods().len());

    match analyzer.analyze(&image, request.methods.as_deref()).await {
        Ok(results) => {
            tracing::info!(
                image = %image.display_name(),
                requested,
                completed = results.len(),
                "Analysis request completed"
            );
            Ok(Json(AnalyzeResponse {
                success: true,
                image: image.display_name(),
                requested,
                completed: results.len(),
                results,
            }))
        }
        Err(e) => {
            tracing::error!(image = %image.display_name(), error = %e, "Analysis request failed");
            *state.last_error.write().await = Some(e.to_string());
            Err(e.into())
        }
    }
}

/// Base64 payload → bytes, tolerating a `data:<mime>;base64,` prefix
fn decode_image_payload(encoded: &str) -> ApiResult<Vec<u8>> {
    let payload = match encoded.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };

    STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64 image data: {}", e)))
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze", post(analyze_image))
        .route("/predict", post(analyze_image))
}

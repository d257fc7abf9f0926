//! Result history and statistics endpoints
//!
//! GET /api/results?limit&image_path, GET /api/statistics

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::AnalysisStatistics;
use crate::error::{ApiError, ApiResult};
use crate::types::StoredRecord;
use crate::AppState;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub limit: Option<u32>,
    pub image_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub count: usize,
    pub results: Vec<StoredRecord>,
}

/// GET /api/results
pub async fn get_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> ApiResult<Json<ResultsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let results = state
        .analyzer
        .read()
        .await
        .results(limit, query.image_path.as_deref())
        .await?;

    Ok(Json(ResultsResponse {
        count: results.len(),
        results,
    }))
}

/// GET /api/statistics
pub async fn get_statistics(State(state): State<AppState>) -> ApiResult<Json<AnalysisStatistics>> {
    let statistics = state.analyzer.read().await.statistics().await?;
    Ok(Json(statistics))
}

pub fn result_routes() -> Router<AppState> {
    Router::new()
        .route("/api/results", get(get_results))
        .route("/api/statistics", get(get_statistics))
}

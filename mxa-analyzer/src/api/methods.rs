//! Method vocabulary endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::methods::MethodInfo;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MethodsResponse {
    pub methods: Vec<MethodInfo>,
    /// Run when a request names no methods
    pub default_methods: Vec<String>,
}

/// GET /api/methods
pub async fn list_methods(State(state): State<AppState>) -> Json<MethodsResponse> {
    let analyzer = state.analyzer.read().await;
    Json(MethodsResponse {
        methods: analyzer.methods().to_vec(),
        default_methods: analyzer.default_methods().to_vec(),
    })
}

pub fn method_routes() -> Router<AppState> {
    Router::new().route("/api/methods", get(list_methods))
}

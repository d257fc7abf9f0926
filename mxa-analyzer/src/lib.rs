//! mxa-analyzer library interface
//!
//! Micro-expression analysis engine: feature extraction under five image
//! encodings, a prediction fallback chain over optional model artifacts,
//! and a persisted result history with on-demand statistics. The HTTP
//! router and CLI in `main.rs` are thin shells over [`analyzer::Analyzer`].

pub mod analyzer;
pub mod api;
pub mod classifiers;
pub mod db;
pub mod error;
pub mod extractors;
pub mod loader;
pub mod methods;
pub mod models;
pub mod registry;
pub mod types;
pub mod utils;

pub use crate::analyzer::Analyzer;
pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Write-locked only by an explicit model reload
    pub analyzer: Arc<RwLock<Analyzer>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer: Arc::new(RwLock::new(analyzer)),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::analyze_routes())
        .merge(api::method_routes())
        .merge(api::result_routes())
        .merge(api::model_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

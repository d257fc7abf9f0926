//! Error types for mxa-analyzer
//!
//! One enum per concern. Extraction and prediction errors never reach an
//! HTTP caller: they are logged and turned into a skipped method or a
//! fall-through to the next prediction tier. Only persistence failures
//! propagate out of an analysis call.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Why a feature extractor produced no vector
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Image could not be read or decoded
    #[error("Image load failed: {0}")]
    ImageLoad(String),

    /// A required model artifact is not loaded
    #[error("Missing artifact: {0}")]
    MissingArtifact(&'static str),

    /// Extractor output contained NaN/inf or was empty
    #[error("Invalid feature vector: {0}")]
    InvalidFeatures(String),

    /// Numerical failure inside an extractor
    #[error("Computation failed: {0}")]
    Computation(String),

    /// Extractor panicked
    #[error("Extractor panicked: {0}")]
    Panicked(String),

    /// Extraction exceeded the configured deadline
    #[error("Extraction exceeded deadline of {0} ms")]
    DeadlineExceeded(u64),
}

/// Strategy lookup failures
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    /// No external entry point and no built-in strategy for the encoding
    #[error("No compatible extraction method for encoding '{0}'")]
    NoCompatibleMethod(String),
}

/// A single prediction tier failed
#[derive(Debug, Error)]
pub enum PredictionError {
    /// Input length does not match the model
    #[error("Feature length mismatch: expected {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    /// Model produced an unusable output
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    /// Tier is not available for this request
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Model artifact could not be loaded
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary decode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Artifact parsed but violates its structural invariants
    #[error("Invalid artifact: {0}")]
    Invalid(String),
}

/// Analysis-level failure surfaced to callers
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Batch append failed (after lock retries)
    #[error("Persistence failed: {0}")]
    Persistence(#[from] mxa_common::Error),

    /// Blocking task could not be joined
    #[error("Worker failure: {0}")]
    Worker(String),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Analysis failure
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    /// mxa-common error
    #[error("Common error: {0}")]
    Common(#[from] mxa_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Analysis(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ANALYSIS_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

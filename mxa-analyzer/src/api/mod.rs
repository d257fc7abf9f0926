//! HTTP API handlers for mxa-analyzer
//!
//! Thin shim over [`crate::analyzer::Analyzer`]: decode uploads, map
//! outcomes to JSON and status codes.

pub mod analyze;
pub mod health;
pub mod methods;
pub mod models;
pub mod results;

pub use analyze::analyze_routes;
pub use health::health_routes;
pub use methods::method_routes;
pub use models::model_routes;
pub use results::result_routes;

//! # MXA Common Library
//!
//! Shared code for the MXA analysis crates:
//! - Error type shared by configuration and persistence code
//! - TOML configuration loading and root folder resolution
//! - Tracing subscriber initialization
//! - Database initialization and additive schema synchronization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod logging;

pub use error::{Error, Result};

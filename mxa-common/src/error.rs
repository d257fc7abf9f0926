//! Common error types for MXA

use thiserror::Error;

/// Common result type for MXA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across MXA crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "sqlx")]
impl Error {
    /// True when the error is SQLite reporting lock contention
    /// ("database is locked" / "database table is locked").
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(e) => e.to_string().contains("is locked"),
            _ => false,
        }
    }
}

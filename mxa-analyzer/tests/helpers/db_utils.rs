//! Database Test Utilities

use anyhow::Result;
use mxa_analyzer::Analyzer;
use mxa_common::config::{ModelsConfig, TomlConfig};
use sqlx::SqlitePool;
use std::path::Path;
use tempfile::TempDir;

/// Configuration rooted in `root`, with models under `<root>/models`
pub fn test_config(root: &Path) -> TomlConfig {
    TomlConfig {
        root_folder: Some(root.to_path_buf()),
        database_path: Some(root.join("test_mxa.db")),
        models: ModelsConfig {
            directory: Some(root.join("models")),
            ..ModelsConfig::default()
        },
        ..TomlConfig::default()
    }
}

/// Create temporary test database with the current schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let pool = mxa_common::db::init_database(&temp_dir.path().join("test_mxa.db")).await?;
    Ok((temp_dir, pool))
}

/// Analyzer over a fresh temporary root with an empty model directory
pub async fn test_analyzer() -> Result<(TempDir, Analyzer)> {
    let (temp_dir, pool) = create_test_db().await?;
    std::fs::create_dir_all(temp_dir.path().join("models"))?;
    let analyzer = Analyzer::new(pool, &test_config(temp_dir.path()));
    Ok((temp_dir, analyzer))
}

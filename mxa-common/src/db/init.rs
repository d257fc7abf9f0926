//! Database initialization
//!
//! Opens (creating when missing) the SQLite database holding the
//! `analysis_results` relation and brings its schema up to date:
//! 1. `CREATE TABLE IF NOT EXISTS`
//! 2. Additive schema sync (missing columns are added)

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets statistics readers run while a batch append is in flight
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 250")
        .execute(&pool)
        .await?;

    create_analysis_results_table(&pool).await?;
    crate::db::table_schemas::sync_all_table_schemas(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema, for tests and dry runs
///
/// Limited to a single connection: every pooled connection to `:memory:`
/// would otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_analysis_results_table(&pool).await?;
    crate::db::table_schemas::sync_all_table_schemas(&pool).await?;

    Ok(pool)
}

/// Create the `analysis_results` relation
///
/// Columns added after the first release are NOT listed here; they are
/// declared in `table_schemas` and added by the schema sync step so that old
/// and new databases converge on the same layout.
pub async fn create_analysis_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_path TEXT NOT NULL,
            original_filename TEXT,
            encoding_type TEXT NOT NULL,
            classifier_type TEXT NOT NULL,
            prediction TEXT NOT NULL,
            confidence REAL NOT NULL,
            processing_time REAL NOT NULL,
            features_extracted INTEGER,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
            model_combination TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_results_image ON analysis_results(image_path)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

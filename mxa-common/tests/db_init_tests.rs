//! Database initialization and additive schema evolution

use mxa_common::db::init_database;
use sqlx::Row;
use tempfile::TempDir;

async fn column_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query("PRAGMA table_info(analysis_results)")
        .fetch_all(pool)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect()
}

#[tokio::test]
async fn new_database_has_current_layout() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("mxa.db")).await.unwrap();

    let columns = column_names(&pool).await;
    for expected in [
        "id",
        "image_path",
        "original_filename",
        "encoding_type",
        "classifier_type",
        "prediction",
        "confidence",
        "processing_time",
        "features_extracted",
        "timestamp",
        "model_combination",
        "prediction_source",
    ] {
        assert!(columns.iter().any(|c| c == expected), "missing column {}", expected);
    }
}

#[tokio::test]
async fn legacy_database_gains_new_columns_and_keeps_rows() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("legacy.db");

    {
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = sqlx::SqlitePool::connect(&url).await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE analysis_results (
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
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO analysis_results (image_path, encoding_type, classifier_type, prediction, confidence, processing_time, model_combination) VALUES ('old.jpg', 'hog', 'rf', 'lie', 0.6, 0.2, 'Hog + Rf')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path).await.unwrap();

    assert!(column_names(&pool).await.iter().any(|c| c == "prediction_source"));
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_results")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

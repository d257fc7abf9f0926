//! Analysis result persistence
//!
//! One row per completed method in `analysis_results`. A batch from a single
//! `analyze` call is written in one transaction, so either every record of
//! the call is visible or none is. Aggregates are computed at query time.

use crate::types::{AnalysisRecord, Label, PredictionSource, StoredRecord};
use crate::utils::LockRetry;
use chrono::{DateTime, NaiveDateTime, Utc};
use mxa_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Stored timestamp layout; sorts lexicographically in time order
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Average confidence and volume of one encoding + classifier combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationStats {
    pub model_combination: String,
    pub avg_confidence: f64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub prediction: Label,
    pub count: i64,
}

/// Processing time in seconds, per encoding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingTiming {
    pub encoding_type: String,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisStatistics {
    pub total_analyses: i64,
    /// Ordered by average confidence, highest first
    pub by_combination: Vec<CombinationStats>,
    pub prediction_distribution: Vec<LabelCount>,
    pub timing_by_encoding: Vec<EncodingTiming>,
}

#[derive(Clone)]
pub struct ResultStore {
    pool: SqlitePool,
    retry: LockRetry,
}

impl ResultStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            retry: LockRetry::new(max_lock_wait_ms),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a batch atomically
    pub async fn append(&self, records: &[AnalysisRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.retry.run("append_results", || async {
            let mut tx = self.pool.begin().await?;

            for record in records {
                sqlx::query(
                    r#"
                    INSERT INTO analysis_results (
                        image_path, original_filename, encoding_type, classifier_type,
                        prediction, confidence, processing_time, features_extracted,
                        timestamp, model_combination, prediction_source
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.image_path)
                .bind(&record.original_filename)
                .bind(&record.encoding_type)
                .bind(&record.classifier_type)
                .bind(record.prediction.as_str())
                .bind(record.confidence)
                .bind(record.processing_time)
                .bind(record.features_extracted)
                .bind(record.timestamp.format(TIMESTAMP_FORMAT).to_string())
                .bind(&record.model_combination)
                .bind(record.prediction_source.map(|s| s.as_str()))
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok::<(), Error>(())
        })
        .await?;

        debug!(count = records.len(), "Appended analysis results");
        Ok(())
    }

    /// Most recent first, optionally restricted to one image
    pub async fn query(&self, limit: u32, image_path: Option<&str>) -> Result<Vec<StoredRecord>> {
        let mut sql = String::from(
            r#"
            SELECT id, image_path, original_filename, encoding_type, classifier_type,
                   prediction, confidence, processing_time, features_extracted,
                   timestamp, model_combination, prediction_source
            FROM analysis_results
            "#,
        );
        if image_path.is_some() {
            sql.push_str(" WHERE image_path = ?");
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(path) = image_path {
            query = query.bind(path);
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;

        rows.iter().map(stored_record).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn statistics(&self) -> Result<AnalysisStatistics> {
        let total_analyses = self.count().await?;

        let by_combination = sqlx::query(
            r#"
            SELECT model_combination, AVG(confidence) AS avg_confidence, COUNT(*) AS count
            FROM analysis_results
            GROUP BY model_combination
            ORDER BY avg_confidence DESC, model_combination ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| CombinationStats {
            model_combination: row.get("model_combination"),
            avg_confidence: row.get("avg_confidence"),
            count: row.get("count"),
        })
        .collect();

        let prediction_distribution = sqlx::query(
            r#"
            SELECT prediction, COUNT(*) AS count
            FROM analysis_results
            GROUP BY prediction
            ORDER BY count DESC, prediction ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| LabelCount {
            prediction: Label::parse(row.get::<String, _>("prediction").as_str()),
            count: row.get("count"),
        })
        .collect();

        let timing_by_encoding = sqlx::query(
            r#"
            SELECT encoding_type,
                   AVG(processing_time) AS avg_time,
                   MIN(processing_time) AS min_time,
                   MAX(processing_time) AS max_time
            FROM analysis_results
            GROUP BY encoding_type
            ORDER BY avg_time ASC, encoding_type ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| EncodingTiming {
            encoding_type: row.get("encoding_type"),
            avg_time: row.get("avg_time"),
            min_time: row.get("min_time"),
            max_time: row.get("max_time"),
        })
        .collect();

        Ok(AnalysisStatistics {
            total_analyses,
            by_combination,
            prediction_distribution,
            timing_by_encoding,
        })
    }
}

fn stored_record(row: &SqliteRow) -> Result<StoredRecord> {
    let timestamp: String = row.try_get("timestamp")?;
    let source: Option<String> = row.try_get("prediction_source")?;
    let prediction: String = row.try_get("prediction")?;

    Ok(StoredRecord {
        id: row.try_get("id")?,
        record: AnalysisRecord {
            image_path: row.try_get("image_path")?,
            original_filename: row
                .try_get::<Option<String>, _>("original_filename")?
                .unwrap_or_default(),
            encoding_type: row.try_get("encoding_type")?,
            classifier_type: row.try_get("classifier_type")?,
            prediction: Label::parse(&prediction),
            confidence: row.try_get("confidence")?,
            processing_time: row.try_get("processing_time")?,
            features_extracted: row
                .try_get::<Option<i64>, _>("features_extracted")?
                .unwrap_or(0),
            timestamp: parse_timestamp(&timestamp)?,
            model_combination: row.try_get("model_combination")?,
            prediction_source: source.as_deref().and_then(PredictionSource::parse),
        },
    })
}

/// Accepts our own layout and SQLite's `CURRENT_TIMESTAMP` default
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(image: &str, encoding: &str, confidence: f64, seconds: i64) -> AnalysisRecord {
        AnalysisRecord {
            image_path: image.to_string(),
            original_filename: format!("{}.png", image),
            encoding_type: encoding.to_string(),
            classifier_type: "rf".to_string(),
            prediction: if confidence > 0.6 { Label::Truth } else { Label::Lie },
            confidence,
            processing_time: 0.01 * (seconds + 1) as f64,
            features_extracted: 1764,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + Duration::seconds(seconds),
            model_combination: format!("{} + Rf", encoding),
            prediction_source: Some(PredictionSource::Statistical),
        }
    }

    async fn store() -> ResultStore {
        let pool = mxa_common::db::init_memory_database().await.unwrap();
        ResultStore::new(pool, 1000)
    }

    #[tokio::test]
    async fn query_returns_most_recent_first() {
        let store = store().await;
        store
            .append(&[record("a", "hog", 0.7, 0), record("b", "hog", 0.5, 10)])
            .await
            .unwrap();
        store.append(&[record("a", "dlib", 0.9, 20)]).await.unwrap();

        let all = store.query(10, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].record.encoding_type, "dlib");
        assert_eq!(all[2].record.image_path, "a");
        assert_eq!(all[0].record, record("a", "dlib", 0.9, 20));

        let only_a = store.query(10, Some("a")).await.unwrap();
        assert_eq!(only_a.len(), 2);

        let limited = store.query(1, None).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn empty_store_has_empty_statistics() {
        let stats = store().await.statistics().await.unwrap();
        assert_eq!(stats.total_analyses, 0);
        assert!(stats.by_combination.is_empty());
        assert!(stats.prediction_distribution.is_empty());
        assert!(stats.timing_by_encoding.is_empty());
    }

    #[tokio::test]
    async fn statistics_aggregate_per_combination_and_encoding() {
        let store = store().await;
        store
            .append(&[
                record("a", "hog", 0.7, 0),
                record("b", "hog", 0.5, 1),
                record("c", "dlib", 0.9, 2),
            ])
            .await
            .unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_analyses, 3);

        assert_eq!(stats.by_combination[0].model_combination, "dlib + Rf");
        assert_eq!(stats.by_combination[1].count, 2);
        assert!((stats.by_combination[1].avg_confidence - 0.6).abs() < 1e-9);

        assert_eq!(
            stats.prediction_distribution[0],
            LabelCount {
                prediction: Label::Truth,
                count: 2
            }
        );

        let hog = &stats.timing_by_encoding[0];
        assert_eq!(hog.encoding_type, "hog");
        assert!((hog.min_time - 0.01).abs() < 1e-9);
        assert!((hog.max_time - 0.02).abs() < 1e-9);

        assert_eq!(store.statistics().await.unwrap(), stats);
    }

    #[tokio::test]
    async fn timing_is_ordered_fastest_encoding_first() {
        let store = store().await;
        store
            .append(&[
                record("a", "hog", 0.7, 5),
                record("a", "raw_pixels", 0.7, 0),
                record("a", "dlib", 0.7, 2),
            ])
            .await
            .unwrap();

        let order: Vec<String> = store
            .statistics()
            .await
            .unwrap()
            .timing_by_encoding
            .into_iter()
            .map(|t| t.encoding_type)
            .collect();
        assert_eq!(order, vec!["raw_pixels", "dlib", "hog"]);
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_rows() {
        let store = store().await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_second_row BEFORE INSERT ON analysis_results
            WHEN (SELECT COUNT(*) FROM analysis_results) >= 1
            BEGIN SELECT RAISE(ABORT, 'second row rejected'); END
            "#,
        )
        .execute(store.pool())
        .await
        .unwrap();

        let result = store
            .append(&[record("a", "hog", 0.7, 0), record("a", "dlib", 0.7, 1)])
            .await;

        assert!(result.is_err());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn legacy_rows_with_default_timestamp_are_readable() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO analysis_results (image_path, encoding_type, classifier_type, prediction, confidence, processing_time, model_combination) VALUES ('old.png', 'hog', 'rf', 'truth', 0.7, 0.01, 'Hog + Rf')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let rows = store.query(5, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.original_filename, "");
        assert_eq!(rows[0].record.features_extracted, 0);
        assert!(rows[0].record.prediction_source.is_none());
    }

    #[test]
    fn timestamp_parsing_accepts_both_layouts() {
        assert!(parse_timestamp("2024-05-01 12:00:00").is_ok());
        assert!(parse_timestamp("2024-05-01 12:00:00.123456").is_ok());
        assert!(parse_timestamp("2024-05-01T12:00:00Z").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}

//! Table Schema Definitions
//!
//! Single source of truth for the persisted layout. Columns appended to
//! `expected_columns` are added to existing databases on startup.

use crate::db::schema_sync::{ColumnDefinition, SchemaSync, TableSchema};
use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// `analysis_results` table schema
pub struct AnalysisResultsSchema;

impl TableSchema for AnalysisResultsSchema {
    fn table_name() -> &'static str {
        "analysis_results"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "INTEGER").primary_key(),
            ColumnDefinition::new("image_path", "TEXT").not_null(),
            ColumnDefinition::new("original_filename", "TEXT"),
            ColumnDefinition::new("encoding_type", "TEXT").not_null(),
            ColumnDefinition::new("classifier_type", "TEXT").not_null(),
            ColumnDefinition::new("prediction", "TEXT").not_null(),
            ColumnDefinition::new("confidence", "REAL").not_null(),
            ColumnDefinition::new("processing_time", "REAL").not_null(),
            ColumnDefinition::new("features_extracted", "INTEGER"),
            ColumnDefinition::new("timestamp", "DATETIME").default("CURRENT_TIMESTAMP"),
            ColumnDefinition::new("model_combination", "TEXT").not_null(),
            // Which prediction tier produced the label
            ColumnDefinition::new("prediction_source", "TEXT"),
        ]
    }
}

/// Synchronize all table schemas
pub async fn sync_all_table_schemas(pool: &SqlitePool) -> Result<()> {
    let added = SchemaSync::sync_table::<AnalysisResultsSchema>(pool).await?;
    if added > 0 {
        info!("Schema sync added {} column(s) to analysis_results", added);
    }
    Ok(())
}

//! Automatic Schema Synchronization
//!
//! The persisted layout evolves additively: new columns are declared in code
//! and added to existing databases on startup. Anything that is not a plain
//! column addition (type change, new constraint, removal) is reported as
//! drift and left alone.
//!
//! # Usage
//!
//! ```rust,ignore
//! pub struct AnalysisResultsSchema;
//!
//! impl TableSchema for AnalysisResultsSchema {
//!     fn table_name() -> &'static str { "analysis_results" }
//!
//!     fn expected_columns() -> Vec<ColumnDefinition> {
//!         vec![
//!             ColumnDefinition::new("id", "INTEGER").primary_key(),
//!             ColumnDefinition::new("prediction_source", "TEXT"),  // added later
//!         ]
//!     }
//! }
//!
//! SchemaSync::sync_table::<AnalysisResultsSchema>(&pool).await?;
//! ```

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER", "REAL", "DATETIME")
    pub sql_type: String,
    /// NOT NULL constraint
    pub not_null: bool,
    /// PRIMARY KEY constraint
    pub primary_key: bool,
    /// DEFAULT value
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    /// Create new column definition
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            default_value: None,
        }
    }

    /// Mark column as PRIMARY KEY
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark column as NOT NULL
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Set DEFAULT value
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Column clause for `ALTER TABLE ... ADD COLUMN`
    ///
    /// SQLite refuses to add a NOT NULL column without a default, so the
    /// constraint is only emitted together with one.
    fn add_column_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);
        if let Some(default) = &self.default_value {
            if self.not_null {
                sql.push_str(" NOT NULL");
            }
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        sql
    }
}

/// Actual column from database introspection (PRAGMA table_info result)
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub cid: i32,
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub pk: bool,
}

/// Schema drift detected between expected and actual schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaDrift {
    /// Column missing from database (fixable)
    MissingColumn {
        table: String,
        column: ColumnDefinition,
    },
    /// Column type mismatch (cannot auto-fix)
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
    /// Constraint mismatch (cannot auto-fix)
    ConstraintMismatch {
        table: String,
        column: String,
        constraint: String,
    },
}

/// Defines expected schema for a database table
pub trait TableSchema {
    /// Table name in database
    fn table_name() -> &'static str;

    /// Expected column definitions
    fn expected_columns() -> Vec<ColumnDefinition>;
}

/// Read actual columns from database table using PRAGMA table_info
pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
    let query = format!("PRAGMA table_info({})", table_name);
    let rows = sqlx::query(&query).fetch_all(pool).await?;

    let mut columns: Vec<ActualColumn> = rows
        .iter()
        .map(|row| ActualColumn {
            cid: row.get("cid"),
            name: row.get("name"),
            type_name: row.get("type"),
            not_null: row.get::<i32, _>("notnull") != 0,
            pk: row.get::<i32, _>("pk") != 0,
        })
        .collect();

    columns.sort_by_key(|c| c.cid);
    Ok(columns)
}

/// Check if table exists
pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Compare expected schema to actual database schema
pub fn compare(
    table_name: &str,
    expected: &[ColumnDefinition],
    actual: &[ActualColumn],
) -> Vec<SchemaDrift> {
    let mut drift = Vec::new();

    for expected_col in expected {
        let Some(actual_col) = actual.iter().find(|c| c.name == expected_col.name) else {
            drift.push(SchemaDrift::MissingColumn {
                table: table_name.to_string(),
                column: expected_col.clone(),
            });
            continue;
        };

        if !types_compatible(&expected_col.sql_type, &actual_col.type_name) {
            drift.push(SchemaDrift::TypeMismatch {
                table: table_name.to_string(),
                column: expected_col.name.clone(),
                expected: expected_col.sql_type.clone(),
                actual: actual_col.type_name.clone(),
            });
        }

        if expected_col.not_null && !actual_col.not_null {
            drift.push(SchemaDrift::ConstraintMismatch {
                table: table_name.to_string(),
                column: expected_col.name.clone(),
                constraint: "NOT NULL".to_string(),
            });
        }

        if expected_col.primary_key && !actual_col.pk {
            drift.push(SchemaDrift::ConstraintMismatch {
                table: table_name.to_string(),
                column: expected_col.name.clone(),
                constraint: "PRIMARY KEY".to_string(),
            });
        }
    }

    drift
}

/// SQLite type affinity comparison
fn types_compatible(expected: &str, actual: &str) -> bool {
    let exp = expected.to_uppercase();
    let act = actual.to_uppercase();

    if exp == act {
        return true;
    }

    let affinity = |t: &str| {
        if t.contains("INT") {
            "INTEGER"
        } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
            "TEXT"
        } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
            "REAL"
        } else {
            "NUMERIC"
        }
    };

    affinity(&exp) == affinity(&act)
}

/// Schema synchronization entry point
pub struct SchemaSync;

impl SchemaSync {
    /// Add missing columns; log everything else
    ///
    /// Returns the number of columns added.
    pub async fn sync_table<T: TableSchema>(pool: &SqlitePool) -> Result<usize> {
        let table_name = T::table_name();

        if !table_exists(pool, table_name).await? {
            warn!(
                "Table '{}' does not exist - should be created by CREATE TABLE IF NOT EXISTS first",
                table_name
            );
            return Ok(0);
        }

        let actual = introspect_table(pool, table_name).await?;
        let drift = compare(table_name, &T::expected_columns(), &actual);

        let mut added = 0;
        for item in drift {
            match item {
                SchemaDrift::MissingColumn { table, column } => {
                    let sql = format!("ALTER TABLE {} ADD COLUMN {}", table, column.add_column_sql());
                    sqlx::query(&sql).execute(pool).await?;
                    info!(table = %table, column = %column.name, "Added missing column");
                    added += 1;
                }
                SchemaDrift::TypeMismatch {
                    table,
                    column,
                    expected,
                    actual,
                } => {
                    warn!(
                        table = %table,
                        column = %column,
                        expected = %expected,
                        actual = %actual,
                        "Column type drift (not auto-fixable)"
                    );
                }
                SchemaDrift::ConstraintMismatch {
                    table,
                    column,
                    constraint,
                } => {
                    warn!(
                        table = %table,
                        column = %column,
                        constraint = %constraint,
                        "Column constraint drift (not auto-fixable)"
                    );
                }
            }
        }

        Ok(added)
    }
}

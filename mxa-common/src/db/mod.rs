//! Database initialization and schema maintenance

pub mod init;
pub mod schema_sync;
pub mod table_schemas;

pub use init::{create_analysis_results_table, init_database, init_memory_database};

//! Database access for mxa-analyzer
//!
//! Pool creation and schema maintenance live in `mxa_common::db`; this
//! module owns the queries over `analysis_results`.

pub mod results;

pub use results::{AnalysisStatistics, CombinationStats, EncodingTiming, LabelCount, ResultStore};

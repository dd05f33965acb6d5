/// Data model for analysis reports.
///
/// Re-exports the report types and supporting size helpers.
pub mod report;
pub mod size;

pub use report::{sort_by_size, AnalysisResult, DatabaseReport, GroupReport};

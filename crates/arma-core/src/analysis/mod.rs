/// Analysis module: key pattern grouping and the multi-database run.
///
/// - [`pattern`] maps keys to group labels and accumulates totals.
/// - [`orchestrator`] enumerates databases, runs one pipeline per database,
///   and collects the reports.
pub mod orchestrator;
pub mod pattern;

pub use orchestrator::{start_analysis, AnalysisHandle, AnalysisOutcome, Analyzer};
pub use pattern::{group_label, BatchTally, GroupTotals, PatternAggregator, WILDCARD};

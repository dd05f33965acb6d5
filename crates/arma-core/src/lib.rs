/// arma Core — scanning, aggregation, and report model.
///
/// This crate contains all analysis logic with zero terminal or rendering
/// dependencies. It is designed to be reusable across different frontends
/// (CLI, service, tests).
///
/// # Modules
///
/// - [`config`]: Explicit connection and analysis configuration values.
/// - [`error`]: Store and analysis error taxonomy.
/// - [`store`]: Key-value store seam, the Redis adapter, an in-memory store,
///   and keyspace enumeration.
/// - [`scanner`]: Cursor-based key scanning, the bounded worker pool, and the
///   per-database pipeline.
/// - [`analysis`]: Key pattern grouping and the multi-database orchestrator.
/// - [`model`]: Report types, ordering, and size formatting.
pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod scanner;
pub mod store;

pub use analysis::{start_analysis, AnalysisHandle, AnalysisOutcome, Analyzer};
pub use config::{AnalysisConfig, ConnectionConfig, ErrorPolicy};
pub use error::{AnalysisError, Stage, StoreError};
pub use model::{AnalysisResult, DatabaseReport, GroupReport};

/// arma CLI — command-line frontend for the analysis engine.
///
/// This crate owns everything terminal-facing: argument parsing, the
/// password prompt, progress bars and the report renderers. Scanning and
/// aggregation live in `arma-core`.
pub mod args;
pub mod output;
pub mod progress;
pub mod prompt;
pub mod run;

pub use args::{AnalyzeArgs, Cli, Command, OutputFormat};
pub use run::{analyze, analyze_with, execute, run};

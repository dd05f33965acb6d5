/// Command execution.
///
/// Wires parsed arguments to the analysis engine: resolves the password,
/// runs the analysis (with progress bars when attached to a terminal), logs
/// failures and totals, and writes the requested reports to stdout.
use crate::args::{AnalyzeArgs, Cli, Command};
use crate::output::write_reports;
use crate::progress::ProgressDisplay;
use crate::prompt;
use anyhow::{bail, Context, Result};
use arma_core::model::size::format_size;
use arma_core::store::{Connector, RedisConnector};
use arma_core::{start_analysis, AnalysisOutcome, AnalysisResult, Analyzer};
use std::io::{self, Write};
use tracing::info;

/// Run the parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Analyze(args) => analyze(&args),
    }
}

/// `arma analyze`: analyse a live Redis instance and print the reports.
pub fn analyze(args: &AnalyzeArgs) -> Result<()> {
    let password = if args.ask_password {
        Some(prompt::ask_password()?)
    } else {
        None
    };
    let connection = args.connection_config(password);
    info!("Connecting to {}", connection.address());

    let analyzer = Analyzer::new(args.analysis_config(), RedisConnector::new(connection))
        .context("invalid analysis settings")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    analyze_with(analyzer, args, &mut out)
}

/// Run `analyzer` and write its reports to `out`.
///
/// Under `--continue-on-error` the reports for the healthy databases are
/// written before the failures are turned into an error.
pub fn analyze_with<C>(analyzer: Analyzer<C>, args: &AnalyzeArgs, out: &mut dyn Write) -> Result<()>
where
    C: Connector + Send + 'static,
{
    let outcome = execute(analyzer, args.show_progress()).context("analysis failed")?;
    log_totals(&outcome.result);
    write_reports(out, &outcome.result, &args.format, args.min_size)
        .context("failed to write the report")?;

    if !outcome.is_complete() {
        bail!(
            "{} database(s) could not be analysed: {:?}",
            outcome.failures.len(),
            outcome.failures.keys().collect::<Vec<_>>()
        );
    }
    Ok(())
}

/// Run the analysis, on a background thread with live progress bars when
/// `show_progress` is set, inline otherwise.
pub fn execute<C>(analyzer: Analyzer<C>, show_progress: bool) -> Result<AnalysisOutcome>
where
    C: Connector + Send + 'static,
{
    if !show_progress {
        return Ok(analyzer.run()?);
    }

    let handle = start_analysis(analyzer).context("failed to start the analysis thread")?;
    let mut display = ProgressDisplay::new();
    // The channel disconnects when the analysis thread returns.
    for message in handle.progress_rx.iter() {
        display.handle(&message);
    }
    display.clear();
    Ok(handle.wait()?)
}

fn log_totals(result: &AnalysisResult) {
    for report in result.iter() {
        info!(
            "DB {} total size is: {} ({} keys in {} groups, {:.2?})",
            report.db,
            format_size(report.total_size()),
            report.total_count(),
            report.groups().len(),
            report.duration
        );
        if report.vanished_keys > 0 {
            info!(
                "DB {}: {} key(s) disappeared while being sized",
                report.db, report.vanished_keys
            );
        }
    }
    info!("Redis total size is: {}", format_size(result.total_size()));
}

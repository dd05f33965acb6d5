/// Analysis orchestrator: enumerates databases and runs one pipeline per
/// database, all in parallel, then assembles the final result.
///
/// Each pipeline runs on its own named thread (`arma-db-<id>`) with its own
/// connections. The orchestrator returns only after every pipeline thread has
/// been joined.
///
/// # Failure policy
///
/// - [`ErrorPolicy::Abort`]: the first failing pipeline raises a run-wide stop
///   flag; the others notice it at their next batch and bail out. The run
///   returns the failure with the lowest database id.
/// - [`ErrorPolicy::Continue`]: every pipeline runs to completion; failures
///   are listed in [`AnalysisOutcome::failures`] next to the databases that
///   did complete.
use crate::config::{AnalysisConfig, ErrorPolicy};
use crate::error::{AnalysisError, Stage};
use crate::model::{AnalysisResult, DatabaseReport};
use crate::scanner::pipeline::{open_store, scan_database};
use crate::scanner::progress::{ProgressSink, ScanProgress, PROGRESS_CHANNEL_CAPACITY};
use crate::store::{enumerate_databases, Connector, Database};
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{info, warn};

/// Database used for the keyspace summary connection.
const SUMMARY_DB: u32 = 0;

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct AnalysisOutcome {
    /// Reports for every database whose pipeline completed.
    pub result: AnalysisResult,
    /// Pipelines that failed, by database id. Only ever non-empty under
    /// [`ErrorPolicy::Continue`].
    pub failures: BTreeMap<u32, AnalysisError>,
}

impl AnalysisOutcome {
    /// `true` if every selected database produced a report.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs analyses against the store behind a [`Connector`].
pub struct Analyzer<C: Connector> {
    config: AnalysisConfig,
    connector: C,
}

impl<C: Connector> Analyzer<C> {
    /// Validate `config` and bind it to `connector`.
    pub fn new(config: AnalysisConfig, connector: C) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Enumerate the non-empty databases, ordered by id.
    ///
    /// Any failure here is fatal to the run: without the summary there is
    /// nothing to scan.
    pub fn databases(&self) -> Result<Vec<Database>, AnalysisError> {
        let mut store = open_store(&self.connector, SUMMARY_DB)?;
        enumerate_databases(&mut store).map_err(|source| AnalysisError::Connection {
            db: SUMMARY_DB,
            stage: Stage::KeyspaceSummary,
            source,
        })
    }

    /// Apply the single-database filter.
    fn select(&self, databases: Vec<Database>) -> Vec<Database> {
        match self.config.only_db {
            Some(only) => databases.into_iter().filter(|d| d.id == only).collect(),
            None => databases,
        }
    }

    /// Run the analysis without progress reporting.
    pub fn run(&self) -> Result<AnalysisOutcome, AnalysisError> {
        self.run_with_progress(&ProgressSink::none())
    }

    /// Run the analysis, reporting progress to `progress`.
    pub fn run_with_progress(
        &self,
        progress: &ProgressSink,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let start = Instant::now();
        info!("Starting memory analysis");
        info!("Reading databases...");
        let databases = self.databases()?;
        let selected = self.select(databases);
        if let Some(only) = self.config.only_db {
            if selected.is_empty() {
                warn!("db {only} is empty or does not exist; nothing to analyse");
            }
        }
        info!(
            "Analysing {} database(s): {:?}",
            selected.len(),
            selected.iter().map(|d| d.id).collect::<Vec<_>>()
        );
        progress.send(ScanProgress::Databases {
            selected: selected.clone(),
        });

        let stop = AtomicBool::new(false);
        let finished: Vec<(u32, Result<DatabaseReport, AnalysisError>)> = thread::scope(|scope| {
            let handles: Vec<_> = selected
                .iter()
                .map(|&database| {
                    let stop = &stop;
                    let handle = thread::Builder::new()
                        .name(format!("arma-db-{}", database.id))
                        .spawn_scoped(scope, move || self.run_pipeline(database, progress, stop));
                    (database.id, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(db, handle)| {
                    let outcome = match handle {
                        Ok(handle) => handle
                            .join()
                            .unwrap_or(Err(AnalysisError::WorkerPanicked { db })),
                        Err(source) => Err(AnalysisError::Spawn { db, source }),
                    };
                    (db, outcome)
                })
                .collect()
        });

        let mut outcome = AnalysisOutcome::default();
        for (db, finished) in finished {
            match finished {
                Ok(report) => outcome.result.insert(report),
                Err(err) => {
                    outcome.failures.insert(db, err);
                }
            }
        }

        info!(
            "Analysis finished in {:?}: {} database(s) reported, {} failed",
            start.elapsed(),
            outcome.result.len(),
            outcome.failures.len()
        );

        match self.config.error_policy {
            ErrorPolicy::Continue => Ok(outcome),
            ErrorPolicy::Abort => match first_root_cause(std::mem::take(&mut outcome.failures)) {
                Some(err) => Err(err),
                None => Ok(outcome),
            },
        }
    }

    fn run_pipeline(
        &self,
        database: Database,
        progress: &ProgressSink,
        stop: &AtomicBool,
    ) -> Result<DatabaseReport, AnalysisError> {
        let db = database.id;
        let result = scan_database(&self.connector, database, &self.config, progress, stop);
        match &result {
            Ok(report) => progress.send(ScanProgress::Complete {
                db,
                keys: report.total_count(),
                size: report.total_size(),
                duration: report.duration,
            }),
            Err(err) => {
                if !err.is_aborted() {
                    warn!("{err}");
                    if self.config.error_policy == ErrorPolicy::Abort {
                        stop.store(true, Ordering::SeqCst);
                    }
                }
                progress.send(ScanProgress::Failed {
                    db,
                    message: err.to_string(),
                });
            }
        }
        result
    }
}

/// The lowest-id failure that is not just a reaction to another failure.
fn first_root_cause(failures: BTreeMap<u32, AnalysisError>) -> Option<AnalysisError> {
    let mut fallback = None;
    for (_, err) in failures {
        if !err.is_aborted() {
            return Some(err);
        }
        fallback.get_or_insert(err);
    }
    fallback
}

/// Handle to an analysis running on a background thread.
pub struct AnalysisHandle {
    /// Progress messages from the run. The channel closes when the run ends.
    pub progress_rx: Receiver<ScanProgress>,
    thread: JoinHandle<Result<AnalysisOutcome, AnalysisError>>,
}

impl AnalysisHandle {
    /// `true` once the background thread has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to finish and return its outcome.
    ///
    /// Undrained progress messages are discarded.
    pub fn wait(self) -> Result<AnalysisOutcome, AnalysisError> {
        let Self {
            progress_rx,
            thread,
        } = self;
        drop(progress_rx);
        thread.join().unwrap_or(Err(AnalysisError::Panicked))
    }
}

/// Start `analyzer` on a background thread.
///
/// Returns an [`AnalysisHandle`] for receiving progress and collecting the
/// outcome.
pub fn start_analysis<C>(analyzer: Analyzer<C>) -> std::io::Result<AnalysisHandle>
where
    C: Connector + Send + 'static,
{
    let (progress_tx, progress_rx) =
        crossbeam_channel::bounded::<ScanProgress>(PROGRESS_CHANNEL_CAPACITY);

    let thread = thread::Builder::new()
        .name("arma-analysis".into())
        .spawn(move || analyzer.run_with_progress(&ProgressSink::new(progress_tx)))?;

    Ok(AnalysisHandle {
        progress_rx,
        thread,
    })
}

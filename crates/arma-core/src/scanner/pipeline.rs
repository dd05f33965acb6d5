/// Per-database pipeline: scan → size → aggregate → sort.
///
/// The calling thread owns the scan connection and walks the keyspace with a
/// [`KeyScanner`]. Every non-empty batch is handed to the [`WorkerPool`];
/// scanning carries on while earlier batches are still being sized, and only
/// blocks when all workers are busy.
///
/// Each worker lazily opens its own connection to the database on its first
/// batch, queries `MEMORY USAGE` for every key, folds the results into a
/// private [`BatchTally`], and merges that into the shared
/// [`PatternAggregator`] under one lock.
///
/// # Failure
///
/// The first error (scan, size query, or a worker's connection) is recorded
/// and raises a pipeline-local flag. The scan loop stops dispatching, idle
/// workers discard whatever is still queued, and once the pool has drained
/// the pipeline returns that error. No partial report is produced.
///
/// A run-wide `stop` flag is checked between batches as well; it is raised by
/// the orchestrator when another database failed under
/// [`ErrorPolicy::Abort`](crate::ErrorPolicy::Abort).
use crate::analysis::pattern::{BatchTally, PatternAggregator};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Stage};
use crate::model::DatabaseReport;
use crate::scanner::pool::WorkerPool;
use crate::scanner::progress::{ProgressSink, ScanProgress};
use crate::scanner::KeyScanner;
use crate::store::{Connector, Database, KeyValueStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Connect to `db` and validate the connection with `PING`.
pub fn open_store<C: Connector>(connector: &C, db: u32) -> Result<C::Store, AnalysisError> {
    let mut store = connector.connect(db).map_err(|source| AnalysisError::Connection {
        db,
        stage: Stage::Connect,
        source,
    })?;
    store.ping().map_err(|source| AnalysisError::Connection {
        db,
        stage: Stage::Ping,
        source,
    })?;
    Ok(store)
}

/// State shared by the scan loop and the workers of one pipeline.
struct PipelineState<'a> {
    db: u32,
    aggregator: PatternAggregator,
    failure: Mutex<Option<AnalysisError>>,
    failed: AtomicBool,
    stop: &'a AtomicBool,
    vanished: AtomicU64,
    progress: &'a ProgressSink,
}

impl PipelineState<'_> {
    /// Keep the first failure; later ones are consequences of it.
    fn fail(&self, err: AnalysisError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            debug!("db {}: pipeline failing: {err}", self.db);
            *slot = Some(err);
        }
        self.failed.store(true, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.failed.load(Ordering::SeqCst) || self.stop.load(Ordering::SeqCst)
    }
}

/// Run the full pipeline for one database and return its finalised report.
pub fn scan_database<C: Connector>(
    connector: &C,
    database: Database,
    config: &AnalysisConfig,
    progress: &ProgressSink,
    stop: &AtomicBool,
) -> Result<DatabaseReport, AnalysisError> {
    let start = Instant::now();
    let db = database.id;
    progress.send(ScanProgress::Started {
        db,
        approx_keys: database.approx_keys,
    });
    info!(
        "db {db}: scanning ~{} keys with {} workers",
        database.approx_keys, config.concurrency
    );

    let mut scan_store = open_store(connector, db)?;

    let state = PipelineState {
        db,
        aggregator: PatternAggregator::new(config.delimiter.clone(), config.level),
        failure: Mutex::new(None),
        failed: AtomicBool::new(false),
        stop,
        vanished: AtomicU64::new(0),
        progress,
    };

    let mut scanned_keys: u64 = 0;
    let mut batches: u64 = 0;

    thread::scope(|scope| {
        let pool = WorkerPool::spawn(scope, &format!("arma-db{db}-w"), config.concurrency, |_| {
            let state = &state;
            let mut store: Option<C::Store> = None;
            move |keys: Vec<Vec<u8>>| {
                if state.should_stop() {
                    return;
                }
                if let Err(err) = size_batch(connector, &mut store, state, &keys) {
                    state.fail(err);
                }
            }
        });
        let pool = match pool {
            Ok(pool) => pool,
            Err(source) => {
                state.fail(AnalysisError::Spawn { db, source });
                return;
            }
        };

        let mut scanner = KeyScanner::new(&mut scan_store, config.scan_count, database.approx_keys);
        while let Some(batch) = scanner.next() {
            if state.should_stop() {
                break;
            }
            match batch {
                Ok(keys) if keys.is_empty() => continue,
                Ok(keys) => {
                    scanned_keys += keys.len() as u64;
                    batches += 1;
                    if pool.dispatch(keys).is_err() {
                        state.fail(AnalysisError::WorkerPanicked { db });
                        break;
                    }
                }
                Err(source) => {
                    state.fail(AnalysisError::Scan {
                        db,
                        cursor: scanner.cursor(),
                        source,
                    });
                    break;
                }
            }
        }
        debug!(
            "db {db}: scan finished after {} pages, final batch target {}",
            scanner.pages(),
            scanner.batch_target()
        );

        // Barrier: every dispatched batch is done once this returns.
        if pool.join() > 0 {
            state.fail(AnalysisError::WorkerPanicked { db });
        }
    });

    let PipelineState {
        aggregator,
        failure,
        vanished,
        ..
    } = state;

    if let Some(err) = failure.into_inner() {
        return Err(err);
    }
    if stop.load(Ordering::SeqCst) {
        return Err(AnalysisError::Aborted { db });
    }

    let vanished = vanished.into_inner();
    let report = DatabaseReport::new(db, aggregator.into_groups(), vanished, start.elapsed());
    info!(
        "db {db}: {} keys in {} groups ({} batches, {} vanished) in {:?}",
        report.total_count(),
        report.groups().len(),
        batches,
        vanished,
        report.duration
    );
    debug_assert_eq!(report.total_count() + vanished, scanned_keys);
    Ok(report)
}

/// Size every key of one batch and merge the results into the aggregator.
fn size_batch<C: Connector>(
    connector: &C,
    store: &mut Option<C::Store>,
    state: &PipelineState<'_>,
    keys: &[Vec<u8>],
) -> Result<(), AnalysisError> {
    let db = state.db;
    let store = match store {
        Some(store) => store,
        None => store.insert(open_store(connector, db)?),
    };

    let mut tally = BatchTally::new();
    let mut vanished = 0;
    for key in keys {
        // Invalid UTF-8 becomes U+FFFD in the label; the query uses the raw bytes.
        let name = String::from_utf8_lossy(key);
        match store.memory_usage(key) {
            Ok(Some(bytes)) => tally.add(&state.aggregator.label_for(&name), bytes),
            Ok(None) => {
                trace!("db {db}: key {name:?} vanished before it could be sized");
                vanished += 1;
            }
            Err(source) => {
                return Err(AnalysisError::SizeQuery {
                    db,
                    key: name.into_owned(),
                    source,
                })
            }
        }
    }

    state.aggregator.absorb(tally);
    if vanished > 0 {
        state.vanished.fetch_add(vanished, Ordering::Relaxed);
    }
    state.progress.send(ScanProgress::KeysProcessed {
        db,
        keys: keys.len() as u64,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryConnector;
    use std::time::Duration;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            scan_count: 2,
            concurrency: 4,
            ..Default::default()
        }
    }

    fn database(connector: &MemoryConnector, id: u32) -> Database {
        let mut store = connector.connect(id).unwrap();
        crate::store::enumerate_databases(&mut store)
            .unwrap()
            .into_iter()
            .find(|d| d.id == id)
            .expect("database not in keyspace")
    }

    #[test]
    fn aggregates_keys_by_pattern() {
        let connector = MemoryConnector::new();
        connector
            .insert(0, "user:1", 100)
            .insert(0, "user:2", 200)
            .insert(0, "order:5", 50);
        let stop = AtomicBool::new(false);

        let report = scan_database(
            &connector,
            database(&connector, 0),
            &config(),
            &ProgressSink::none(),
            &stop,
        )
        .unwrap();

        let groups: Vec<(&str, u64, u64)> = report
            .groups()
            .iter()
            .map(|g| (g.label.as_str(), g.count, g.size))
            .collect();
        assert_eq!(groups, vec![("user:*", 2, 300), ("order:*", 1, 50)]);
    }

    #[test]
    fn totals_match_every_key_scanned() {
        let connector = MemoryConnector::new();
        let mut expected_size = 0;
        for i in 0..500u64 {
            let size = 10 + i % 7;
            expected_size += size;
            connector.insert(1, format!("tenant:{}:item:{i}", i % 5), size);
        }
        connector.add_holes(1, 100);
        let stop = AtomicBool::new(false);

        let report = scan_database(
            &connector,
            database(&connector, 1),
            &AnalysisConfig {
                level: 2,
                scan_count: 7,
                concurrency: 8,
                ..Default::default()
            },
            &ProgressSink::none(),
            &stop,
        )
        .unwrap();

        assert_eq!(report.total_count(), 500);
        assert_eq!(report.total_size(), expected_size);
        assert_eq!(report.groups().len(), 5);
        assert!(report.groups().windows(2).all(|w| w[0].size >= w[1].size));
    }

    #[test]
    fn worker_pool_limit_bounds_concurrent_size_queries() {
        let connector = MemoryConnector::new();
        for i in 0..60 {
            connector.insert(0, format!("k:{i}"), 1);
        }
        connector.set_latency(Duration::from_millis(2));
        let stop = AtomicBool::new(false);

        let report = scan_database(
            &connector,
            database(&connector, 0),
            &AnalysisConfig {
                scan_count: 1,
                concurrency: 3,
                ..Default::default()
            },
            &ProgressSink::none(),
            &stop,
        )
        .unwrap();

        assert_eq!(report.total_count(), 60);
        assert!(connector.peak_in_flight() <= 3, "peak {}", connector.peak_in_flight());
        // One scan connection plus at most one per worker.
        assert!(connector.connections(0) <= 1 + 1 + 3);
    }

    #[test]
    fn size_query_failure_fails_the_pipeline() {
        let connector = MemoryConnector::new();
        connector
            .insert(2, "ok:1", 1)
            .insert(2, "bad:1", 1)
            .fail_size_query(2, "bad:1");
        let stop = AtomicBool::new(false);

        let err = scan_database(
            &connector,
            database(&connector, 2),
            &config(),
            &ProgressSink::none(),
            &stop,
        )
        .unwrap_err();
        match err {
            AnalysisError::SizeQuery { db, key, .. } => {
                assert_eq!(db, 2);
                assert_eq!(key, "bad:1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn scan_failure_reports_cursor() {
        let connector = MemoryConnector::new();
        for i in 0..10 {
            connector.insert(0, format!("k:{i}"), 1);
        }
        connector.fail_scan_at(0, 2);
        let stop = AtomicBool::new(false);

        let err = scan_database(
            &connector,
            database(&connector, 0),
            &config(),
            &ProgressSink::none(),
            &stop,
        )
        .unwrap_err();
        assert!(
            matches!(err, AnalysisError::Scan { db: 0, cursor: 4, .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn connection_failure_is_reported_with_stage() {
        let connector = MemoryConnector::new();
        connector.insert(4, "a", 1).fail_connect(4);
        let stop = AtomicBool::new(false);

        let err = scan_database(
            &connector,
            Database {
                id: 4,
                approx_keys: 1,
            },
            &config(),
            &ProgressSink::none(),
            &stop,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Connection {
                db: 4,
                stage: Stage::Connect,
                ..
            }
        ));
    }

    #[test]
    fn vanished_keys_are_counted_separately() {
        let connector = MemoryConnector::new();
        connector
            .insert(0, "s:1", 10)
            .insert(0, "s:2", 20)
            .vanish(0, "s:2");
        let stop = AtomicBool::new(false);

        let report = scan_database(
            &connector,
            database(&connector, 0),
            &config(),
            &ProgressSink::none(),
            &stop,
        )
        .unwrap();
        assert_eq!(report.vanished_keys, 1);
        assert_eq!(report.total_count(), 1);
        assert_eq!(report.total_size(), 10);
    }

    #[test]
    fn binary_keys_are_sized_not_rejected() {
        let connector = MemoryConnector::new();
        connector
            .insert(0, "user:1", 5)
            .insert(0, vec![0xff, b':', 0x01], 7)
            .insert(0, vec![0xff, b':', 0x02], 9);
        let stop = AtomicBool::new(false);

        let report = scan_database(
            &connector,
            database(&connector, 0),
            &config(),
            &ProgressSink::none(),
            &stop,
        )
        .unwrap();

        let groups: Vec<(&str, u64, u64)> = report
            .groups()
            .iter()
            .map(|g| (g.label.as_str(), g.count, g.size))
            .collect();
        assert_eq!(groups, vec![("\u{fffd}:*", 2, 16), ("user:*", 1, 5)]);
    }

    #[test]
    fn raised_stop_flag_aborts_without_a_report() {
        let connector = MemoryConnector::new();
        connector.insert(0, "a:1", 1);
        let stop = AtomicBool::new(true);

        let err = scan_database(
            &connector,
            database(&connector, 0),
            &config(),
            &ProgressSink::none(),
            &stop,
        )
        .unwrap_err();
        assert!(err.is_aborted());
    }

    #[test]
    fn progress_messages_cover_the_lifecycle() {
        let connector = MemoryConnector::new();
        for i in 0..5 {
            connector.insert(0, format!("p:{i}"), 1);
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let stop = AtomicBool::new(false);

        scan_database(
            &connector,
            database(&connector, 0),
            &config(),
            &ProgressSink::new(tx),
            &stop,
        )
        .unwrap();

        let messages: Vec<ScanProgress> = rx.try_iter().collect();
        assert!(matches!(
            messages.first(),
            Some(ScanProgress::Started { db: 0, approx_keys: 5 })
        ));
        let processed: u64 = messages
            .iter()
            .filter_map(|m| match m {
                ScanProgress::KeysProcessed { keys, .. } => Some(*keys),
                _ => None,
            })
            .sum();
        assert_eq!(processed, 5);
    }
}

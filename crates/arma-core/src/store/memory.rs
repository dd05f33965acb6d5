/// In-process key-value store with Redis-like cursor semantics.
///
/// Each database is a slot table. [`MemoryConnector::insert`] appends a
/// live key; [`MemoryConnector::add_holes`] appends empty slots, which is how
/// a hash table looks after heavy deletion. A `SCAN` with `COUNT n` visits
/// the next `n` slots and returns whatever live keys it found there, so a
/// sparse table produces empty pages with a non-terminal cursor exactly like
/// a real server does.
///
/// Failures can be injected per database (connect, scan) or per key (memory
/// usage), and a gauge records the highest number of `MEMORY USAGE` requests
/// observed in flight at once. All state is shared between the connector and
/// the stores it opens.
use crate::error::StoreError;
use crate::store::{Connector, KeyValueStore, ScanPage, MATCH_ALL, TERMINAL_CURSOR};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryDatabase {
    /// `None` marks a deleted slot.
    slots: Vec<Option<Vec<u8>>>,
    footprints: HashMap<Vec<u8>, u64>,
    /// Keys still returned by `SCAN` whose footprint query answers nil.
    vanished: HashSet<Vec<u8>>,
    /// Keys whose footprint query fails.
    failing_keys: HashSet<Vec<u8>>,
    fail_connect: bool,
    /// Fail the `SCAN` request with this zero-based index.
    fail_scan_at: Option<usize>,
    scan_calls: usize,
    /// `COUNT` hints received, in request order.
    scan_counts: Vec<usize>,
    connections: usize,
}

#[derive(Debug, Default)]
struct Shared {
    databases: Mutex<BTreeMap<u32, MemoryDatabase>>,
    fail_summary: Mutex<bool>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    size_queries: AtomicU64,
}

/// Builder and inspector for an in-memory keyspace.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a live key with the given footprint. Keys need not be UTF-8.
    pub fn insert(&self, db: u32, key: impl Into<Vec<u8>>, footprint: u64) -> &Self {
        let key = key.into();
        let mut databases = self.shared.databases.lock();
        let database = databases.entry(db).or_default();
        database.slots.push(Some(key.clone()));
        database.footprints.insert(key, footprint);
        self
    }

    /// Append `count` deleted slots.
    pub fn add_holes(&self, db: u32, count: usize) -> &Self {
        let mut databases = self.shared.databases.lock();
        let database = databases.entry(db).or_default();
        let len = database.slots.len();
        database.slots.resize(len + count, None);
        self
    }

    /// Keep `key` visible to `SCAN` but answer its footprint query with nil,
    /// as if it expired between the two requests.
    pub fn vanish(&self, db: u32, key: impl AsRef<[u8]>) -> &Self {
        let mut databases = self.shared.databases.lock();
        databases
            .entry(db)
            .or_default()
            .vanished
            .insert(key.as_ref().to_vec());
        self
    }

    /// Make every connection attempt to `db` fail.
    pub fn fail_connect(&self, db: u32) -> &Self {
        self.shared.databases.lock().entry(db).or_default().fail_connect = true;
        self
    }

    /// Make the `SCAN` request with zero-based index `call` on `db` fail.
    pub fn fail_scan_at(&self, db: u32, call: usize) -> &Self {
        self.shared.databases.lock().entry(db).or_default().fail_scan_at = Some(call);
        self
    }

    /// Make the footprint query for `key` on `db` fail.
    pub fn fail_size_query(&self, db: u32, key: impl AsRef<[u8]>) -> &Self {
        self.shared
            .databases
            .lock()
            .entry(db)
            .or_default()
            .failing_keys
            .insert(key.as_ref().to_vec());
        self
    }

    /// Make `INFO keyspace` fail.
    pub fn fail_keyspace_summary(&self) -> &Self {
        *self.shared.fail_summary.lock() = true;
        self
    }

    /// Delay every footprint query, to widen concurrency windows in tests.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        *self.shared.latency.lock() = latency;
        self
    }

    /// Highest number of footprint queries observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Total footprint queries served.
    pub fn size_queries(&self) -> u64 {
        self.shared.size_queries.load(Ordering::SeqCst)
    }

    /// `COUNT` hints received by `db`, in request order.
    pub fn scan_counts(&self, db: u32) -> Vec<usize> {
        self.shared
            .databases
            .lock()
            .get(&db)
            .map(|d| d.scan_counts.clone())
            .unwrap_or_default()
    }

    /// Connections opened to `db` so far.
    pub fn connections(&self, db: u32) -> usize {
        self.shared
            .databases
            .lock()
            .get(&db)
            .map_or(0, |d| d.connections)
    }

    /// The `INFO keyspace` text this store answers with.
    pub fn render_keyspace(&self) -> String {
        let databases = self.shared.databases.lock();
        let mut out = String::from("# Keyspace\r\n");
        for (id, database) in databases.iter() {
            let keys = database.slots.iter().flatten().count();
            if keys > 0 {
                out.push_str(&format!("db{id}:keys={keys},expires=0,avg_ttl=0\r\n"));
            }
        }
        out
    }
}

impl Connector for MemoryConnector {
    type Store = MemoryStore;

    fn connect(&self, db: u32) -> Result<MemoryStore, StoreError> {
        let mut databases = self.shared.databases.lock();
        let database = databases.entry(db).or_default();
        if database.fail_connect {
            return Err(StoreError::Backend(format!(
                "connection to db {db} refused"
            )));
        }
        database.connections += 1;
        Ok(MemoryStore {
            connector: self.clone(),
            db,
        })
    }
}

/// A connection into one database of a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryStore {
    connector: MemoryConnector,
    db: u32,
}

impl KeyValueStore for MemoryStore {
    fn ping(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn keyspace_summary(&mut self) -> Result<String, StoreError> {
        if *self.connector.shared.fail_summary.lock() {
            return Err(StoreError::Backend("INFO is disabled".into()));
        }
        Ok(self.connector.render_keyspace())
    }

    fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, StoreError> {
        if pattern != MATCH_ALL {
            return Err(StoreError::Backend(format!(
                "unsupported MATCH pattern {pattern:?}"
            )));
        }
        let mut databases = self.connector.shared.databases.lock();
        let database = databases.entry(self.db).or_default();
        let call = database.scan_calls;
        database.scan_calls += 1;
        database.scan_counts.push(count);
        if database.fail_scan_at == Some(call) {
            return Err(StoreError::Backend(format!(
                "scan #{call} on db {} failed",
                self.db
            )));
        }

        let start = usize::try_from(cursor)
            .map_err(|_| StoreError::Backend(format!("invalid cursor {cursor}")))?;
        let end = start.saturating_add(count.max(1)).min(database.slots.len());
        let keys = database
            .slots
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .flatten()
            .cloned()
            .collect();
        let cursor = if end >= database.slots.len() {
            TERMINAL_CURSOR
        } else {
            end as u64
        };
        Ok(ScanPage { cursor, keys })
    }

    fn memory_usage(&mut self, key: &[u8]) -> Result<Option<u64>, StoreError> {
        let shared = &self.connector.shared;
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        shared.size_queries.fetch_add(1, Ordering::SeqCst);

        let latency = *shared.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let answer = {
            let databases = shared.databases.lock();
            match databases.get(&self.db) {
                Some(db) if db.failing_keys.contains(key) => Err(StoreError::Backend(format!(
                    "MEMORY USAGE {} failed",
                    String::from_utf8_lossy(key)
                ))),
                Some(db) if db.vanished.contains(key) => Ok(None),
                Some(db) => Ok(db.footprints.get(key).copied()),
                None => Ok(None),
            }
        };

        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }
}

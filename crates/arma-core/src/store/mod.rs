/// Store access: the seam between the analysis engine and the key-value
/// store it inspects.
///
/// The engine only ever talks to a [`KeyValueStore`] (one connection, bound
/// to one logical database) obtained from a [`Connector`]. Two
/// implementations ship with the crate:
/// - [`RedisConnector`]: synchronous `redis` client connections.
/// - [`MemoryConnector`]: an in-process keyspace with real cursor semantics.
pub mod keyspace;
pub mod memory;
pub mod redis_store;

pub use keyspace::{enumerate_databases, parse_keyspace, Database};
pub use memory::{MemoryConnector, MemoryStore};
pub use redis_store::{RedisConnector, RedisStore};

use crate::error::StoreError;

/// Cursor value that both starts and ends a `SCAN` iteration.
pub const TERMINAL_CURSOR: u64 = 0;

/// `MATCH` pattern that selects every key.
pub const MATCH_ALL: &str = "*";

/// One page of a cursor-based scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next request. [`TERMINAL_CURSOR`] means done.
    pub cursor: u64,
    /// Raw key names in this page. May be empty even when the cursor is not
    /// terminal.
    pub keys: Vec<Vec<u8>>,
}

/// A connection to one logical database.
///
/// Every method is a single blocking round-trip. Keys are binary-safe and
/// travel as raw bytes.
pub trait KeyValueStore: Send {
    /// Validate the connection.
    fn ping(&mut self) -> Result<(), StoreError>;

    /// Raw `INFO keyspace` text.
    fn keyspace_summary(&mut self) -> Result<String, StoreError>;

    /// Fetch the next page of keys matching `pattern`, visiting roughly
    /// `count` entries starting at `cursor`.
    fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, StoreError>;

    /// In-memory footprint of `key` in bytes, or `None` if the key no longer
    /// exists.
    fn memory_usage(&mut self, key: &[u8]) -> Result<Option<u64>, StoreError>;
}

/// Opens connections. Shared by reference across pipeline threads.
pub trait Connector: Sync {
    type Store: KeyValueStore;

    /// Open a fresh connection bound to database `db`.
    fn connect(&self, db: u32) -> Result<Self::Store, StoreError>;
}

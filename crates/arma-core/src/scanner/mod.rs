/// Scanner module: walks one database's keyspace and feeds the worker pool.
///
/// - [`KeyScanner`] pages through the keyspace with `SCAN`, growing its batch
///   size when a sparse table keeps answering with empty pages.
/// - [`pool::WorkerPool`] bounds how many batches are sized concurrently.
/// - [`pipeline::scan_database`] ties both to a [`PatternAggregator`](crate::analysis::PatternAggregator)
///   and produces the database's report.
/// - [`progress::ScanProgress`] carries lightweight status messages to the
///   frontend.
pub mod pipeline;
pub mod pool;
pub mod progress;

use crate::error::StoreError;
use crate::store::{KeyValueStore, MATCH_ALL, TERMINAL_CURSOR};
use std::iter::FusedIterator;
use tracing::trace;

/// Lazy, finite, non-restartable sequence of key batches from one database.
///
/// Each call to `next` issues one `SCAN`. The sequence ends after the page
/// that comes back with the terminal cursor, even if that is the very first
/// page. After an error the scanner yields nothing further.
///
/// # Adaptive batch size
///
/// Redis' `COUNT` is a hint for how many hash-table slots to visit, not how
/// many keys to return. On a keyspace with many deleted entries a small
/// `COUNT` keeps returning empty pages. When a page is empty, the cursor is
/// not terminal, and the batch target is still below the database's
/// approximate key count, the target grows by half for the next request. It
/// never shrinks.
pub struct KeyScanner<'a, S: KeyValueStore + ?Sized> {
    store: &'a mut S,
    pattern: &'a str,
    cursor: u64,
    batch_target: usize,
    approx_keys: u64,
    pages: u64,
    finished: bool,
}

impl<'a, S: KeyValueStore + ?Sized> KeyScanner<'a, S> {
    /// Scan every key, starting with `batch_target` keys per request.
    pub fn new(store: &'a mut S, batch_target: usize, approx_keys: u64) -> Self {
        Self::with_pattern(store, MATCH_ALL, batch_target, approx_keys)
    }

    /// Scan keys matching `pattern`.
    pub fn with_pattern(
        store: &'a mut S,
        pattern: &'a str,
        batch_target: usize,
        approx_keys: u64,
    ) -> Self {
        Self {
            store,
            pattern,
            cursor: TERMINAL_CURSOR,
            batch_target: batch_target.max(1),
            approx_keys,
            pages: 0,
            finished: false,
        }
    }

    /// Cursor the next request will use. After an error this is the cursor
    /// of the request that failed.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// `COUNT` hint the next request will use.
    pub fn batch_target(&self) -> usize {
        self.batch_target
    }

    /// Requests issued so far.
    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn grow_batch_target(&mut self) {
        let grown = self.batch_target + (self.batch_target / 2).max(1);
        trace!(
            "Empty page at cursor {}: batch target {} -> {}",
            self.cursor,
            self.batch_target,
            grown
        );
        self.batch_target = grown;
    }
}

impl<S: KeyValueStore + ?Sized> Iterator for KeyScanner<'_, S> {
    type Item = Result<Vec<Vec<u8>>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let page = match self.store.scan(self.cursor, self.pattern, self.batch_target) {
            Ok(page) => page,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };
        self.pages += 1;
        self.cursor = page.cursor;

        if page.cursor == TERMINAL_CURSOR {
            self.finished = true;
        } else if page.keys.is_empty() && (self.batch_target as u64) < self.approx_keys {
            self.grow_batch_target();
        }

        Some(Ok(page.keys))
    }
}

impl<S: KeyValueStore + ?Sized> FusedIterator for KeyScanner<'_, S> {}

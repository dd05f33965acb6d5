/// Key pattern grouping: maps key names to group labels and accumulates
/// count/size totals per label.
///
/// # Concurrency
///
/// The label → totals map is the only state shared between the workers of a
/// database. It sits behind one `parking_lot::Mutex`, and every update is a
/// read-modify-write performed while that lock is held, so two workers
/// updating the same label can never lose an increment.
///
/// Workers do not take the lock per key. Each worker folds its batch into a
/// private [`BatchTally`] first and merges it with [`PatternAggregator::absorb`]
/// under a single lock acquisition. A 500-key batch costs one lock cycle
/// instead of 500.
use crate::model::GroupReport;
use compact_str::CompactString;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;

/// Marker appended to truncated labels.
pub const WILDCARD: &str = "*";

/// Compute the group label for `key`.
///
/// The key is split on `delimiter`. If it has more than `level` segments, the
/// label is the first `level` segments, the delimiter, and `*`
/// (`user:42:cart` at level 1 → `user:*`). Otherwise the key is its own label.
pub fn group_label<'k>(key: &'k str, delimiter: &str, level: usize) -> Cow<'k, str> {
    if delimiter.is_empty() {
        return Cow::Borrowed(key);
    }
    // The level-th delimiter exists exactly when the key has more than
    // `level` segments.
    let cut = match level.checked_sub(1) {
        Some(nth) => key.match_indices(delimiter).nth(nth).map(|(at, _)| at),
        None => key.contains(delimiter).then_some(0),
    };
    match cut {
        Some(end) => Cow::Owned(format!("{}{delimiter}{WILDCARD}", &key[..end])),
        None => Cow::Borrowed(key),
    }
}

/// Running totals for one label.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GroupTotals {
    pub count: u64,
    pub size: u64,
}

impl GroupTotals {
    #[inline]
    fn add(&mut self, count: u64, size: u64) {
        self.count += count;
        self.size += size;
    }
}

/// Worker-local totals for one batch, merged into the shared aggregator in
/// one step.
#[derive(Debug, Default)]
pub struct BatchTally {
    groups: HashMap<CompactString, GroupTotals>,
}

impl BatchTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one key's footprint into `label`.
    pub fn add(&mut self, label: &str, size: u64) {
        match self.groups.get_mut(label) {
            Some(totals) => totals.add(1, size),
            None => {
                self.groups
                    .insert(CompactString::new(label), GroupTotals { count: 1, size });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Shared per-database aggregation.
#[derive(Debug)]
pub struct PatternAggregator {
    delimiter: String,
    level: usize,
    groups: Mutex<HashMap<CompactString, GroupTotals>>,
}

impl PatternAggregator {
    pub fn new(delimiter: impl Into<String>, level: usize) -> Self {
        Self {
            delimiter: delimiter.into(),
            level,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Label `key` with this aggregator's delimiter and level.
    pub fn label_for<'k>(&self, key: &'k str) -> Cow<'k, str> {
        group_label(key, &self.delimiter, self.level)
    }

    /// Fold a single key into the totals.
    #[cfg(test)]
    fn record(&self, key: &str, size: u64) {
        let label = self.label_for(key);
        let mut groups = self.groups.lock();
        match groups.get_mut(label.as_ref()) {
            Some(totals) => totals.add(1, size),
            None => {
                groups.insert(CompactString::new(&label), GroupTotals { count: 1, size });
            }
        }
    }

    /// Merge a worker's batch tally. The lock is held for the whole merge.
    pub fn absorb(&self, tally: BatchTally) {
        if tally.is_empty() {
            return;
        }
        let mut groups = self.groups.lock();
        for (label, totals) in tally.groups {
            groups.entry(label).or_default().add(totals.count, totals.size);
        }
    }

    #[cfg(test)]
    fn totals(&self, label: &str) -> Option<GroupTotals> {
        self.groups.lock().get(label).copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.groups.lock().len()
    }

    /// Consume the aggregator and emit its groups, unordered.
    ///
    /// Taking `self` by value guarantees no worker can still be writing.
    pub fn into_groups(self) -> Vec<GroupReport> {
        self.groups
            .into_inner()
            .into_iter()
            .map(|(label, totals)| GroupReport {
                label,
                count: totals.count,
                size: totals.size,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    // ── group_label ──────────────────────────────────────────────────────

    #[test]
    fn first_segment_gets_wildcard() {
        assert_eq!(group_label("user:1", ":", 1), "user:*");
    }

    #[test]
    fn key_without_delimiter_is_unchanged() {
        assert_eq!(group_label("singleword", ":", 1), "singleword");
        assert_eq!(group_label("singleword", "-", 3), "singleword");
    }

    #[test]
    fn level_beyond_segments_keeps_key() {
        assert_eq!(group_label("a:b:c", ":", 5), "a:b:c");
        // Three segments, level three: nothing left to wildcard.
        assert_eq!(group_label("a:b:c", ":", 3), "a:b:c");
    }

    #[test]
    fn deeper_levels_keep_more_segments() {
        assert_eq!(group_label("a:b:c", ":", 2), "a:b:*");
        assert_eq!(group_label("session-eu-42", "-", 2), "session-eu-*");
    }

    #[test]
    fn multi_character_delimiters() {
        assert_eq!(group_label("tenant::7::cart", "::", 1), "tenant::*");
        assert_eq!(group_label("tenant::7::cart", "::", 2), "tenant::7::*");
    }

    #[test]
    fn empty_segments_count_as_segments() {
        assert_eq!(group_label(":leading", ":", 1), ":*");
        assert_eq!(group_label("trailing:", ":", 1), "trailing:*");
    }

    #[test]
    fn unchanged_labels_borrow_the_key() {
        assert!(matches!(group_label("plain", ":", 1), Cow::Borrowed(_)));
    }

    // ── PatternAggregator ────────────────────────────────────────────────

    #[test]
    fn record_accumulates_per_label() {
        let agg = PatternAggregator::new(":", 1);
        agg.record("user:1", 100);
        agg.record("user:2", 200);
        agg.record("order:5", 50);

        assert_eq!(agg.totals("user:*"), Some(GroupTotals { count: 2, size: 300 }));
        assert_eq!(agg.totals("order:*"), Some(GroupTotals { count: 1, size: 50 }));
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn absorb_merges_batch_tallies() {
        let agg = PatternAggregator::new(":", 1);
        let mut first = BatchTally::new();
        first.add("user:*", 10);
        first.add("user:*", 20);
        let mut second = BatchTally::new();
        second.add("user:*", 5);
        second.add("cart:*", 7);
        assert!(!first.is_empty());

        agg.absorb(first);
        agg.absorb(second);
        agg.absorb(BatchTally::new());

        assert_eq!(agg.totals("user:*"), Some(GroupTotals { count: 3, size: 35 }));
        assert_eq!(agg.totals("cart:*"), Some(GroupTotals { count: 1, size: 7 }));
    }

    /// Many threads hammering the same label must not lose a single update.
    #[test]
    fn concurrent_updates_are_not_lost() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 5_000;

        let agg = PatternAggregator::new(":", 1);
        thread::scope(|s| {
            for t in 0..THREADS {
                let agg = &agg;
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        if i % 2 == 0 {
                            agg.record(&format!("hot:{t}:{i}"), 3);
                        } else {
                            let mut tally = BatchTally::new();
                            tally.add("hot:*", 3);
                            agg.absorb(tally);
                        }
                    }
                });
            }
        });

        let totals = agg.totals("hot:*").expect("label missing");
        assert_eq!(totals.count, THREADS * PER_THREAD);
        assert_eq!(totals.size, THREADS * PER_THREAD * 3);
    }

    #[test]
    fn into_groups_emits_every_label() {
        let agg = PatternAggregator::new("-", 1);
        agg.record("a-1", 1);
        agg.record("b-1", 2);
        agg.record("loner", 3);
        let mut labels: Vec<String> = agg
            .into_groups()
            .into_iter()
            .map(|g| g.label.to_string())
            .collect();
        labels.sort();
        assert_eq!(labels, vec!["a-*", "b-*", "loner"]);
    }
}

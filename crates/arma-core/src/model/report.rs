/// Report types produced by an analysis run.
///
/// A [`DatabaseReport`] is only ever built from a finished aggregation, so
/// its groups are always in their final order: size descending, ties broken
/// by label so that two runs over the same keyspace print identically.
use compact_str::CompactString;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Totals for one key pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    /// Pattern label, e.g. `user:*`, or the key itself when it has no
    /// delimiter to group on.
    #[serde(rename = "key")]
    pub label: CompactString,
    /// Number of keys folded into this group.
    pub count: u64,
    /// Sum of the keys' footprints in bytes.
    pub size: u64,
}

/// Order groups by size descending, then label ascending.
pub fn sort_by_size(groups: &mut [GroupReport]) {
    groups.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.label.cmp(&b.label)));
}

/// Finalised results for one database.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseReport {
    pub db: u32,
    groups: Vec<GroupReport>,
    /// Keys returned by `SCAN` that were gone by the time their footprint was
    /// queried. They are not part of any group.
    pub vanished_keys: u64,
    /// Wall-clock time of the database pipeline.
    #[serde(skip)]
    pub duration: Duration,
}

impl DatabaseReport {
    /// Freeze a set of groups into a report, sorting them.
    pub fn new(db: u32, mut groups: Vec<GroupReport>, vanished_keys: u64, duration: Duration) -> Self {
        sort_by_size(&mut groups);
        Self {
            db,
            groups,
            vanished_keys,
            duration,
        }
    }

    /// Groups, largest first.
    pub fn groups(&self) -> &[GroupReport] {
        &self.groups
    }

    /// Groups at or above `min_size` bytes, largest first.
    pub fn groups_at_least(&self, min_size: u64) -> impl Iterator<Item = &GroupReport> {
        // Sorted descending, so the visible groups are a prefix.
        self.groups.iter().take_while(move |g| g.size >= min_size)
    }

    /// Number of keys across all groups.
    pub fn total_count(&self) -> u64 {
        self.groups.iter().map(|g| g.count).sum()
    }

    /// Bytes across all groups.
    pub fn total_size(&self) -> u64 {
        self.groups.iter().map(|g| g.size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Reports for every database that completed, keyed and ordered by id.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    databases: BTreeMap<u32, DatabaseReport>,
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, report: DatabaseReport) {
        self.databases.insert(report.db, report);
    }

    pub fn get(&self, db: u32) -> Option<&DatabaseReport> {
        self.databases.get(&db)
    }

    /// Reports in ascending database order.
    pub fn iter(&self) -> impl Iterator<Item = &DatabaseReport> {
        self.databases.values()
    }

    pub fn databases(&self) -> impl Iterator<Item = u32> + '_ {
        self.databases.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    /// Keys across all databases.
    pub fn total_count(&self) -> u64 {
        self.iter().map(DatabaseReport::total_count).sum()
    }

    /// Bytes across all databases.
    pub fn total_size(&self) -> u64 {
        self.iter().map(DatabaseReport::total_size).sum()
    }
}

impl FromIterator<DatabaseReport> for AnalysisResult {
    fn from_iter<I: IntoIterator<Item = DatabaseReport>>(iter: I) -> Self {
        let mut result = Self::new();
        for report in iter {
            result.insert(report);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(label: &str, count: u64, size: u64) -> GroupReport {
        GroupReport {
            label: CompactString::new(label),
            count,
            size,
        }
    }

    #[test]
    fn report_is_sorted_by_size_descending() {
        let report = DatabaseReport::new(
            0,
            vec![group("a:*", 1, 10), group("b:*", 4, 400), group("c:*", 2, 50)],
            0,
            Duration::ZERO,
        );
        let sizes: Vec<u64> = report.groups().iter().map(|g| g.size).collect();
        assert_eq!(sizes, vec![400, 50, 10]);
        assert!(report.groups().windows(2).all(|w| w[0].size >= w[1].size));
    }

    /// Equal sizes fall back to label order so the output is reproducible.
    #[test]
    fn ties_are_broken_by_label() {
        let report = DatabaseReport::new(
            0,
            vec![group("zeta", 1, 5), group("alpha", 1, 5), group("mid", 1, 5)],
            0,
            Duration::ZERO,
        );
        let labels: Vec<&str> = report.groups().iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn totals_include_every_group() {
        let report = DatabaseReport::new(
            2,
            vec![group("x", 3, 300), group("y", 1, 1)],
            0,
            Duration::ZERO,
        );
        assert_eq!(report.total_count(), 4);
        assert_eq!(report.total_size(), 301);
        let visible: Vec<_> = report.groups_at_least(100).collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].label.as_str(), "x");
    }

    #[test]
    fn result_orders_databases_and_sums_totals() {
        let result: AnalysisResult = [
            DatabaseReport::new(5, vec![group("a", 1, 10)], 0, Duration::ZERO),
            DatabaseReport::new(1, vec![group("b", 2, 20)], 0, Duration::ZERO),
        ]
        .into_iter()
        .collect();
        assert_eq!(result.databases().collect::<Vec<_>>(), vec![1, 5]);
        assert_eq!(result.total_count(), 3);
        assert_eq!(result.total_size(), 30);
        assert!(result.get(3).is_none());
    }
}

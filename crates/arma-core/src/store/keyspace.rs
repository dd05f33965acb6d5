/// Database enumeration from the server's keyspace summary.
///
/// `INFO keyspace` answers with one line per non-empty database:
///
/// ```text
/// # Keyspace
/// db0:keys=1204,expires=12,avg_ttl=360000
/// db3:keys=7,expires=0,avg_ttl=0
/// ```
///
/// Entries that do not parse are skipped rather than failing the run; the
/// key count is only a heuristic for the scanner anyway.
use crate::error::StoreError;
use crate::store::KeyValueStore;
use std::collections::BTreeMap;
use tracing::debug;

/// A logical database discovered in the keyspace summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Database {
    pub id: u32,
    /// Key count reported by the server when the run started. Not
    /// authoritative: keys may be added or expire while the scan runs.
    pub approx_keys: u64,
}

/// Parse a keyspace summary into databases ordered by id.
///
/// Section headers, blank segments, malformed entries, and databases that
/// report zero keys are dropped.
pub fn parse_keyspace(summary: &str) -> Vec<Database> {
    let mut databases: BTreeMap<u32, u64> = BTreeMap::new();

    for entry in summary.split(['\r', '\n']) {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        match parse_entry(entry) {
            Some(db) if db.approx_keys > 0 => {
                databases.insert(db.id, db.approx_keys);
            }
            Some(db) => debug!("Skipping db{}: reports zero keys", db.id),
            None => debug!("Skipping malformed keyspace entry {entry:?}"),
        }
    }

    databases
        .into_iter()
        .map(|(id, approx_keys)| Database { id, approx_keys })
        .collect()
}

/// `db<N>:keys=<K>,...` → `Database`.
fn parse_entry(entry: &str) -> Option<Database> {
    let (name, fields) = entry.split_once(':')?;
    let id = name.trim().strip_prefix("db")?.parse().ok()?;
    let approx_keys = fields
        .split(',')
        .find_map(|field| field.trim().strip_prefix("keys="))?
        .parse()
        .ok()?;
    Some(Database { id, approx_keys })
}

/// Ask the store for its keyspace summary and parse it.
pub fn enumerate_databases<S: KeyValueStore + ?Sized>(
    store: &mut S,
) -> Result<Vec<Database>, StoreError> {
    let summary = store.keyspace_summary()?;
    Ok(parse_keyspace(&summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(id: u32, approx_keys: u64) -> Database {
        Database { id, approx_keys }
    }

    #[test]
    fn parses_redis_info_output() {
        let info = "# Keyspace\r\ndb0:keys=1204,expires=12,avg_ttl=360000\r\ndb3:keys=7,expires=0,avg_ttl=0\r\n";
        assert_eq!(parse_keyspace(info), vec![db(0, 1204), db(3, 7)]);
    }

    #[test]
    fn databases_are_ordered_by_id() {
        let info = "db5:keys=1,expires=0,avg_ttl=0\ndb1:keys=2,expires=0,avg_ttl=0\n";
        assert_eq!(parse_keyspace(info), vec![db(1, 2), db(5, 1)]);
    }

    #[test]
    fn zero_key_databases_are_excluded() {
        let info = "db0:keys=0,expires=0,avg_ttl=0\r\ndb2:keys=9,expires=0,avg_ttl=0\r\n";
        assert_eq!(parse_keyspace(info), vec![db(2, 9)]);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let info = concat!(
            "\r\n",
            "garbage\r\n",
            "dbX:keys=4,expires=0\r\n",
            "db1:expires=0,avg_ttl=0\r\n",
            "db2:keys=abc,expires=0\r\n",
            "db4:keys=-3,expires=0\r\n",
            "db6:keys=11,expires=0,avg_ttl=0,subexpiry=0\r\n",
        );
        assert_eq!(parse_keyspace(info), vec![db(6, 11)]);
    }

    #[test]
    fn empty_summary_yields_no_databases() {
        assert!(parse_keyspace("").is_empty());
        assert!(parse_keyspace("# Keyspace\r\n").is_empty());
    }
}

// Parsed-table cache.
//
// Entries are keyed by source identity (path + header offset) and carry the
// SHA-256 of the bytes they were parsed from. A lookup always re-reads the
// file; a changed fingerprint replaces the entry.
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::columns::AliasTable;
use crate::error::Result;
use crate::loader::{parse_actuals, parse_plan, read_source, LoadReport};
use crate::types::{ActualsTable, PlanTable};

/// `"sha256:<64 hex>"` of the raw source bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256:{:x}", digest)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub path: PathBuf,
    pub header_row: usize,
}

impl SourceKey {
    pub fn new(path: &Path, header_row: usize) -> Self {
        // Fall back to the given path when it cannot be canonicalized; the
        // read that follows reports the real error.
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Self { path, header_row }
    }
}

#[derive(Debug)]
struct CacheEntry<T> {
    fingerprint: String,
    table: Arc<T>,
    report: LoadReport,
}

/// A table handed out by the cache.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub table: Arc<T>,
    pub report: LoadReport,
    pub fingerprint: String,
    /// `true` when the table came from the cache without re-parsing.
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug)]
pub struct TableCache {
    aliases: AliasTable,
    plans: HashMap<SourceKey, CacheEntry<PlanTable>>,
    actuals: HashMap<SourceKey, CacheEntry<ActualsTable>>,
    stats: CacheStats,
}

impl TableCache {
    /// Tables are parsed with `aliases`; changing aliases needs a new cache.
    pub fn new(aliases: AliasTable) -> Self {
        Self {
            aliases,
            plans: HashMap::new(),
            actuals: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn plan(&mut self, path: &Path, header_row: usize) -> Result<Loaded<PlanTable>> {
        let bytes = read_source(path)?;
        let key = SourceKey::new(path, header_row);
        let aliases = &self.aliases;
        lookup(&mut self.plans, &mut self.stats, key, &bytes, |origin, bytes| {
            parse_plan(origin, bytes, header_row, aliases)
        })
    }

    pub fn actuals(&mut self, path: &Path, header_row: usize) -> Result<Loaded<ActualsTable>> {
        let bytes = read_source(path)?;
        let key = SourceKey::new(path, header_row);
        let aliases = &self.aliases;
        lookup(&mut self.actuals, &mut self.stats, key, &bytes, |origin, bytes| {
            parse_actuals(origin, bytes, header_row, aliases)
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.plans.len() + self.actuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.plans.clear();
        self.actuals.clear();
    }
}

fn lookup<T, F>(
    entries: &mut HashMap<SourceKey, CacheEntry<T>>,
    stats: &mut CacheStats,
    key: SourceKey,
    bytes: &[u8],
    parse: F,
) -> Result<Loaded<T>>
where
    F: FnOnce(&str, &[u8]) -> Result<(T, LoadReport)>,
{
    let fp = fingerprint(bytes);
    if let Some(entry) = entries.get(&key) {
        if entry.fingerprint == fp {
            stats.hits += 1;
            debug!(path = %key.path.display(), fingerprint = %fp, "cache hit");
            return Ok(Loaded {
                table: Arc::clone(&entry.table),
                report: entry.report.clone(),
                fingerprint: fp,
                from_cache: true,
            });
        }
        debug!(path = %key.path.display(), "source changed, re-parsing");
    }

    stats.misses += 1;
    let origin = key.path.display().to_string();
    let (table, report) = parse(&origin, bytes)?;
    let table = Arc::new(table);
    entries.insert(
        key,
        CacheEntry {
            fingerprint: fp.clone(),
            table: Arc::clone(&table),
            report: report.clone(),
        },
    );
    Ok(Loaded {
        table,
        report,
        fingerprint: fp,
        from_cache: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert!(fingerprint(b"").starts_with("sha256:"));
    }

    #[test]
    fn identical_content_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "date,actual\n2024-01-01,1\n");
        let mut cache = TableCache::new(AliasTable::default());

        let first = cache.actuals(&path, 0).unwrap();
        let second = cache.actuals(&path, 0).unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert!(Arc::ptr_eq(&first.table, &second.table));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn changed_content_invalidates_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "date,actual\n2024-01-01,1\n");
        let mut cache = TableCache::new(AliasTable::default());
        let first = cache.actuals(&path, 0).unwrap();

        write_file(dir.path(), "a.csv", "date,actual\n2024-01-01,2\n");
        let second = cache.actuals(&path, 0).unwrap();
        assert!(!second.from_cache);
        assert_ne!(first.fingerprint, second.fingerprint);
        assert_eq!(second.table.records[0].actual_volume, Some(2.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn header_offset_is_part_of_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "p.csv", "title\nyear,month,day,plan\n2024,1,1,5\n");
        let mut cache = TableCache::new(AliasTable::default());
        assert!(cache.plan(&path, 0).is_err());
        let loaded = cache.plan(&path, 1).unwrap();
        assert!(!loaded.from_cache);
        assert_eq!(loaded.table.records.len(), 1);
    }
}

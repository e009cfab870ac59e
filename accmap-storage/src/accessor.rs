//! Read-only accessor.
//!
//! Opens a merged store read-only, resolves classification names to column
//! slots once, and serves single and batched lookups.
//!
//! # Absence
//!
//! `0` means "no mapping". [`MappingStore::get`] never fails: a backend
//! error is logged, counted in [`LookupStats::failed_lookups`], and reported
//! as `0`. [`MappingStore::get_many`] propagates backend errors and leaves
//! unknown accessions out of its result.
//!
//! # Example
//!
//! ```ignore
//! let store = MappingStore::open("mappings.db", &["Taxonomy", "KEGG"], StoreConfig::default())?;
//! let taxon = store.get("Taxonomy", "WP_000001");
//! let rows = store.get_many(&accessions, accessions.len())?;
//! let kegg = store.column_index("KEGG").map(|i| rows["WP_000001"][i]);
//! ```

use crate::catalog::MetadataCatalog;
use crate::schema::{
    quote_ident, sqlite_err, table_columns, table_exists, INFO_TABLE, MAPPINGS_TABLE,
};
use accmap_core::{
    AccmapResult, OpenError, StoreConfig, ValueFilter, ABSENT, ACCESSION_COLUMN,
};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Which classifications a handle resolves at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    All,
    Named(Vec<String>),
}

/// A resolved classification column.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedColumn {
    /// Physical column name
    column: String,
    /// Position in `get_many` rows
    slot: usize,
}

/// Lookup counters for one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LookupStats {
    pub lookups: u64,
    pub batched_lookups: u64,
    /// Single lookups that hit a backend error and returned 0
    pub failed_lookups: u64,
}

/// Read-only handle on a merged store.
#[derive(Debug)]
pub struct MappingStore {
    conn: Connection,
    path: PathBuf,
    config: StoreConfig,
    selection: Selection,
    /// Classification columns in table order, excluding the accession key
    value_columns: Vec<String>,
    resolved: HashMap<String, ResolvedColumn>,
    lookups: AtomicU64,
    batched_lookups: AtomicU64,
    failed_lookups: AtomicU64,
}

impl MappingStore {
    /// Open a store, resolving the named classifications. Names the store
    /// does not carry resolve to no column rather than failing the open.
    pub fn open<S: AsRef<str>>(
        path: impl AsRef<Path>,
        classifications: &[S],
        config: StoreConfig,
    ) -> AccmapResult<Self> {
        let names = classifications
            .iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        Self::open_with(path.as_ref(), Selection::Named(names), config)
    }

    /// Open a store, resolving every classification it carries.
    pub fn open_all(path: impl AsRef<Path>, config: StoreConfig) -> AccmapResult<Self> {
        Self::open_with(path.as_ref(), Selection::All, config)
    }

    fn open_with(path: &Path, selection: Selection, config: StoreConfig) -> AccmapResult<Self> {
        config.validate()?;
        let conn = connect(path, &config)?;
        let value_columns = value_columns(&conn)?;
        let resolved = resolve(&value_columns, &selection);

        tracing::info!(
            path = %path.display(),
            columns = value_columns.len(),
            resolved = resolved.len(),
            "Opened store for reading"
        );

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            config,
            selection,
            value_columns,
            resolved,
            lookups: AtomicU64::new(0),
            batched_lookups: AtomicU64::new(0),
            failed_lookups: AtomicU64::new(0),
        })
    }

    /// Reopen the file and recompute the column index map, picking up a
    /// store that was rebuilt since this handle was opened.
    pub fn reopen(&mut self) -> AccmapResult<()> {
        let conn = connect(&self.path, &self.config)?;
        let value_columns = value_columns(&conn)?;
        self.resolved = resolve(&value_columns, &self.selection);
        self.value_columns = value_columns;
        self.conn = conn;
        tracing::debug!(path = %self.path.display(), "Reopened store");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Slot of a classification in `get_many` rows, or `None` when the
    /// classification was not requested or is not in the store.
    pub fn column_index(&self, classification: &str) -> Option<usize> {
        self.resolved_column(classification).map(|c| c.slot)
    }

    /// Resolved column for a name in any ASCII case. The caller's spelling
    /// at open time hits the map directly; other spellings fall back to a scan.
    fn resolved_column(&self, classification: &str) -> Option<&ResolvedColumn> {
        self.resolved.get(classification).or_else(|| {
            self.resolved
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(classification))
                .map(|(_, resolved)| resolved)
        })
    }

    /// Length of every `get_many` row.
    pub fn num_columns(&self) -> usize {
        self.value_columns.len()
    }

    /// Classification columns in slot order.
    pub fn column_names(&self) -> &[String] {
        &self.value_columns
    }

    fn filtered(filter: &ValueFilter, raw: Option<i64>) -> i64 {
        match raw {
            None | Some(ABSENT) => ABSENT,
            Some(value) => filter.apply(value),
        }
    }

    /// Value of `accession` under `classification`, or `0` when there is no
    /// mapping, the classification is unresolved, or the lookup failed.
    pub fn get(&self, classification: &str, accession: &str) -> i64 {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let Some(resolved) = self.resolved_column(classification) else {
            return ABSENT;
        };

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            quote_ident(&resolved.column),
            quote_ident(MAPPINGS_TABLE),
            quote_ident(ACCESSION_COLUMN)
        );
        let raw = self.conn.prepare_cached(&sql).and_then(|mut stmt| {
            stmt.query_row(params![accession], |row| row.get::<_, Option<i64>>(0))
                .optional()
        });

        match raw {
            Ok(value) => Self::filtered(&self.config.value_filter, value.flatten()),
            Err(e) => {
                self.failed_lookups.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    classification,
                    accession,
                    "Lookup failed, returning absent"
                );
                ABSENT
            }
        }
    }

    /// Full rows for the first `count` accessions, keyed by accession.
    ///
    /// Each row holds one value per classification column in slot order,
    /// 0-filled for absent values. Accessions the store does not know are
    /// left out. Accessions are bound in chunks of `max_batch_size`, one
    /// `IN (...)` query per chunk.
    pub fn get_many<S: AsRef<str>>(
        &self,
        accessions: &[S],
        count: usize,
    ) -> AccmapResult<HashMap<String, Vec<i64>>> {
        let wanted = &accessions[..count.min(accessions.len())];
        let mut rows = HashMap::with_capacity(wanted.len());
        if wanted.is_empty() {
            return Ok(rows);
        }
        self.batched_lookups.fetch_add(1, Ordering::Relaxed);

        let mut select = vec![quote_ident(ACCESSION_COLUMN)];
        select.extend(self.value_columns.iter().map(|c| quote_ident(c)));
        let select = select.join(", ");
        let filter = &self.config.value_filter;
        let width = self.value_columns.len();

        for chunk in wanted.chunks(self.config.tuning.max_batch_size) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {select} FROM {} WHERE {} IN ({placeholders})",
                quote_ident(MAPPINGS_TABLE),
                quote_ident(ACCESSION_COLUMN)
            );
            let mut stmt = self.conn.prepare_cached(&sql).map_err(sqlite_err)?;
            let mut result = stmt
                .query(params_from_iter(chunk.iter().map(|s| s.as_ref())))
                .map_err(sqlite_err)?;
            while let Some(row) = result.next().map_err(sqlite_err)? {
                let (accession, values) = read_row(row, width, filter).map_err(sqlite_err)?;
                rows.insert(accession, values);
            }
        }

        tracing::debug!(
            requested = wanted.len(),
            found = rows.len(),
            "Batched lookup"
        );
        Ok(rows)
    }

    fn catalog(&self) -> MetadataCatalog<'_> {
        MetadataCatalog::new(&self.conn)
    }

    /// The synthesized info string: general description, edition, total and
    /// one line per classification.
    pub fn info(&self) -> AccmapResult<String> {
        self.catalog().info_string()
    }

    pub fn edition(&self) -> AccmapResult<Option<String>> {
        self.catalog().edition()
    }

    /// Count recorded for a classification; unregistered names are an error.
    pub fn classification_count(&self, classification: &str) -> AccmapResult<u64> {
        let id = self
            .resolved_column(classification)
            .map_or(classification, |c| c.column.as_str());
        self.catalog().count(id)
    }

    /// Every classification registered in the catalog.
    pub fn classifications(&self) -> AccmapResult<Vec<String>> {
        self.catalog().classification_names()
    }

    /// Total number of accessions in the store.
    pub fn size(&self) -> AccmapResult<u64> {
        self.catalog().total_count()
    }

    pub fn stats(&self) -> LookupStats {
        LookupStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            batched_lookups: self.batched_lookups.load(Ordering::Relaxed),
            failed_lookups: self.failed_lookups.load(Ordering::Relaxed),
        }
    }
}

fn read_row(
    row: &Row<'_>,
    width: usize,
    filter: &ValueFilter,
) -> rusqlite::Result<(String, Vec<i64>)> {
    let accession: String = row.get(0)?;
    let mut values = Vec::with_capacity(width);
    for i in 0..width {
        values.push(MappingStore::filtered(filter, row.get(i + 1)?));
    }
    Ok((accession, values))
}

fn connect(path: &Path, config: &StoreConfig) -> AccmapResult<Connection> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            OpenError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            OpenError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;
    if !metadata.is_file() {
        return Err(OpenError::Unreadable {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        }
        .into());
    }
    if metadata.len() == 0 {
        return Err(OpenError::Empty {
            path: path.to_path_buf(),
        }
        .into());
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| OpenError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let not_a_store = |reason: String| OpenError::NotAStore {
        path: path.to_path_buf(),
        reason,
    };
    conn.execute_batch(&format!(
        "PRAGMA cache_size = -{};",
        config.tuning.cache_size_kib
    ))
    .map_err(|e| not_a_store(e.to_string()))?;
    for table in [MAPPINGS_TABLE, INFO_TABLE] {
        let exists = table_exists(&conn, table).map_err(|e| not_a_store(e.to_string()))?;
        if !exists {
            return Err(not_a_store(format!("missing table {}", table)).into());
        }
    }

    let info = MetadataCatalog::new(&conn).info_string()?;
    if !config.compatibility.accepts(&info) {
        return Err(OpenError::Incompatible {
            path: path.to_path_buf(),
            info,
        }
        .into());
    }

    Ok(conn)
}

fn value_columns(conn: &Connection) -> AccmapResult<Vec<String>> {
    Ok(table_columns(conn, MAPPINGS_TABLE)?
        .into_iter()
        .filter(|c| !c.eq_ignore_ascii_case(ACCESSION_COLUMN))
        .collect())
}

/// Map requested names to column slots. SQLite column names are
/// case-insensitive, so matching is too; the caller's spelling is the key.
fn resolve(value_columns: &[String], selection: &Selection) -> HashMap<String, ResolvedColumn> {
    let lookup = |name: &str| {
        value_columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .map(|slot| ResolvedColumn {
                column: value_columns[slot].clone(),
                slot,
            })
    };

    match selection {
        Selection::All => value_columns
            .iter()
            .filter_map(|c| lookup(c).map(|r| (c.clone(), r)))
            .collect(),
        Selection::Named(names) => names
            .iter()
            .filter_map(|name| match lookup(name) {
                Some(resolved) => Some((name.clone(), resolved)),
                None => {
                    tracing::debug!(classification = %name, "Classification not in store");
                    None
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::StoreWriter;
    use accmap_core::{AccmapError, CompatibilityFilter};
    use std::fs;
    use tempfile::TempDir;

    fn build(dir: &TempDir) -> PathBuf {
        let db = dir.path().join("store.db");
        let tax = dir.path().join("tax.tsv");
        let kegg = dir.path().join("kegg.tsv");
        fs::write(&tax, "acc1\t100\nacc2\t0\nacc3\t-4\n").expect("write taxonomy");
        fs::write(&kegg, "acc2\t7\nacc3\t8\n").expect("write kegg");

        let mut writer = StoreWriter::open(&db, true, StoreConfig::default()).expect("writer");
        writer.set_edition("ultimate").expect("edition");
        writer.stage("Taxonomy", &tax, "NCBI").expect("stage taxonomy");
        writer.stage("KEGG", &kegg, "KO").expect("stage kegg");
        writer.finish().expect("finish");
        db
    }

    #[test]
    fn test_resolve_is_case_insensitive_and_tolerates_unknown() {
        let columns = vec!["KEGG".to_string(), "Taxonomy".to_string()];
        let resolved = resolve(
            &columns,
            &Selection::Named(vec!["taxonomy".to_string(), "EC".to_string()]),
        );
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["taxonomy"].slot, 1);
        assert_eq!(resolved["taxonomy"].column, "Taxonomy");
    }

    #[test]
    fn test_open_all_and_named_open_agree_on_any_spelling() {
        let dir = TempDir::new().expect("temp dir");
        let db = build(&dir);
        let all = MappingStore::open_all(&db, StoreConfig::default()).expect("open all");
        let named = MappingStore::open(&db, &["taxonomy", "Kegg"], StoreConfig::default())
            .expect("open named");

        for spelling in ["Taxonomy", "taxonomy", "TAXONOMY"] {
            assert_eq!(all.get(spelling, "acc1"), 100);
            assert_eq!(named.get(spelling, "acc1"), 100);
            assert_eq!(all.column_index(spelling), named.column_index(spelling));
            assert_eq!(all.classification_count(spelling).expect("count"), 2);
        }
        assert_eq!(all.get("kegg", "acc3"), 8);
        assert_eq!(named.get("KEGG", "acc3"), 8);
        assert_eq!(all.column_index("kegg"), named.column_index("Kegg"));
        assert!(all.column_index("EC").is_none());
    }

    #[test]
    fn test_get_and_absence() {
        let dir = TempDir::new().expect("temp dir");
        let db = build(&dir);
        let store = MappingStore::open(&db, &["Taxonomy", "KEGG", "EC"], StoreConfig::default())
            .expect("open");

        assert_eq!(store.get("Taxonomy", "acc1"), 100);
        assert_eq!(store.get("Taxonomy", "acc2"), 0);
        assert_eq!(store.get("KEGG", "acc1"), 0);
        assert_eq!(store.get("Taxonomy", "unknown"), 0);
        assert_eq!(store.get("EC", "acc1"), 0);
        assert_eq!(store.column_index("EC"), None);
        assert_eq!(store.stats().failed_lookups, 0);
    }

    #[test]
    fn test_value_filter_applies_to_both_paths() {
        let dir = TempDir::new().expect("temp dir");
        let db = build(&dir);

        let raw = MappingStore::open_all(&db, StoreConfig::default()).expect("open");
        assert_eq!(raw.get("Taxonomy", "acc3"), -4);

        let config = StoreConfig::default().with_value_filter(ValueFilter::non_negative());
        let store = MappingStore::open_all(&db, config).expect("open");
        assert_eq!(store.get("Taxonomy", "acc3"), 0);
        let rows = store.get_many(&["acc3"], 1).expect("get_many");
        let slot = store.column_index("Taxonomy").expect("resolved");
        assert_eq!(rows["acc3"][slot], 0);
    }

    #[test]
    fn test_get_many_rows_and_count() {
        let dir = TempDir::new().expect("temp dir");
        let db = build(&dir);
        let store = MappingStore::open_all(&db, StoreConfig::default()).expect("open");

        assert_eq!(store.num_columns(), 2);
        let keys = ["acc1", "acc2", "nope", "acc3"];
        let rows = store.get_many(&keys, 2).expect("get_many");
        assert_eq!(rows.len(), 2);
        assert!(!rows.contains_key("acc3"));

        let tax = store.column_index("Taxonomy").expect("taxonomy resolved");
        let kegg = store.column_index("KEGG").expect("kegg resolved");
        assert_eq!(rows["acc1"][tax], 100);
        assert_eq!(rows["acc1"][kegg], 0);
        assert_eq!(rows["acc2"][kegg], 7);

        let all = store.get_many(&keys, 10).expect("get_many");
        assert_eq!(all.len(), 3);
        assert!(store.get_many::<&str>(&[], 5).expect("empty").is_empty());
    }

    #[test]
    fn test_get_many_chunks_large_requests() {
        let dir = TempDir::new().expect("temp dir");
        let db = build(&dir);
        let mut tuning = accmap_core::StoreTuning::default();
        tuning.max_batch_size = 1;
        let store = MappingStore::open_all(&db, StoreConfig::default().with_tuning(tuning))
            .expect("open");

        let rows = store
            .get_many(&["acc1", "acc2", "acc3"], 3)
            .expect("chunked get_many");
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_open_errors() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("missing.db");
        let err = MappingStore::open_all(&missing, StoreConfig::default())
            .err()
            .expect("missing file");
        assert!(matches!(err, AccmapError::Open(OpenError::NotFound { .. })));

        let empty = dir.path().join("empty.db");
        fs::write(&empty, b"").expect("write empty");
        let err = MappingStore::open_all(&empty, StoreConfig::default())
            .err()
            .expect("empty file");
        assert!(matches!(err, AccmapError::Open(OpenError::Empty { .. })));

        let garbage = dir.path().join("garbage.db");
        fs::write(&garbage, b"this is not a database file at all, not even close")
            .expect("write garbage");
        let err = MappingStore::open_all(&garbage, StoreConfig::default())
            .err()
            .expect("garbage file");
        assert!(matches!(
            err,
            AccmapError::Open(OpenError::NotAStore { .. } | OpenError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_incompatible_edition() {
        let dir = TempDir::new().expect("temp dir");
        let db = build(&dir);

        let config = StoreConfig::default()
            .with_compatibility(CompatibilityFilter::require_edition("community"));
        let err = MappingStore::open_all(&db, config).err().expect("rejected");
        assert!(matches!(err, AccmapError::Open(OpenError::Incompatible { .. })));

        let config = StoreConfig::default()
            .with_compatibility(CompatibilityFilter::require_edition("ultimate"));
        let store = MappingStore::open_all(&db, config).expect("accepted");
        assert_eq!(store.edition().expect("edition"), Some("ultimate".to_string()));
    }

    #[test]
    fn test_catalog_passthrough() {
        let dir = TempDir::new().expect("temp dir");
        let db = build(&dir);
        let store = MappingStore::open_all(&db, StoreConfig::default()).expect("open");

        assert_eq!(store.size().expect("size"), 3);
        assert_eq!(store.classification_count("Taxonomy").expect("count"), 2);
        assert_eq!(store.classification_count("KEGG").expect("count"), 2);
        assert!(store.classification_count("EC").is_err());
        assert_eq!(
            store.classifications().expect("names"),
            vec!["KEGG".to_string(), "Taxonomy".to_string()]
        );
        assert!(store.info().expect("info").contains("Taxonomy: NCBI, count=2"));
    }

    #[test]
    fn test_reopen_picks_up_new_columns() {
        let dir = TempDir::new().expect("temp dir");
        let db = build(&dir);
        let mut store = MappingStore::open_all(&db, StoreConfig::default()).expect("open");
        assert_eq!(store.column_index("SEED"), None);

        let seed = dir.path().join("seed.tsv");
        fs::write(&seed, "acc1\t11\n").expect("write seed");
        {
            let mut writer = StoreWriter::open(&db, false, StoreConfig::default()).expect("writer");
            writer.add_column("SEED", &seed, "SEED").expect("add column");
        }

        store.reopen().expect("reopen");
        assert_eq!(store.num_columns(), 3);
        assert_eq!(store.column_index("SEED"), Some(2));
        assert_eq!(store.get("SEED", "acc1"), 11);
    }
}

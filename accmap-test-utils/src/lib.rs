//! accmap Test Utilities
//!
//! Shared test infrastructure for the accmap workspace:
//! - Source file writers and ready-built store fixtures
//! - Proptest generators for accessions and classification sources
//! - Test tracing initialization

pub use accmap_core::{
    AccmapError, AccmapResult, ClassificationName, CompatibilityFilter, HeaderPolicy, StoreConfig,
    StoreTuning, ValueFilter,
};
pub use accmap_storage::{
    build_store, BuildReport, MappingStore, SourceSpec, StoreManifest, StoreWriter,
};

use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

/// Accession to value rows of one classification source file.
pub type SourceRows = BTreeMap<String, i64>;

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// SOURCE FILES
// ============================================================================

/// Write a tab-separated source file, optionally with a header line.
pub fn write_source<'a>(
    path: &Path,
    header: Option<&str>,
    rows: impl IntoIterator<Item = (&'a str, i64)>,
) -> PathBuf {
    let mut body = String::new();
    if let Some(header) = header {
        body.push_str(header);
        body.push('\n');
    }
    for (accession, value) in rows {
        body.push_str(accession);
        body.push('\t');
        body.push_str(&value.to_string());
        body.push('\n');
    }
    fs::write(path, body).expect("source file should be writable");
    path.to_path_buf()
}

// ============================================================================
// STORE FIXTURES
// ============================================================================

/// A store built in a temporary directory from in-memory sources.
pub struct StoreFixture {
    dir: TempDir,
    path: PathBuf,
    sources: BTreeMap<String, SourceRows>,
}

impl StoreFixture {
    /// Build a fresh store with one source file per classification.
    pub fn build(sources: BTreeMap<String, SourceRows>) -> Self {
        Self::build_with(sources, StoreManifest::default())
    }

    /// Build with a manifest carrying description and edition; the
    /// manifest's own sources are replaced by `sources`.
    pub fn build_with(sources: BTreeMap<String, SourceRows>, mut manifest: StoreManifest) -> Self {
        init_test_tracing();
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let path = dir.path().join("mappings.db");

        manifest.sources = sources
            .iter()
            .map(|(name, rows)| {
                let file = dir.path().join(format!("{}.tsv", name));
                write_source(
                    &file,
                    Some("accession\tvalue"),
                    rows.iter().map(|(a, v)| (a.as_str(), *v)),
                );
                SourceSpec::new(name.clone(), file, format!("{} source", name))
            })
            .collect();

        build_store(&path, true, &manifest, StoreConfig::default())
            .expect("fixture store should build");

        Self { dir, path, sources }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn sources(&self) -> &BTreeMap<String, SourceRows> {
        &self.sources
    }

    /// Accessions carrying a non-absent value in at least one source.
    pub fn accession_union(&self) -> BTreeSet<String> {
        self.sources
            .values()
            .flat_map(|rows| rows.iter())
            .filter(|(_, value)| **value != 0)
            .map(|(accession, _)| accession.clone())
            .collect()
    }

    pub fn open_all(&self) -> MappingStore {
        MappingStore::open_all(&self.path, StoreConfig::default())
            .expect("fixture store should open")
    }

    pub fn writer(&self) -> StoreWriter {
        StoreWriter::open(&self.path, false, StoreConfig::default())
            .expect("fixture store should open for writing")
    }
}

fn rows(pairs: &[(&str, i64)]) -> SourceRows {
    pairs.iter().map(|(a, v)| (a.to_string(), *v)).collect()
}

/// `taxon`: acc1 → 100, acc2 → 0, acc3 → 42.
pub fn taxon_fixture() -> StoreFixture {
    let mut sources = BTreeMap::new();
    sources.insert(
        "taxon".to_string(),
        rows(&[("acc1", 100), ("acc2", 0), ("acc3", 42)]),
    );
    StoreFixture::build(sources)
}

/// `taxon`: acc1 → 100; `kegg`: acc2 → 7.
pub fn cross_classification_fixture() -> StoreFixture {
    let mut sources = BTreeMap::new();
    sources.insert("taxon".to_string(), rows(&[("acc1", 100)]));
    sources.insert("kegg".to_string(), rows(&[("acc2", 7)]));
    StoreFixture::build(sources)
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Accessions shaped like protein and nucleotide ids.
pub fn arb_accession() -> impl Strategy<Value = String> {
    prop_oneof![
        "WP_[0-9]{6}\\.[1-3]",
        "[A-Z]{3}[0-9]{5}",
        "acc[0-9]{1,3}",
    ]
}

/// Classification values, including the absence sentinel and negatives.
pub fn arb_value() -> impl Strategy<Value = i64> {
    prop_oneof![
        3 => 1i64..5_000_000,
        1 => Just(0i64),
        1 => -100i64..0,
    ]
}

pub fn arb_classification_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Taxonomy".to_string()),
        Just("GTDB".to_string()),
        Just("eggNOG".to_string()),
        Just("KEGG".to_string()),
        Just("SEED".to_string()),
        Just("EC".to_string()),
        "[a-z][a-z0-9_]{2,10}".prop_filter("reserved", |s| {
            !["general", "edition", "accession"].contains(&s.as_str())
        }),
    ]
}

pub fn arb_source_rows(max_rows: usize) -> impl Strategy<Value = SourceRows> {
    btree_map(arb_accession(), arb_value(), 0..=max_rows)
}

/// One to four classifications with distinct names (case-insensitively,
/// as SQLite treats column names) and their source rows.
pub fn arb_sources(max_rows: usize) -> impl Strategy<Value = BTreeMap<String, SourceRows>> {
    vec((arb_classification_name(), arb_source_rows(max_rows)), 1..=4).prop_map(|entries| {
        let mut seen = BTreeSet::new();
        entries
            .into_iter()
            .filter(|(name, _)| seen.insert(name.to_ascii_lowercase()))
            .collect()
    })
}

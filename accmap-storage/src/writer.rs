//! Write-side entry points: the exclusive [`StoreWriter`] handle and the
//! one-call [`build_store`] pipeline (stage, merge, compact).

use crate::adder::{add_classification_column, AddColumnReport};
use crate::builder::{stage_classification, StageReport};
use crate::catalog::MetadataCatalog;
use crate::compactor::{compact, CompactionReport};
use crate::merge::{merge_staged, MergeReport};
use crate::schema::{sqlite_err, staged_classifications};
use accmap_core::{
    AccmapResult, ClassificationName, StorageError, StoreConfig, StoreTuning, GENERAL_KEY,
};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// One classification source for [`build_store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
    pub description: String,
}

impl SourceSpec {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: description.into(),
        }
    }
}

/// Everything [`build_store`] writes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreManifest {
    /// Store-wide description, first line of the info string
    pub description: String,
    /// Edition marker checked by readers' compatibility filters
    pub edition: Option<String>,
    pub sources: Vec<SourceSpec>,
}

/// Outcome of a full build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub staged: Vec<StageReport>,
    pub merge: MergeReport,
    pub compaction: CompactionReport,
}

fn remove_if_exists(path: &Path) -> AccmapResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()),
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn apply_write_pragmas(conn: &Connection, tuning: &StoreTuning) -> AccmapResult<()> {
    conn.execute_batch(&format!(
        "PRAGMA locking_mode = EXCLUSIVE;
         PRAGMA cache_size = -{};
         PRAGMA temp_store = MEMORY;",
        tuning.cache_size_kib
    ))
    .map_err(sqlite_err)
}

/// Exclusive write handle on a store file.
///
/// Only one writer may be active per file; the connection holds an
/// exclusive lock from its first write until it is dropped.
pub struct StoreWriter {
    conn: Connection,
    path: PathBuf,
    config: StoreConfig,
}

impl StoreWriter {
    /// Open a store for writing.
    ///
    /// With `overwrite` the file is deleted and recreated; otherwise an
    /// existing store is extended, or a new one created if none exists.
    pub fn open(path: impl AsRef<Path>, overwrite: bool, config: StoreConfig) -> AccmapResult<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        if overwrite {
            tracing::debug!(path = %path.display(), "Removing existing store");
            remove_if_exists(&path)?;
            remove_if_exists(&sidecar(&path, "-journal"))?;
        }

        let conn = Connection::open(&path).map_err(sqlite_err)?;
        apply_write_pragmas(&conn, &config.tuning)?;
        MetadataCatalog::new(&conn).ensure_schema()?;

        tracing::info!(path = %path.display(), overwrite, "Opened store for writing");

        Ok(Self { conn, path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn catalog(&self) -> MetadataCatalog<'_> {
        MetadataCatalog::new(&self.conn)
    }

    /// Classifications currently staged and not yet compacted away.
    pub fn staged(&self) -> AccmapResult<Vec<ClassificationName>> {
        staged_classifications(&self.conn)
    }

    pub fn set_description(&self, description: &str) -> AccmapResult<()> {
        self.catalog().set_description(GENERAL_KEY, description)
    }

    pub fn set_edition(&self, marker: &str) -> AccmapResult<()> {
        self.catalog().set_edition(marker)
    }

    /// Load one classification source file into its staging table.
    pub fn stage(
        &mut self,
        name: &str,
        source: impl AsRef<Path>,
        description: &str,
    ) -> AccmapResult<StageReport> {
        let name = ClassificationName::new(name)?;
        stage_classification(
            &mut self.conn,
            &name,
            source.as_ref(),
            description,
            self.config.tuning.header,
        )
    }

    pub fn merge(&mut self) -> AccmapResult<MergeReport> {
        merge_staged(&mut self.conn)
    }

    pub fn compact(&mut self) -> AccmapResult<CompactionReport> {
        compact(&mut self.conn)
    }

    /// Merge everything staged, then compact.
    pub fn finish(&mut self) -> AccmapResult<(MergeReport, CompactionReport)> {
        let merge = self.merge()?;
        let compaction = self.compact()?;
        Ok((merge, compaction))
    }

    /// Add a classification column to the already merged wide table.
    pub fn add_column(
        &mut self,
        name: &str,
        source: impl AsRef<Path>,
        description: &str,
    ) -> AccmapResult<AddColumnReport> {
        let name = ClassificationName::new(name)?;
        add_classification_column(
            &mut self.conn,
            &name,
            source.as_ref(),
            description,
            self.config.tuning.header,
        )
    }
}

/// Build a store from a manifest: stage every source, then merge and compact.
///
/// Every source is staged before any join runs, so an input or schema error
/// in any file stops the build with the wide table untouched.
pub fn build_store(
    path: impl AsRef<Path>,
    overwrite: bool,
    manifest: &StoreManifest,
    config: StoreConfig,
) -> AccmapResult<BuildReport> {
    let mut writer = StoreWriter::open(path, overwrite, config)?;
    if !manifest.description.is_empty() {
        writer.set_description(&manifest.description)?;
    }
    if let Some(edition) = &manifest.edition {
        writer.set_edition(edition)?;
    }

    let mut staged = Vec::with_capacity(manifest.sources.len());
    for source in &manifest.sources {
        staged.push(writer.stage(&source.name, &source.path, &source.description)?);
    }
    let (merge, compaction) = writer.finish()?;

    Ok(BuildReport {
        staged,
        merge,
        compaction,
    })
}

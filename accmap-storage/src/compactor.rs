//! Store compactor: drops staging and union tables, reconciles the catalog
//! with the wide table, and vacuums the file.
//!
//! Safe to run any number of times, including after an interrupted build.

use crate::catalog::MetadataCatalog;
use crate::schema::{
    classification_columns, column_value_count, quote_ident, row_count, sqlite_err,
    staged_classifications, staging_table, table_exists, MAPPINGS_TABLE, PRIOR_MAPPINGS_TABLE,
    UNION_TABLE,
};
use accmap_core::{AccmapResult, GENERAL_KEY};
use rusqlite::Connection;

/// Outcome of a compaction pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompactionReport {
    /// Intermediate tables that were dropped
    pub dropped_tables: Vec<String>,
    /// Catalog records removed because their classification has no column
    pub removed_entries: Vec<String>,
    /// Catalog records respelled to match their column
    pub renamed_entries: Vec<String>,
    /// Rows in the wide table after compaction
    pub total_rows: u64,
}

impl CompactionReport {
    pub fn is_noop(&self) -> bool {
        self.dropped_tables.is_empty()
            && self.removed_entries.is_empty()
            && self.renamed_entries.is_empty()
    }
}

pub fn compact(conn: &mut Connection) -> AccmapResult<CompactionReport> {
    let mut report = CompactionReport::default();

    let tx = conn.transaction().map_err(sqlite_err)?;

    let mut intermediate: Vec<String> = staged_classifications(&tx)?
        .iter()
        .map(staging_table)
        .collect();
    for table in [UNION_TABLE, PRIOR_MAPPINGS_TABLE] {
        if table_exists(&tx, table)? {
            intermediate.push(table.to_string());
        }
    }
    for table in intermediate {
        tracing::debug!(table = %table, "Dropping intermediate table");
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(&table)))
            .map_err(sqlite_err)?;
        report.dropped_tables.push(table);
    }

    let has_wide = table_exists(&tx, MAPPINGS_TABLE)?;
    let columns = if has_wide {
        classification_columns(&tx)?
    } else {
        Vec::new()
    };

    let catalog = MetadataCatalog::new(&tx);
    let names = catalog.classification_names()?;
    for name in &names {
        if columns.contains(name) {
            continue;
        }
        match columns.iter().find(|c| c.eq_ignore_ascii_case(name)) {
            Some(column) if names.contains(column) => {
                tracing::warn!(classification = %name, column = %column, "Removing duplicate catalog entry");
                catalog.remove(name)?;
                report.removed_entries.push(name.clone());
            }
            Some(column) => {
                tracing::warn!(classification = %name, column = %column, "Respelling catalog entry to match its column");
                catalog.rename(name, column)?;
                catalog.set_count(column, column_value_count(&tx, column)?)?;
                report.renamed_entries.push(name.clone());
            }
            None => {
                tracing::warn!(classification = %name, "Removing catalog entry without a column");
                catalog.remove(name)?;
                report.removed_entries.push(name.clone());
            }
        }
    }

    report.total_rows = if has_wide {
        row_count(&tx, MAPPINGS_TABLE)?
    } else {
        0
    };
    catalog.set_count(GENERAL_KEY, report.total_rows)?;

    tx.commit().map_err(sqlite_err)?;

    tracing::debug!("Reclaiming free pages");
    conn.execute_batch("VACUUM;").map_err(sqlite_err)?;

    tracing::info!(
        dropped = report.dropped_tables.len(),
        removed = report.removed_entries.len(),
        renamed = report.renamed_entries.len(),
        total_rows = report.total_rows,
        "Compacted store"
    );

    Ok(report)
}

//! Classification source table builder.
//!
//! Loads one source file into its own staging table and records the
//! inserted count in the catalog, both inside a single transaction.

use crate::catalog::MetadataCatalog;
use crate::schema::{is_constraint_violation, quote_ident, sqlite_err, staging_table};
use crate::source::SourceReader;
use accmap_core::{AccmapResult, ClassificationName, HeaderPolicy, SchemaError, ACCESSION_COLUMN};
use rusqlite::{params, Connection};
use std::path::Path;

/// Outcome of staging one classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub classification: ClassificationName,
    /// Rows written to the staging table
    pub inserted: u64,
    /// Lines carrying the absence sentinel, not stored
    pub skipped_absent: u64,
}

/// Build (or rebuild) the staging table for `name` from `source`.
///
/// Any malformed line or duplicate accession rolls back the whole load; a
/// previous staging table for the same classification is only replaced when
/// the new load commits.
pub fn stage_classification(
    conn: &mut Connection,
    name: &ClassificationName,
    source: &Path,
    description: &str,
    header: HeaderPolicy,
) -> AccmapResult<StageReport> {
    let reader = SourceReader::open(source, header)?;
    let table = quote_ident(&staging_table(name));

    let tx = conn.transaction().map_err(sqlite_err)?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table};
         CREATE TABLE {table} (
             {key} TEXT PRIMARY KEY,
             value {value_type} NOT NULL
         ) WITHOUT ROWID;",
        key = quote_ident(ACCESSION_COLUMN),
        value_type = name.value_type().sql_type(),
    ))
    .map_err(sqlite_err)?;

    let mut inserted = 0u64;
    let mut skipped_absent = 0u64;
    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {table} ({}, value) VALUES (?1, ?2)",
                quote_ident(ACCESSION_COLUMN)
            ))
            .map_err(sqlite_err)?;

        for record in reader {
            let record = record?;
            if record.is_absent() {
                skipped_absent += 1;
                continue;
            }
            let result = stmt.execute(params![record.accession, record.value]);
            match result {
                Ok(_) => inserted += 1,
                Err(e) if is_constraint_violation(&e) => {
                    return Err(SchemaError::DuplicateAccession {
                        classification: name.to_string(),
                        accession: record.accession,
                        line: record.line,
                    }
                    .into());
                }
                Err(e) => return Err(sqlite_err(e)),
            }
        }
    }
    // The staging table name is case-insensitive too: a pending load under
    // another spelling was just replaced, and so is its catalog record.
    MetadataCatalog::new(&tx).register(name, description, inserted)?;
    tx.commit().map_err(sqlite_err)?;

    tracing::info!(
        classification = %name,
        inserted,
        skipped_absent,
        source = %source.display(),
        "Staged classification"
    );

    Ok(StageReport {
        classification: name.clone(),
        inserted,
        skipped_absent,
    })
}

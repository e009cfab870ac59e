//! Incremental column adder.
//!
//! Appends one classification column to an existing wide table and fills it
//! from a source file, matched by accession. Existing columns are never
//! touched and the accession universe does not change: accessions unknown to
//! the wide table are dropped and counted.

use crate::catalog::MetadataCatalog;
use crate::schema::{classification_columns, quote_ident, sqlite_err, table_exists, MAPPINGS_TABLE};
use crate::source::SourceReader;
use accmap_core::{AccmapResult, ClassificationName, HeaderPolicy, SchemaError, ACCESSION_COLUMN};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;

/// Outcome of adding a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddColumnReport {
    pub classification: ClassificationName,
    /// Rows that received a value
    pub updated: u64,
    /// Source accessions absent from the wide table
    pub skipped_unknown: u64,
    /// Lines carrying the absence sentinel
    pub skipped_absent: u64,
}

pub fn add_classification_column(
    conn: &mut Connection,
    name: &ClassificationName,
    source: &Path,
    description: &str,
    header: HeaderPolicy,
) -> AccmapResult<AddColumnReport> {
    let reader = SourceReader::open(source, header)?;

    if !table_exists(conn, MAPPINGS_TABLE)? {
        return Err(SchemaError::MissingMappingTable.into());
    }
    if classification_columns(conn)?
        .iter()
        .any(|c| c.eq_ignore_ascii_case(name.as_str()))
    {
        return Err(SchemaError::ClassificationExists {
            name: name.to_string(),
        }
        .into());
    }

    let column = quote_ident(name.as_str());
    let tx = conn.transaction().map_err(sqlite_err)?;
    tx.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {column} {};",
        quote_ident(MAPPINGS_TABLE),
        name.value_type().sql_type()
    ))
    .map_err(sqlite_err)?;

    let mut updated = 0u64;
    let mut skipped_unknown = 0u64;
    let mut skipped_absent = 0u64;
    {
        let mut stmt = tx
            .prepare(&format!(
                "UPDATE {} SET {column} = ?2 WHERE {} = ?1",
                quote_ident(MAPPINGS_TABLE),
                quote_ident(ACCESSION_COLUMN)
            ))
            .map_err(sqlite_err)?;
        let mut seen = HashSet::new();

        for record in reader {
            let record = record?;
            if !seen.insert(record.accession.clone()) {
                return Err(SchemaError::DuplicateAccession {
                    classification: name.to_string(),
                    accession: record.accession,
                    line: record.line,
                }
                .into());
            }
            if record.is_absent() {
                skipped_absent += 1;
                continue;
            }
            let changed = stmt
                .execute(params![record.accession, record.value])
                .map_err(sqlite_err)?;
            if changed == 0 {
                skipped_unknown += 1;
            } else {
                updated += 1;
            }
        }
    }

    MetadataCatalog::new(&tx).register(name, description, updated)?;
    tx.commit().map_err(sqlite_err)?;

    tracing::info!(
        classification = %name,
        updated,
        skipped_unknown,
        skipped_absent,
        "Added classification column"
    );

    Ok(AddColumnReport {
        classification: name.clone(),
        updated,
        skipped_unknown,
        skipped_absent,
    })
}

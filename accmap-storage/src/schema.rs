//! Table names, identifier quoting and small schema queries shared by the
//! writer and the reader.

use accmap_core::{AccmapError, AccmapResult, ClassificationName, StorageError, ACCESSION_COLUMN};
use rusqlite::{params, Connection, OptionalExtension};

/// The wide table: one row per accession, one column per classification.
pub const MAPPINGS_TABLE: &str = "mappings";

/// The wide table while a merge is rebuilding it.
pub const PRIOR_MAPPINGS_TABLE: &str = "mappings_prior";

/// Union of all accessions seen during a merge.
pub const UNION_TABLE: &str = "accession_union";

/// Metadata catalog table.
pub const INFO_TABLE: &str = "info";

/// Prefix of the per-classification staging tables.
pub const STAGING_PREFIX: &str = "staging_";

/// Quote an identifier for use in SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn staging_table(name: &ClassificationName) -> String {
    format!("{}{}", STAGING_PREFIX, name)
}

pub fn sqlite_err(e: rusqlite::Error) -> AccmapError {
    StorageError::Sqlite {
        reason: e.to_string(),
    }
    .into()
}

pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub fn table_exists(conn: &Connection, table: &str) -> AccmapResult<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(sqlite_err)
}

/// Names of all staging tables' classifications, sorted by name.
pub fn staged_classifications(conn: &Connection) -> AccmapResult<Vec<ClassificationName>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND substr(name, 1, length(?1)) = ?1
             ORDER BY name",
        )
        .map_err(sqlite_err)?;
    let tables = stmt
        .query_map(params![STAGING_PREFIX], |row| row.get::<_, String>(0))
        .map_err(sqlite_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sqlite_err)?;

    let mut names = Vec::with_capacity(tables.len());
    for table in tables {
        let raw = &table[STAGING_PREFIX.len()..];
        match ClassificationName::new(raw) {
            Ok(name) => names.push(name),
            Err(e) => tracing::warn!(table = %table, error = %e, "Ignoring staging table with invalid name"),
        }
    }
    Ok(names)
}

/// Column names of a table in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> AccmapResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(sqlite_err)?;
    let columns = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(sqlite_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sqlite_err)?;
    Ok(columns)
}

/// Classification columns of the wide table, excluding the accession key.
pub fn classification_columns(conn: &Connection) -> AccmapResult<Vec<String>> {
    Ok(table_columns(conn, MAPPINGS_TABLE)?
        .into_iter()
        .filter(|c| !c.eq_ignore_ascii_case(ACCESSION_COLUMN))
        .collect())
}

pub fn row_count(conn: &Connection, table: &str) -> AccmapResult<u64> {
    let count: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )
        .map_err(sqlite_err)?;
    Ok(count.max(0) as u64)
}

/// Number of non-absent values in one classification column.
pub fn column_value_count(conn: &Connection, column: &str) -> AccmapResult<u64> {
    let column = quote_ident(column);
    let count: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {column} IS NOT NULL AND {column} <> 0",
                quote_ident(MAPPINGS_TABLE)
            ),
            [],
            |row| row.get(0),
        )
        .map_err(sqlite_err)?;
    Ok(count.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("KEGG"), "\"KEGG\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_staged_classifications_lists_only_staging_tables() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "CREATE TABLE staging_KEGG (Accession TEXT PRIMARY KEY, value INTEGER NOT NULL) WITHOUT ROWID;
             CREATE TABLE staging_EC (Accession TEXT PRIMARY KEY, value INTEGER NOT NULL) WITHOUT ROWID;
             CREATE TABLE info (id TEXT PRIMARY KEY, description TEXT, count INTEGER);",
        )
        .expect("create tables");

        let names: Vec<String> = staged_classifications(&conn)
            .expect("list staged")
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, vec!["EC".to_string(), "KEGG".to_string()]);
    }

    #[test]
    fn test_columns_and_counts() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "CREATE TABLE mappings (Accession TEXT PRIMARY KEY, Taxonomy INTEGER, EC INTEGER) WITHOUT ROWID;
             INSERT INTO mappings VALUES ('a', 1, NULL), ('b', 0, 3), ('c', 2, 4);",
        )
        .expect("create mappings");

        assert!(table_exists(&conn, MAPPINGS_TABLE).expect("exists query"));
        assert!(!table_exists(&conn, UNION_TABLE).expect("exists query"));
        assert_eq!(
            classification_columns(&conn).expect("columns"),
            vec!["Taxonomy".to_string(), "EC".to_string()]
        );
        assert_eq!(row_count(&conn, MAPPINGS_TABLE).expect("rows"), 3);
        assert_eq!(column_value_count(&conn, "Taxonomy").expect("count"), 2);
        assert_eq!(column_value_count(&conn, "EC").expect("count"), 2);
    }
}

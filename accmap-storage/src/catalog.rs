//! Metadata catalog: descriptions and counts per classification, plus the
//! store-wide `general` and `edition` records.

use crate::schema::{quote_ident, sqlite_err, INFO_TABLE};
use accmap_core::{
    edition_line, AccmapResult, CatalogError, ClassificationInfo, ClassificationName, EDITION_KEY,
    GENERAL_KEY,
};
use rusqlite::{params, Connection, OptionalExtension};

fn to_sql_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn from_sql_count(count: Option<i64>) -> u64 {
    count.unwrap_or(0).max(0) as u64
}

fn is_reserved(id: &str) -> bool {
    id == GENERAL_KEY || id == EDITION_KEY
}

/// View over the `info` table of an open connection.
pub struct MetadataCatalog<'c> {
    conn: &'c Connection,
}

impl<'c> MetadataCatalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn ensure_schema(&self) -> AccmapResult<()> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    description TEXT,
                    count INTEGER
                )",
                quote_ident(INFO_TABLE)
            ))
            .map_err(sqlite_err)
    }

    /// Insert or replace the description and count of one record.
    pub fn upsert(&self, id: &str, description: &str, count: u64) -> AccmapResult<()> {
        self.conn
            .execute(
                "INSERT INTO info (id, description, count) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET description = excluded.description,
                                               count = excluded.count",
                params![id, description, to_sql_count(count)],
            )
            .map_err(sqlite_err)?;
        Ok(())
    }

    /// Register a classification with its description and count.
    ///
    /// SQLite identifiers are case-insensitive, so a name is one column
    /// whatever its spelling; records under another spelling are replaced.
    pub fn register(
        &self,
        name: &ClassificationName,
        description: &str,
        count: u64,
    ) -> AccmapResult<()> {
        self.drop_case_variants(name.as_str())?;
        self.upsert(name.as_str(), description, count)
    }

    /// Delete classification records spelled like `id` up to ASCII case,
    /// keeping the exact spelling. Returns the deleted ids.
    pub fn drop_case_variants(&self, id: &str) -> AccmapResult<Vec<String>> {
        let variants: Vec<String> = self
            .entries()?
            .into_iter()
            .map(|entry| String::from(entry.name))
            .filter(|name| name != id && name.eq_ignore_ascii_case(id))
            .collect();
        for variant in &variants {
            tracing::debug!(id = %id, variant = %variant, "Dropping case variant of catalog record");
            self.remove(variant)?;
        }
        Ok(variants)
    }

    /// Move a record to a new id, keeping its description and count.
    pub fn rename(&self, from: &str, to: &str) -> AccmapResult<bool> {
        let renamed = self
            .conn
            .execute("UPDATE info SET id = ?2 WHERE id = ?1", params![from, to])
            .map_err(sqlite_err)?;
        Ok(renamed > 0)
    }

    /// Update a record's count, keeping any existing description.
    pub fn set_count(&self, id: &str, count: u64) -> AccmapResult<()> {
        self.conn
            .execute(
                "INSERT INTO info (id, description, count) VALUES (?1, '', ?2)
                 ON CONFLICT(id) DO UPDATE SET count = excluded.count",
                params![id, to_sql_count(count)],
            )
            .map_err(sqlite_err)?;
        Ok(())
    }

    /// Update a record's description, keeping any existing count.
    pub fn set_description(&self, id: &str, description: &str) -> AccmapResult<()> {
        self.conn
            .execute(
                "INSERT INTO info (id, description, count) VALUES (?1, ?2, 0)
                 ON CONFLICT(id) DO UPDATE SET description = excluded.description",
                params![id, description],
            )
            .map_err(sqlite_err)?;
        Ok(())
    }

    pub fn set_edition(&self, marker: &str) -> AccmapResult<()> {
        self.set_description(EDITION_KEY, marker)
    }

    pub fn edition(&self) -> AccmapResult<Option<String>> {
        Ok(self
            .record(EDITION_KEY)?
            .map(|(description, _)| description)
            .filter(|marker| !marker.is_empty()))
    }

    pub fn remove(&self, id: &str) -> AccmapResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM info WHERE id = ?1", params![id])
            .map_err(sqlite_err)?;
        Ok(removed > 0)
    }

    fn record(&self, id: &str) -> AccmapResult<Option<(String, u64)>> {
        self.conn
            .query_row(
                "SELECT description, count FROM info WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        from_sql_count(row.get(1)?),
                    ))
                },
            )
            .optional()
            .map_err(sqlite_err)
    }

    /// Count of a registered classification. A classification that was
    /// never registered is an error, not a zero count.
    pub fn count(&self, name: &str) -> AccmapResult<u64> {
        match self.record(name)? {
            Some((_, count)) if !is_reserved(name) => Ok(count),
            _ => Err(CatalogError::NotRegistered {
                name: name.to_string(),
            }
            .into()),
        }
    }

    pub fn description(&self, name: &str) -> AccmapResult<String> {
        match self.record(name)? {
            Some((description, _)) if !is_reserved(name) => Ok(description),
            _ => Err(CatalogError::NotRegistered {
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Total number of accessions recorded for the whole store.
    pub fn total_count(&self) -> AccmapResult<u64> {
        Ok(self.record(GENERAL_KEY)?.map_or(0, |(_, count)| count))
    }

    pub fn general_description(&self) -> AccmapResult<String> {
        Ok(self
            .record(GENERAL_KEY)?
            .map(|(description, _)| description)
            .unwrap_or_default())
    }

    /// Registered classifications, ordered by name.
    pub fn entries(&self) -> AccmapResult<Vec<ClassificationInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, description, count FROM info ORDER BY id")
            .map_err(sqlite_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    from_sql_count(row.get(2)?),
                ))
            })
            .map_err(sqlite_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sqlite_err)?;

        let mut entries = Vec::with_capacity(rows.len());
        for (id, description, count) in rows {
            if is_reserved(&id) {
                continue;
            }
            match ClassificationName::new(id.as_str()) {
                Ok(name) => entries.push(ClassificationInfo {
                    name,
                    description,
                    count,
                }),
                Err(e) => tracing::warn!(id = %id, error = %e, "Skipping catalog record with invalid name"),
            }
        }
        Ok(entries)
    }

    pub fn classification_names(&self) -> AccmapResult<Vec<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|entry| entry.name.into())
            .collect())
    }

    /// The store's info string: the general description, the edition line,
    /// the total, then one line per classification.
    pub fn info_string(&self) -> AccmapResult<String> {
        let mut lines = Vec::new();
        let description = self.general_description()?;
        if !description.is_empty() {
            lines.push(description);
        }
        if let Some(marker) = self.edition()? {
            lines.push(edition_line(&marker));
        }
        lines.push(format!("accessions: {}", self.total_count()?));
        for entry in self.entries()? {
            lines.push(format!(
                "{}: {}, count={}",
                entry.name, entry.description, entry.count
            ));
        }
        Ok(lines.join("\n"))
    }
}

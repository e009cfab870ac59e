//! Table merge engine.
//!
//! Materializes the left-outer multi-way join of every staged classification
//! against the union of all accessions into the wide `mappings` table. When a
//! wide table already exists it is renamed aside, joined in as one more
//! source, and dropped once the new table is populated.
//!
//! The whole merge runs in one transaction. SQLite rolls back DDL along with
//! data, so a failed merge leaves the store exactly as it was.

use crate::catalog::MetadataCatalog;
use crate::schema::{
    column_value_count, quote_ident, row_count, sqlite_err, staged_classifications,
    staging_table, table_exists, table_columns, MAPPINGS_TABLE, PRIOR_MAPPINGS_TABLE,
    UNION_TABLE,
};
use accmap_core::{AccmapResult, ClassificationName, SchemaError, ACCESSION_COLUMN, GENERAL_KEY};
use rusqlite::{Connection, Transaction};

/// Outcome of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Classification columns of the new wide table, in column order
    pub columns: Vec<String>,
    /// Staged classifications joined in by this merge
    pub merged: Vec<ClassificationName>,
    /// Rows in the new wide table
    pub rows: u64,
    /// Whether an existing wide table was extended
    pub extended: bool,
}

/// Where one column of the new wide table takes its values from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnPlan {
    name: String,
    source: String,
}

/// Plan the new table's columns: prior columns keep their position (taking
/// staged values when the classification was re-staged), new classifications
/// are appended in staging order.
fn plan_columns(prior: &[String], staged: &[ClassificationName]) -> Vec<ColumnPlan> {
    let staged_alias = |i: usize| format!("s{}.value", i);
    let mut plan = Vec::with_capacity(prior.len() + staged.len());
    let mut used = vec![false; staged.len()];

    for column in prior {
        let restaged = staged
            .iter()
            .position(|s| s.as_str().eq_ignore_ascii_case(column));
        match restaged {
            Some(i) => {
                used[i] = true;
                plan.push(ColumnPlan {
                    name: staged[i].to_string(),
                    source: staged_alias(i),
                });
            }
            None => plan.push(ColumnPlan {
                name: column.clone(),
                source: format!("p.{}", quote_ident(column)),
            }),
        }
    }
    for (i, name) in staged.iter().enumerate() {
        if !used[i] {
            plan.push(ColumnPlan {
                name: name.to_string(),
                source: staged_alias(i),
            });
        }
    }
    plan
}

fn build_union(tx: &Transaction<'_>, sources: &[String]) -> AccmapResult<()> {
    let key = quote_ident(ACCESSION_COLUMN);
    let union = quote_ident(UNION_TABLE);
    let selects = sources
        .iter()
        .map(|table| format!("SELECT {key} FROM {}", quote_ident(table)))
        .collect::<Vec<_>>()
        .join(" UNION ");

    tracing::debug!(sources = sources.len(), "Computing accession union");
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {union};
         CREATE TABLE {union} ({key} TEXT PRIMARY KEY) WITHOUT ROWID;
         INSERT OR IGNORE INTO {union} ({key}) {selects};"
    ))
    .map_err(sqlite_err)
}

fn create_wide_table(tx: &Transaction<'_>, plan: &[ColumnPlan]) -> AccmapResult<()> {
    let mut columns = vec![format!("{} TEXT PRIMARY KEY", quote_ident(ACCESSION_COLUMN))];
    columns.extend(
        plan.iter()
            .map(|c| format!("{} INTEGER", quote_ident(&c.name))),
    );

    tracing::debug!(columns = plan.len(), "Creating wide table");
    tx.execute_batch(&format!(
        "CREATE TABLE {} ({}) WITHOUT ROWID;",
        quote_ident(MAPPINGS_TABLE),
        columns.join(", ")
    ))
    .map_err(sqlite_err)
}

fn populate_wide_table(
    tx: &Transaction<'_>,
    plan: &[ColumnPlan],
    staged: &[ClassificationName],
    extended: bool,
) -> AccmapResult<usize> {
    let key = quote_ident(ACCESSION_COLUMN);

    let mut targets = vec![key.clone()];
    targets.extend(plan.iter().map(|c| quote_ident(&c.name)));
    let mut values = vec![format!("u.{key}")];
    values.extend(plan.iter().map(|c| c.source.clone()));

    let mut joins = Vec::with_capacity(staged.len() + 1);
    if extended {
        joins.push(format!(
            "LEFT JOIN {} AS p ON p.{key} = u.{key}",
            quote_ident(PRIOR_MAPPINGS_TABLE)
        ));
    }
    for (i, name) in staged.iter().enumerate() {
        joins.push(format!(
            "LEFT JOIN {} AS s{i} ON s{i}.{key} = u.{key}",
            quote_ident(&staging_table(name))
        ));
    }

    tracing::debug!(joins = joins.len(), "Populating wide table");
    tx.execute(
        &format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} AS u {}",
            quote_ident(MAPPINGS_TABLE),
            targets.join(", "),
            values.join(", "),
            quote_ident(UNION_TABLE),
            joins.join(" ")
        ),
        [],
    )
    .map_err(sqlite_err)
}

/// Delete rows where every classification is absent. Re-staging a
/// classification can leave prior accessions that no source mentions.
fn prune_absent_rows(tx: &Transaction<'_>, plan: &[ColumnPlan]) -> AccmapResult<usize> {
    let predicate = if plan.is_empty() {
        "1".to_string()
    } else {
        plan.iter()
            .map(|c| format!("coalesce({}, 0) = 0", quote_ident(&c.name)))
            .collect::<Vec<_>>()
            .join(" AND ")
    };
    let pruned = tx
        .execute(
            &format!(
                "DELETE FROM {} WHERE {predicate}",
                quote_ident(MAPPINGS_TABLE)
            ),
            [],
        )
        .map_err(sqlite_err)?;
    if pruned > 0 {
        tracing::debug!(pruned, "Pruned accessions without any mapping");
    }
    Ok(pruned)
}

/// Merge every staged classification into the wide table.
///
/// Re-running a merge over the same staging tables yields the same wide
/// table. Staging tables and the union table are left for the compactor.
pub fn merge_staged(conn: &mut Connection) -> AccmapResult<MergeReport> {
    let staged = staged_classifications(conn)?;
    let extended = table_exists(conn, MAPPINGS_TABLE)?;
    if staged.is_empty() && !extended {
        return Err(SchemaError::NothingToMerge.into());
    }

    let tx = conn.transaction().map_err(sqlite_err)?;

    let prior_columns: Vec<String> = if extended {
        table_columns(&tx, MAPPINGS_TABLE)?
            .into_iter()
            .filter(|c| !c.eq_ignore_ascii_case(ACCESSION_COLUMN))
            .collect()
    } else {
        Vec::new()
    };

    let mut sources = Vec::with_capacity(staged.len() + 1);
    if extended {
        tracing::debug!("Renaming existing wide table aside");
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {prior};
             ALTER TABLE {wide} RENAME TO {prior};",
            prior = quote_ident(PRIOR_MAPPINGS_TABLE),
            wide = quote_ident(MAPPINGS_TABLE),
        ))
        .map_err(sqlite_err)?;
        sources.push(PRIOR_MAPPINGS_TABLE.to_string());
    }
    sources.extend(staged.iter().map(staging_table));

    build_union(&tx, &sources)?;
    let plan = plan_columns(&prior_columns, &staged);
    create_wide_table(&tx, &plan)?;
    populate_wide_table(&tx, &plan, &staged, extended)?;
    prune_absent_rows(&tx, &plan)?;

    if extended {
        tx.execute_batch(&format!(
            "DROP TABLE {};",
            quote_ident(PRIOR_MAPPINGS_TABLE)
        ))
        .map_err(sqlite_err)?;
    }

    let rows = row_count(&tx, MAPPINGS_TABLE)?;
    let catalog = MetadataCatalog::new(&tx);
    for column in &plan {
        let count = column_value_count(&tx, &column.name)?;
        catalog.drop_case_variants(&column.name)?;
        catalog.set_count(&column.name, count)?;
    }
    catalog.set_count(GENERAL_KEY, rows)?;

    tx.commit().map_err(sqlite_err)?;

    tracing::info!(
        rows,
        columns = plan.len(),
        merged = staged.len(),
        extended,
        "Merged classifications into wide table"
    );

    Ok(MergeReport {
        columns: plan.into_iter().map(|c| c.name).collect(),
        merged: staged,
        rows,
        extended,
    })
}

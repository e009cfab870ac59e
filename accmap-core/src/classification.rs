//! Classification names and the identifiers the store reserves.

use crate::error::{AccmapResult, SchemaError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the primary key column in the mapping table.
pub const ACCESSION_COLUMN: &str = "Accession";

/// Catalog key holding the store-wide description and total row count.
pub const GENERAL_KEY: &str = "general";

/// Catalog key holding the edition marker.
pub const EDITION_KEY: &str = "edition";

/// The absence sentinel. Never a valid classification id.
pub const ABSENT: i64 = 0;

const MAX_NAME_LEN: usize = 64;

/// Classification names in common use.
pub mod well_known {
    pub const TAXONOMY: &str = "Taxonomy";
    pub const GTDB: &str = "GTDB";
    pub const EGGNOG: &str = "eggNOG";
    pub const INTERPRO2GO: &str = "INTERPRO2GO";
    pub const SEED: &str = "SEED";
    pub const KEGG: &str = "KEGG";
    pub const EC: &str = "EC";

    pub const ALL: [&str; 7] = [TAXONOMY, GTDB, EGGNOG, INTERPRO2GO, SEED, KEGG, EC];
}

/// Value type of a classification column. Only integers are stored today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Integer,
}

impl ValueType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ValueType::Integer => "INTEGER",
        }
    }
}

/// A validated classification name.
///
/// The name doubles as a physical column name, so it must be a plain
/// identifier: `[A-Za-z_][A-Za-z0-9_]*`, at most 64 characters, and not one
/// of the reserved words `Accession`, `general` or `edition`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassificationName(String);

impl ClassificationName {
    pub fn new(name: impl Into<String>) -> AccmapResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value type of this classification's column.
    pub fn value_type(&self) -> ValueType {
        ValueType::Integer
    }
}

fn validate_name(name: &str) -> Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidClassificationName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("name is empty")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err(invalid("must start with a letter or underscore"))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only letters, digits and underscores are allowed"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("longer than 64 characters"));
    }
    for reserved in [ACCESSION_COLUMN, GENERAL_KEY, EDITION_KEY] {
        if name.eq_ignore_ascii_case(reserved) {
            return Err(invalid("reserved name"));
        }
    }
    Ok(())
}

impl fmt::Display for ClassificationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClassificationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClassificationName {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value)?;
        Ok(Self(value))
    }
}

impl From<ClassificationName> for String {
    fn from(name: ClassificationName) -> Self {
        name.0
    }
}

/// Catalog entry for one classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationInfo {
    pub name: ClassificationName,
    pub description: String,
    pub count: u64,
}

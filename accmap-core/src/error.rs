//! Error types for accmap operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading a classification source file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Cannot read source file {path:?}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Malformed line {line} in {path:?}: {reason}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Errors in table shape or naming, raised before any data is joined.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid classification name {name:?}: {reason}")]
    InvalidClassificationName { name: String, reason: String },

    #[error("Duplicate accession {accession:?} for {classification} at line {line}")]
    DuplicateAccession {
        classification: String,
        accession: String,
        line: usize,
    },

    #[error("Classification {name} already has a column in the mapping table")]
    ClassificationExists { name: String },

    #[error("Mapping table does not exist")]
    MissingMappingTable,

    #[error("Nothing to merge: no staged classifications and no mapping table")]
    NothingToMerge,
}

/// Errors raised when opening a store for lookups.
///
/// Missing or empty files are kept apart from edition mismatches so an
/// operator can tell a deployment problem from a wrong product variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpenError {
    #[error("Store file not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("Store file unreadable: {path:?}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Store file is empty: {path:?}")]
    Empty { path: PathBuf },

    #[error("Not a mapping store: {path:?} ({reason})")]
    NotAStore { path: PathBuf, reason: String },

    #[error("Incompatible store edition in {path:?}: {info}")]
    Incompatible { path: PathBuf, info: String },
}

/// Metadata catalog errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Classification not registered: {name}")]
    NotRegistered { name: String },
}

/// Backend storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("SQLite error: {reason}")]
    Sqlite { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("I/O error on {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all accmap errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccmapError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Open error: {0}")]
    Open(#[from] OpenError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for accmap operations.
pub type AccmapResult<T> = Result<T, AccmapError>;

// =============================================================================
// TESTS
// =============================================================================

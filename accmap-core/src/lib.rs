//! accmap Core - Types, configuration and errors
//!
//! Pure data structures shared by the storage layer and its callers.
//! This crate performs no I/O.

pub mod classification;
pub mod config;
pub mod error;

pub use classification::{
    well_known, ClassificationInfo, ClassificationName, ValueType, ABSENT, ACCESSION_COLUMN,
    EDITION_KEY, GENERAL_KEY,
};
pub use config::{
    edition_line, CompatibilityFilter, HeaderPolicy, StoreConfig, StoreTuning, ValueFilter,
    MAX_SQL_PARAMETERS,
};
pub use error::{
    AccmapError, AccmapResult, CatalogError, ConfigError, OpenError, SchemaError, SourceError,
    StorageError,
};

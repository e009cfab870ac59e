//! accmap Storage - accession to classification lookup store
//!
//! A single SQLite file holding one wide table (`Accession` plus one integer
//! column per classification) and a small metadata catalog.
//!
//! Building is offline and single-writer:
//! 1. [`StoreWriter::stage`] loads each classification source file into its
//!    own staging table.
//! 2. [`StoreWriter::merge`] outer-joins every staging table against the
//!    union of accessions into the wide table.
//! 3. [`StoreWriter::compact`] drops the intermediate tables and vacuums.
//!
//! [`StoreWriter::add_column`] patches one more classification into a merged
//! store. [`MappingStore`] opens the result read-only for lookups.

pub mod accessor;
pub mod adder;
pub mod builder;
pub mod catalog;
pub mod compactor;
pub mod merge;
pub mod schema;
pub mod source;
pub mod writer;

pub use accessor::{LookupStats, MappingStore};
pub use adder::{add_classification_column, AddColumnReport};
pub use builder::{stage_classification, StageReport};
pub use catalog::MetadataCatalog;
pub use compactor::{compact, CompactionReport};
pub use merge::{merge_staged, MergeReport};
pub use source::{SourceReader, SourceRecord};
pub use writer::{build_store, BuildReport, SourceSpec, StoreManifest, StoreWriter};

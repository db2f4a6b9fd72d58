//! tabular-core: Core library for schema-validated tabular record files
//!
//! This library provides functionality to:
//! - Declare per-row schemas with defaults and a pre-validation hook
//! - Load tab-separated files as text and validate them against a schema
//! - Enforce uniqueness of index key columns
//! - Diff, upsert and concatenate tables by index key
//! - Save tables with backup rotation, skipping unchanged content

pub mod backup;
pub mod batch;
pub mod config;
pub mod error;
pub mod parser;
pub mod row;
pub mod schema;
pub mod schemas;
pub mod table;

pub use batch::RecordBatch;
pub use config::SaveOptions;
pub use error::{Error, FieldError, Result, RowError, SchemaError};
pub use parser::{parse_tsv_str, read_tsv};
pub use row::{binding, Binding, Row};
pub use schema::{raw_row, DefaultValue, FieldSpec, FieldType, Presence, RawRow, Record, Schema};
pub use schemas::{
    CurationStatus, CurationStatusRow, CurationStatusTable, Manifest, ManifestRow, ManifestTable,
};
pub use table::{CellValue, Table};

//! Error types for tabular-core

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tabular-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV/TSV parsing error from the csv crate
    #[error("TSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The file does not look like a well-formed tab-separated table
    #[error("failed to load '{path}': {message}")]
    LoadFormat { path: PathBuf, message: String },

    /// A single raw row failed schema validation
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// One or more rows of a table failed schema validation
    #[error("error when validating the {table} file: {}", join_row_errors(.rows))]
    Validation {
        table: String,
        rows: Vec<RowError>,
    },

    /// Index key columns do not uniquely identify a record
    #[error(
        "duplicate records found in the {table} file. Columns {columns:?} must uniquely \
         identify a record. Got duplicates:\n{duplicates}"
    )]
    DuplicateKey {
        table: String,
        columns: Vec<String>,
        duplicates: String,
    },

    /// Columns needed for a comparison are absent
    #[error("the columns {missing:?} are not present in the {table}")]
    MissingColumn { table: String, missing: Vec<String> },

    /// An operation needed exactly one row
    #[error("expected exactly one {table} row, found {rows}")]
    NotSingleRow { table: String, rows: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failure for a single field of a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All field failures collected while validating one raw row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} validation error(s) for {schema}: {}", .errors.len(), join_field_errors(.errors))]
pub struct SchemaError {
    pub schema: &'static str,
    pub errors: Vec<FieldError>,
}

impl SchemaError {
    /// Whether a given field is among the failures
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

/// A schema failure tied to its row position within a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub error: SchemaError,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.error)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_row_errors(rows: &[RowError]) -> String {
    rows.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

//! Row schemas: field declarations and the normalization/validation pipeline
//!
//! A schema describes one row of a tabular file. Raw rows go through
//! [`normalize`] (missing-value handling, then the schema's own
//! [`Schema::before_fields`] hook) and are then coerced field by field.
//! Every failing field is reported, not just the first one.

use crate::error::{FieldError, SchemaError};
use crate::table::CellValue;
use indexmap::IndexMap;

/// An unvalidated row: field name to cell value, in input order
pub type RawRow = IndexMap<String, CellValue>;

/// Build a raw row from `(field, value)` pairs
pub fn raw_row<I, K, V>(pairs: I) -> RawRow
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<CellValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// The declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    /// List of strings
    List,
}

/// Default applied to an optional field left out of a row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Null,
    Boolean(bool),
    Integer(i64),
    String(&'static str),
    EmptyList,
}

impl DefaultValue {
    pub fn to_value(self) -> CellValue {
        match self {
            DefaultValue::Null => CellValue::Empty,
            DefaultValue::Boolean(b) => CellValue::Boolean(b),
            DefaultValue::Integer(i) => CellValue::Integer(i),
            DefaultValue::String(s) => CellValue::String(s.to_string()),
            DefaultValue::EmptyList => CellValue::List(Vec::new()),
        }
    }
}

/// Whether a field must be present
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence {
    Required,
    Optional(DefaultValue),
}

/// A single field declaration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub presence: Presence,
}

impl FieldSpec {
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            presence: Presence::Required,
        }
    }

    pub const fn optional(
        name: &'static str,
        field_type: FieldType,
        default: DefaultValue,
    ) -> Self {
        Self {
            name,
            field_type,
            presence: Presence::Optional(default),
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self.presence, Presence::Required)
    }
}

/// Per-row specification of a tabular file
///
/// Implementors declare their fields and index key as associated constants.
/// `TABLE_NAME` is the CamelCase name used in error messages (it is split into
/// lowercase words, so `CurationStatus` reads as "curation status"), and
/// `ROW_NAME` names the companion single-row type.
pub trait Schema: Sized + 'static {
    const TABLE_NAME: &'static str;
    const ROW_NAME: &'static str;
    const FIELDS: &'static [FieldSpec];
    /// Columns whose joint value must be unique across a table
    const INDEX_COLS: &'static [&'static str];

    /// Model-specific pre-processing, run after missing values are handled
    /// and before field-level coercion.
    fn before_fields(row: RawRow) -> RawRow {
        row
    }

    fn field(name: &str) -> Option<&'static FieldSpec> {
        Self::FIELDS.iter().find(|f| f.name == name)
    }

    fn field_names() -> Vec<&'static str> {
        Self::FIELDS.iter().map(|f| f.name).collect()
    }

    /// Normalize and coerce a raw row into a [`Record`]
    fn validate(raw: RawRow) -> Result<Record, SchemaError> {
        coerce_fields::<Self>(normalize::<Self>(raw))
    }
}

/// Missing-value handling followed by the schema hook
///
/// Optional fields holding a missing value are dropped so their default
/// applies; any other missing value becomes an explicit empty cell, so a
/// required field reports "field required" instead of silently defaulting.
pub fn normalize<S: Schema>(raw: RawRow) -> RawRow {
    let row = raw
        .into_iter()
        .filter_map(|(key, value)| {
            if !value.is_missing() {
                return Some((key, value));
            }
            match S::field(&key) {
                Some(spec) if !spec.is_required() => None,
                _ => Some((key, CellValue::Empty)),
            }
        })
        .collect();
    S::before_fields(row)
}

fn coerce_fields<S: Schema>(mut row: RawRow) -> Result<Record, SchemaError> {
    let mut values = IndexMap::with_capacity(S::FIELDS.len());
    let mut errors = Vec::new();

    for spec in S::FIELDS {
        match (row.shift_remove(spec.name), spec.presence) {
            (None, Presence::Optional(default)) => {
                values.insert(spec.name.to_string(), default.to_value());
            }
            (None | Some(CellValue::Empty), Presence::Required) => {
                errors.push(FieldError::new(spec.name, "field required"));
            }
            (Some(CellValue::Empty), Presence::Optional(_)) => {
                values.insert(spec.name.to_string(), CellValue::Empty);
            }
            (Some(value), _) => match spec.field_type.coerce(value) {
                Ok(coerced) => {
                    values.insert(spec.name.to_string(), coerced);
                }
                Err(message) => errors.push(FieldError::new(spec.name, message)),
            },
        }
    }

    for (extra, _) in row {
        errors.push(FieldError::new(extra, "extra field not permitted"));
    }

    if errors.is_empty() {
        Ok(Record::new(values))
    } else {
        Err(SchemaError {
            schema: S::TABLE_NAME,
            errors,
        })
    }
}

impl FieldType {
    /// Coerce a non-empty value to this type
    pub fn coerce(self, value: CellValue) -> Result<CellValue, String> {
        match (self, value) {
            (FieldType::String, v @ CellValue::String(_)) => Ok(v),
            (FieldType::String, other) => Err(format!(
                "input should be a valid string, got {}",
                other.type_name()
            )),

            (FieldType::Integer, v @ CellValue::Integer(_)) => Ok(v),
            (FieldType::Integer, CellValue::Float(f)) => float_to_int(f)
                .map(CellValue::Integer)
                .ok_or_else(|| format!("input should be a valid integer, got {f}")),
            (FieldType::Integer, CellValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(CellValue::Integer)
                .map_err(|_| format!("input should be a valid integer, got '{s}'")),

            (FieldType::Float, v @ CellValue::Float(_)) => Ok(v),
            (FieldType::Float, CellValue::Integer(i)) => Ok(CellValue::Float(i as f64)),
            (FieldType::Float, CellValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(CellValue::Float)
                .map_err(|_| format!("input should be a valid number, got '{s}'")),

            (FieldType::Boolean, v @ CellValue::Boolean(_)) => Ok(v),
            (FieldType::Boolean, CellValue::Integer(0)) => Ok(CellValue::Boolean(false)),
            (FieldType::Boolean, CellValue::Integer(1)) => Ok(CellValue::Boolean(true)),
            (FieldType::Boolean, CellValue::String(s)) => parse_bool(&s)
                .map(CellValue::Boolean)
                .ok_or_else(|| format!("input should be a valid boolean, got '{s}'")),

            (FieldType::List, v @ CellValue::List(_)) => Ok(v),
            (FieldType::List, CellValue::String(s)) => parse_list(&s)
                .map(CellValue::List)
                .ok_or_else(|| format!("input should be a valid list, got '{s}'")),

            (field_type, other) => Err(format!(
                "input should be {}, got {}",
                field_type.describe(),
                other.type_name()
            )),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldType::String => "a valid string",
            FieldType::Integer => "a valid integer",
            FieldType::Float => "a valid number",
            FieldType::Boolean => "a valid boolean",
            FieldType::List => "a valid list",
        }
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Lists are stored as JSON arrays; older files use `['a', 'b']`.
fn parse_list(s: &str) -> Option<Vec<String>> {
    let trimmed = s.trim();
    if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
        return Some(list);
    }
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        return serde_json::from_str(&trimmed.replace('\'', "\"")).ok();
    }
    None
}

/// One validated row, in schema field order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: IndexMap<String, CellValue>,
}

impl Record {
    pub(crate) fn new(values: IndexMap<String, CellValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.values.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Back to a raw row, e.g. to feed an upsert
    pub fn into_raw(self) -> RawRow {
        self.values
    }
}

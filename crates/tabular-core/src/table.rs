//! Core table types: cell values and the schema-bound [`Table`]

use crate::backup;
use crate::config::SaveOptions;
use crate::error::{Error, Result, RowError};
use crate::parser;
use crate::row::{binding, Row};
use crate::schema::{RawRow, Record, Schema};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A single cell
///
/// Loaded files only ever contain `String` and `Empty` cells; the other
/// variants appear once a schema has coerced a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Empty/null cell
    Empty,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl CellValue {
    /// Wrap raw text from a file, mapping NA tokens to `Empty`
    pub fn from_text(s: &str) -> Self {
        if parser::NA_VALUES.contains(&s) {
            CellValue::Empty
        } else {
            CellValue::String(s.to_string())
        }
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Null-equivalent values: what an empty field reads back as. Lists are
    /// never missing.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Float(f) => f.is_nan(),
            CellValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "null",
            CellValue::Boolean(_) => "boolean",
            CellValue::Integer(_) => "integer",
            CellValue::Float(_) => "float",
            CellValue::String(_) => "string",
            CellValue::List(_) => "list",
        }
    }

    /// Convert to the text written in a file
    pub fn to_string_value(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Boolean(true) => "True".to_string(),
            CellValue::Boolean(false) => "False".to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::String(s) => s.clone(),
            CellValue::List(items) => serde_json::Value::from(items.clone()).to_string(),
        }
    }

    /// Ordering used for sorting: empty cells last, numbers compared across
    /// integer/float, then by type.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => Ordering::Equal,
            (CellValue::Empty, _) => Ordering::Greater,
            (_, CellValue::Empty) => Ordering::Less,
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
            (CellValue::Integer(a), CellValue::Integer(b)) => a.cmp(b),
            (CellValue::Float(a), CellValue::Float(b)) => a.total_cmp(b),
            (CellValue::Integer(a), CellValue::Float(b)) => (*a as f64).total_cmp(b),
            (CellValue::Float(a), CellValue::Integer(b)) => a.total_cmp(&(*b as f64)),
            (CellValue::String(a), CellValue::String(b)) => a.cmp(b),
            (CellValue::List(a), CellValue::List(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            CellValue::Boolean(_) => 0,
            CellValue::Integer(_) | CellValue::Float(_) => 1,
            CellValue::String(_) => 2,
            CellValue::List(_) => 3,
            CellValue::Empty => 4,
        }
    }
}

// Floats compare by bit pattern so cells can key hash maps.
impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => true,
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a == b,
            (CellValue::Integer(a), CellValue::Integer(b)) => a == b,
            (CellValue::Float(a), CellValue::Float(b)) => a.to_bits() == b.to_bits(),
            (CellValue::String(a), CellValue::String(b)) => a == b,
            (CellValue::List(a), CellValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Empty => {}
            CellValue::Boolean(b) => b.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::String(s) => s.hash(state),
            CellValue::List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_value())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<Vec<String>> for CellValue {
    fn from(items: Vec<String>) -> Self {
        CellValue::List(items)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Empty, Into::into)
    }
}

/// An ordered set of rows bound to a schema
///
/// Columns are kept by name; every row has exactly one cell per column.
/// A table loaded without validation may hold columns the schema does not
/// declare, and will hold text cells only.
pub struct Table<S: Schema> {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    schema: PhantomData<fn() -> S>,
}

impl<S: Schema> Table<S> {
    /// Create an empty table with the schema's columns
    pub fn new() -> Self {
        Self::from_parts(
            S::field_names().into_iter().map(str::to_string).collect(),
            Vec::new(),
        )
    }

    fn from_parts(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            columns,
            rows,
            schema: PhantomData,
        }
    }

    /// Same columns, different rows
    fn with_rows(&self, rows: Vec<Vec<CellValue>>) -> Self {
        Self::from_parts(self.columns.clone(), rows)
    }

    /// Build a table from unvalidated rows; columns are the union of the
    /// rows' fields in first-seen order.
    pub fn from_raw_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = RawRow>,
    {
        let raw: Vec<RawRow> = rows.into_iter().collect();
        if raw.is_empty() {
            return Self::new();
        }

        let mut columns: Vec<String> = Vec::new();
        for row in &raw {
            for field in row.keys() {
                if !columns.contains(field) {
                    columns.push(field.clone());
                }
            }
        }

        let rows = raw
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|c| row.shift_remove(c).unwrap_or(CellValue::Empty))
                    .collect()
            })
            .collect();

        Self::from_parts(columns, rows)
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        Self::from_raw_rows(records.into_iter().map(Record::into_raw))
    }

    /// Load a tab-separated file, every cell as text
    pub fn load<P: AsRef<Path>>(path: P, validate: bool) -> Result<Self> {
        let raw = parser::read_tsv(path.as_ref())?;
        let table = Self::from_parsed(raw);
        if validate {
            table.validate()
        } else {
            Ok(table)
        }
    }

    /// Parse tab-separated content held in memory
    pub fn parse(content: &str, source_name: &str, validate: bool) -> Result<Self> {
        let table = Self::from_parsed(parser::parse_tsv_str(content, source_name)?);
        if validate {
            table.validate()
        } else {
            Ok(table)
        }
    }

    fn from_parsed(raw: parser::RawTable) -> Self {
        Self::from_parts(raw.columns, raw.rows)
    }

    /// Human-readable table name, e.g. "curation status"
    pub fn name(&self) -> &'static str {
        binding::<S>().label.as_str()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    fn raw_row_at(&self, idx: usize) -> Option<RawRow> {
        self.rows.get(idx).map(|cells| {
            self.columns
                .iter()
                .cloned()
                .zip(cells.iter().cloned())
                .collect()
        })
    }

    /// Rows as raw field maps, in row order
    pub fn raw_rows(&self) -> impl Iterator<Item = RawRow> + '_ {
        (0..self.rows.len()).filter_map(move |idx| self.raw_row_at(idx))
    }

    /// Rows as records, without running the schema
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.raw_rows().map(Record::new)
    }

    /// The row at `idx`
    pub fn row(&self, idx: usize) -> Option<Row<S>> {
        self.raw_row_at(idx).map(|raw| Row::new(Record::new(raw)))
    }

    /// Reduce a single-row table to its companion row
    pub fn to_row(&self) -> Result<Row<S>> {
        match self.rows.len() {
            1 => self.row(0).ok_or_else(|| Error::NotSingleRow {
                table: self.name().to_string(),
                rows: 0,
            }),
            rows => Err(Error::NotSingleRow {
                table: self.name().to_string(),
                rows,
            }),
        }
    }

    /// Find the row whose index key equals `key`
    pub fn find_by_key(&self, key: &[CellValue]) -> Result<Option<Row<S>>> {
        let positions = self.column_positions(S::INDEX_COLS)?;
        let found = self
            .rows
            .iter()
            .position(|row| project(row, &positions).into_iter().eq(key.iter()));
        Ok(found.and_then(|idx| self.row(idx)))
    }

    fn column_positions(&self, cols: &[&str]) -> Result<Vec<usize>> {
        let mut positions = Vec::with_capacity(cols.len());
        let mut missing = Vec::new();
        for col in cols {
            match self.column_index(col) {
                Some(idx) => positions.push(idx),
                None => missing.push(col.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(positions)
        } else {
            Err(Error::MissingColumn {
                table: self.name().to_string(),
                missing,
            })
        }
    }

    /// Validate every row against the schema, then check index uniqueness
    ///
    /// Returns a rebuilt table holding the coerced values, columns in schema
    /// order. All failing rows are reported together.
    pub fn validate(&self) -> Result<Self> {
        let mut records = Vec::with_capacity(self.rows.len());
        let mut failures = Vec::new();

        for (row, raw) in self.raw_rows().enumerate() {
            match S::validate(raw) {
                Ok(record) => records.push(record),
                Err(error) => failures.push(RowError { row, error }),
            }
        }

        if !failures.is_empty() {
            return Err(Error::Validation {
                table: self.name().to_string(),
                rows: failures,
            });
        }

        let validated = Self::from_records(records);

        let duplicates = validated.find_duplicates(None)?;
        if !duplicates.is_empty() {
            return Err(Error::DuplicateKey {
                table: self.name().to_string(),
                columns: S::INDEX_COLS.iter().map(|c| c.to_string()).collect(),
                duplicates: duplicates.to_string(),
            });
        }

        log::debug!("validated {} {} rows", validated.len(), self.name());
        Ok(validated)
    }

    /// Every row whose projection onto `cols` (default: the index key) is
    /// shared with at least one other row
    pub fn find_duplicates(&self, cols: Option<&[&str]>) -> Result<Self> {
        let positions = self.column_positions(cols.unwrap_or(S::INDEX_COLS))?;

        let mut counts: HashMap<Vec<&CellValue>, usize> = HashMap::new();
        for row in &self.rows {
            *counts.entry(project(row, &positions)).or_default() += 1;
        }

        let rows = self
            .rows
            .iter()
            .filter(|row| {
                counts
                    .get(&project(row, &positions))
                    .is_some_and(|&n| n > 1)
            })
            .cloned()
            .collect();

        Ok(self.with_rows(rows))
    }

    /// Rows of `self` whose `cols` projection (default: the index key) does
    /// not occur in `other`
    pub fn get_diff<T: Schema>(&self, other: &Table<T>, cols: Option<&[&str]>) -> Result<Self> {
        let cols = cols.unwrap_or(S::INDEX_COLS);
        let own = self.column_positions(cols)?;
        let theirs = other.column_positions(cols)?;

        let other_keys: HashSet<Vec<&CellValue>> =
            other.rows.iter().map(|row| project(row, &theirs)).collect();

        let rows = self
            .rows
            .iter()
            .filter(|row| !other_keys.contains(&project(row, &own)))
            .cloned()
            .collect();

        Ok(self.with_rows(rows))
    }

    /// Upsert raw records by index key
    ///
    /// An existing row only has the non-key fields the record supplies
    /// overwritten; a new key is appended as a full row. Updates are applied
    /// to a working copy, so on error the table is left as it was.
    pub fn add_or_update_records<I>(&mut self, records: I, validate: bool) -> Result<&mut Self>
    where
        I: IntoIterator<Item = RawRow>,
    {
        let key_positions = self.column_positions(S::INDEX_COLS)?;
        let mut columns = self.columns.clone();
        let mut rows = self.rows.clone();
        let mut by_key: HashMap<Vec<CellValue>, usize> = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (project(row, &key_positions).into_iter().cloned().collect(), idx))
            .collect();

        let (mut added, mut updated) = (0, 0);
        for raw in records {
            let supplied: Vec<String> = raw.keys().cloned().collect();
            let record = if validate {
                S::validate(raw)?.into_raw()
            } else {
                raw
            };

            let missing: Vec<String> = S::INDEX_COLS
                .iter()
                .filter(|col| !record.contains_key(**col))
                .map(|col| col.to_string())
                .collect();
            if !missing.is_empty() {
                return Err(Error::MissingColumn {
                    table: format!("{} record", self.name()),
                    missing,
                });
            }
            let key: Vec<CellValue> = S::INDEX_COLS
                .iter()
                .filter_map(|col| record.get(*col).cloned())
                .collect();

            for field in record.keys() {
                if !columns.contains(field) {
                    columns.push(field.clone());
                    rows.iter_mut().for_each(|row| row.push(CellValue::Empty));
                }
            }

            match by_key.get(&key) {
                Some(&idx) => {
                    for field in &supplied {
                        if S::INDEX_COLS.contains(&field.as_str()) {
                            continue;
                        }
                        let col = columns.iter().position(|c| c == field);
                        if let (Some(col), Some(value)) = (col, record.get(field)) {
                            rows[idx][col] = value.clone();
                        }
                    }
                    updated += 1;
                }
                None => {
                    let row = columns
                        .iter()
                        .map(|c| record.get(c).cloned().unwrap_or(CellValue::Empty))
                        .collect();
                    by_key.insert(key, rows.len());
                    rows.push(row);
                    added += 1;
                }
            }
        }

        self.columns = columns;
        self.rows = rows;
        log::debug!("{}: added {added} row(s), updated {updated}", self.name());
        Ok(self)
    }

    /// Row-wise union; with `validate`, the union is re-validated so index
    /// collisions across the two sides are caught
    pub fn concatenate(&self, other: &Self, validate: bool) -> Result<Self> {
        let mut columns = self.columns.clone();
        for col in &other.columns {
            if !columns.contains(col) {
                columns.push(col.clone());
            }
        }

        let mut rows = self.aligned_rows(&columns);
        rows.extend(other.aligned_rows(&columns));
        let concatenated = Self::from_parts(columns, rows);

        if validate {
            concatenated.validate()
        } else {
            Ok(concatenated)
        }
    }

    /// Rows reordered (and padded) to match `columns`
    fn aligned_rows(&self, columns: &[String]) -> Vec<Vec<CellValue>> {
        let mapping: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();
        self.rows
            .iter()
            .map(|row| {
                mapping
                    .iter()
                    .map(|idx| {
                        idx.and_then(|i| row.get(i).cloned())
                            .unwrap_or(CellValue::Empty)
                    })
                    .collect()
            })
            .collect()
    }

    /// Structural equality ignoring row and column order
    pub fn equals(&self, other: &Self) -> bool {
        if self.rows.len() != other.rows.len() || self.columns.len() != other.columns.len() {
            return false;
        }
        let own: HashSet<&String> = self.columns.iter().collect();
        if !other.columns.iter().all(|c| own.contains(c)) {
            return false;
        }

        let theirs = other.aligned_rows(&self.columns);
        let mut counts: HashMap<&Vec<CellValue>, isize> = HashMap::new();
        for row in &self.rows {
            *counts.entry(row).or_default() += 1;
        }
        for row in &theirs {
            *counts.entry(row).or_default() -= 1;
        }
        counts.values().all(|&n| n == 0)
    }

    /// Canonical order: index key columns ascending
    pub fn sort_values(&self) -> Result<Self> {
        self.sort_by(S::INDEX_COLS, true)
    }

    /// Stable sort on `cols`; empty cells always sort last
    pub fn sort_by(&self, cols: &[&str], ascending: bool) -> Result<Self> {
        let positions = self.column_positions(cols)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            positions
                .iter()
                .map(|&p| {
                    let (x, y) = (&a[p], &b[p]);
                    let ord = x.sort_cmp(y);
                    if ascending || x.is_empty() || y.is_empty() {
                        ord
                    } else {
                        ord.reverse()
                    }
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(self.with_rows(rows))
    }

    /// Render as tab-separated text with a header line
    pub fn to_tsv_string(&self) -> Result<String> {
        parser::write_tsv(&self.columns, &self.rows)
    }

    /// Save with backup rotation, skipping the write when the file on disk
    /// already holds the same content
    ///
    /// The existing-file comparison is best effort: unless
    /// `strict_existing_check` is set, any failure to load the current file
    /// counts as "nothing to compare against". The check and the write are
    /// not atomic; concurrent writers to the same path may race.
    pub fn save_with_backup<P: AsRef<Path>>(
        &self,
        path: P,
        options: &SaveOptions,
    ) -> Result<Option<PathBuf>> {
        let path = path.as_ref();
        let new = if options.sort {
            self.sort_values()?
        } else {
            self.clone()
        };

        let content = new.to_tsv_string()?;
        if path.exists() {
            match new.matches_existing(path, &content, options) {
                Ok(true) => {
                    log::debug!("{} is unchanged, not writing", path.display());
                    return Ok(None);
                }
                Ok(false) => {}
                Err(err) if options.strict_existing_check && is_unexpected_io(&err) => {
                    return Err(err);
                }
                Err(err) => {
                    log::debug!("not comparing with existing {}: {err}", path.display());
                }
            }
        }

        backup::save(
            &content,
            path,
            options.backup_dir.as_deref(),
            options.use_relative_path,
            options.dry_run,
        )
    }

    /// Whether the file at `path` already holds this table. Row order only
    /// counts under `order_sensitive`, where the file text must match
    /// `content` exactly.
    fn matches_existing(&self, path: &Path, content: &str, options: &SaveOptions) -> Result<bool> {
        if options.order_sensitive {
            let current = fs::read_to_string(path).map_err(|e| Error::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;
            return Ok(current == content);
        }

        let existing = Self::load(path, true)?;
        let existing = if options.sort {
            existing.sort_values()?
        } else {
            existing
        };
        Ok(self.equals(&existing))
    }
}

fn project<'a>(row: &'a [CellValue], positions: &[usize]) -> Vec<&'a CellValue> {
    positions.iter().filter_map(|&p| row.get(p)).collect()
}

fn is_unexpected_io(err: &Error) -> bool {
    let source = match err {
        Error::FileRead { source, .. } | Error::Io(source) => source,
        Error::Csv { source, .. } => match source.kind() {
            csv::ErrorKind::Io(source) => source,
            _ => return false,
        },
        _ => return false,
    };
    source.kind() != std::io::ErrorKind::NotFound
}

impl<S: Schema> Default for Table<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Schema> Clone for Table<S> {
    fn clone(&self) -> Self {
        Self::from_parts(self.columns.clone(), self.rows.clone())
    }
}

impl<S: Schema> fmt::Debug for Table<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::TABLE_NAME)
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .finish()
    }
}

/// Tab-joined rendering used in messages
impl<S: Schema> fmt::Display for Table<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(CellValue::to_string_value).collect();
            write!(f, "\n{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::raw_row;
    use crate::schema::tests::Example;
    use tempfile::TempDir;

    fn example(rows: &[(&str, &str, &str)]) -> Table<Example> {
        Table::from_raw_rows(rows.iter().map(|(id, name, value)| {
            raw_row([
                ("id", CellValue::from_text(id)),
                ("name", CellValue::from_text(name)),
                ("value", CellValue::from_text(value)),
            ])
        }))
    }

    #[test]
    fn test_cell_value_from_text() {
        assert_eq!(CellValue::from_text(""), CellValue::Empty);
        assert_eq!(CellValue::from_text("NA"), CellValue::Empty);
        assert_eq!(CellValue::from_text("nan"), CellValue::Empty);
        assert_eq!(
            CellValue::from_text("42"),
            CellValue::String("42".to_string())
        );
        assert_eq!(
            CellValue::from_text(" padded "),
            CellValue::String(" padded ".to_string())
        );
    }

    #[test]
    fn test_cell_value_equality_is_type_strict() {
        assert_ne!(CellValue::Integer(1), CellValue::String("1".to_string()));
        assert_ne!(CellValue::Integer(1), CellValue::Float(1.0));
        assert_eq!(CellValue::Float(f64::NAN), CellValue::Float(f64::NAN));
    }

    #[test]
    fn test_cell_value_is_missing() {
        assert!(CellValue::Empty.is_missing());
        assert!(CellValue::Float(f64::NAN).is_missing());
        assert!(CellValue::String(String::new()).is_missing());
        assert!(!CellValue::from("0").is_missing());
        assert!(!CellValue::List(Vec::new()).is_missing());
    }

    #[test]
    fn test_cell_value_json() {
        let row: RawRow = serde_json::from_str(
            r#"{"id": "1", "count": 3, "ratio": 0.5, "ok": true, "tags": ["a"], "note": null}"#,
        )
        .unwrap();
        assert_eq!(row["count"], CellValue::Integer(3));
        assert_eq!(row["ratio"], CellValue::Float(0.5));
        assert_eq!(row["ok"], CellValue::Boolean(true));
        assert_eq!(row["tags"], CellValue::List(vec!["a".to_string()]));
        assert_eq!(row["note"], CellValue::Empty);
    }

    #[test]
    fn test_empty_table_has_schema_columns() {
        let table = Table::<Example>::new();
        assert!(table.is_empty());
        assert_eq!(table.columns(), ["id", "name", "value"]);

        let parsed = Table::<Example>::parse("", "empty.tsv", false);
        assert!(parsed.is_err());

        let from_nothing = Table::<Example>::from_raw_rows(Vec::new());
        assert_eq!(from_nothing.columns().len(), 3);
    }

    #[test]
    fn test_load_reads_text_only() {
        let table =
            Table::<Example>::parse("id\tname\tvalue\n1\tA\t10\n2\t\tNA\n", "t.tsv", false)
                .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "value"), Some(&CellValue::String("10".to_string())));
        assert_eq!(table.cell(1, "name"), Some(&CellValue::Empty));
        assert_eq!(table.cell(1, "value"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_parse_rejects_empty_content() {
        let err = Table::<Example>::parse("", "empty.tsv", false).unwrap_err();
        assert!(matches!(err, Error::LoadFormat { .. }), "unexpected error: {err}");
    }

    #[test]
    fn test_load_rejects_comma_separated() {
        let err = Table::<Example>::parse("id,name,value\n1,A,10\n", "t.tsv", false).unwrap_err();
        assert!(matches!(err, Error::LoadFormat { .. }));
        assert!(err.to_string().contains("tabs"));
    }

    #[test]
    fn test_validate_reports_duplicates() {
        let table = example(&[("1", "A", "10"), ("1", "B", "20"), ("2", "C", "30")]);
        let err = table.validate().unwrap_err();

        match err {
            Error::DuplicateKey {
                table,
                columns,
                duplicates,
            } => {
                assert_eq!(table, "example table");
                assert_eq!(columns, vec!["id".to_string()]);
                assert!(duplicates.contains("1\tA\t10"));
                assert!(duplicates.contains("1\tB\t20"));
                assert!(!duplicates.contains("2\tC\t30"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_collects_all_row_errors() {
        let table = example(&[("", "A", "10"), ("2", "B", "20"), ("", "C", "30")]);
        match table.validate().unwrap_err() {
            Error::Validation { table, rows } => {
                assert_eq!(table, "example table");
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].row, 0);
                assert_eq!(rows[1].row, 2);
                assert!(rows[0].error.has_field("id"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_is_idempotent() {
        let table = example(&[("2", "B", ""), ("1", "A", "10")]);
        let once = table.validate().unwrap();
        let twice = once.validate().unwrap();
        assert!(once.equals(&twice));
        assert_eq!(once.columns(), ["id", "name", "value"]);
    }

    #[test]
    fn test_validate_rejects_unknown_columns() {
        let table =
            Table::<Example>::parse("id\tname\tcolour\n1\tA\tred\n", "t.tsv", false).unwrap();
        match table.validate().unwrap_err() {
            Error::Validation { rows, .. } => assert!(rows[0].error.has_field("colour")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_find_duplicates_returns_whole_groups() {
        let table = example(&[
            ("1", "A", "10"),
            ("2", "B", "20"),
            ("1", "C", "30"),
            ("3", "B", "40"),
        ]);

        assert_eq!(table.find_duplicates(None).unwrap().len(), 2);
        assert_eq!(table.find_duplicates(Some(&["name"][..])).unwrap().len(), 2);
        assert!(table.find_duplicates(Some(&["id", "name"][..])).unwrap().is_empty());
        assert!(table.find_duplicates(Some(&["missing"][..])).is_err());
    }

    #[test]
    fn test_get_diff() {
        let left = example(&[("1", "A", "10"), ("2", "B", "20"), ("3", "C", "30")]);
        let right = example(&[("2", "X", "99")]);

        let diff = left.get_diff(&right, None).unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.cell(0, "id"), Some(&CellValue::from("1")));
        assert_eq!(diff.cell(1, "id"), Some(&CellValue::from("3")));

        assert!(left.get_diff(&left, None).unwrap().is_empty());
        assert!(left
            .get_diff(&Table::<Example>::new(), None)
            .unwrap()
            .equals(&left));

        // compare on a non-key column
        let by_name = left.get_diff(&right, Some(&["name"][..])).unwrap();
        assert_eq!(by_name.len(), 3);
    }

    #[test]
    fn test_get_diff_missing_column() {
        let left = example(&[("1", "A", "10")]);
        let right =
            Table::<Example>::parse("name\tvalue\nA\t10\n", "right.tsv", false).unwrap();

        match left.get_diff(&right, None).unwrap_err() {
            Error::MissingColumn { table, missing } => {
                assert_eq!(table, "example table");
                assert_eq!(missing, vec!["id".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_upsert_updates_only_supplied_fields() {
        let mut table = example(&[("1", "A", "10")]).validate().unwrap();
        table
            .add_or_update_records([raw_row([("id", "1"), ("name", "X")])], true)
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "name"), Some(&CellValue::from("X")));
        assert_eq!(table.cell(0, "value"), Some(&CellValue::from("10")));
    }

    #[test]
    fn test_upsert_appends_new_key() {
        let mut table = example(&[("1", "A", "10")]).validate().unwrap();
        table
            .add_or_update_records([raw_row([("id", "2"), ("name", "Y")])], true)
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, "id"), Some(&CellValue::from("2")));
        assert_eq!(table.cell(1, "name"), Some(&CellValue::from("Y")));
        assert_eq!(table.cell(1, "value"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_upsert_many_records() {
        let mut table = example(&[("1", "A", "10")]).validate().unwrap();
        table
            .add_or_update_records(
                [
                    raw_row([("id", "2"), ("name", "B")]),
                    raw_row([("id", "2"), ("value", "20")]),
                    raw_row([("id", "1"), ("value", "11")]),
                ],
                true,
            )
            .unwrap();

        assert_eq!(table.len(), 2);
        let row = table.find_by_key(&[CellValue::from("2")]).unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&CellValue::from("B")));
        assert_eq!(row.get("value"), Some(&CellValue::from("20")));
        assert_eq!(table.cell(0, "value"), Some(&CellValue::from("11")));
    }

    #[test]
    fn test_upsert_failure_leaves_table_untouched() {
        let mut table = example(&[("1", "A", "10")]).validate().unwrap();
        let result = table.add_or_update_records(
            [
                raw_row([("id", "2"), ("name", "B")]),
                raw_row([("name", "no id")]),
            ],
            true,
        );

        assert!(result.is_err());
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "name"), Some(&CellValue::from("A")));
    }

    #[test]
    fn test_upsert_without_validation_requires_key() {
        let mut table = example(&[("1", "A", "10")]);
        let err = table
            .add_or_update_records([raw_row([("name", "B")])], false)
            .unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }

    #[test]
    fn test_concatenate() {
        let left = example(&[("1", "A", "10")]);
        let right = example(&[("2", "B", "20")]);

        let both = left.concatenate(&right, true).unwrap();
        assert_eq!(both.len(), 2);

        let clash = example(&[("1", "C", "30")]);
        assert!(left.validate().is_ok());
        assert!(clash.validate().is_ok());
        let err = left.concatenate(&clash, true).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));

        // without validation the collision is kept
        assert_eq!(left.concatenate(&clash, false).unwrap().len(), 2);
    }

    #[test]
    fn test_concatenate_aligns_columns() {
        let left = example(&[("1", "A", "10")]);
        let right = Table::<Example>::parse("value\tid\n20\t2\n", "r.tsv", false).unwrap();

        let both = left.concatenate(&right, false).unwrap();
        assert_eq!(both.columns(), ["id", "name", "value"]);
        assert_eq!(both.cell(1, "id"), Some(&CellValue::from("2")));
        assert_eq!(both.cell(1, "name"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_equals_ignores_order_but_not_types() {
        let a = example(&[("1", "A", "10"), ("2", "B", "20")]);
        let b = example(&[("2", "B", "20"), ("1", "A", "10")]);
        assert!(a.equals(&b));

        let reordered =
            Table::<Example>::parse("value\tname\tid\n20\tB\t2\n10\tA\t1\n", "r.tsv", false)
                .unwrap();
        assert!(a.equals(&reordered));

        let c = example(&[("1", "A", "10"), ("2", "B", "21")]);
        assert!(!a.equals(&c));

        let d = example(&[("1", "A", "10"), ("1", "A", "10")]);
        let e = example(&[("1", "A", "10"), ("2", "B", "20")]);
        assert!(!d.equals(&e));
    }

    #[test]
    fn test_sort_values() {
        let table = example(&[("b", "", ""), ("a", "", ""), ("c", "", "")]);
        let sorted = table.sort_values().unwrap();
        let ids: Vec<String> = sorted
            .records()
            .map(|r| r.get("id").map(CellValue::to_string_value).unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let by_value = example(&[("1", "", "5"), ("2", "", ""), ("3", "", "7")])
            .sort_by(&["value"], false)
            .unwrap();
        assert_eq!(by_value.cell(0, "id"), Some(&CellValue::from("3")));
        assert_eq!(by_value.cell(2, "id"), Some(&CellValue::from("2")));
    }

    #[test]
    fn test_to_row_and_back() {
        let table = example(&[("1", "A", "10"), ("2", "B", "20")]);
        assert!(matches!(
            table.to_row(),
            Err(Error::NotSingleRow { rows: 2, .. })
        ));

        let single = table.get_diff(&example(&[("2", "", "")]), None).unwrap();
        let row = single.to_row().unwrap();
        assert_eq!(row.get("name"), Some(&CellValue::from("A")));

        let expanded: Table<Example> = row.to_table();
        assert!(expanded.equals(&single));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.tsv");
        let table = example(&[("2", "B", ""), ("1", "A", "10")])
            .validate()
            .unwrap();

        let written = table.save_with_backup(&path, &SaveOptions::default()).unwrap();
        assert!(written.is_some());

        let loaded = Table::<Example>::load(&path, true).unwrap();
        assert!(loaded.equals(&table));
        // saved sorted on the index key
        assert_eq!(loaded.cell(0, "id"), Some(&CellValue::from("1")));
    }

    #[test]
    fn test_save_twice_skips_second_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.tsv");
        let table = example(&[("1", "A", "10")]).validate().unwrap();

        let first = table.save_with_backup(&path, &SaveOptions::default()).unwrap();
        let second = table.save_with_backup(&path, &SaveOptions::default()).unwrap();
        assert!(first.is_some());
        assert!(second.is_none());

        let mut changed = table.clone();
        changed
            .add_or_update_records([raw_row([("id", "1"), ("value", "11")])], true)
            .unwrap();
        let third = changed.save_with_backup(&path, &SaveOptions::default()).unwrap();
        assert!(third.is_some());
        assert_ne!(first, third);
    }

    #[test]
    fn test_save_overwrites_unreadable_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.tsv");
        std::fs::write(&path, "id,name\n1,A\n").unwrap();

        let table = example(&[("1", "A", "10")]).validate().unwrap();
        let written = table.save_with_backup(&path, &SaveOptions::default()).unwrap();
        assert!(written.is_some());
        assert!(Table::<Example>::load(&path, true).unwrap().equals(&table));
    }

    #[cfg(unix)]
    #[test]
    fn test_strict_existing_check_propagates_io_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.tsv");
        std::fs::create_dir(&path).unwrap();

        let table = example(&[("1", "A", "10")]).validate().unwrap();
        let strict = SaveOptions {
            strict_existing_check: true,
            ..SaveOptions::default()
        };
        let err = table.save_with_backup(&path, &strict).unwrap_err();
        assert!(is_unexpected_io(&err), "unexpected error: {err}");
    }

    #[test]
    fn test_strict_existing_check_tolerates_bad_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.tsv");
        std::fs::write(&path, "id,name\n1,A\n").unwrap();

        let table = example(&[("1", "A", "10")]).validate().unwrap();
        let strict = SaveOptions {
            strict_existing_check: true,
            ..SaveOptions::default()
        };
        assert!(table.save_with_backup(&path, &strict).unwrap().is_some());
    }

    #[test]
    fn test_save_blank_string_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.tsv");
        let mut table = Table::<Example>::new();
        table
            .add_or_update_records([raw_row([("id", "1"), ("name", "")])], true)
            .unwrap();
        assert_eq!(table.cell(0, "name"), Some(&CellValue::Empty));

        let first = table.save_with_backup(&path, &SaveOptions::default()).unwrap();
        let second = table.save_with_backup(&path, &SaveOptions::default()).unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(Table::<Example>::load(&path, true).unwrap().equals(&table));
    }

    #[test]
    fn test_order_sensitive_save_rewrites_reordered_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.tsv");
        std::fs::write(&path, "id\tname\tvalue\nb\tB\t\na\tA\t\n").unwrap();

        let sorted = Table::<Example>::load(&path, true)
            .unwrap()
            .sort_by(&["id"], true)
            .unwrap();
        let options = SaveOptions {
            sort: false,
            order_sensitive: true,
            ..SaveOptions::default()
        };

        // row order alone does not count as a change by default
        let unordered = SaveOptions {
            sort: false,
            ..SaveOptions::default()
        };
        assert!(sorted.save_with_backup(&path, &unordered).unwrap().is_none());

        assert!(sorted.save_with_backup(&path, &options).unwrap().is_some());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "id\tname\tvalue\na\tA\t\nb\tB\t\n"
        );
        assert!(sorted.save_with_backup(&path, &options).unwrap().is_none());
    }

    #[test]
    fn test_save_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.tsv");
        let table = example(&[("1", "A", "10")]).validate().unwrap();
        let options = SaveOptions {
            dry_run: true,
            ..SaveOptions::default()
        };

        let written = table.save_with_backup(&path, &options).unwrap();
        assert!(written.is_some());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

//! Companion single-row type for each table schema
//!
//! Slicing a [`Table`] down to one row yields a [`Row`] of the same schema,
//! and expanding a row yields that schema's table again. The descriptive
//! side of this pairing (names, labels, fields) is resolved once per schema
//! type and kept in a process-wide registry.

use crate::schema::{RawRow, Record, Schema};
use crate::table::{CellValue, Table};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Static description of a schema's table/row pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub table_name: &'static str,
    pub row_name: &'static str,
    /// Table name split into lowercase words, for messages
    pub label: String,
    pub fields: Vec<&'static str>,
    pub index_cols: &'static [&'static str],
}

impl Binding {
    fn of<S: Schema>() -> Self {
        Self {
            table_name: S::TABLE_NAME,
            row_name: S::ROW_NAME,
            label: split_camel_case(S::TABLE_NAME),
            fields: S::field_names(),
            index_cols: S::INDEX_COLS,
        }
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<TypeId, &'static Binding>>> = OnceLock::new();

/// The binding for `S`, registered on first use
pub fn binding<S: Schema>() -> &'static Binding {
    let registry = REGISTRY.get_or_init(Default::default);
    let mut bindings = registry.lock().unwrap_or_else(PoisonError::into_inner);
    *bindings.entry(TypeId::of::<S>()).or_insert_with(|| {
        log::trace!("registering {} / {}", S::TABLE_NAME, S::ROW_NAME);
        let leaked: &'static Binding = Box::leak(Box::new(Binding::of::<S>()));
        leaked
    })
}

/// Number of schemas registered so far
#[cfg(test)]
fn registered_count() -> usize {
    REGISTRY
        .get()
        .map(|r| r.lock().unwrap_or_else(PoisonError::into_inner).len())
        .unwrap_or(0)
}

fn split_camel_case(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for ch in name.chars() {
        if ch.is_uppercase() || words.is_empty() {
            words.push(String::new());
        }
        if let Some(word) = words.last_mut() {
            word.extend(ch.to_lowercase());
        }
    }
    words.join(" ")
}

/// One row of a `Table<S>`
pub struct Row<S: Schema> {
    record: Record,
    schema: PhantomData<fn() -> S>,
}

impl<S: Schema> Row<S> {
    pub(crate) fn new(record: Record) -> Self {
        Self {
            record,
            schema: PhantomData,
        }
    }

    /// Validate a raw row into a companion row
    pub fn from_raw(raw: RawRow) -> crate::Result<Self> {
        Ok(Self::new(S::validate(raw)?))
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.record.get(field)
    }

    /// Index key values, in index column order
    pub fn key(&self) -> Vec<CellValue> {
        S::INDEX_COLS
            .iter()
            .map(|col| self.get(col).cloned().unwrap_or(CellValue::Empty))
            .collect()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_raw(self) -> RawRow {
        self.record.into_raw()
    }

    pub fn binding(&self) -> &'static Binding {
        binding::<S>()
    }

    /// Expand back into a one-row table of the same schema
    pub fn to_table(&self) -> Table<S> {
        Table::from_records([self.record.clone()])
    }
}

impl<S: Schema> Clone for Row<S> {
    fn clone(&self) -> Self {
        Self::new(self.record.clone())
    }
}

impl<S: Schema> PartialEq for Row<S> {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl<S: Schema> fmt::Debug for Row<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(S::ROW_NAME).field(&self.record).finish()
    }
}

impl<S: Schema> fmt::Display for Row<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .record
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        write!(f, "{}({})", S::ROW_NAME, fields.join(", "))
    }
}

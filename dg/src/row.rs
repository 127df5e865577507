//! Raw and typed row representations
//!
//! A [`RawRow`] is what the staging scan produced: column name to original
//! text (or null). A [`TypedRow`] is what the caster produced from it: field
//! name to typed [`Value`] (or null). The two never convert into each other
//! except through [`crate::cast`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rusqlite::ToSql;
use rusqlite::types::ToSqlOutput;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A typed destination value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Money(Decimal),
    Date(NaiveDate),
}

impl Value {
    /// Exact numeric view; `None` for text, dates and floats outside `Decimal`
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Float(f) => Decimal::from_f64(*f),
            Value::Money(d) => Some(*d),
            Value::Text(_) | Value::Date(_) => None,
        }
    }

    /// Approximate numeric view; `None` for text and dates
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Money(d) => d.to_f64(),
            Value::Text(_) | Value::Date(_) => None,
        }
    }

    /// Order of a numeric value against a range bound
    ///
    /// Exact when both sides fit in `Decimal`, otherwise compared as `f64`.
    /// `None` for non-numeric values and NaN bounds.
    pub fn compare_bound(&self, bound: f64) -> Option<Ordering> {
        if let Value::Float(f) = self {
            return f.partial_cmp(&bound);
        }
        match (self.as_decimal(), Decimal::from_f64(bound)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => self.as_f64()?.partial_cmp(&bound),
        }
    }

    /// Compare two values of compatible kinds
    ///
    /// Numbers compare across integer/float/money, text with text, dates with
    /// dates. Anything else is incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Money(_), _) | (_, Value::Money(_)) => match (self.as_decimal(), other.as_decimal()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
            },
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Money(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Float(x) => ToSqlOutput::from(*x),
            // Exact decimal text; never routed through f64
            Value::Money(d) => ToSqlOutput::from(d.to_string()),
            Value::Date(d) => ToSqlOutput::from(d.format("%Y-%m-%d").to_string()),
        })
    }
}

/// One staging row, in staging column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    cells: Vec<(String, Option<String>)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and fixtures
    pub fn with(mut self, column: impl Into<String>, value: Option<&str>) -> Self {
        self.push(column, value.map(str::to_string));
        self
    }

    /// Append a cell; a repeated column name replaces the earlier value
    pub fn push(&mut self, column: impl Into<String>, value: Option<String>) {
        let column = column.into();
        if let Some(cell) = self.cells.iter_mut().find(|(c, _)| *c == column) {
            cell.1 = value;
        } else {
            self.cells.push((column, value));
        }
    }

    /// Original text for a column; `None` when the column is absent or null
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sorted-key view used for canonical encodings
    pub fn canonical(&self) -> BTreeMap<&str, Option<&str>> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v.as_deref())).collect()
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// One row after casting, in destination field order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedRow {
    fields: Vec<(String, Option<Value>)>,
}

impl TypedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Option<Value>) {
        let field = field.into();
        if let Some(slot) = self.fields.iter_mut().find(|(f, _)| *f == field) {
            slot.1 = value;
        } else {
            self.fields.push((field, value));
        }
    }

    /// Typed value of a field; `None` when null or not present
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(f, _)| f == field)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn is_null(&self, field: &str) -> bool {
        self.get(field).is_none()
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match self.get(field) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        match self.get(field) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn float(&self, field: &str) -> Option<f64> {
        match self.get(field) {
            Some(Value::Float(f)) => Some(*f),
            _ => None,
        }
    }

    pub fn money(&self, field: &str) -> Option<Decimal> {
        match self.get(field) {
            Some(Value::Money(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        match self.get(field) {
            Some(Value::Date(d)) => Some(*d),
            _ => None,
        }
    }

    /// Values in field order, nulls included
    pub fn values(&self) -> impl Iterator<Item = Option<&Value>> {
        self.fields.iter().map(|(_, v)| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

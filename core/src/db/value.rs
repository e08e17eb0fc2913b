// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Backend-neutral representation of column values and raw rows.

use crate::db::{DbError, DbResult};
use std::collections::BTreeMap;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// The storage types supported by the columns of our tables.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    /// Boolean flag.  Stored as `BOOLEAN` in PostgreSQL and as an integer in SQLite.
    Bool,

    /// 64-bit signed integer.
    Integer,

    /// Double-precision floating point number.
    Float,

    /// Arbitrary length text.
    Text,

    /// Calendar date without a time component.
    Date,

    /// Instant in time with a UTC offset.
    Timestamp,
}

/// Declaration of a single column of a table or view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Column {
    /// Name of the column, which matches the name of the field in the row type.
    pub name: &'static str,

    /// Storage type of the column.
    pub ty: ColumnType,
}

/// A single value read from or written to the database.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The SQL `NULL`.
    Null,

    /// A boolean flag.
    Bool(bool),

    /// An integer.
    Integer(i64),

    /// A floating point number.
    Float(f64),

    /// A string.
    Text(String),

    /// A calendar date.
    Date(Date),

    /// A timestamp.
    Timestamp(OffsetDateTime),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::Timestamp(t) => write!(f, "{}", t),
        }
    }
}

/// Parses a date in `YYYY-MM-DD` format.
fn parse_date(s: &str) -> Option<Date> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]")).ok()
}

impl Value {
    /// Returns true if this is the SQL `NULL` or an empty string.
    ///
    /// Empty strings are treated as absent primary keys, as user-facing forms submit them for
    /// fields the user left blank.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Converts this value into the representation required by a column of type `ty`.
    ///
    /// The `column` name is only used for error reporting purposes.
    pub fn coerce(self, ty: ColumnType, column: &str) -> DbResult<Value> {
        let converted = match (ty, self) {
            (_, Value::Null) => Some(Value::Null),
            (
                ColumnType::Integer | ColumnType::Float | ColumnType::Date | ColumnType::Timestamp,
                Value::Text(s),
            ) if s.trim().is_empty() => Some(Value::Null),

            (ColumnType::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
            (ColumnType::Bool, Value::Integer(i)) => Some(Value::Bool(i != 0)),
            (ColumnType::Bool, Value::Text(s)) => match s.to_lowercase().as_str() {
                "1" | "t" | "true" => Some(Value::Bool(true)),
                "0" | "f" | "false" | "" => Some(Value::Bool(false)),
                _ => None,
            },

            (ColumnType::Integer, Value::Integer(i)) => Some(Value::Integer(i)),
            (ColumnType::Integer, Value::Bool(b)) => Some(Value::Integer(i64::from(b))),
            (ColumnType::Integer, Value::Float(f)) if f.fract() == 0.0 => {
                Some(Value::Integer(f as i64))
            }
            (ColumnType::Integer, Value::Text(s)) => {
                s.trim().parse::<i64>().ok().map(Value::Integer)
            }

            (ColumnType::Float, Value::Float(f)) => Some(Value::Float(f)),
            (ColumnType::Float, Value::Integer(i)) => Some(Value::Float(i as f64)),
            (ColumnType::Float, Value::Text(s)) => s.trim().parse::<f64>().ok().map(Value::Float),

            (ColumnType::Text, Value::Text(s)) => Some(Value::Text(s)),
            (ColumnType::Text, v @ (Value::Bool(_) | Value::Integer(_) | Value::Float(_))) => {
                Some(Value::Text(v.to_string()))
            }
            (ColumnType::Text, Value::Date(d)) => Some(Value::Text(d.to_string())),

            (ColumnType::Date, Value::Date(d)) => Some(Value::Date(d)),
            (ColumnType::Date, Value::Timestamp(t)) => Some(Value::Date(t.date())),
            (ColumnType::Date, Value::Text(s)) => parse_date(&s).map(Value::Date),

            (ColumnType::Timestamp, Value::Timestamp(t)) => Some(Value::Timestamp(t)),
            (ColumnType::Timestamp, Value::Text(s)) => {
                OffsetDateTime::parse(s.trim(), &Rfc3339).ok().map(Value::Timestamp)
            }

            (_, _) => None,
        };

        match converted {
            Some(value) => Ok(value),
            None => Err(DbError::DataIntegrityError(format!(
                "Cannot represent value as {:?} in column '{}'",
                ty, column
            ))),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Value::Date(d)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(t: OffsetDateTime) -> Self {
        Value::Timestamp(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A raw row represented as a mapping of column names to values.
///
/// This is the input to the hydration of records and views, and it can come either from the
/// database or from any other source of associative data such as a submitted form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataRow(BTreeMap<String, Value>);

impl DataRow {
    /// Adds or replaces the value of `column`.
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, column: K, value: V) {
        self.0.insert(column.into(), value.into());
    }

    /// Builder-style version of `insert`.
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, column: K, value: V) -> Self {
        self.insert(column, value);
        self
    }

    /// Gets the value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of columns in the row.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the columns of the row in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DataRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = DataRow::default();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Conversions between the Rust types used for record fields and database values.
pub trait FieldValue: Sized {
    /// Storage type of the column that backs fields of this type.
    const TYPE: ColumnType;

    /// Converts the field into a database value.
    fn to_value(&self) -> Value;

    /// Creates the field from a database `value`, coercing it as necessary.
    ///
    /// The `column` name is only used for error reporting purposes.
    fn from_value(column: &str, value: Value) -> DbResult<Self>;
}

/// Generates the `FieldValue` implementations for a non-nullable type `$t` and its `Option`.
macro_rules! impl_field_value [
    ( $t:ty, $column_type:ident, $variant:ident, $to:expr ) => {
        impl FieldValue for $t {
            const TYPE: ColumnType = ColumnType::$column_type;

            fn to_value(&self) -> Value {
                #[allow(clippy::redundant_closure_call)]
                Value::$variant(($to)(self))
            }

            fn from_value(column: &str, value: Value) -> DbResult<Self> {
                match value.coerce(Self::TYPE, column)? {
                    Value::$variant(v) => Ok(v),
                    Value::Null => Err(DbError::DataIntegrityError(format!(
                        "Column '{}' cannot be NULL",
                        column
                    ))),
                    _ => unreachable!("Coercion must return the requested type"),
                }
            }
        }

        impl FieldValue for Option<$t> {
            const TYPE: ColumnType = ColumnType::$column_type;

            fn to_value(&self) -> Value {
                match self {
                    #[allow(clippy::redundant_closure_call)]
                    Some(v) => Value::$variant(($to)(v)),
                    None => Value::Null,
                }
            }

            fn from_value(column: &str, value: Value) -> DbResult<Self> {
                match value.coerce(Self::TYPE, column)? {
                    Value::$variant(v) => Ok(Some(v)),
                    Value::Null => Ok(None),
                    _ => unreachable!("Coercion must return the requested type"),
                }
            }
        }
    }
];

impl_field_value!(bool, Bool, Bool, |v: &bool| *v);
impl_field_value!(i64, Integer, Integer, |v: &i64| *v);
impl_field_value!(f64, Float, Float, |v: &f64| *v);
impl_field_value!(String, Text, Text, |v: &String| v.clone());
impl_field_value!(Date, Date, Date, |v: &Date| *v);
impl_field_value!(OffsetDateTime, Timestamp, Timestamp, |v: &OffsetDateTime| *v);

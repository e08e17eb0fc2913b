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

//! Generic persistence operations over table rows.
//!
//! Every table row type implements `Record`, usually via the `record!` macro, which describes
//! the table it lives in and how to convert the row to and from raw `DataRow`s.  The `Table`
//! trait adds the behavior that each model customizes: validation before saving, automatic
//! code generation and the rows to seed when the table is created.
//!
//! All operations are free functions that take an `Executor` so that callers can compose them
//! inside a single transaction.

use crate::db::query::{OrderBy, SqlBuilder, Statement, Where, push_order, push_where};
use crate::db::value::{Column, ColumnType, DataRow, Value};
use crate::db::{DbError, DbResult, Dialect, Executor};
use crate::model::ModelResult;
use log::warn;

/// Structural description of a table row.
pub trait Record: Clone + Default + Send + Sync + 'static {
    /// Name of the table that holds the rows.
    const TABLE_NAME: &'static str;

    /// Name of the column that holds the primary key.
    const PRIMARY_COLUMN: &'static str;

    /// Whether the primary key is an integer assigned by the database on insertion.
    const SERIAL: bool;

    /// Returns all columns of the table, primary key first.
    fn columns() -> &'static [Column];

    /// Returns the value of the primary key.
    fn primary_value(&self) -> Value;

    /// Sets the value of the primary key.
    fn set_primary_value(&mut self, value: Value) -> DbResult<()>;

    /// Converts the record into a raw row with all of its columns.
    fn to_row(&self) -> DataRow;

    /// Copies the values in `data` whose names match a column into the record.
    ///
    /// Columns not present in `data` keep their current values and keys that do not match any
    /// column are ignored.
    fn load_from_data(&mut self, data: &DataRow) -> DbResult<()>;

    /// Creates a new record from its defaults overlaid with `data`.
    fn from_data(data: &DataRow) -> DbResult<Self> {
        let mut record = Self::default();
        record.load_from_data(data)?;
        Ok(record)
    }

    /// Looks up the declaration of the column `name`.
    fn column(name: &str) -> Option<&'static Column> {
        Self::columns().iter().find(|c| c.name == name)
    }
}

/// Behavior that each table row type customizes.
///
/// The `Default` implementation of the type acts as the initializer of new records.
pub trait Table: Record {
    /// Whether an empty text primary key should be replaced by the next numeric code on insert.
    const AUTO_CODE: bool = false;

    /// Validates and sanitizes the record before it is stored.
    fn test(&mut self) -> ModelResult<()> {
        Ok(())
    }

    /// Returns the rows to seed when the table is installed.
    fn install() -> Vec<Self> {
        vec![]
    }
}

/// Declares a struct that represents a table row and implements `Record` for it.
///
/// The first field must be the primary key, marked either as `primary` (keys provided by the
/// caller) or `serial` (integer keys assigned by the database, which must be of type
/// `Option<i64>`).  All fields get a column of the same name.
///
/// The generated type derives `Clone`, `Debug` and `PartialEq` and must implement `Default`
/// separately.
#[macro_export]
macro_rules! record [
    (
        @impl $serial:literal,
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $table:literal {
            $(#[$pk_meta:meta])* $pk:ident: $pk_ty:ty,
            $( $(#[$field_meta:meta])* $field:ident: $field_ty:ty ),*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name {
            $(#[$pk_meta])*
            pub $pk: $pk_ty,
            $( $(#[$field_meta])* pub $field: $field_ty, )*
        }

        impl $crate::db::Record for $name {
            const TABLE_NAME: &'static str = $table;
            const PRIMARY_COLUMN: &'static str = stringify!($pk);
            const SERIAL: bool = $serial;

            fn columns() -> &'static [$crate::db::Column] {
                const COLUMNS: &[$crate::db::Column] = &[
                    $crate::db::Column {
                        name: stringify!($pk),
                        ty: <$pk_ty as $crate::db::FieldValue>::TYPE,
                    },
                    $(
                        $crate::db::Column {
                            name: stringify!($field),
                            ty: <$field_ty as $crate::db::FieldValue>::TYPE,
                        },
                    )*
                ];
                COLUMNS
            }

            fn primary_value(&self) -> $crate::db::Value {
                $crate::db::FieldValue::to_value(&self.$pk)
            }

            fn set_primary_value(&mut self, value: $crate::db::Value) -> $crate::db::DbResult<()> {
                self.$pk = $crate::db::FieldValue::from_value(stringify!($pk), value)?;
                Ok(())
            }

            fn to_row(&self) -> $crate::db::DataRow {
                let mut row = $crate::db::DataRow::default();
                row.insert(stringify!($pk), $crate::db::FieldValue::to_value(&self.$pk));
                $(
                    row.insert(stringify!($field), $crate::db::FieldValue::to_value(&self.$field));
                )*
                row
            }

            fn load_from_data(&mut self, data: &$crate::db::DataRow) -> $crate::db::DbResult<()> {
                if let Some(value) = data.get(stringify!($pk)) {
                    self.$pk = $crate::db::FieldValue::from_value(stringify!($pk), value.clone())?;
                }
                $(
                    if let Some(value) = data.get(stringify!($field)) {
                        self.$field =
                            $crate::db::FieldValue::from_value(stringify!($field), value.clone())?;
                    }
                )*
                Ok(())
            }
        }
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $table:literal {
            $(#[$pk_meta:meta])*
            primary $pk:ident: $pk_ty:ty,
            $( $(#[$field_meta:meta])* $field:ident: $field_ty:ty ),* $(,)?
        }
    ) => {
        $crate::record!(
            @impl false,
            $(#[$meta])* $vis struct $name in $table {
                $(#[$pk_meta])* $pk: $pk_ty,
                $( $(#[$field_meta])* $field: $field_ty ),*
            }
        );
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $table:literal {
            $(#[$pk_meta:meta])*
            serial $pk:ident: $pk_ty:ty,
            $( $(#[$field_meta:meta])* $field:ident: $field_ty:ty ),* $(,)?
        }
    ) => {
        $crate::record!(
            @impl true,
            $(#[$meta])* $vis struct $name in $table {
                $(#[$pk_meta])* $pk: $pk_ty,
                $( $(#[$field_meta])* $field: $field_ty ),*
            }
        );
    };

];

/// Resolves column names of `M` for use in filters and orderings.
fn resolve<M: Record>(column: &str) -> Option<(&'static str, ColumnType)> {
    M::column(column).map(|c| (c.name, c.ty))
}

/// Returns the comma-separated list of all columns of `M`.
fn select_list<M: Record>() -> String {
    M::columns().iter().map(|c| c.name).collect::<Vec<&str>>().join(", ")
}

/// Builds a `SELECT` of all columns of `M` with optional filtering, ordering and pagination.
fn select_statement<M: Record>(
    dialect: Dialect,
    filter: &[Where],
    order: &[OrderBy],
    offset: u64,
    limit: Option<u64>,
) -> DbResult<Statement> {
    let mut builder = SqlBuilder::new(dialect);
    builder.push("SELECT ").push(&select_list::<M>()).push(" FROM ").push(M::TABLE_NAME);
    push_where(&mut builder, &resolve::<M>, M::TABLE_NAME, filter)?;
    push_order(&mut builder, &resolve::<M>, M::TABLE_NAME, order)?;
    builder.push_limit(offset, limit);
    Ok(builder.build())
}

/// Converts raw rows into records of type `M`.
fn hydrate<M: Record>(rows: Vec<DataRow>) -> DbResult<Vec<M>> {
    rows.iter().map(M::from_data).collect()
}

/// Returns the primary key column declaration of `M`.
fn primary_column<M: Record>() -> DbResult<&'static Column> {
    M::column(M::PRIMARY_COLUMN).ok_or_else(|| {
        DbError::BackendError(format!(
            "Primary column '{}' not declared in '{}'",
            M::PRIMARY_COLUMN,
            M::TABLE_NAME
        ))
    })
}

/// Checks whether `record` is stored in the database, as identified by its primary key.
///
/// Records with a `NULL` or empty primary key never exist.
pub async fn exists<M: Record>(ex: &mut Executor, record: &M) -> DbResult<bool> {
    let code = record.primary_value();
    if code.is_empty() {
        return Ok(false);
    }
    Ok(count::<M>(ex, &[Where::eq(M::PRIMARY_COLUMN, code)]).await? > 0)
}

/// Loads the record whose primary key is `code`, if any.
pub async fn load<M: Record, V: Into<Value>>(ex: &mut Executor, code: V) -> DbResult<Option<M>> {
    let code = code.into();
    if code.is_empty() {
        return Ok(None);
    }
    load_where(ex, &[Where::eq(M::PRIMARY_COLUMN, code)], &[]).await
}

/// Loads the record whose primary key is `code` and fails with `NotFound` if there is none.
pub async fn get<M: Record, V: Into<Value>>(ex: &mut Executor, code: V) -> DbResult<M> {
    match load(ex, code).await? {
        Some(record) => Ok(record),
        None => Err(DbError::NotFound),
    }
}

/// Loads the first record that matches `filter` when sorted by `order`, if any.
pub async fn load_where<M: Record>(
    ex: &mut Executor,
    filter: &[Where],
    order: &[OrderBy],
) -> DbResult<Option<M>> {
    let stmt = select_statement::<M>(ex.dialect(), filter, order, 0, Some(1))?;
    match stmt.fetch_optional(ex, M::columns()).await? {
        Some(row) => Ok(Some(M::from_data(&row)?)),
        None => Ok(None),
    }
}

/// Loads all records that match `filter` sorted by `order`, skipping the first `offset` ones
/// and returning at most `limit` of them.
pub async fn all<M: Record>(
    ex: &mut Executor,
    filter: &[Where],
    order: &[OrderBy],
    offset: u64,
    limit: Option<u64>,
) -> DbResult<Vec<M>> {
    let stmt = select_statement::<M>(ex.dialect(), filter, order, offset, limit)?;
    hydrate(stmt.fetch_all(ex, M::columns()).await?)
}

/// Counts the records that match `filter`.
pub async fn count<M: Record>(ex: &mut Executor, filter: &[Where]) -> DbResult<u64> {
    let mut builder = SqlBuilder::new(ex.dialect());
    builder.push("SELECT COUNT(*) AS value FROM ").push(M::TABLE_NAME);
    push_where(&mut builder, &resolve::<M>, M::TABLE_NAME, filter)?;
    row_count(builder.build().fetch_integer(ex).await?)
}

/// Converts the result of a `COUNT(*)` query, which is `None` when there were no rows to count.
pub(crate) fn row_count(count: Option<i64>) -> DbResult<u64> {
    let count = count.unwrap_or(0);
    u64::try_from(count).map_err(|e| DbError::DataIntegrityError(format!("Invalid count: {}", e)))
}

/// Inserts `record` as a new row.
///
/// Records of tables with `AUTO_CODE` and an empty primary key get the next numeric code, and
/// records of serial tables without a primary key get the one assigned by the database.  In
/// both cases, the new key is stored in `record`.
pub async fn insert<M: Table>(ex: &mut Executor, record: &mut M) -> DbResult<()> {
    if M::AUTO_CODE && !M::SERIAL && record.primary_value().is_empty() {
        let code = new_code::<M>(ex).await?;
        record.set_primary_value(Value::Text(code))?;
    }
    let generate_key = M::SERIAL && record.primary_value() == Value::Null;

    let row = record.to_row();
    let columns: Vec<&Column> = M::columns()
        .iter()
        .filter(|c| !(generate_key && c.name == M::PRIMARY_COLUMN))
        .collect();

    let mut builder = SqlBuilder::new(ex.dialect());
    builder.push("INSERT INTO ").push(M::TABLE_NAME).push(" (");
    builder.push(&columns.iter().map(|c| c.name).collect::<Vec<&str>>().join(", "));
    builder.push(") VALUES (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        let value = row.get(column.name).cloned().unwrap_or(Value::Null);
        builder.push_bind(column.name, column.ty, value)?;
    }
    builder.push(")");

    if generate_key {
        builder.push(" RETURNING ").push(M::PRIMARY_COLUMN).push(" AS value");
        match builder.build().fetch_integer(ex).await? {
            Some(id) => record.set_primary_value(Value::Integer(id)),
            None => Err(DbError::BackendError(format!(
                "Insertion into '{}' did not return a key",
                M::TABLE_NAME
            ))),
        }
    } else {
        builder.build().execute(ex).await?;
        Ok(())
    }
}

/// Updates all columns of the row identified by the primary key of `record`.
pub async fn update<M: Record>(ex: &mut Executor, record: &M) -> DbResult<()> {
    let row = record.to_row();
    let primary = primary_column::<M>()?;

    let mut builder = SqlBuilder::new(ex.dialect());
    builder.push("UPDATE ").push(M::TABLE_NAME).push(" SET ");
    let mut first = true;
    for column in M::columns().iter().filter(|c| c.name != M::PRIMARY_COLUMN) {
        if !first {
            builder.push(", ");
        }
        first = false;
        let value = row.get(column.name).cloned().unwrap_or(Value::Null);
        builder.push(column.name).push(" = ");
        builder.push_bind(column.name, column.ty, value)?;
    }
    builder.push(" WHERE ").push(primary.name).push(" = ");
    builder.push_bind(primary.name, primary.ty, record.primary_value())?;

    match builder.build().execute(ex).await? {
        0 => Err(DbError::NotFound),
        _ => Ok(()),
    }
}

/// Validates `record` and then updates it if it exists or inserts it otherwise.
pub async fn save<M: Table>(ex: &mut Executor, record: &mut M) -> DbResult<()> {
    if let Err(e) = record.test() {
        warn!("Refusing to save invalid record into '{}': {}", M::TABLE_NAME, e);
        return Err(DbError::InvalidRecord(e.to_string()));
    }

    if exists(ex, record).await? { update(ex, record).await } else { insert(ex, record).await }
}

/// Deletes the row identified by the primary key of `record`.
pub async fn delete<M: Record>(ex: &mut Executor, record: &M) -> DbResult<()> {
    let code = record.primary_value();
    if code.is_empty() {
        return Err(DbError::NotFound);
    }
    match delete_where::<M>(ex, &[Where::eq(M::PRIMARY_COLUMN, code)]).await? {
        0 => Err(DbError::NotFound),
        _ => Ok(()),
    }
}

/// Deletes all rows that match `filter` and returns how many there were.
pub async fn delete_where<M: Record>(ex: &mut Executor, filter: &[Where]) -> DbResult<u64> {
    let mut builder = SqlBuilder::new(ex.dialect());
    builder.push("DELETE FROM ").push(M::TABLE_NAME);
    push_where(&mut builder, &resolve::<M>, M::TABLE_NAME, filter)?;
    builder.build().execute(ex).await
}

/// Sets the columns in `assignments` on all rows that match `filter` and returns how many
/// there were.
pub async fn update_where<M: Record>(
    ex: &mut Executor,
    assignments: &[(&str, Value)],
    filter: &[Where],
) -> DbResult<u64> {
    if assignments.is_empty() {
        return Ok(0);
    }

    let mut builder = SqlBuilder::new(ex.dialect());
    builder.push("UPDATE ").push(M::TABLE_NAME).push(" SET ");
    for (i, (name, value)) in assignments.iter().enumerate() {
        let column = M::column(name).ok_or_else(|| {
            DbError::BackendError(format!("Unknown column '{}' in '{}'", name, M::TABLE_NAME))
        })?;
        if i > 0 {
            builder.push(", ");
        }
        builder.push(column.name).push(" = ");
        builder.push_bind(column.name, column.ty, value.clone())?;
    }
    push_where(&mut builder, &resolve::<M>, M::TABLE_NAME, filter)?;
    builder.build().execute(ex).await
}

/// Computes the next numeric code for the text primary key of `M`.
///
/// Keys that are not purely numeric are ignored, so the first code of a table is `1`.
pub async fn new_code<M: Record>(ex: &mut Executor) -> DbResult<String> {
    let pk = M::PRIMARY_COLUMN;
    let mut builder = SqlBuilder::new(ex.dialect());
    match ex.dialect() {
        Dialect::Postgres => builder.push(&format!(
            "SELECT MAX(CAST({pk} AS BIGINT)) AS value FROM {} WHERE {pk} ~ '^[0-9]+$'",
            M::TABLE_NAME
        )),
        Dialect::Sqlite => builder.push(&format!(
            "SELECT MAX(CAST({pk} AS INTEGER)) AS value FROM {} \
             WHERE {pk} <> '' AND {pk} NOT GLOB '*[^0-9]*'",
            M::TABLE_NAME
        )),
    };
    let max = builder.build().fetch_integer(ex).await?.unwrap_or(0);
    Ok((max + 1).to_string())
}

/// Computes the maximum value of the integer `column` across all rows that match `filter`.
///
/// Returns `None` when no rows match.
pub async fn max_integer<M: Record>(
    ex: &mut Executor,
    column: &str,
    filter: &[Where],
) -> DbResult<Option<i64>> {
    let column = match M::column(column) {
        Some(column) if column.ty == ColumnType::Integer => column,
        Some(_) => {
            return Err(DbError::BackendError(format!(
                "Column '{}' in '{}' is not an integer",
                column,
                M::TABLE_NAME
            )));
        }
        None => {
            return Err(DbError::BackendError(format!(
                "Unknown column '{}' in '{}'",
                column,
                M::TABLE_NAME
            )));
        }
    };

    let mut builder = SqlBuilder::new(ex.dialect());
    builder.push("SELECT MAX(").push(column.name).push(") AS value FROM ").push(M::TABLE_NAME);
    push_where(&mut builder, &resolve::<M>, M::TABLE_NAME, filter)?;
    builder.build().fetch_integer(ex).await
}

/// Seeds the table of `M` with its default rows if the table is empty.
///
/// Returns the number of inserted rows.
pub async fn install<M: Table>(ex: &mut Executor) -> DbResult<u64> {
    if count::<M>(ex, &[]).await? > 0 {
        return Ok(0);
    }

    let mut inserted = 0;
    for mut record in M::install() {
        if let Err(e) = record.test() {
            return Err(DbError::InvalidRecord(format!("Seed row for '{}': {}", M::TABLE_NAME, e)));
        }
        insert(ex, &mut record).await?;
        inserted += 1;
    }
    Ok(inserted)
}

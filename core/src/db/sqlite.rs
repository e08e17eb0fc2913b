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

//! Common utilities to interact with an SQLite database.

use crate::db::query::{Bind, Statement};
use crate::db::value::{Column, ColumnType, DataRow, Value};
use crate::db::{Db, DbError, DbResult, Executor, TxExecutor};
use async_trait::async_trait;
use futures::TryStreamExt;
use log::warn;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Row, Transaction};
use time::{Date, OffsetDateTime};

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::RowNotFound => DbError::NotFound,
        e if e.to_string().contains("FOREIGN KEY constraint failed") => DbError::NotFound,
        e if e.to_string().contains("UNIQUE constraint failed") => DbError::AlreadyExists,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Creates a new connection.
pub async fn connect(conn_str: &str) -> DbResult<SqliteDb> {
    let pool = SqlitePool::connect(conn_str).await.map_err(map_sqlx_error)?;
    Ok(SqliteDb { pool })
}

/// A generic database executor implementation for SQLite.
#[derive(Debug)]
pub enum SqliteExecutor {
    /// An executor backed by a pool.  Operations issued via this executor aren't guaranteed to
    /// happen on the same connection.
    PoolExec(PoolConnection<Sqlite>),

    /// An executor backed by a transaction.
    TxExec(Transaction<'static, Sqlite>),
}

impl SqliteExecutor {
    /// Returns the raw connection to issue `sqlx` operations against.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        match self {
            SqliteExecutor::PoolExec(conn) => &mut *conn,
            SqliteExecutor::TxExec(tx) => &mut *tx,
        }
    }

    /// Commits the transaction if this executor is backed by one.
    ///
    /// Calling this on a non-transaction-based executor results in a panic.
    pub(super) async fn commit(self) -> DbResult<()> {
        match self {
            SqliteExecutor::PoolExec(_) => unreachable!("Do not call commit on direct executors"),
            SqliteExecutor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }

    /// Rolls back the transaction if this executor is backed by one.
    ///
    /// Calling this on a non-transaction-based executor results in a panic.
    pub(super) async fn rollback(self) -> DbResult<()> {
        match self {
            SqliteExecutor::PoolExec(_) => unreachable!("Do not call rollback on direct executors"),
            SqliteExecutor::TxExec(tx) => tx.rollback().await.map_err(map_sqlx_error),
        }
    }
}

/// A database instance backed by an SQLite database.
pub struct SqliteDb {
    /// Shared SQLite connection pool.  This is a cloneable type that all concurrent
    /// transactions can use concurrently.
    pool: SqlitePool,
}

impl SqliteDb {
    /// Returns an executor of the specific type used by this database.
    pub async fn typed_ex(&self) -> DbResult<SqliteExecutor> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        Ok(SqliteExecutor::PoolExec(conn))
    }
}

impl Drop for SqliteDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("Dropping connection without having called close() first");
        }
    }
}

#[async_trait]
impl Db for SqliteDb {
    async fn ex(&self) -> DbResult<Executor> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        Ok(Executor::Sqlite(SqliteExecutor::PoolExec(conn)))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(TxExecutor(Executor::Sqlite(SqliteExecutor::TxExec(tx))))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Helper function to initialize the database with a schema.
pub async fn run_schema(e: &mut SqliteExecutor, schema: &str) -> DbResult<()> {
    let mut results = sqlx::query(schema).execute_many(e.conn()).await;
    while results.try_next().await.map_err(map_sqlx_error)?.is_some() {
        // Nothing to do.
    }
    Ok(())
}

/// Checks whether a table named `name` exists.
pub(crate) async fn table_exists(e: &mut SqliteExecutor, name: &str) -> DbResult<bool> {
    let query_str = "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?";
    let row = sqlx::query(query_str)
        .bind(name)
        .fetch_one(e.conn())
        .await
        .map_err(map_sqlx_error)?;
    let count: i64 = row.try_get("count").map_err(map_sqlx_error)?;
    Ok(count > 0)
}

/// Prepares the query for `stmt` with all of its parameters bound.
fn bind_statement(stmt: &Statement) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let mut query = sqlx::query(&stmt.sql);
    for Bind { ty, value } in &stmt.binds {
        query = match (ty, value) {
            (ColumnType::Bool, Value::Null) => query.bind(None::<bool>),
            (ColumnType::Integer, Value::Null) => query.bind(None::<i64>),
            (ColumnType::Float, Value::Null) => query.bind(None::<f64>),
            (ColumnType::Text, Value::Null) => query.bind(None::<String>),
            (ColumnType::Date, Value::Null) => query.bind(None::<Date>),
            (ColumnType::Timestamp, Value::Null) => query.bind(None::<OffsetDateTime>),
            (_, Value::Bool(b)) => query.bind(*b),
            (_, Value::Integer(i)) => query.bind(*i),
            (_, Value::Float(f)) => query.bind(*f),
            (_, Value::Text(s)) => query.bind(s.as_str()),
            (_, Value::Date(d)) => query.bind(*d),
            (_, Value::Timestamp(t)) => query.bind(*t),
        };
    }
    query
}

/// Extracts the values of `columns` from a raw `row`.
fn decode_row(row: &SqliteRow, columns: &[Column]) -> DbResult<DataRow> {
    let mut data = DataRow::default();
    for column in columns {
        let name = column.name;
        let value = match column.ty {
            ColumnType::Bool => row.try_get::<Option<bool>, _>(name).map(|v| v.map(Value::Bool)),
            ColumnType::Integer => {
                row.try_get::<Option<i64>, _>(name).map(|v| v.map(Value::Integer))
            }
            ColumnType::Float => row.try_get::<Option<f64>, _>(name).map(|v| v.map(Value::Float)),
            ColumnType::Text => row.try_get::<Option<String>, _>(name).map(|v| v.map(Value::Text)),
            ColumnType::Date => row.try_get::<Option<Date>, _>(name).map(|v| v.map(Value::Date)),
            ColumnType::Timestamp => {
                row.try_get::<Option<OffsetDateTime>, _>(name).map(|v| v.map(Value::Timestamp))
            }
        }
        .map_err(map_sqlx_error)?;
        data.insert(name, value.unwrap_or(Value::Null));
    }
    Ok(data)
}

/// Executes `stmt` and returns the number of affected rows.
pub(crate) async fn execute(e: &mut SqliteExecutor, stmt: &Statement) -> DbResult<u64> {
    let done = bind_statement(stmt).execute(e.conn()).await.map_err(map_sqlx_error)?;
    Ok(done.rows_affected())
}

/// Executes `stmt` and decodes all returned rows according to `columns`.
pub(crate) async fn fetch_all(
    e: &mut SqliteExecutor,
    stmt: &Statement,
    columns: &[Column],
) -> DbResult<Vec<DataRow>> {
    let mut rows = bind_statement(stmt).fetch(e.conn());
    let mut result = vec![];
    while let Some(row) = rows.try_next().await.map_err(map_sqlx_error)? {
        result.push(decode_row(&row, columns)?);
    }
    Ok(result)
}

/// Executes `stmt` and decodes the first returned row according to `columns`, if any.
pub(crate) async fn fetch_optional(
    e: &mut SqliteExecutor,
    stmt: &Statement,
    columns: &[Column],
) -> DbResult<Option<DataRow>> {
    let maybe_row =
        bind_statement(stmt).fetch_optional(e.conn()).await.map_err(map_sqlx_error)?;
    match maybe_row {
        None => Ok(None),
        Some(row) => Ok(Some(decode_row(&row, columns)?)),
    }
}

/// Test utilities for the SQLite connection.
#[cfg(any(feature = "testutils", test))]
pub mod testutils {
    use super::*;

    /// Initializes the test database.
    pub async fn setup() -> SqliteDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        connect(":memory:").await.unwrap()
    }
}

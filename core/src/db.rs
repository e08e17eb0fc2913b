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

//! Generic abstraction to access different database systems.
//!
//! The facilities in this module provide an abstraction over different database systems such as
//! PostgreSQL and SQLite.  The PostgreSQL backend is for production use and the SQLite backend is
//! primarily intended to support unit tests.
//!
//! On top of the raw executors, `table` offers the generic persistence operations shared by all
//! table row types and `view` offers the read-only counterpart for aggregation queries.

use crate::model::ModelError;
use async_trait::async_trait;

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod table;
pub mod value;
pub mod view;

pub use query::{Dialect, OrderBy, Where};
pub use table::{Record, Table};
pub use value::{Column, ColumnType, DataRow, FieldValue, Value};
pub use view::{View, ViewColumn};

/// Database errors.  Any unexpected errors that come from the database are classified as
/// `BackendError`, but errors we know about have more specific types.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DbError {
    /// Indicates that a request to create an entry failed because it already exists.
    #[error("Already exists")]
    AlreadyExists,

    /// Catch-all error type for unexpected database errors.
    #[error("Database error: {0}")]
    BackendError(String),

    /// Indicates a failure processing the data that already exists in the database.
    #[error("Data integrity error: {0}")]
    DataIntegrityError(String),

    /// Indicates that a record was rejected by its own validation before being stored.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Indicates that a requested entry does not exist.
    #[error("Entity not found")]
    NotFound,

    /// Indicates that the database is not available (maybe because of too many active concurrent
    /// connections).
    #[error("Unavailable")]
    Unavailable,
}

impl From<ModelError> for DbError {
    fn from(e: ModelError) -> Self {
        DbError::DataIntegrityError(e.to_string())
    }
}

/// Result type for this module.
pub type DbResult<T> = Result<T, DbError>;

/// A database executor that can talk to multiple database implementations.
///
/// This type provides a generic mechanism to access a typed instance of a database, which is needed
/// by sqlx to offer type safety guarantees during query compilation.  Users of this type are forced
/// to destructure it and issue different calls for each database.
///
/// Note that this can wrap an executor that talks directly to a pool or to an open transaction.
pub enum Executor {
    /// A PostgreSQL executor that can be used in `sqlx` operations.
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresExecutor),

    /// A SQLite executor that can be used in `sqlx` operations.
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteExecutor),
}

impl Executor {
    /// Returns the SQL dialect spoken by this executor.
    pub fn dialect(&self) -> Dialect {
        match self {
            #[cfg(feature = "postgres")]
            Executor::Postgres(_) => Dialect::Postgres,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(_) => Dialect::Sqlite,

            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }
}

/// A wrapper for a database executor backed by an open transaction.
pub struct TxExecutor(Executor);

impl TxExecutor {
    /// Returns the executor wrapped by this transaction.
    ///
    /// This would be better called `executor` but this method is used so frequently that it makes
    /// call sites too verbose.
    pub fn ex(&mut self) -> &mut Executor {
        &mut self.0
    }

    /// Commits the transaction.
    pub async fn commit(self) -> DbResult<()> {
        match self.0 {
            #[cfg(feature = "postgres")]
            Executor::Postgres(e) => e.commit().await,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(e) => e.commit().await,

            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }

    /// Rolls the transaction back explicitly.
    ///
    /// Dropping the transaction has the same effect, but this allows the caller to observe errors.
    pub async fn rollback(self) -> DbResult<()> {
        match self.0 {
            #[cfg(feature = "postgres")]
            Executor::Postgres(e) => e.rollback().await,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(e) => e.rollback().await,

            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }
}

/// Abstraction over the database connection.
#[async_trait]
pub trait Db {
    /// Obtains an executor for direct access to the pool.
    ///
    /// This would be better called `executor` but this method is used so frequently that it makes
    /// call sites too verbose.
    async fn ex(&self) -> DbResult<Executor>;

    /// Begins a transaction.
    ///
    /// It is the responsibility of the caller to call `commit` on the returned executor.  Otherwise
    /// the transaction is rolled back on drop.
    async fn begin(&self) -> DbResult<TxExecutor>;

    /// Closes the connection pool, waiting for all connections to be returned.
    async fn close(&self);
}

/// Checks whether a table named `name` exists in the database.
pub async fn table_exists(ex: &mut Executor, name: &str) -> DbResult<bool> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::table_exists(ex, name).await,

        #[cfg(feature = "sqlite")]
        Executor::Sqlite(ex) => sqlite::table_exists(ex, name).await,

        #[allow(unreachable_patterns)]
        _ => unreachable!(),
    }
}

/// Macros to help instantiate tests for multiple database systems.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    pub use paste::paste;

    /// Instantiates the `module::name` test for the database configured by `setup`.
    ///
    /// The `extra` metadata parameter can be used to tag the generated tests.
    #[macro_export]
    macro_rules! generate_one_test [
        ( $name:ident, $setup:expr, $module:path $(, #[$extra:meta] )? ) => {
            #[tokio::test]
            $(#[$extra])?
            async fn $name() {
                $crate::db::testutils::paste! {
                    $module :: [< $name >]($setup).await;
                }
            }
        }
    ];

    pub use generate_one_test;

    /// Instantiates a collection of tests for a specific database system.
    ///
    /// The database implementation to run the tests against is determined by the `setup`
    /// expression, which needs to return a database object.  The returned database should also
    /// have been initialized with the desired schema.
    ///
    /// The `extra` metadata parameter can be used to tag the generated tests.
    #[macro_export]
    macro_rules! generate_tests [
        ( #[$extra:meta], $setup:expr, $module:path $(, $name:ident)+ ) => {
            $(
                $crate::db::testutils::generate_one_test!($name, $setup, $module, #[$extra]);
            )+
        };

        ( $setup:expr, $module:path $(, $name:ident)+ ) => {
            $(
                $crate::db::testutils::generate_one_test!($name, $setup, $module);
            )+
        };
    ];

    pub use generate_tests;
}

#[cfg(all(test, any(feature = "postgres", feature = "sqlite")))]
mod tests {
    use super::*;
    use crate::db::query::SqlBuilder;

    /// Runs a `query` on `ex` and does not care about its results.  The `query` must be valid for
    /// all possible database implementations.
    pub async fn exec(ex: &mut Executor, query: &str) -> DbResult<u64> {
        let mut builder = SqlBuilder::new(ex.dialect());
        builder.push(query);
        builder.build().execute(ex).await
    }

    /// Runs a `query` on `ex` that fetches a single row with an integer `value` column and
    /// returns that value.  The `query` must be valid for all possible database implementations.
    async fn query_i64(ex: &mut Executor, query: &str) -> i64 {
        let mut builder = SqlBuilder::new(ex.dialect());
        builder.push(query);
        builder.build().fetch_integer(ex).await.unwrap().unwrap()
    }

    pub(super) async fn test_direct_execution(db: Box<dyn Db>) {
        let mut ex = db.ex().await.unwrap();
        exec(&mut ex, "CREATE TABLE test (i INTEGER)").await.unwrap();
        assert_eq!(1, exec(&mut ex, "INSERT INTO test (i) VALUES (3)").await.unwrap());
        assert_eq!(1, query_i64(&mut ex, "SELECT COUNT(*) AS value FROM test").await);
    }

    pub(super) async fn test_tx_commit(db: Box<dyn Db>) {
        exec(&mut db.ex().await.unwrap(), "CREATE TABLE test (i INTEGER)").await.unwrap();

        let mut tx = db.begin().await.unwrap();
        exec(tx.ex(), "INSERT INTO test (i) VALUES (3)").await.unwrap();
        tx.commit().await.unwrap();

        let mut ex = db.ex().await.unwrap();
        assert_eq!(1, query_i64(&mut ex, "SELECT COUNT(*) AS value FROM test").await);
    }

    pub(super) async fn test_tx_rollback_on_drop(db: Box<dyn Db>) {
        exec(&mut db.ex().await.unwrap(), "CREATE TABLE test (i INTEGER)").await.unwrap();

        {
            let mut tx = db.begin().await.unwrap();
            exec(tx.ex(), "INSERT INTO test (i) VALUES (3)").await.unwrap();
        }

        let mut ex = db.ex().await.unwrap();
        assert_eq!(0, query_i64(&mut ex, "SELECT COUNT(*) AS value FROM test").await);
    }

    pub(super) async fn test_tx_explicit_rollback(db: Box<dyn Db>) {
        exec(&mut db.ex().await.unwrap(), "CREATE TABLE test (i INTEGER)").await.unwrap();

        let mut tx = db.begin().await.unwrap();
        exec(tx.ex(), "INSERT INTO test (i) VALUES (3)").await.unwrap();
        tx.rollback().await.unwrap();

        let mut ex = db.ex().await.unwrap();
        assert_eq!(0, query_i64(&mut ex, "SELECT COUNT(*) AS value FROM test").await);
    }

    pub(super) async fn test_table_exists(db: Box<dyn Db>) {
        let mut ex = db.ex().await.unwrap();
        assert!(!table_exists(&mut ex, "test").await.unwrap());
        exec(&mut ex, "CREATE TABLE test (i INTEGER)").await.unwrap();
        assert!(table_exists(&mut ex, "test").await.unwrap());
        assert!(!table_exists(&mut ex, "tes").await.unwrap());
    }

    /// Instantiates tests that need write access to the test database.
    #[macro_export]
    macro_rules! generate_db_rw_tests [
        ( $setup:expr $(, #[$extra:meta])? ) => {
            $crate::db::testutils::generate_tests!(
                $( #[$extra], )?
                $setup,
                $crate::db::tests,
                test_direct_execution,
                test_tx_commit,
                test_tx_rollback_on_drop,
                test_tx_explicit_rollback,
                test_table_exists
            );
        }
    ];

    pub(super) use generate_db_rw_tests;
}

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

//! Read-only models backed by aggregation queries.
//!
//! A view has no table of its own: its rows are the result of a fixed `JOIN`/`GROUP BY` query
//! whose output columns are declared by the view type.

use crate::db::query::{OrderBy, SqlBuilder, Statement, Where, push_order, push_where};
use crate::db::table::row_count;
use crate::db::value::{Column, ColumnType, DataRow};
use crate::db::{DbResult, Dialect, Executor};

/// An output column of a view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewColumn {
    /// Name of the column in the result rows.  Filters and orderings refer to columns by this.
    pub name: &'static str,

    /// SQL expression that computes the column.
    pub expr: &'static str,

    /// Storage type of the values computed by `expr`.
    pub ty: ColumnType,
}

/// Structural description of a read-only row computed by a query.
///
/// The `Default` implementation of the type acts as the initializer of new rows.
pub trait View: Clone + Default + Send + Sync + 'static {
    /// Contents of the `FROM` clause, including any joins.
    const TABLES: &'static str;

    /// Contents of the `GROUP BY` clause, or empty if the query does not aggregate.
    const GROUP_BY: &'static str = "";

    /// Returns all output columns of the view.
    fn columns() -> &'static [ViewColumn];

    /// Copies the values in `data` into the row and recomputes any derived fields.
    fn load_from_data(&mut self, data: &DataRow) -> DbResult<()>;

    /// Creates a new row from its defaults overlaid with `data`.
    fn from_data(data: &DataRow) -> DbResult<Self> {
        let mut row = Self::default();
        row.load_from_data(data)?;
        Ok(row)
    }
}

/// Resolves column names of `V` into their SQL expressions.
fn resolve<V: View>(column: &str) -> Option<(&'static str, ColumnType)> {
    V::columns().iter().find(|c| c.name == column).map(|c| (c.expr, c.ty))
}

/// Builds the query that computes the rows of `V` that match `filter`.
///
/// The `filter` is applied before grouping, so it should only refer to non-aggregated columns.
fn select_statement<V: View>(
    dialect: Dialect,
    filter: &[Where],
    order: &[OrderBy],
    offset: u64,
    limit: Option<u64>,
) -> DbResult<Statement> {
    let mut builder = SqlBuilder::new(dialect);
    builder.push("SELECT ");
    for (i, column) in V::columns().iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(column.expr).push(" AS ").push(column.name);
    }
    builder.push(" FROM ").push(V::TABLES);
    push_where(&mut builder, &resolve::<V>, V::TABLES, filter)?;
    if !V::GROUP_BY.is_empty() {
        builder.push(" GROUP BY ").push(V::GROUP_BY);
    }
    push_order(&mut builder, &resolve::<V>, V::TABLES, order)?;
    builder.push_limit(offset, limit);
    Ok(builder.build())
}

/// Loads all rows of `V` that match `filter` sorted by `order`, skipping the first `offset` ones
/// and returning at most `limit` of them.
pub async fn all<V: View>(
    ex: &mut Executor,
    filter: &[Where],
    order: &[OrderBy],
    offset: u64,
    limit: Option<u64>,
) -> DbResult<Vec<V>> {
    let stmt = select_statement::<V>(ex.dialect(), filter, order, offset, limit)?;
    let columns: Vec<Column> =
        V::columns().iter().map(|c| Column { name: c.name, ty: c.ty }).collect();
    let rows = stmt.fetch_all(ex, &columns).await?;
    rows.iter().map(V::from_data).collect()
}

/// Counts the rows of `V` that match `filter`.
pub async fn count<V: View>(ex: &mut Executor, filter: &[Where]) -> DbResult<u64> {
    let inner = select_statement::<V>(ex.dialect(), filter, &[], 0, None)?;
    let stmt = Statement {
        sql: format!("SELECT COUNT(*) AS value FROM ({}) AS view_rows", inner.sql),
        binds: inner.binds,
    };
    row_count(stmt.fetch_integer(ex).await?)
}

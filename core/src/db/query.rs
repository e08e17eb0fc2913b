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

//! Construction and execution of dynamic SQL statements.
//!
//! The generic persistence operations cannot be expressed as static queries because the table
//! and column names come from the record declarations.  This module builds those statements
//! for the dialect of the executor they will run on and keeps every value as a typed bind
//! parameter, so user data never ends up concatenated into the SQL text.

#[cfg(feature = "postgres")]
use crate::db::postgres;
#[cfg(feature = "sqlite")]
use crate::db::sqlite;
use crate::db::value::{Column, ColumnType, DataRow, Value};
use crate::db::{DbError, DbResult, Executor};
use log::debug;

/// The SQL flavors we generate statements for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    /// PostgreSQL, which uses `$n` placeholders.
    Postgres,

    /// SQLite, which uses `?` placeholders.
    Sqlite,
}

/// A value to bind to a statement placeholder along with the type of the column it targets.
///
/// The type is necessary to bind typed `NULL`s, which PostgreSQL requires.
#[derive(Clone, Debug, PartialEq)]
pub struct Bind {
    /// Storage type of the target column.
    pub ty: ColumnType,

    /// Value to bind, already coerced to `ty`.
    pub value: Value,
}

/// A finished SQL statement ready to be executed.
#[derive(Debug, PartialEq)]
pub struct Statement {
    /// The SQL text with placeholders.
    pub sql: String,

    /// The values for the placeholders, in order.
    pub binds: Vec<Bind>,
}

impl Statement {
    /// Executes the statement and returns the number of affected rows.
    pub async fn execute(&self, ex: &mut Executor) -> DbResult<u64> {
        debug!("Executing: {}", self.sql);
        match ex {
            #[cfg(feature = "postgres")]
            Executor::Postgres(ex) => postgres::execute(ex, self).await,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(ex) => sqlite::execute(ex, self).await,

            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }

    /// Executes the statement and decodes all returned rows according to `columns`.
    pub async fn fetch_all(&self, ex: &mut Executor, columns: &[Column]) -> DbResult<Vec<DataRow>> {
        debug!("Querying: {}", self.sql);
        match ex {
            #[cfg(feature = "postgres")]
            Executor::Postgres(ex) => postgres::fetch_all(ex, self, columns).await,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(ex) => sqlite::fetch_all(ex, self, columns).await,

            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }

    /// Executes the statement and decodes the first returned row, if any.
    pub async fn fetch_optional(
        &self,
        ex: &mut Executor,
        columns: &[Column],
    ) -> DbResult<Option<DataRow>> {
        debug!("Querying: {}", self.sql);
        match ex {
            #[cfg(feature = "postgres")]
            Executor::Postgres(ex) => postgres::fetch_optional(ex, self, columns).await,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(ex) => sqlite::fetch_optional(ex, self, columns).await,

            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }

    /// Executes a statement that returns a single integer column named `value`, which may be
    /// `NULL` (as aggregates over no rows are).
    pub async fn fetch_integer(&self, ex: &mut Executor) -> DbResult<Option<i64>> {
        const COLUMNS: &[Column] = &[Column { name: "value", ty: ColumnType::Integer }];
        match self.fetch_optional(ex, COLUMNS).await? {
            Some(row) => match row.get("value") {
                Some(Value::Integer(i)) => Ok(Some(*i)),
                Some(Value::Null) | None => Ok(None),
                Some(v) => Err(DbError::DataIntegrityError(format!(
                    "Expected an integer but got {:?}",
                    v
                ))),
            },
            None => Ok(None),
        }
    }
}

/// Incremental builder of a `Statement` for a specific `Dialect`.
pub struct SqlBuilder {
    /// Dialect for which we are generating placeholders.
    dialect: Dialect,

    /// SQL text accumulated so far.
    sql: String,

    /// Bind parameters accumulated so far.
    binds: Vec<Bind>,
}

impl SqlBuilder {
    /// Starts a new statement for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect, sql: String::new(), binds: vec![] }
    }

    /// Returns the dialect this builder generates SQL for.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Appends raw SQL text.  Must never be given untrusted input.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Appends a placeholder for `value`, which is coerced to the `ty` of `column`.
    pub fn push_bind(&mut self, column: &str, ty: ColumnType, value: Value) -> DbResult<&mut Self> {
        let value = value.coerce(ty, column)?;
        self.binds.push(Bind { ty, value });
        match self.dialect {
            Dialect::Postgres => self.sql.push_str(&format!("${}", self.binds.len())),
            Dialect::Sqlite => self.sql.push('?'),
        }
        Ok(self)
    }

    /// Appends a `LIMIT`/`OFFSET` clause.
    pub fn push_limit(&mut self, offset: u64, limit: Option<u64>) -> &mut Self {
        match (limit, self.dialect) {
            (Some(limit), _) => self.sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Dialect::Sqlite) if offset > 0 => self.sql.push_str(" LIMIT -1"),
            (None, _) => (),
        }
        if offset > 0 {
            self.sql.push_str(&format!(" OFFSET {}", offset));
        }
        self
    }

    /// Finishes the construction of the statement.
    pub fn build(self) -> Statement {
        Statement { sql: self.sql, binds: self.binds }
    }
}

/// Comparison operators available in filters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    /// `=`, or `IS NULL` when compared against `NULL`.
    Eq,

    /// `<>`, or `IS NOT NULL` when compared against `NULL`.
    NotEq,

    /// `>`.
    Gt,

    /// `>=`.
    Gte,

    /// `<`.
    Lt,

    /// `<=`.
    Lte,

    /// Case-insensitive `LIKE`.
    Like,

    /// `IN (...)`.
    In,
}

/// A condition in the `WHERE` clause of a query.
///
/// Top-level conditions given to a query are combined with `AND`.  Use `Where::any` to express
/// alternatives.
#[derive(Clone, Debug, PartialEq)]
pub enum Where {
    /// Compares a column against one or more values.
    Compare {
        /// Name of the column as declared by the record or view.
        column: String,

        /// Comparison to perform.
        op: Operator,

        /// Values to compare against.  Only `In` takes more than one.
        values: Vec<Value>,
    },

    /// Matches if any of the nested conditions match.
    Any(Vec<Where>),
}

impl Where {
    /// Creates a comparison condition.
    fn compare<C: Into<String>>(column: C, op: Operator, values: Vec<Value>) -> Self {
        Where::Compare { column: column.into(), op, values }
    }

    /// Matches rows where `column` equals `value`.
    pub fn eq<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Operator::Eq, vec![value.into()])
    }

    /// Matches rows where `column` differs from `value`.
    pub fn neq<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Operator::NotEq, vec![value.into()])
    }

    /// Matches rows where `column` is greater than `value`.
    pub fn gt<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Operator::Gt, vec![value.into()])
    }

    /// Matches rows where `column` is greater than or equal to `value`.
    pub fn gte<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Operator::Gte, vec![value.into()])
    }

    /// Matches rows where `column` is less than `value`.
    pub fn lt<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Operator::Lt, vec![value.into()])
    }

    /// Matches rows where `column` is less than or equal to `value`.
    pub fn lte<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Operator::Lte, vec![value.into()])
    }

    /// Matches rows where `column` contains `text`, ignoring case.
    pub fn like<C: Into<String>, S: AsRef<str>>(column: C, text: S) -> Self {
        let pattern = format!("%{}%", text.as_ref());
        Self::compare(column, Operator::Like, vec![Value::Text(pattern)])
    }

    /// Matches rows where `column` is `NULL`.
    pub fn is_null<C: Into<String>>(column: C) -> Self {
        Self::compare(column, Operator::Eq, vec![Value::Null])
    }

    /// Matches rows where `column` is not `NULL`.
    pub fn not_null<C: Into<String>>(column: C) -> Self {
        Self::compare(column, Operator::NotEq, vec![Value::Null])
    }

    /// Matches rows where `column` equals any of `values`.
    pub fn in_list<C, V, I>(column: C, values: I) -> Self
    where
        C: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::compare(column, Operator::In, values.into_iter().map(Into::into).collect())
    }

    /// Matches rows for which any of `conditions` holds.
    pub fn any(conditions: Vec<Where>) -> Self {
        Where::Any(conditions)
    }
}

/// Sorting criteria for a query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderBy {
    /// Name of the column as declared by the record or view.
    pub column: String,

    /// Whether to sort in descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Sorts by `column` in ascending order.
    pub fn asc<C: Into<String>>(column: C) -> Self {
        Self { column: column.into(), descending: false }
    }

    /// Sorts by `column` in descending order.
    pub fn desc<C: Into<String>>(column: C) -> Self {
        Self { column: column.into(), descending: true }
    }
}

/// Maps a column name used in a filter or ordering to its SQL expression and storage type.
pub type Resolver<'a> = &'a dyn Fn(&str) -> Option<(&'static str, ColumnType)>;

/// Looks up `column` via `resolve` and fails if the column is unknown.
fn resolve_column(
    resolve: Resolver<'_>,
    source: &str,
    column: &str,
) -> DbResult<(&'static str, ColumnType)> {
    match resolve(column) {
        Some(resolved) => Ok(resolved),
        None => Err(DbError::BackendError(format!("Unknown column '{}' in '{}'", column, source))),
    }
}

/// Appends a single condition to `builder`.
fn push_condition(
    builder: &mut SqlBuilder,
    resolve: Resolver<'_>,
    source: &str,
    condition: &Where,
) -> DbResult<()> {
    match condition {
        Where::Any(conditions) => {
            if conditions.is_empty() {
                builder.push("1 = 0");
                return Ok(());
            }
            builder.push("(");
            for (i, condition) in conditions.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                push_condition(builder, resolve, source, condition)?;
            }
            builder.push(")");
        }

        Where::Compare { column, op, values } => {
            let (expr, ty) = resolve_column(resolve, source, column)?;
            match (op, values.as_slice()) {
                (Operator::Eq, [Value::Null]) => {
                    builder.push(expr).push(" IS NULL");
                }
                (Operator::NotEq, [Value::Null]) => {
                    builder.push(expr).push(" IS NOT NULL");
                }
                (Operator::Like, [value]) => {
                    builder.push("LOWER(").push(expr).push(") LIKE LOWER(");
                    builder.push_bind(column, ColumnType::Text, value.clone())?;
                    builder.push(")");
                }
                (Operator::In, values) => {
                    if values.is_empty() {
                        builder.push("1 = 0");
                        return Ok(());
                    }
                    builder.push(expr).push(" IN (");
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            builder.push(", ");
                        }
                        builder.push_bind(column, ty, value.clone())?;
                    }
                    builder.push(")");
                }
                (op, [value]) => {
                    let sql_op = match op {
                        Operator::Eq => " = ",
                        Operator::NotEq => " <> ",
                        Operator::Gt => " > ",
                        Operator::Gte => " >= ",
                        Operator::Lt => " < ",
                        Operator::Lte => " <= ",
                        Operator::Like | Operator::In => unreachable!("Handled above"),
                    };
                    builder.push(expr).push(sql_op);
                    builder.push_bind(column, ty, value.clone())?;
                }
                (op, values) => {
                    return Err(DbError::BackendError(format!(
                        "Operator {:?} on '{}' takes one value but got {}",
                        op,
                        column,
                        values.len()
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Appends a `WHERE` clause for `filter` to `builder`, if there are any conditions.
///
/// The `source` names the table or view being queried and is only used for error reporting.
pub fn push_where(
    builder: &mut SqlBuilder,
    resolve: Resolver<'_>,
    source: &str,
    filter: &[Where],
) -> DbResult<()> {
    for (i, condition) in filter.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        push_condition(builder, resolve, source, condition)?;
    }
    Ok(())
}

/// Appends an `ORDER BY` clause for `order` to `builder`, if there are any criteria.
pub fn push_order(
    builder: &mut SqlBuilder,
    resolve: Resolver<'_>,
    source: &str,
    order: &[OrderBy],
) -> DbResult<()> {
    for (i, criteria) in order.iter().enumerate() {
        let (expr, _ty) = resolve_column(resolve, source, &criteria.column)?;
        builder.push(if i == 0 { " ORDER BY " } else { ", " });
        builder.push(expr);
        if criteria.descending {
            builder.push(" DESC");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resolver for a fictitious table with a few columns.
    fn resolve(column: &str) -> Option<(&'static str, ColumnType)> {
        match column {
            "code" => Some(("code", ColumnType::Text)),
            "amount" => Some(("amount", ColumnType::Float)),
            "active" => Some(("active", ColumnType::Bool)),
            "total" => Some(("SUM(t.amount)", ColumnType::Float)),
            _ => None,
        }
    }

    fn build_where(dialect: Dialect, filter: &[Where]) -> DbResult<Statement> {
        let mut builder = SqlBuilder::new(dialect);
        builder.push("SELECT * FROM things");
        push_where(&mut builder, &resolve, "things", filter)?;
        Ok(builder.build())
    }

    #[test]
    fn test_placeholders_per_dialect() {
        let filter = [Where::eq("code", "A"), Where::gt("amount", 3)];

        let stmt = build_where(Dialect::Sqlite, &filter).unwrap();
        assert_eq!("SELECT * FROM things WHERE code = ? AND amount > ?", stmt.sql);

        let stmt = build_where(Dialect::Postgres, &filter).unwrap();
        assert_eq!("SELECT * FROM things WHERE code = $1 AND amount > $2", stmt.sql);
        assert_eq!(
            vec![
                Bind { ty: ColumnType::Text, value: Value::from("A") },
                Bind { ty: ColumnType::Float, value: Value::Float(3.0) },
            ],
            stmt.binds
        );
    }

    #[test]
    fn test_null_comparisons() {
        let stmt =
            build_where(Dialect::Sqlite, &[Where::is_null("code"), Where::not_null("amount")])
                .unwrap();
        assert_eq!("SELECT * FROM things WHERE code IS NULL AND amount IS NOT NULL", stmt.sql);
        assert!(stmt.binds.is_empty());
    }

    #[test]
    fn test_like_and_in() {
        let stmt = build_where(
            Dialect::Postgres,
            &[Where::like("code", "Ab"), Where::in_list("code", ["X", "Y"])],
        )
        .unwrap();
        assert_eq!(
            "SELECT * FROM things WHERE LOWER(code) LIKE LOWER($1) AND code IN ($2, $3)",
            stmt.sql
        );
        assert_eq!(Value::from("%Ab%"), stmt.binds[0].value);

        let stmt = build_where(Dialect::Sqlite, &[Where::in_list::<_, Value, _>("code", [])])
            .unwrap();
        assert_eq!("SELECT * FROM things WHERE 1 = 0", stmt.sql);
    }

    #[test]
    fn test_any_groups_alternatives() {
        let stmt = build_where(
            Dialect::Sqlite,
            &[
                Where::eq("active", true),
                Where::any(vec![Where::eq("code", "A"), Where::lte("amount", 1.5)]),
            ],
        )
        .unwrap();
        assert_eq!("SELECT * FROM things WHERE active = ? AND (code = ? OR amount <= ?)", stmt.sql);
    }

    #[test]
    fn test_view_expressions() {
        let stmt = build_where(Dialect::Sqlite, &[Where::gte("total", 10)]).unwrap();
        assert_eq!("SELECT * FROM things WHERE SUM(t.amount) >= ?", stmt.sql);
    }

    #[test]
    fn test_unknown_column() {
        match build_where(Dialect::Sqlite, &[Where::eq("code; DROP TABLE things", "x")]) {
            Err(DbError::BackendError(msg)) => assert!(msg.contains("Unknown column")),
            e => panic!("Unexpected result: {:?}", e),
        }
    }

    #[test]
    fn test_bad_value_type() {
        build_where(Dialect::Sqlite, &[Where::eq("amount", "not a number")]).unwrap_err();
    }

    #[test]
    fn test_order_and_limit() {
        let mut builder = SqlBuilder::new(Dialect::Sqlite);
        builder.push("SELECT * FROM things");
        let order = [OrderBy::desc("amount"), OrderBy::asc("code")];
        push_order(&mut builder, &resolve, "things", &order).unwrap();
        builder.push_limit(20, None);
        assert_eq!(
            "SELECT * FROM things ORDER BY amount DESC, code LIMIT -1 OFFSET 20",
            builder.build().sql
        );

        let mut builder = SqlBuilder::new(Dialect::Postgres);
        builder.push("SELECT * FROM things").push_limit(0, Some(5));
        assert_eq!("SELECT * FROM things LIMIT 5", builder.build().sql);

        let mut builder = SqlBuilder::new(Dialect::Postgres);
        builder.push("SELECT * FROM things").push_limit(5, None);
        assert_eq!("SELECT * FROM things OFFSET 5", builder.build().sql);
    }
}

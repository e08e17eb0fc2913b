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

//! Database schema, seed data and the queries shared by the business operations.

use crate::model::{
    AccountingEntry, AccountingEntryLine, Company, Country, Currency, CustomerAddress,
    CustomerBankAccount, CustomerInvoice, CustomerInvoiceLine, DEFAULT_SETTINGS_NAME,
    DefaultSettings, Exercise, PaymentMethod, Settings, Tax, Warehouse,
};
#[cfg(feature = "postgres")]
use erp_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use erp_core::db::sqlite;
use erp_core::db::{DbResult, Executor, OrderBy, Where, table};
use log::debug;
use time::{Date, Month};


/// Creates the tables if they do not exist yet.
async fn create_tables(ex: &mut Executor) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::run_schema(ex, include_str!("postgres.sql")).await,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlite::run_schema(ex, include_str!("sqlite.sql")).await,

        #[allow(unreachable_patterns)]
        _ => unreachable!(),
    }
}

/// Initializes the database schema and seeds the tables that are still empty.
///
/// Seeding happens in dependency order: the default settings refer to rows of the other seeded
/// tables.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    create_tables(ex).await?;

    let mut seeded = 0;
    seeded += table::install::<Country>(ex).await?;
    seeded += table::install::<Currency>(ex).await?;
    seeded += table::install::<Company>(ex).await?;
    seeded += table::install::<Warehouse>(ex).await?;
    seeded += table::install::<PaymentMethod>(ex).await?;
    seeded += table::install::<Tax>(ex).await?;
    seeded += table::install::<Settings>(ex).await?;
    debug!("Schema initialized with {} seed rows", seeded);
    Ok(())
}

/// Loads the system defaults, falling back to the built-in ones if they were never stored.
pub async fn load_default_settings(ex: &mut Executor) -> DbResult<DefaultSettings> {
    match table::load::<Settings, _>(ex, DEFAULT_SETTINGS_NAME).await? {
        Some(settings) => Ok(settings.properties()?),
        None => Ok(DefaultSettings::default()),
    }
}

/// Loads all addresses of the customer `customer_code` in creation order.
pub async fn customer_addresses(
    ex: &mut Executor,
    customer_code: &str,
) -> DbResult<Vec<CustomerAddress>> {
    table::all(ex, &[Where::eq("customer_code", customer_code)], &[OrderBy::asc("id")], 0, None)
        .await
}

/// Loads all bank accounts of the customer `customer_code` sorted by code.
pub async fn customer_bank_accounts(
    ex: &mut Executor,
    customer_code: &str,
) -> DbResult<Vec<CustomerBankAccount>> {
    table::all(ex, &[Where::eq("customer_code", customer_code)], &[OrderBy::asc("code")], 0, None)
        .await
}

/// Loads all lines of the accounting entry `entry_id` in creation order.
pub async fn entry_lines(ex: &mut Executor, entry_id: i64) -> DbResult<Vec<AccountingEntryLine>> {
    table::all(ex, &[Where::eq("entry_id", entry_id)], &[OrderBy::asc("id")], 0, None).await
}

/// Loads all lines of the invoice `invoice_id` in creation order.
pub async fn invoice_lines(
    ex: &mut Executor,
    invoice_id: i64,
) -> DbResult<Vec<CustomerInvoiceLine>> {
    table::all(ex, &[Where::eq("invoice_id", invoice_id)], &[OrderBy::asc("id")], 0, None).await
}

/// Finds the exercise of `company_id` that contains `date`, if any.
pub async fn find_exercise(
    ex: &mut Executor,
    company_id: i64,
    date: Date,
) -> DbResult<Option<Exercise>> {
    let filter = [
        Where::eq("company_id", company_id),
        Where::lte("start_date", date),
        Where::gte("end_date", date),
    ];
    table::load_where(ex, &filter, &[OrderBy::asc("start_date")]).await
}

/// Computes the number of the next accounting entry of the exercise `exercise_code`.
pub async fn next_entry_number(ex: &mut Executor, exercise_code: &str) -> DbResult<i64> {
    let filter = [Where::eq("exercise_code", exercise_code)];
    let max = table::max_integer::<AccountingEntry>(ex, "number", &filter).await?;
    Ok(max.unwrap_or(0) + 1)
}

/// Computes the number of the next invoice issued by `company_id` during `year`.
pub async fn next_invoice_number(ex: &mut Executor, company_id: i64, year: i32) -> DbResult<i64> {
    let bad_year = |e: time::error::ComponentRange| {
        erp_core::db::DbError::BackendError(format!("Invalid invoice year {}: {}", year, e))
    };
    let first = Date::from_calendar_date(year, Month::January, 1).map_err(bad_year)?;
    let last = Date::from_calendar_date(year, Month::December, 31).map_err(bad_year)?;
    let filter = [
        Where::eq("company_id", company_id),
        Where::gte("date", first),
        Where::lte("date", last),
    ];
    let max = table::max_integer::<CustomerInvoice>(ex, "number", &filter).await?;
    Ok(max.unwrap_or(0) + 1)
}

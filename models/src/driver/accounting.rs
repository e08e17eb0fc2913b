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

//! Rules of exercises and accounting entries.

use crate::db;
use crate::driver::base::check_reference;
use crate::driver::{Entity, ErpDriver, HookContext, refuse, save_entity, stored};
use crate::model::{AccountingEntry, AccountingEntryLine, Company, Exercise, TaxSummary};
use erp_core::db::{OrderBy, Where, table, view};
use erp_core::driver::{DriverError, DriverResult};
use erp_core::model::round_to;
use log::info;
use time::Date;

/// Finds the exercise of `company_id` that contains `date`, creating one for its calendar year
/// if there is none.
async fn exercise_in(
    ctx: &mut HookContext<'_>,
    company_id: i64,
    date: Date,
) -> DriverResult<Exercise> {
    if let Some(exercise) = db::find_exercise(ctx.ex(), company_id, date).await? {
        return Ok(exercise);
    }

    let mut exercise = Exercise::for_year(company_id, date.year())?;
    if table::exists(ctx.ex(), &exercise).await? {
        // The year is taken by an exercise of another company.
        exercise.code = table::new_code::<Exercise>(ctx.ex()).await?;
    }
    save_entity(ctx, &mut exercise).await?;
    info!("Created exercise {} for company {}", exercise.code, company_id);
    Ok(exercise)
}

/// Loads the exercise `code` and checks that it accepts changes to its entries.
async fn open_exercise(ctx: &mut HookContext<'_>, code: &str) -> DriverResult<Exercise> {
    let exercise = match table::load::<Exercise, _>(ctx.ex(), code).await? {
        Some(exercise) => exercise,
        None => return Err(DriverError::InvalidInput(format!("Unknown exercise {}", code))),
    };
    if !exercise.is_open() {
        return refuse(format!("Exercise {} is closed", code));
    }
    Ok(exercise)
}

/// Loads the entry `entry_id` and checks that its exercise accepts changes.
async fn open_entry(ctx: &mut HookContext<'_>, entry_id: i64) -> DriverResult<AccountingEntry> {
    let entry = match table::load::<AccountingEntry, _>(ctx.ex(), entry_id).await? {
        Some(entry) => entry,
        None => {
            return Err(DriverError::InvalidInput(format!(
                "Unknown accounting entry {}",
                entry_id
            )));
        }
    };
    open_exercise(ctx, &entry.exercise_code).await?;
    Ok(entry)
}

/// Recomputes the amount of the entry `entry_id` from its stored lines, ignoring the line
/// `without` if given.
async fn update_entry_amount(
    ctx: &mut HookContext<'_>,
    entry_id: i64,
    without: Option<i64>,
) -> DriverResult<()> {
    let mut entry = table::get::<AccountingEntry, _>(ctx.ex(), entry_id).await?;
    let mut lines = db::entry_lines(ctx.ex(), entry_id).await?;
    if without.is_some() {
        lines.retain(|l| l.id != without);
    }
    entry.recompute_amount(&lines);
    table::update(ctx.ex(), &entry).await?;
    Ok(())
}

#[async_trait::async_trait]
impl Entity for Exercise {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        check_reference::<Company, _>(ctx, "company", self.company_id).await
    }

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        let filter = [Where::eq("exercise_code", self.code.as_str())];
        let entries = table::count::<AccountingEntry>(ctx.ex(), &filter).await?;
        if entries > 0 {
            return refuse(format!(
                "Cannot delete exercise {}: it has {} accounting entries",
                self.code, entries
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Entity for AccountingEntry {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if let Some(stored) = stored(ctx.ex(), self).await? {
            open_exercise(ctx, &stored.exercise_code).await?;
        }

        self.exercise_code = self.exercise_code.trim().to_owned();
        if self.exercise_code.is_empty() {
            self.exercise_code = exercise_in(ctx, self.company_id, self.date).await?.code;
        }
        let exercise = open_exercise(ctx, &self.exercise_code).await?;
        if exercise.company_id != self.company_id || !exercise.contains(self.date) {
            return Err(DriverError::InvalidInput(format!(
                "Date {} is outside of exercise {} of company {}",
                self.date, exercise.code, self.company_id
            )));
        }

        if self.number == 0 {
            self.number = db::next_entry_number(ctx.ex(), &self.exercise_code).await?;
        }

        match self.id {
            Some(id) => {
                let lines = db::entry_lines(ctx.ex(), id).await?;
                self.recompute_amount(&lines);
            }
            None => self.amount = 0.0,
        }
        Ok(())
    }

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        open_exercise(ctx, &self.exercise_code).await?;
        let filter = [Where::eq("entry_id", self.id)];
        table::delete_where::<AccountingEntryLine>(ctx.ex(), &filter).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Entity for AccountingEntryLine {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if let Some(stored) = stored(ctx.ex(), self).await? {
            open_entry(ctx, stored.entry_id).await?;
            if stored.entry_id != self.entry_id {
                update_entry_amount(ctx, stored.entry_id, self.id).await?;
            }
        }

        let entry = open_entry(ctx, self.entry_id).await?;
        if self.concept.trim().is_empty() {
            self.concept = entry.concept;
        }
        Ok(())
    }

    async fn after_save(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        update_entry_amount(ctx, self.entry_id, None).await
    }

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        open_entry(ctx, self.entry_id).await?;
        Ok(())
    }

    async fn after_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        update_entry_amount(ctx, self.entry_id, None).await
    }
}

impl ErpDriver {
    /// Finds the exercise of `company_id` that contains `date`, creating one for its calendar
    /// year if there is none.
    pub async fn exercise_for_date(self, company_id: i64, date: Date) -> DriverResult<Exercise> {
        let mut tx = self.db.begin().await?;
        let exercise = exercise_in(&mut self.context(&mut tx), company_id, date).await?;
        tx.commit().await?;
        Ok(exercise)
    }

    /// Gets the lines of the accounting entry `entry_id`.
    pub async fn entry_lines(self, entry_id: i64) -> DriverResult<Vec<AccountingEntryLine>> {
        let mut ex = self.db.ex().await?;
        Ok(db::entry_lines(&mut ex, entry_id).await?)
    }

    /// Adds `line` to the accounting entry `entry_id` and returns the updated entry.
    pub async fn add_entry_line(
        self,
        entry_id: i64,
        mut line: AccountingEntryLine,
    ) -> DriverResult<AccountingEntry> {
        let mut tx = self.db.begin().await?;
        let mut ctx = self.context(&mut tx);
        line.entry_id = entry_id;
        save_entity(&mut ctx, &mut line).await?;
        let entry = table::get::<AccountingEntry, _>(ctx.ex(), entry_id).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Checks that the debits of the lines of the entry `entry_id` match its credits.
    pub async fn entry_is_balanced(self, entry_id: i64) -> DriverResult<bool> {
        let mut ex = self.db.ex().await?;
        table::get::<AccountingEntry, _>(&mut ex, entry_id).await?;
        let lines = db::entry_lines(&mut ex, entry_id).await?;
        let debit = round_to(lines.iter().map(|l| l.debit).sum(), 2);
        let credit = round_to(lines.iter().map(|l| l.credit).sum(), 2);
        Ok(debit == credit)
    }

    /// Summarizes the taxed movements of the exercise `exercise_code` by subaccount and rates.
    pub async fn tax_summary(self, exercise_code: &str) -> DriverResult<Vec<TaxSummary>> {
        let mut ex = self.db.ex().await?;
        let filter = [Where::eq("exercise_code", exercise_code), Where::gt("tax_rate", 0.0)];
        let order = [
            OrderBy::asc("subaccount_code"),
            OrderBy::asc("tax_rate"),
            OrderBy::asc("surcharge"),
        ];
        Ok(view::all::<TaxSummary>(&mut ex, &filter, &order, 0, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use crate::model::{DEFAULT_COMPANY_ID, ExerciseStatus};
    use time::macros::date;

    /// Creates the sale entry of a 100 units sale with 21% taxes.
    async fn create_sale(context: &TestContext, date: Date) -> AccountingEntry {
        let entry = context.driver().save(AccountingEntry::new(date, "Sale")).await.unwrap();
        let id = entry.id.unwrap();
        for line in [
            AccountingEntryLine::new(id, "4300000001", 121.0, 0.0),
            AccountingEntryLine::new(id, "7000000000", 0.0, 100.0),
            AccountingEntryLine::new_tax(id, "4770000021", 100.0, 21.0, 0.0),
        ] {
            context.driver().add_entry_line(id, line).await.unwrap();
        }
        context.driver().get(id).await.unwrap()
    }

    /// Closes the exercise `code`.
    async fn close_exercise(context: &TestContext, code: &str) {
        let mut exercise = context.driver().get::<Exercise, _>(code).await.unwrap();
        exercise.status = ExerciseStatus::Closed.as_str().to_owned();
        context.driver().save(exercise).await.unwrap();
    }

    #[tokio::test]
    async fn test_exercise_for_date_creates_once() {
        let context = TestContext::setup().await;

        let driver = context.driver();
        let exercise = driver.exercise_for_date(DEFAULT_COMPANY_ID, date!(2024 - 03 - 01)).await;
        let exercise = exercise.unwrap();
        assert_eq!("2024", exercise.code);
        assert_eq!(date!(2024 - 01 - 01), exercise.start_date);
        assert_eq!(date!(2024 - 12 - 31), exercise.end_date);
        assert!(exercise.is_open());

        let again =
            context.driver().exercise_for_date(DEFAULT_COMPANY_ID, date!(2024 - 12 - 31)).await;
        assert_eq!(exercise, again.unwrap());
        assert_eq!(1, context.driver().count::<Exercise>(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_exercise_for_date_code_taken_by_other_company() {
        let context = TestContext::setup().await;
        let company = context.driver().save(Company::new("Other", "ESP")).await.unwrap();
        let company_id = company.id.unwrap();

        let driver = context.driver();
        driver.exercise_for_date(DEFAULT_COMPANY_ID, date!(2024 - 03 - 01)).await.unwrap();
        let exercise =
            context.driver().exercise_for_date(company_id, date!(2024 - 03 - 01)).await.unwrap();
        assert_eq!("2025", exercise.code);
        assert_eq!(company_id, exercise.company_id);
        assert_eq!(date!(2024 - 01 - 01), exercise.start_date);
    }

    #[tokio::test]
    async fn test_entries_are_numbered_per_exercise() {
        let context = TestContext::setup().await;

        let mut numbers = vec![];
        for date in [date!(2024 - 01 - 10), date!(2024 - 02 - 10), date!(2023 - 06 - 01)] {
            let entry = context.driver().save(AccountingEntry::new(date, "Entry")).await.unwrap();
            numbers.push((entry.exercise_code, entry.number));
        }
        assert_eq!(
            vec![("2024".to_owned(), 1), ("2024".to_owned(), 2), ("2023".to_owned(), 1)],
            numbers
        );
    }

    #[tokio::test]
    async fn test_entry_amount_and_balance() {
        let context = TestContext::setup().await;

        let entry = create_sale(&context, date!(2024 - 05 - 10)).await;
        assert_eq!(121.0, entry.amount);
        assert!(context.driver().entry_is_balanced(entry.id.unwrap()).await.unwrap());

        let lines = context.driver().entry_lines(entry.id.unwrap()).await.unwrap();
        assert_eq!(3, lines.len());
        assert!(lines.iter().all(|l| l.concept == "Sale"));
        assert_eq!(21.0, lines[2].credit);

        context.driver().delete(lines[1].clone()).await.unwrap();
        assert!(!context.driver().entry_is_balanced(entry.id.unwrap()).await.unwrap());

        context.driver().delete(lines[0].clone()).await.unwrap();
        let entry = context.driver().get::<AccountingEntry, _>(entry.id.unwrap()).await.unwrap();
        assert_eq!(0.0, entry.amount);
    }

    #[tokio::test]
    async fn test_entry_outside_of_exercise() {
        let context = TestContext::setup().await;
        let driver = context.driver();
        driver.exercise_for_date(DEFAULT_COMPANY_ID, date!(2024 - 01 - 01)).await.unwrap();

        let mut entry = AccountingEntry::new(date!(2023 - 12 - 31), "Entry");
        entry.exercise_code = "2024".to_owned();
        match context.driver().save(entry).await {
            Err(DriverError::InvalidInput(e)) => assert!(e.contains("outside of exercise 2024")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_closed_exercise_rejects_changes() {
        let context = TestContext::setup().await;
        let entry = create_sale(&context, date!(2024 - 05 - 10)).await;
        close_exercise(&context, "2024").await;

        let new_entry = AccountingEntry::new(date!(2024 - 06 - 01), "Late");
        match context.driver().save(new_entry).await {
            Err(DriverError::PreconditionFailed(e)) => assert_eq!("Exercise 2024 is closed", e),
            e => panic!("{:?}", e),
        }

        let line = AccountingEntryLine::new(0, "5700000000", 1.0, 0.0);
        match context.driver().add_entry_line(entry.id.unwrap(), line).await {
            Err(DriverError::PreconditionFailed(_)) => (),
            e => panic!("{:?}", e),
        }

        match context.driver().delete(entry).await {
            Err(DriverError::PreconditionFailed(_)) => (),
            e => panic!("{:?}", e),
        }
        assert_eq!(3, context.driver().count::<AccountingEntryLine>(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_entry_cascades() {
        let context = TestContext::setup().await;
        let entry = create_sale(&context, date!(2024 - 05 - 10)).await;
        let other = create_sale(&context, date!(2024 - 05 - 11)).await;

        context.driver().delete(entry).await.unwrap();
        assert_eq!(3, context.driver().count::<AccountingEntryLine>(&[]).await.unwrap());
        assert!(context.driver().entry_is_balanced(other.id.unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_exercise_with_entries() {
        let context = TestContext::setup().await;
        let entry = create_sale(&context, date!(2024 - 05 - 10)).await;

        let exercise = context.driver().get::<Exercise, _>("2024").await.unwrap();
        match context.driver().delete(exercise.clone()).await {
            Err(DriverError::PreconditionFailed(e)) => {
                assert_eq!("Cannot delete exercise 2024: it has 1 accounting entries", e)
            }
            e => panic!("{:?}", e),
        }

        context.driver().delete(entry).await.unwrap();
        context.driver().delete(exercise).await.unwrap();
    }

    #[tokio::test]
    async fn test_move_line_between_entries() {
        let context = TestContext::setup().await;
        let first = create_sale(&context, date!(2024 - 05 - 10)).await;
        let second = create_sale(&context, date!(2024 - 05 - 11)).await;

        let mut moved = context.driver().entry_lines(first.id.unwrap()).await.unwrap().remove(0);
        assert_eq!(121.0, moved.debit);
        moved.entry_id = second.id.unwrap();
        context.driver().save(moved).await.unwrap();

        let first = context.driver().get::<AccountingEntry, _>(first.id).await.unwrap();
        assert_eq!(0.0, first.amount);
        let second = context.driver().get::<AccountingEntry, _>(second.id).await.unwrap();
        assert_eq!(242.0, second.amount);
    }

    #[tokio::test]
    async fn test_cannot_move_line_out_of_closed_exercise() {
        let context = TestContext::setup().await;
        let closed = create_sale(&context, date!(2023 - 05 - 10)).await;
        let open = create_sale(&context, date!(2024 - 05 - 10)).await;
        close_exercise(&context, "2023").await;

        let mut moved = context.driver().entry_lines(closed.id.unwrap()).await.unwrap().remove(0);
        moved.entry_id = open.id.unwrap();
        match context.driver().save(moved).await {
            Err(DriverError::PreconditionFailed(e)) => assert_eq!("Exercise 2023 is closed", e),
            e => panic!("{:?}", e),
        }
        assert_eq!(3, context.driver().entry_lines(closed.id.unwrap()).await.unwrap().len());
    }

    #[tokio::test]
    async fn test_tax_summary() {
        let context = TestContext::setup().await;
        create_sale(&context, date!(2024 - 05 - 10)).await;
        create_sale(&context, date!(2024 - 05 - 11)).await;
        create_sale(&context, date!(2023 - 05 - 11)).await;

        let entry = context.driver().save(AccountingEntry::new(date!(2024 - 05 - 12), "Books"));
        let id = entry.await.unwrap().id.unwrap();
        let line = AccountingEntryLine::new_tax(id, "4770000004", 50.0, 4.0, 0.5);
        context.driver().add_entry_line(id, line).await.unwrap();

        let summary = context.driver().tax_summary("2024").await.unwrap();
        assert_eq!(2, summary.len());
        assert_eq!(
            ("4770000004", 4.0, 50.0, 2.0, 0.25, 52.25),
            (
                summary[0].subaccount_code.as_str(),
                summary[0].tax_rate,
                summary[0].tax_base,
                summary[0].tax_amount,
                summary[0].surcharge_amount,
                summary[0].total
            )
        );
        assert_eq!(
            ("4770000021", 21.0, 200.0, 42.0, 242.0),
            (
                summary[1].subaccount_code.as_str(),
                summary[1].tax_rate,
                summary[1].tax_base,
                summary[1].tax_amount,
                summary[1].total
            )
        );

        assert!(context.driver().tax_summary("2022").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_entry() {
        let context = TestContext::setup().await;

        let line = AccountingEntryLine::new(0, "5700000000", 1.0, 0.0);
        match context.driver().add_entry_line(42, line).await {
            Err(DriverError::InvalidInput(e)) => assert_eq!("Unknown accounting entry 42", e),
            e => panic!("{:?}", e),
        }
        match context.driver().entry_is_balanced(42).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
    }
}

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

//! The `AccountingEntry` and `AccountingEntryLine` tables.

use crate::model::{DEFAULT_COMPANY_ID, test_text};
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_code, check_percentage, round_to};
use erp_core::record;
use serde::{Deserialize, Serialize};
use time::Date;
use time::macros::date;

/// Number of decimal positions kept in accounting amounts.
const AMOUNT_DECIMALS: u32 = 2;

record! {
    /// A journal entry of the accounting of a company.
    #[derive(Deserialize, Serialize)]
    pub struct AccountingEntry in "accounting_entries" {
        /// Identifier of the entry, assigned on insertion.
        serial id: Option<i64>,

        /// Sequential number of the entry within its exercise.
        number: i64,

        /// Company that this entry belongs to.
        company_id: i64,

        /// Exercise that contains the date of the entry.
        exercise_code: String,

        /// Accounting date of the entry.
        date: Date,

        /// Description of the entry.
        concept: String,

        /// Total amount of the entry, which is the sum of the debits of its lines.
        amount: f64,
    }
}

impl AccountingEntry {
    /// Creates a new entry for `date` that is yet to be numbered.
    pub fn new(date: Date, concept: &str) -> Self {
        Self { date, concept: concept.to_owned(), ..Default::default() }
    }

    /// Recomputes the `amount` of the entry from its `lines`.
    pub fn recompute_amount(&mut self, lines: &[AccountingEntryLine]) {
        self.amount = round_to(lines.iter().map(|l| l.debit).sum(), AMOUNT_DECIMALS);
    }
}

impl Default for AccountingEntry {
    fn default() -> Self {
        Self {
            id: None,
            number: 0,
            company_id: DEFAULT_COMPANY_ID,
            exercise_code: String::new(),
            date: date!(2000 - 01 - 01),
            concept: String::new(),
            amount: 0.0,
        }
    }
}

impl Table for AccountingEntry {
    fn test(&mut self) -> ModelResult<()> {
        self.exercise_code = self.exercise_code.trim().to_owned();
        check_code("exercise_code", &self.exercise_code, 4)?;

        test_text("concept", &mut self.concept, 255)?;
        if self.concept.is_empty() {
            return Err(ModelError("concept cannot be empty".to_owned()));
        }

        if self.number < 0 {
            return Err(ModelError(format!("Invalid entry number {}", self.number)));
        }
        self.amount = round_to(self.amount, AMOUNT_DECIMALS);
        Ok(())
    }
}

record! {
    /// A movement on a single subaccount within an accounting entry.
    #[derive(Deserialize, Serialize)]
    pub struct AccountingEntryLine in "accounting_entry_lines" {
        /// Identifier of the line, assigned on insertion.
        serial id: Option<i64>,

        /// Entry that this line belongs to.
        entry_id: i64,

        /// Subaccount affected by the movement.
        subaccount_code: String,

        /// Description of the movement.  Defaults to the concept of the entry.
        concept: String,

        /// Amount charged to the subaccount.
        debit: f64,

        /// Amount credited to the subaccount.
        credit: f64,

        /// Taxable base behind this movement, for tax subaccounts.
        tax_base: f64,

        /// Tax percentage applied to `tax_base`.
        tax_rate: f64,

        /// Surcharge percentage applied to `tax_base`.
        surcharge: f64,
    }
}

impl AccountingEntryLine {
    /// Creates a new line for `entry_id` moving `debit` and `credit` on `subaccount_code`.
    pub fn new(entry_id: i64, subaccount_code: &str, debit: f64, credit: f64) -> Self {
        Self {
            entry_id,
            subaccount_code: subaccount_code.to_owned(),
            debit,
            credit,
            ..Default::default()
        }
    }

    /// Creates a new line that records a tax movement over `tax_base`.
    pub fn new_tax(
        entry_id: i64,
        subaccount_code: &str,
        tax_base: f64,
        tax_rate: f64,
        surcharge: f64,
    ) -> Self {
        let quota = round_to(tax_base * (tax_rate + surcharge) / 100.0, AMOUNT_DECIMALS);
        Self {
            tax_base,
            tax_rate,
            surcharge,
            ..Self::new(entry_id, subaccount_code, 0.0, quota)
        }
    }
}

impl Default for AccountingEntryLine {
    fn default() -> Self {
        Self {
            id: None,
            entry_id: 0,
            subaccount_code: String::new(),
            concept: String::new(),
            debit: 0.0,
            credit: 0.0,
            tax_base: 0.0,
            tax_rate: 0.0,
            surcharge: 0.0,
        }
    }
}

impl Table for AccountingEntryLine {
    fn test(&mut self) -> ModelResult<()> {
        if self.entry_id <= 0 {
            return Err(ModelError("A line must belong to an accounting entry".to_owned()));
        }

        self.subaccount_code = self.subaccount_code.trim().to_owned();
        check_code("subaccount_code", &self.subaccount_code, 15)?;

        test_text("concept", &mut self.concept, 255)?;

        for (field, value) in [("debit", &mut self.debit), ("credit", &mut self.credit)] {
            if value.is_nan() || *value < 0.0 {
                return Err(ModelError(format!("Invalid {} {}", field, value)));
            }
            *value = round_to(*value, AMOUNT_DECIMALS);
        }
        self.tax_base = round_to(self.tax_base, AMOUNT_DECIMALS);
        check_percentage("tax_rate", self.tax_rate)?;
        check_percentage("surcharge", self.surcharge)
    }
}

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

//! The `PaymentMethod` table.

use crate::model::DEFAULT_COMPANY_ID;
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_code, check_length, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::{Date, Duration, Month};

/// Units in which the expiration term of a payment method is expressed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DueUnit {
    /// Calendar days.
    Days,

    /// Weeks of seven days.
    Weeks,

    /// Calendar months.  Days that do not exist in the target month are clamped.
    Months,

    /// Calendar years.
    Years,
}

impl DueUnit {
    /// Returns the name of the unit as stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            DueUnit::Days => "days",
            DueUnit::Weeks => "weeks",
            DueUnit::Months => "months",
            DueUnit::Years => "years",
        }
    }

    /// Returns the longest term accepted in this unit, which is about 100 years.
    pub fn max_period(self) -> i64 {
        match self {
            DueUnit::Days => 36_525,
            DueUnit::Weeks => 5_218,
            DueUnit::Months => 1_200,
            DueUnit::Years => 100,
        }
    }
}

impl FromStr for DueUnit {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "days" => Ok(DueUnit::Days),
            "weeks" => Ok(DueUnit::Weeks),
            "months" => Ok(DueUnit::Months),
            "years" => Ok(DueUnit::Years),
            _ => Err(ModelError(format!("Invalid due_unit '{}'", s))),
        }
    }
}

/// Adds `months` calendar months to `date`, clamping the day to the end of the target month.
fn add_months(date: Date, months: i64) -> ModelResult<Date> {
    let overflow = || ModelError(format!("Cannot add {} months to {}", months, date));

    let index = (i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1)
        .checked_add(months)
        .ok_or_else(overflow)?;
    let year = i32::try_from(index.div_euclid(12)).map_err(|_| overflow())?;
    let month = u8::try_from(index.rem_euclid(12) + 1).map_err(|_| overflow())?;
    let month = Month::try_from(month).map_err(|_| overflow())?;
    let day = date.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).map_err(|_| overflow())
}

record! {
    /// A way in which documents are paid, along with the term to pay them.
    #[derive(Deserialize, Serialize)]
    pub struct PaymentMethod in "payment_methods" {
        /// Code of the payment method.
        primary code: String,

        /// Human-readable name of the payment method.
        description: String,

        /// Company that this payment method belongs to.
        company_id: i64,

        /// Whether documents paid with this method are considered paid when issued.
        paid: bool,

        /// Whether this method charges the payer's bank account directly.
        direct_debit: bool,

        /// Amount of `due_unit`s between the issue of a document and its due date.
        due_period: i64,

        /// Unit of `due_period`, as given by `DueUnit::as_str`.
        due_unit: String,
    }
}

impl PaymentMethod {
    /// Creates a new payment method for the default company.
    pub fn new(code: &str, description: &str, paid: bool, due_period: i64, unit: DueUnit) -> Self {
        Self {
            code: code.to_owned(),
            description: description.to_owned(),
            paid,
            due_period,
            due_unit: unit.as_str().to_owned(),
            ..Default::default()
        }
    }

    /// Computes the due date of a document issued on `from`.
    pub fn due_date(&self, from: Date) -> ModelResult<Date> {
        let unit = DueUnit::from_str(&self.due_unit)?;
        let overflow = || ModelError(format!("Due date out of range for {}", from));
        let add_seconds = |per_unit: i64| {
            self.due_period
                .checked_mul(per_unit)
                .and_then(|secs| from.checked_add(Duration::seconds(secs)))
                .ok_or_else(overflow)
        };
        match unit {
            DueUnit::Days => add_seconds(24 * 60 * 60),
            DueUnit::Weeks => add_seconds(7 * 24 * 60 * 60),
            DueUnit::Months => add_months(from, self.due_period),
            DueUnit::Years => {
                add_months(from, self.due_period.checked_mul(12).ok_or_else(overflow)?)
            }
        }
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self {
            code: String::new(),
            description: String::new(),
            company_id: DEFAULT_COMPANY_ID,
            paid: false,
            direct_debit: false,
            due_period: 0,
            due_unit: DueUnit::Days.as_str().to_owned(),
        }
    }
}

impl Table for PaymentMethod {
    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_owned();
        check_code("code", &self.code, 10)?;

        self.description = no_html(self.description.trim());
        check_length("description", &self.description, 1, 100)?;

        if self.due_period < 0 {
            return Err(ModelError(format!(
                "Invalid due_period: {} is negative",
                self.due_period
            )));
        }
        let unit = DueUnit::from_str(&self.due_unit)?;
        if self.due_period > unit.max_period() {
            return Err(ModelError(format!(
                "Invalid due_period: {} {} is too long",
                self.due_period, self.due_unit
            )));
        }
        Ok(())
    }

    fn install() -> Vec<Self> {
        let mut debit = PaymentMethod::new("DEBIT", "Direct debit", false, 30, DueUnit::Days);
        debit.direct_debit = true;
        vec![
            PaymentMethod::new("CASH", "Cash", true, 0, DueUnit::Days),
            debit,
            PaymentMethod::new("TRANSFER", "Bank transfer", false, 1, DueUnit::Months),
        ]
    }
}

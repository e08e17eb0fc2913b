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

//! The `Customer` table.

use crate::model::{test_party, test_text};
use erp_core::db::Table;
use erp_core::model::ModelResult;
use erp_core::record;
use serde::{Deserialize, Serialize};
use time::Date;

record! {
    /// A party that the companies sell to.
    #[derive(Deserialize, Serialize)]
    pub struct Customer in "customers" {
        /// Code of the customer, generated on insertion when empty.
        primary code: String,

        /// Name of the customer for display purposes.
        name: String,

        /// Legal name of the customer.  Defaults to `name`.
        business_name: String,

        /// Tax identification number.
        tax_id: String,

        /// Contact email address, if any.
        email: String,

        /// Contact phone number.
        phone: String,

        /// Payment method used by default in documents for this customer.
        payment_method_code: String,

        /// Currency used by default in documents for this customer.
        currency_code: String,

        /// Maximum amount of outstanding debt allowed.  Zero means no limit.
        credit_limit: f64,

        /// Date in which the customer was registered.
        registration_date: Option<Date>,

        /// Whether the customer has been deactivated.
        inactive: bool,

        /// Date in which the customer was deactivated, if inactive.
        inactive_since: Option<Date>,

        /// Free-form notes.
        notes: String,
    }
}

impl Customer {
    /// Creates a new customer named `name` whose code will be generated on insertion.
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned(), ..Default::default() }
    }
}

impl Default for Customer {
    fn default() -> Self {
        Self {
            code: String::new(),
            name: String::new(),
            business_name: String::new(),
            tax_id: String::new(),
            email: String::new(),
            phone: String::new(),
            payment_method_code: String::new(),
            currency_code: String::new(),
            credit_limit: 0.0,
            registration_date: None,
            inactive: false,
            inactive_since: None,
            notes: String::new(),
        }
    }
}

impl Table for Customer {
    const AUTO_CODE: bool = true;

    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_owned();
        test_party(
            &self.code,
            &mut self.name,
            &mut self.business_name,
            &mut self.tax_id,
            &mut self.email,
            self.credit_limit,
        )?;
        test_text("phone", &mut self.phone, 30)?;
        test_text("notes", &mut self.notes, 4000)?;
        if !self.inactive {
            self.inactive_since = None;
        }
        Ok(())
    }
}

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

//! The `Company` table.

use crate::model::test_text;
use erp_core::db::Table;
use erp_core::model::{ModelResult, check_email, check_length, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};

/// Identifier of the company created when the database is installed.
pub const DEFAULT_COMPANY_ID: i64 = 1;

record! {
    /// A company managed by the system.  All documents belong to one.
    #[derive(Deserialize, Serialize)]
    pub struct Company in "companies" {
        /// Identifier of the company, assigned on insertion.
        serial id: Option<i64>,

        /// Legal name of the company.
        name: String,

        /// Name of the company for display purposes.
        short_name: String,

        /// Tax identification number of the company.
        tax_id: String,

        /// Street address of the company.
        address: String,

        /// Postal code of the company's address.
        postal_code: String,

        /// City of the company's address.
        city: String,

        /// Province or state of the company's address.
        province: String,

        /// Country of the company's address.
        country_code: String,

        /// Contact phone number.
        phone: String,

        /// Contact email address.
        email: String,
    }
}

impl Company {
    /// Creates a new company named `name` in the country `country_code`.
    pub fn new(name: &str, country_code: &str) -> Self {
        Self {
            name: name.to_owned(),
            short_name: name.to_owned(),
            country_code: country_code.to_owned(),
            ..Default::default()
        }
    }
}

impl Default for Company {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            short_name: String::new(),
            tax_id: String::new(),
            address: String::new(),
            postal_code: String::new(),
            city: String::new(),
            province: String::new(),
            country_code: String::new(),
            phone: String::new(),
            email: String::new(),
        }
    }
}

impl Table for Company {
    fn test(&mut self) -> ModelResult<()> {
        self.name = no_html(self.name.trim());
        check_length("name", &self.name, 1, 100)?;

        self.short_name = no_html(self.short_name.trim());
        if self.short_name.is_empty() {
            self.short_name = self.name.chars().take(32).collect();
        }
        check_length("short_name", &self.short_name, 1, 32)?;

        test_text("tax_id", &mut self.tax_id, 30)?;
        test_text("address", &mut self.address, 200)?;
        test_text("postal_code", &mut self.postal_code, 10)?;
        test_text("city", &mut self.city, 100)?;
        test_text("province", &mut self.province, 100)?;
        test_text("country_code", &mut self.country_code, 20)?;
        test_text("phone", &mut self.phone, 30)?;

        self.email = self.email.trim().to_owned();
        if !self.email.is_empty() {
            check_email(&self.email)?;
        }
        Ok(())
    }

    fn install() -> Vec<Self> {
        vec![Company::new("My company", "ESP")]
    }
}

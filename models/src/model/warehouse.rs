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

//! The `Warehouse` table.

use crate::model::{DEFAULT_COMPANY_ID, test_text};
use erp_core::db::Table;
use erp_core::model::{ModelResult, check_code, check_length, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};

record! {
    /// A place where a company keeps stock.
    #[derive(Deserialize, Serialize)]
    pub struct Warehouse in "warehouses" {
        /// Code of the warehouse.
        primary code: String,

        /// Name of the warehouse.
        name: String,

        /// Company that owns the warehouse.
        company_id: i64,

        /// Street address of the warehouse.
        address: String,

        /// Postal code of the warehouse's address.
        postal_code: String,

        /// City of the warehouse's address.
        city: String,

        /// Province or state of the warehouse's address.
        province: String,

        /// Country of the warehouse's address.
        country_code: String,
    }
}

impl Warehouse {
    /// Creates a new warehouse for the default company.
    pub fn new(code: &str, name: &str) -> Self {
        Self { code: code.to_owned(), name: name.to_owned(), ..Default::default() }
    }
}

impl Default for Warehouse {
    fn default() -> Self {
        Self {
            code: String::new(),
            name: String::new(),
            company_id: DEFAULT_COMPANY_ID,
            address: String::new(),
            postal_code: String::new(),
            city: String::new(),
            province: String::new(),
            country_code: String::new(),
        }
    }
}

impl Table for Warehouse {
    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_owned();
        check_code("code", &self.code, 4)?;

        self.name = no_html(self.name.trim());
        check_length("name", &self.name, 1, 100)?;

        test_text("address", &mut self.address, 200)?;
        test_text("postal_code", &mut self.postal_code, 10)?;
        test_text("city", &mut self.city, 100)?;
        test_text("province", &mut self.province, 100)?;
        test_text("country_code", &mut self.country_code, 20)
    }

    fn install() -> Vec<Self> {
        let mut main = Warehouse::new("MAIN", "Main warehouse");
        main.country_code = "ESP".to_owned();
        vec![main]
    }
}

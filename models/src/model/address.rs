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

//! The `CustomerAddress` table.

use crate::model::test_text;
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult};
use erp_core::record;
use serde::{Deserialize, Serialize};

record! {
    /// A postal address of a customer.
    ///
    /// Each customer has at most one default billing address and one default shipping address.
    #[derive(Deserialize, Serialize)]
    pub struct CustomerAddress in "customer_addresses" {
        /// Identifier of the address, assigned on insertion.
        serial id: Option<i64>,

        /// Customer that this address belongs to.
        customer_code: String,

        /// Short label to tell the customer's addresses apart.
        description: String,

        /// Street address.
        address: String,

        /// Postal code.
        postal_code: String,

        /// City.
        city: String,

        /// Province or state.
        province: String,

        /// Country.
        country_code: String,

        /// Whether this is the customer's default billing address.
        billing_default: bool,

        /// Whether this is the customer's default shipping address.
        shipping_default: bool,
    }
}

impl CustomerAddress {
    /// Creates a new address for the customer `customer_code`.
    pub fn new(customer_code: &str, address: &str, city: &str) -> Self {
        Self {
            customer_code: customer_code.to_owned(),
            address: address.to_owned(),
            city: city.to_owned(),
            ..Default::default()
        }
    }
}

impl Default for CustomerAddress {
    fn default() -> Self {
        Self {
            id: None,
            customer_code: String::new(),
            description: String::new(),
            address: String::new(),
            postal_code: String::new(),
            city: String::new(),
            province: String::new(),
            country_code: String::new(),
            billing_default: false,
            shipping_default: false,
        }
    }
}

impl Table for CustomerAddress {
    fn test(&mut self) -> ModelResult<()> {
        self.customer_code = self.customer_code.trim().to_owned();
        if self.customer_code.is_empty() {
            return Err(ModelError("An address must belong to a customer".to_owned()));
        }

        test_text("description", &mut self.description, 100)?;
        if self.description.is_empty() {
            self.description = "Main".to_owned();
        }
        test_text("address", &mut self.address, 200)?;
        test_text("postal_code", &mut self.postal_code, 10)?;
        test_text("city", &mut self.city, 100)?;
        test_text("province", &mut self.province, 100)?;
        test_text("country_code", &mut self.country_code, 20)
    }
}

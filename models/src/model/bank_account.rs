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

//! The `CustomerBankAccount` table.

use crate::model::test_text;
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_code};
use erp_core::record;
use serde::{Deserialize, Serialize};
use time::Date;

/// Validates an IBAN using the ISO 13616 mod-97 checksum.
///
/// The `iban` must already be normalized: uppercase and without separators.
pub fn check_iban(iban: &str) -> ModelResult<()> {
    let invalid = |reason: &str| ModelError(format!("Invalid IBAN '{}': {}", iban, reason));

    if iban.len() < 15 || iban.len() > 34 {
        return Err(invalid("bad length"));
    }
    if !iban.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err(invalid("unexpected characters"));
    }
    let (country, rest) = iban.split_at(2);
    if !country.chars().all(|c| c.is_ascii_uppercase())
        || !rest[..2].chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid("must start with a country code and two check digits"));
    }

    let mut remainder = 0u32;
    for c in rest[2..].chars().chain(iban[..4].chars()) {
        let digits = match c.to_digit(36) {
            Some(digits) => digits,
            None => return Err(invalid("unexpected characters")),
        };
        remainder = if digits >= 10 {
            (remainder * 100 + digits) % 97
        } else {
            (remainder * 10 + digits) % 97
        };
    }
    if remainder != 1 {
        return Err(invalid("bad checksum"));
    }
    Ok(())
}

record! {
    /// A bank account of a customer.
    ///
    /// Each customer has at most one primary account, which is the one charged by direct debits.
    #[derive(Deserialize, Serialize)]
    pub struct CustomerBankAccount in "customer_bank_accounts" {
        /// Code of the account, generated on insertion when empty.
        primary code: String,

        /// Customer that this account belongs to.
        customer_code: String,

        /// Short label to tell the customer's accounts apart.
        description: String,

        /// International bank account number, normalized without separators.
        iban: String,

        /// SWIFT/BIC code of the bank.
        swift: String,

        /// Whether this is the customer's primary account.
        is_primary: bool,

        /// Reference of the direct debit mandate signed by the customer, if any.
        mandate: String,

        /// Date in which the mandate was signed, if any.
        mandate_date: Option<Date>,
    }
}

impl CustomerBankAccount {
    /// Creates a new account for the customer `customer_code`.
    pub fn new(customer_code: &str, iban: &str) -> Self {
        Self {
            customer_code: customer_code.to_owned(),
            iban: iban.to_owned(),
            ..Default::default()
        }
    }
}

impl Default for CustomerBankAccount {
    fn default() -> Self {
        Self {
            code: String::new(),
            customer_code: String::new(),
            description: String::new(),
            iban: String::new(),
            swift: String::new(),
            is_primary: false,
            mandate: String::new(),
            mandate_date: None,
        }
    }
}

impl Table for CustomerBankAccount {
    const AUTO_CODE: bool = true;

    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_owned();
        if !self.code.is_empty() {
            check_code("code", &self.code, 10)?;
        }

        self.customer_code = self.customer_code.trim().to_owned();
        if self.customer_code.is_empty() {
            return Err(ModelError("A bank account must belong to a customer".to_owned()));
        }

        test_text("description", &mut self.description, 100)?;

        self.iban = self.iban.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
        self.iban = self.iban.to_uppercase();
        if !self.iban.is_empty() {
            check_iban(&self.iban)?;
        }

        self.swift = self.swift.trim().to_uppercase();
        let swift_ok = matches!(self.swift.len(), 0 | 8 | 11)
            && self.swift.chars().all(|c| c.is_ascii_alphanumeric());
        if !swift_ok {
            return Err(ModelError(format!("Invalid swift '{}'", self.swift)));
        }

        test_text("mandate", &mut self.mandate, 35)
    }
}

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

//! Row types of the business tables.
//!
//! Every type is declared with `erp_core::record!` so that its fields map one to one to the
//! columns of its table.  The `Default` implementation of each type sets the values a new record
//! starts with and `Table::test` validates and sanitizes the record before it is saved.

mod accounting;
mod address;
mod bank_account;
mod company;
mod country;
mod currency;
mod customer;
mod exercise;
mod invoice;
mod log_message;
mod payment_method;
mod role;
mod settings;
mod supplier;
mod tax;
mod tax_summary;
mod warehouse;

pub use accounting::{AccountingEntry, AccountingEntryLine};
pub use address::CustomerAddress;
pub use bank_account::{CustomerBankAccount, check_iban};
pub use company::{Company, DEFAULT_COMPANY_ID};
pub use country::Country;
pub use currency::Currency;
pub use customer::Customer;
pub use exercise::{Exercise, ExerciseStatus};
pub use invoice::{CustomerInvoice, CustomerInvoiceLine};
pub use log_message::{AUDIT_CHANNEL, LogLevel, LogMessage};
pub use payment_method::{DueUnit, PaymentMethod};
pub use role::{Role, RoleAccess, RoleUser};
pub use settings::{DEFAULT_SETTINGS_NAME, DefaultSettings, Settings};
pub use supplier::Supplier;
pub use tax::Tax;
pub use tax_summary::TaxSummary;
pub use warehouse::Warehouse;

use erp_core::model::{ModelError, ModelResult, check_code, check_email, check_length, no_html};

/// Maximum length of the codes of customers and suppliers.
pub(crate) const PARTY_CODE_LENGTH: usize = 10;

/// Validates and sanitizes the fields shared by customers and suppliers.
///
/// An empty `code` is accepted because the code is generated on insertion.  An empty
/// `business_name` is replaced by `name`.
pub(crate) fn test_party(
    code: &str,
    name: &mut String,
    business_name: &mut String,
    tax_id: &mut String,
    email: &mut String,
    credit_limit: f64,
) -> ModelResult<()> {
    if !code.is_empty() {
        check_code("code", code, PARTY_CODE_LENGTH)?;
    }

    *name = no_html(name.trim());
    check_length("name", name, 1, 100)?;

    *business_name = no_html(business_name.trim());
    if business_name.is_empty() {
        business_name.clone_from(name);
    }
    check_length("business_name", business_name, 1, 100)?;

    *tax_id = no_html(tax_id.trim());
    check_length("tax_id", tax_id, 0, 30)?;

    *email = email.trim().to_owned();
    if !email.is_empty() {
        check_email(email)?;
    }

    if credit_limit < 0.0 {
        return Err(ModelError(format!("Invalid credit_limit: {} is negative", credit_limit)));
    }
    Ok(())
}

/// Sanitizes the text of an optional free-form field and checks its maximum length.
pub(crate) fn test_text(field: &str, value: &mut String, max: usize) -> ModelResult<()> {
    *value = no_html(value.trim());
    check_length(field, value, 0, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_fills_business_name() {
        let mut name = " Acme <Ltd> ".to_owned();
        let mut business_name = String::new();
        let mut tax_id = "B1".to_owned();
        let mut email = " info@acme.example ".to_owned();
        test_party("", &mut name, &mut business_name, &mut tax_id, &mut email, 0.0).unwrap();
        assert_eq!("Acme &lt;Ltd&gt;", name);
        assert_eq!(name, business_name);
        assert_eq!("info@acme.example", email);
    }

    #[test]
    fn test_party_errors() {
        let mut name = "Acme".to_owned();
        let mut empty = String::new();
        let mut other = String::new();
        let mut email = String::new();
        test_party("bad", &mut name, &mut empty, &mut other, &mut email, 0.0).unwrap_err();
        test_party("", &mut empty.clone(), &mut other, &mut String::new(), &mut email, 0.0)
            .unwrap_err();
        test_party("", &mut name, &mut other, &mut String::new(), &mut "x".to_owned(), 0.0)
            .unwrap_err();
        test_party("", &mut name, &mut other, &mut String::new(), &mut email, -1.0).unwrap_err();
    }
}

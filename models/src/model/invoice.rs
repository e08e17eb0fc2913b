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

//! The `CustomerInvoice` and `CustomerInvoiceLine` tables.

use crate::model::{DEFAULT_COMPANY_ID, test_text};
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_length, check_percentage, no_html, round_to};
use erp_core::record;
use serde::{Deserialize, Serialize};
use time::Date;
use time::macros::date;

/// Number of decimal positions kept in document amounts.
const AMOUNT_DECIMALS: u32 = 2;

/// Prefix of the codes of customer invoices.
pub(crate) const INVOICE_CODE_PREFIX: &str = "FAC";

record! {
    /// A sales invoice issued to a customer.
    ///
    /// The customer data is copied into the invoice when it is created so that later changes to
    /// the customer do not alter issued documents.
    #[derive(Deserialize, Serialize)]
    pub struct CustomerInvoice in "customer_invoices" {
        /// Identifier of the invoice, assigned on insertion.
        serial id: Option<i64>,

        /// Printable code of the invoice, derived from its year and number.
        code: String,

        /// Sequential number of the invoice within its company and year.
        number: i64,

        /// Customer that the invoice was issued to.
        customer_code: String,

        /// Name of the customer at the time of issuing.
        customer_name: String,

        /// Tax identification number of the customer at the time of issuing.
        customer_tax_id: String,

        /// Billing street address.
        address: String,

        /// Billing postal code.
        postal_code: String,

        /// Billing city.
        city: String,

        /// Billing province or state.
        province: String,

        /// Billing country.
        country_code: String,

        /// Company issuing the invoice.
        company_id: i64,

        /// Warehouse the goods are served from.
        warehouse_code: String,

        /// Currency of the amounts of the invoice.
        currency_code: String,

        /// Exchange rate of `currency_code` at the time of issuing.
        currency_rate: f64,

        /// Payment method agreed for the invoice.
        payment_method_code: String,

        /// Issuing date.
        date: Date,

        /// Date in which payment is due, if known.
        due_date: Option<Date>,

        /// Sum of the totals of all lines before taxes.
        net: f64,

        /// Sum of the taxes of all lines.
        total_tax: f64,

        /// Sum of the surcharges of all lines.
        total_surcharge: f64,

        /// Amount to be paid.
        total: f64,

        /// Whether the invoice has been paid.
        paid: bool,

        /// Free-form notes.
        notes: String,
    }
}

impl CustomerInvoice {
    /// Computes the printable code of the invoice `number` issued in `year`.
    pub fn format_code(year: i32, number: i64) -> String {
        format!("{}{}-{:05}", INVOICE_CODE_PREFIX, year, number)
    }

    /// Recomputes the totals of the invoice from its `lines`.
    pub fn recompute_totals(&mut self, lines: &[CustomerInvoiceLine]) {
        let mut net = 0.0;
        let mut total_tax = 0.0;
        let mut total_surcharge = 0.0;
        for line in lines {
            net += line.line_total;
            total_tax += line.tax_amount();
            total_surcharge += line.surcharge_amount();
        }
        self.net = round_to(net, AMOUNT_DECIMALS);
        self.total_tax = round_to(total_tax, AMOUNT_DECIMALS);
        self.total_surcharge = round_to(total_surcharge, AMOUNT_DECIMALS);
        self.total = round_to(self.net + self.total_tax + self.total_surcharge, AMOUNT_DECIMALS);
    }
}

impl Default for CustomerInvoice {
    fn default() -> Self {
        Self {
            id: None,
            code: String::new(),
            number: 0,
            customer_code: String::new(),
            customer_name: String::new(),
            customer_tax_id: String::new(),
            address: String::new(),
            postal_code: String::new(),
            city: String::new(),
            province: String::new(),
            country_code: String::new(),
            company_id: DEFAULT_COMPANY_ID,
            warehouse_code: String::new(),
            currency_code: String::new(),
            currency_rate: 1.0,
            payment_method_code: String::new(),
            date: date!(2000 - 01 - 01),
            due_date: None,
            net: 0.0,
            total_tax: 0.0,
            total_surcharge: 0.0,
            total: 0.0,
            paid: false,
            notes: String::new(),
        }
    }
}

impl Table for CustomerInvoice {
    fn test(&mut self) -> ModelResult<()> {
        test_text("code", &mut self.code, 20)?;

        self.customer_code = self.customer_code.trim().to_owned();
        if self.customer_code.is_empty() {
            return Err(ModelError("An invoice must be issued to a customer".to_owned()));
        }
        self.customer_name = no_html(self.customer_name.trim());
        check_length("customer_name", &self.customer_name, 1, 100)?;
        test_text("customer_tax_id", &mut self.customer_tax_id, 30)?;

        test_text("address", &mut self.address, 200)?;
        test_text("postal_code", &mut self.postal_code, 10)?;
        test_text("city", &mut self.city, 100)?;
        test_text("province", &mut self.province, 100)?;
        test_text("notes", &mut self.notes, 4000)?;

        if self.currency_rate.is_nan() || self.currency_rate <= 0.0 {
            return Err(ModelError(format!("Invalid currency_rate {}", self.currency_rate)));
        }
        if let Some(due_date) = self.due_date {
            if due_date < self.date {
                return Err(ModelError(format!(
                    "Due date {} cannot be before the invoice date {}",
                    due_date, self.date
                )));
            }
        }

        self.net = round_to(self.net, AMOUNT_DECIMALS);
        self.total_tax = round_to(self.total_tax, AMOUNT_DECIMALS);
        self.total_surcharge = round_to(self.total_surcharge, AMOUNT_DECIMALS);
        self.total = round_to(self.total, AMOUNT_DECIMALS);
        Ok(())
    }
}

record! {
    /// A line of a customer invoice.
    #[derive(Deserialize, Serialize)]
    pub struct CustomerInvoiceLine in "customer_invoice_lines" {
        /// Identifier of the line, assigned on insertion.
        serial id: Option<i64>,

        /// Invoice that this line belongs to.
        invoice_id: i64,

        /// Reference of the product sold, if any.
        reference: String,

        /// Description of what was sold.
        description: String,

        /// Number of units sold.
        quantity: f64,

        /// Price of each unit before discounts.
        unit_price: f64,

        /// Discount percentage applied to the line.
        discount: f64,

        /// Tax applied to the line.
        tax_code: String,

        /// Tax percentage applied to the line.
        tax_rate: f64,

        /// Surcharge percentage applied to the line.
        surcharge: f64,

        /// Amount of the line after discounts and before taxes.
        line_total: f64,
    }
}

impl CustomerInvoiceLine {
    /// Creates a new line for `invoice_id` without taxes.
    pub fn new(invoice_id: i64, description: &str, quantity: f64, unit_price: f64) -> Self {
        Self {
            invoice_id,
            description: description.to_owned(),
            quantity,
            unit_price,
            ..Default::default()
        }
    }

    /// Returns the tax amount of the line.
    pub fn tax_amount(&self) -> f64 {
        self.line_total * self.tax_rate / 100.0
    }

    /// Returns the surcharge amount of the line.
    pub fn surcharge_amount(&self) -> f64 {
        self.line_total * self.surcharge / 100.0
    }
}

impl Default for CustomerInvoiceLine {
    fn default() -> Self {
        Self {
            id: None,
            invoice_id: 0,
            reference: String::new(),
            description: String::new(),
            quantity: 1.0,
            unit_price: 0.0,
            discount: 0.0,
            tax_code: String::new(),
            tax_rate: 0.0,
            surcharge: 0.0,
            line_total: 0.0,
        }
    }
}

impl Table for CustomerInvoiceLine {
    fn test(&mut self) -> ModelResult<()> {
        if self.invoice_id <= 0 {
            return Err(ModelError("A line must belong to an invoice".to_owned()));
        }

        test_text("reference", &mut self.reference, 30)?;
        test_text("description", &mut self.description, 4000)?;

        if self.quantity.is_nan() || self.unit_price.is_nan() {
            return Err(ModelError("quantity and unit_price must be numbers".to_owned()));
        }
        check_percentage("discount", self.discount)?;
        check_percentage("tax_rate", self.tax_rate)?;
        check_percentage("surcharge", self.surcharge)?;

        self.line_total = round_to(
            self.quantity * self.unit_price * (1.0 - self.discount / 100.0),
            AMOUNT_DECIMALS,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice() -> CustomerInvoice {
        CustomerInvoice {
            customer_code: "1".to_owned(),
            customer_name: "Acme".to_owned(),
            date: date!(2024 - 05 - 10),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_code() {
        assert_eq!("FAC2024-00001", CustomerInvoice::format_code(2024, 1));
        assert_eq!("FAC2024-123456", CustomerInvoice::format_code(2024, 123456));
    }

    #[test]
    fn test_invoice_validation() {
        invoice().test().unwrap();

        CustomerInvoice { customer_code: String::new(), ..invoice() }.test().unwrap_err();
        CustomerInvoice { customer_name: String::new(), ..invoice() }.test().unwrap_err();
        CustomerInvoice { currency_rate: 0.0, ..invoice() }.test().unwrap_err();

        let early = Some(date!(2024 - 05 - 09));
        CustomerInvoice { due_date: early, ..invoice() }.test().unwrap_err();
    }

    #[test]
    fn test_line_total() {
        let mut line = CustomerInvoiceLine::new(1, "Widgets", 3.0, 10.0);
        line.discount = 10.0;
        line.test().unwrap();
        assert_eq!(27.0, line.line_total);

        line.discount = 150.0;
        line.test().unwrap_err();

        CustomerInvoiceLine::new(0, "Widgets", 1.0, 1.0).test().unwrap_err();
    }

    #[test]
    fn test_recompute_totals() {
        let mut first = CustomerInvoiceLine::new(1, "A", 2.0, 50.0);
        first.tax_rate = 21.0;
        first.surcharge = 5.2;
        first.test().unwrap();
        let mut second = CustomerInvoiceLine::new(1, "B", 1.0, 50.0);
        second.tax_rate = 10.0;
        second.test().unwrap();

        let mut invoice = invoice();
        invoice.recompute_totals(&[first, second]);
        assert_eq!(150.0, invoice.net);
        assert_eq!(26.0, invoice.total_tax);
        assert_eq!(5.2, invoice.total_surcharge);
        assert_eq!(181.2, invoice.total);
    }
}

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

//! Rules of customer invoices.

use crate::db;
use crate::driver::base::check_reference;
use crate::driver::{Entity, ErpDriver, HookContext, refuse, save_entity, stored};
use crate::model::{
    Currency, Customer, CustomerAddress, CustomerInvoice, CustomerInvoiceLine, PaymentMethod, Tax,
};
use erp_core::db::{Executor, OrderBy, Where, table};
use erp_core::driver::{DriverError, DriverResult};

/// Loads the invoice `invoice_id` and checks that its lines can still be modified.
async fn unpaid_invoice(
    ctx: &mut HookContext<'_>,
    invoice_id: i64,
) -> DriverResult<CustomerInvoice> {
    let invoice = match table::load::<CustomerInvoice, _>(ctx.ex(), invoice_id).await? {
        Some(invoice) => invoice,
        None => return Err(DriverError::InvalidInput(format!("Unknown invoice {}", invoice_id))),
    };
    if invoice.paid {
        return refuse(format!("Invoice {} has been paid", invoice.code));
    }
    Ok(invoice)
}

/// Recomputes the totals of the invoice `invoice_id` from its stored lines, ignoring the line
/// `without` if given.
async fn update_invoice_totals(
    ctx: &mut HookContext<'_>,
    invoice_id: i64,
    without: Option<i64>,
) -> DriverResult<()> {
    let mut invoice = table::get::<CustomerInvoice, _>(ctx.ex(), invoice_id).await?;
    let mut lines = db::invoice_lines(ctx.ex(), invoice_id).await?;
    if without.is_some() {
        lines.retain(|l| l.id != without);
    }
    invoice.recompute_totals(&lines);
    table::update(ctx.ex(), &invoice).await?;
    Ok(())
}

/// Loads the billing address that new invoices for `customer_code` default to.
async fn billing_address(
    ex: &mut Executor,
    customer_code: &str,
) -> DriverResult<Option<CustomerAddress>> {
    let filter = [Where::eq("customer_code", customer_code), Where::eq("billing_default", true)];
    Ok(table::load_where(ex, &filter, &[OrderBy::asc("id")]).await?)
}

#[async_trait::async_trait]
impl Entity for CustomerInvoice {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        check_reference::<Customer, _>(ctx, "customer", self.customer_code.trim()).await?;

        if self.number == 0 {
            self.number =
                db::next_invoice_number(ctx.ex(), self.company_id, self.date.year()).await?;
            self.code = CustomerInvoice::format_code(self.date.year(), self.number);
        } else if self.code.trim().is_empty() {
            self.code = CustomerInvoice::format_code(self.date.year(), self.number);
        }

        if self.due_date.is_none() && !self.payment_method_code.is_empty() {
            let method = table::load::<PaymentMethod, _>(ctx.ex(), &self.payment_method_code);
            match method.await? {
                Some(method) => self.due_date = Some(method.due_date(self.date)?),
                None => {
                    return Err(DriverError::InvalidInput(format!(
                        "Unknown payment method {}",
                        self.payment_method_code
                    )));
                }
            }
        }

        let lines = match self.id {
            Some(id) => db::invoice_lines(ctx.ex(), id).await?,
            None => vec![],
        };
        self.recompute_totals(&lines);
        Ok(())
    }

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if self.paid {
            return refuse(format!("Cannot delete invoice {}: it has been paid", self.code));
        }
        let filter = [Where::eq("invoice_id", self.id)];
        table::delete_where::<CustomerInvoiceLine>(ctx.ex(), &filter).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Entity for CustomerInvoiceLine {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if let Some(stored) = stored(ctx.ex(), self).await? {
            unpaid_invoice(ctx, stored.invoice_id).await?;
            if stored.invoice_id != self.invoice_id {
                update_invoice_totals(ctx, stored.invoice_id, self.id).await?;
            }
        }
        unpaid_invoice(ctx, self.invoice_id).await?;

        self.tax_code = self.tax_code.trim().to_owned();
        if self.tax_code.is_empty() {
            return Ok(());
        }
        match table::load::<Tax, _>(ctx.ex(), &self.tax_code).await? {
            Some(tax) => {
                self.tax_rate = tax.rate;
                Ok(())
            }
            None => Err(DriverError::InvalidInput(format!("Unknown tax {}", self.tax_code))),
        }
    }

    async fn after_save(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        update_invoice_totals(ctx, self.invoice_id, None).await
    }

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        unpaid_invoice(ctx, self.invoice_id).await?;
        Ok(())
    }

    async fn after_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        update_invoice_totals(ctx, self.invoice_id, None).await
    }
}

impl ErpDriver {
    /// Creates a new invoice for `customer_code`, not yet stored, dated today.
    ///
    /// The invoice carries a copy of the customer data and its default billing address, and
    /// the payment method and currency of the customer, falling back to the system defaults.
    pub async fn new_invoice(self, customer_code: &str) -> DriverResult<CustomerInvoice> {
        let mut ex = self.db.ex().await?;

        let customer = match table::load::<Customer, _>(&mut ex, customer_code).await? {
            Some(customer) => customer,
            None => {
                return Err(DriverError::NotFound(format!("Customer {} not found", customer_code)));
            }
        };
        let defaults = db::load_default_settings(&mut ex).await?;
        let address = billing_address(&mut ex, customer_code).await?.unwrap_or_default();

        let or_default = |code: String, default: &str| {
            if code.is_empty() { default.to_owned() } else { code }
        };
        let currency_code = or_default(customer.currency_code, &defaults.currency_code);
        let currency_rate = match table::load::<Currency, _>(&mut ex, &currency_code).await? {
            Some(currency) => currency.rate,
            None => 1.0,
        };

        Ok(CustomerInvoice {
            customer_code: customer.code,
            customer_name: customer.business_name,
            customer_tax_id: customer.tax_id,
            address: address.address,
            postal_code: address.postal_code,
            city: address.city,
            province: address.province,
            country_code: or_default(address.country_code, &defaults.country_code),
            company_id: defaults.company_id,
            warehouse_code: defaults.warehouse_code,
            currency_code,
            currency_rate,
            payment_method_code: or_default(
                customer.payment_method_code,
                &defaults.payment_method_code,
            ),
            date: self.clock.today_utc(),
            ..Default::default()
        })
    }

    /// Gets the lines of the invoice `invoice_id`.
    pub async fn invoice_lines(self, invoice_id: i64) -> DriverResult<Vec<CustomerInvoiceLine>> {
        let mut ex = self.db.ex().await?;
        Ok(db::invoice_lines(&mut ex, invoice_id).await?)
    }

    /// Adds `line` to the invoice `invoice_id` and returns the invoice with updated totals.
    ///
    /// Lines without a tax get the default tax of the system.
    pub async fn add_invoice_line(
        self,
        invoice_id: i64,
        mut line: CustomerInvoiceLine,
    ) -> DriverResult<CustomerInvoice> {
        let mut tx = self.db.begin().await?;
        let mut ctx = self.context(&mut tx);

        line.invoice_id = invoice_id;
        if line.tax_code.trim().is_empty() {
            line.tax_code = db::load_default_settings(ctx.ex()).await?.tax_code;
        }
        save_entity(&mut ctx, &mut line).await?;
        let invoice = table::get::<CustomerInvoice, _>(ctx.ex(), invoice_id).await?;

        tx.commit().await?;
        Ok(invoice)
    }
}

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

//! Rules of customers, suppliers and the records that belong to customers.

use crate::db;
use crate::driver::base::check_reference;
use crate::driver::{Entity, ErpDriver, HookContext, refuse, stored};
use crate::model::{
    Currency, Customer, CustomerAddress, CustomerBankAccount, CustomerInvoice, PaymentMethod,
    Supplier,
};
use erp_core::db::{OrderBy, Where, table};
use erp_core::driver::DriverResult;
use time::Date;

/// Applies the rules shared by customers and suppliers before they are stored.
async fn before_save_party(
    ctx: &mut HookContext<'_>,
    payment_method_code: &str,
    currency_code: &str,
    registration_date: &mut Option<Date>,
    inactive: bool,
    inactive_since: &mut Option<Date>,
) -> DriverResult<()> {
    if !payment_method_code.is_empty() {
        check_reference::<PaymentMethod, _>(ctx, "payment method", payment_method_code).await?;
    }
    if !currency_code.is_empty() {
        check_reference::<Currency, _>(ctx, "currency", currency_code).await?;
    }

    let today = ctx.today();
    registration_date.get_or_insert(today);
    if inactive {
        inactive_since.get_or_insert(today);
    } else {
        *inactive_since = None;
    }
    Ok(())
}

#[async_trait::async_trait]
impl Entity for Customer {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        before_save_party(
            ctx,
            &self.payment_method_code,
            &self.currency_code,
            &mut self.registration_date,
            self.inactive,
            &mut self.inactive_since,
        )
        .await
    }

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        let filter = [Where::eq("customer_code", self.code.as_str())];
        let invoices = table::count::<CustomerInvoice>(ctx.ex(), &filter).await?;
        if invoices > 0 {
            return refuse(format!(
                "Cannot delete customer {}: it has {} invoices",
                self.code, invoices
            ));
        }

        table::delete_where::<CustomerAddress>(ctx.ex(), &filter).await?;
        table::delete_where::<CustomerBankAccount>(ctx.ex(), &filter).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Entity for Supplier {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        before_save_party(
            ctx,
            &self.payment_method_code,
            &self.currency_code,
            &mut self.registration_date,
            self.inactive,
            &mut self.inactive_since,
        )
        .await
    }
}

/// Builds the filter that selects the addresses of `customer_code` other than `id`.
fn sibling_addresses(customer_code: &str, id: Option<i64>) -> Vec<Where> {
    let mut filter = vec![Where::eq("customer_code", customer_code)];
    if let Some(id) = id {
        filter.push(Where::neq("id", id));
    }
    filter
}

#[async_trait::async_trait]
impl Entity for CustomerAddress {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        check_reference::<Customer, _>(ctx, "customer", self.customer_code.trim()).await?;
        if let Some(stored) = stored(ctx.ex(), self).await? {
            if stored.customer_code != self.customer_code.trim() {
                promote_address(ctx, &stored).await?;
            }
        }

        let siblings = sibling_addresses(self.customer_code.trim(), self.id);
        if table::count::<CustomerAddress>(ctx.ex(), &siblings).await? == 0 {
            self.billing_default = true;
            self.shipping_default = true;
        }
        Ok(())
    }

    async fn after_save(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        let siblings = sibling_addresses(&self.customer_code, self.id);
        for (column, is_default) in
            [("billing_default", self.billing_default), ("shipping_default", self.shipping_default)]
        {
            if is_default {
                let assignments = [(column, false.into())];
                table::update_where::<CustomerAddress>(ctx.ex(), &assignments, &siblings).await?;
            }
        }
        Ok(())
    }

    async fn after_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        promote_address(ctx, self).await
    }
}

/// Hands the default flags of `stored` over to the oldest other address of its customer.
async fn promote_address(ctx: &mut HookContext<'_>, stored: &CustomerAddress) -> DriverResult<()> {
    let siblings = sibling_addresses(&stored.customer_code, stored.id);
    let order = [OrderBy::asc("id")];
    let first = match table::load_where::<CustomerAddress>(ctx.ex(), &siblings, &order).await? {
        Some(first) => first,
        None => return Ok(()),
    };

    for (column, was_default) in
        [("billing_default", stored.billing_default), ("shipping_default", stored.shipping_default)]
    {
        if was_default {
            let assignments = [(column, true.into())];
            let filter = [Where::eq("id", first.id)];
            table::update_where::<CustomerAddress>(ctx.ex(), &assignments, &filter).await?;
        }
    }
    Ok(())
}

/// Builds the filter that selects the bank accounts of `customer_code` other than `code`.
fn sibling_accounts(customer_code: &str, code: &str) -> Vec<Where> {
    let mut filter = vec![Where::eq("customer_code", customer_code)];
    if !code.is_empty() {
        filter.push(Where::neq("code", code));
    }
    filter
}

#[async_trait::async_trait]
impl Entity for CustomerBankAccount {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        check_reference::<Customer, _>(ctx, "customer", self.customer_code.trim()).await?;
        if let Some(stored) = stored(ctx.ex(), self).await? {
            if stored.customer_code != self.customer_code.trim() {
                promote_account(ctx, &stored).await?;
            }
        }

        let siblings = sibling_accounts(self.customer_code.trim(), self.code.trim());
        if table::count::<CustomerBankAccount>(ctx.ex(), &siblings).await? == 0 {
            self.is_primary = true;
        }
        Ok(())
    }

    async fn after_save(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if self.is_primary {
            let siblings = sibling_accounts(&self.customer_code, &self.code);
            let assignments = [("is_primary", false.into())];
            table::update_where::<CustomerBankAccount>(ctx.ex(), &assignments, &siblings).await?;
        }
        Ok(())
    }

    async fn after_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        promote_account(ctx, self).await
    }
}

/// Hands the primary flag of `stored` over to the first other bank account of its customer.
async fn promote_account(
    ctx: &mut HookContext<'_>,
    stored: &CustomerBankAccount,
) -> DriverResult<()> {
    if !stored.is_primary {
        return Ok(());
    }

    let siblings = sibling_accounts(&stored.customer_code, &stored.code);
    let order = [OrderBy::asc("code")];
    if let Some(first) =
        table::load_where::<CustomerBankAccount>(ctx.ex(), &siblings, &order).await?
    {
        let assignments = [("is_primary", true.into())];
        let filter = [Where::eq("code", first.code)];
        table::update_where::<CustomerBankAccount>(ctx.ex(), &assignments, &filter).await?;
    }
    Ok(())
}

impl ErpDriver {
    /// Creates a new customer, not yet stored, initialized with the system defaults.
    pub async fn new_customer(self) -> DriverResult<Customer> {
        let mut ex = self.db.ex().await?;
        let defaults = db::load_default_settings(&mut ex).await?;
        Ok(Customer {
            payment_method_code: defaults.payment_method_code,
            currency_code: defaults.currency_code,
            registration_date: Some(self.clock.today_utc()),
            ..Default::default()
        })
    }

    /// Creates a new supplier, not yet stored, initialized with the system defaults.
    pub async fn new_supplier(self) -> DriverResult<Supplier> {
        let mut ex = self.db.ex().await?;
        let defaults = db::load_default_settings(&mut ex).await?;
        Ok(Supplier {
            payment_method_code: defaults.payment_method_code,
            currency_code: defaults.currency_code,
            registration_date: Some(self.clock.today_utc()),
            ..Default::default()
        })
    }

    /// Gets all addresses of the customer `customer_code`.
    pub async fn customer_addresses(
        self,
        customer_code: &str,
    ) -> DriverResult<Vec<CustomerAddress>> {
        let mut ex = self.db.ex().await?;
        Ok(db::customer_addresses(&mut ex, customer_code).await?)
    }

    /// Gets all bank accounts of the customer `customer_code`.
    pub async fn customer_bank_accounts(
        self,
        customer_code: &str,
    ) -> DriverResult<Vec<CustomerBankAccount>> {
        let mut ex = self.db.ex().await?;
        Ok(db::customer_bank_accounts(&mut ex, customer_code).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::testutils::*;
    use crate::model::*;
    use erp_core::db::table;
    use erp_core::driver::DriverError;
    use std::time::Duration;
    use time::macros::date;

    /// Saves a new customer named `name` through the driver.
    async fn create_customer(context: &TestContext, name: &str) -> Customer {
        let mut customer = context.driver().new_customer().await.unwrap();
        customer.name = name.to_owned();
        context.driver().save(customer).await.unwrap()
    }

    /// Returns the cities of the billing and shipping default addresses of `customer`.
    async fn defaults_of(context: &TestContext, customer: &Customer) -> (Vec<String>, Vec<String>) {
        let addresses = context.driver().customer_addresses(&customer.code).await.unwrap();
        let billing = addresses.iter().filter(|a| a.billing_default).map(|a| a.city.clone());
        let shipping = addresses.iter().filter(|a| a.shipping_default).map(|a| a.city.clone());
        (billing.collect(), shipping.collect())
    }

    /// Shorthand to build the expected result of `defaults_of`.
    fn cities(billing: &str, shipping: &str) -> (Vec<String>, Vec<String>) {
        (vec![billing.to_owned()], vec![shipping.to_owned()])
    }

    #[tokio::test]
    async fn test_new_customer_uses_defaults() {
        let context = TestContext::setup().await;

        let customer = context.driver().new_customer().await.unwrap();
        assert_eq!("CASH", customer.payment_method_code);
        assert_eq!("EUR", customer.currency_code);
        assert_eq!(Some(date!(2024 - 05 - 10)), customer.registration_date);

        let supplier = context.driver().new_supplier().await.unwrap();
        assert_eq!("CASH", supplier.payment_method_code);
        assert_eq!(Some(date!(2024 - 05 - 10)), supplier.registration_date);
    }

    #[tokio::test]
    async fn test_party_references_must_exist() {
        let context = TestContext::setup().await;

        let mut customer = Customer::new("Acme");
        customer.currency_code = "XXX".to_owned();
        match context.driver().save(customer).await {
            Err(DriverError::InvalidInput(e)) => assert!(e.contains("Unknown currency XXX")),
            e => panic!("{:?}", e),
        }

        let mut supplier = Supplier::new("Parts");
        supplier.payment_method_code = "NOPE".to_owned();
        context.driver().save(supplier).await.unwrap_err();
    }

    #[tokio::test]
    async fn test_inactive_since_follows_inactive() {
        let context = TestContext::setup().await;

        let mut customer = create_customer(&context, "Acme").await;
        assert_eq!(None, customer.inactive_since);

        context.clock.advance(Duration::from_secs(3 * 24 * 60 * 60));
        customer.inactive = true;
        let mut customer = context.driver().save(customer).await.unwrap();
        assert_eq!(Some(date!(2024 - 05 - 13)), customer.inactive_since);

        context.clock.advance(Duration::from_secs(24 * 60 * 60));
        let customer2 = context.driver().save(customer.clone()).await.unwrap();
        assert_eq!(Some(date!(2024 - 05 - 13)), customer2.inactive_since);

        customer.inactive = false;
        let customer = context.driver().save(customer).await.unwrap();
        assert_eq!(None, customer.inactive_since);
        assert_eq!(Some(date!(2024 - 05 - 10)), customer.registration_date);
    }

    #[tokio::test]
    async fn test_first_address_becomes_default() {
        let context = TestContext::setup().await;
        let customer = create_customer(&context, "Acme").await;

        let first = CustomerAddress::new(&customer.code, "Street 1", "First");
        let first = context.driver().save(first).await.unwrap();
        assert!(first.billing_default);
        assert!(first.shipping_default);

        let second = CustomerAddress::new(&customer.code, "Street 2", "Second");
        let second = context.driver().save(second).await.unwrap();
        assert!(!second.billing_default);
        assert!(!second.shipping_default);

        // The only address of a customer is always the default one.
        let other = create_customer(&context, "Other").await;
        let only = CustomerAddress::new(&other.code, "Street 3", "Only");
        let mut only = context.driver().save(only).await.unwrap();
        only.billing_default = false;
        let only = context.driver().save(only).await.unwrap();
        assert!(only.billing_default);
    }

    #[tokio::test]
    async fn test_default_address_unmarks_siblings() {
        let context = TestContext::setup().await;
        let customer = create_customer(&context, "Acme").await;
        let other = create_customer(&context, "Other").await;

        for (code, city) in [(&customer.code, "A"), (&customer.code, "B"), (&other.code, "X")] {
            context.driver().save(CustomerAddress::new(code, "Street", city)).await.unwrap();
        }
        assert_eq!(cities("A", "A"), defaults_of(&context, &customer).await);

        let mut third = CustomerAddress::new(&customer.code, "Street", "C");
        third.billing_default = true;
        context.driver().save(third).await.unwrap();
        assert_eq!(cities("C", "A"), defaults_of(&context, &customer).await);

        let addresses = context.driver().customer_addresses(&customer.code).await.unwrap();
        let mut b = addresses.into_iter().find(|a| a.city == "B").unwrap();
        b.shipping_default = true;
        context.driver().save(b).await.unwrap();
        assert_eq!(cities("C", "B"), defaults_of(&context, &customer).await);

        // Addresses of other customers are unaffected.
        assert_eq!(cities("X", "X"), defaults_of(&context, &other).await);
    }

    #[tokio::test]
    async fn test_deleting_default_address_promotes_another() {
        let context = TestContext::setup().await;
        let customer = create_customer(&context, "Acme").await;

        let first = CustomerAddress::new(&customer.code, "Street", "A");
        let first = context.driver().save(first).await.unwrap();
        let second = CustomerAddress::new(&customer.code, "Street", "B");
        context.driver().save(second).await.unwrap();

        context.driver().delete(first).await.unwrap();
        assert_eq!(cities("B", "B"), defaults_of(&context, &customer).await);
    }

    #[tokio::test]
    async fn test_address_needs_existing_customer() {
        let context = TestContext::setup().await;

        match context.driver().save(CustomerAddress::new("404", "Street", "City")).await {
            Err(DriverError::InvalidInput(e)) => assert!(e.contains("Unknown customer 404")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_primary_bank_account_unmarks_siblings() {
        let context = TestContext::setup().await;
        let customer = create_customer(&context, "Acme").await;

        let first = CustomerBankAccount::new(&customer.code, "ES9121000418450200051332");
        let first = context.driver().save(first).await.unwrap();
        assert_eq!("1", first.code);
        assert!(first.is_primary);

        let mut second = CustomerBankAccount::new(&customer.code, "GB82WEST12345698765432");
        second.is_primary = true;
        let second = context.driver().save(second).await.unwrap();
        assert_eq!("2", second.code);

        let accounts = context.driver().customer_bank_accounts(&customer.code).await.unwrap();
        assert_eq!(
            vec![("1", false), ("2", true)],
            accounts.iter().map(|a| (a.code.as_str(), a.is_primary)).collect::<Vec<_>>()
        );

        context.driver().delete(second).await.unwrap();
        let accounts = context.driver().customer_bank_accounts(&customer.code).await.unwrap();
        assert_eq!(1, accounts.len());
        assert!(accounts[0].is_primary);
    }

    #[tokio::test]
    async fn test_moving_default_address_promotes_another() {
        let context = TestContext::setup().await;
        let customer = create_customer(&context, "Acme").await;
        let other = create_customer(&context, "Other").await;

        let first = CustomerAddress::new(&customer.code, "Street", "A");
        let mut first = context.driver().save(first).await.unwrap();
        let second = CustomerAddress::new(&customer.code, "Street", "B");
        context.driver().save(second).await.unwrap();
        let third = CustomerAddress::new(&other.code, "Street", "X");
        context.driver().save(third).await.unwrap();

        first.customer_code = other.code.clone();
        context.driver().save(first).await.unwrap();
        assert_eq!(cities("B", "B"), defaults_of(&context, &customer).await);
        assert_eq!(cities("A", "A"), defaults_of(&context, &other).await);
    }

    #[tokio::test]
    async fn test_moving_primary_bank_account_promotes_another() {
        let context = TestContext::setup().await;
        let customer = create_customer(&context, "Acme").await;
        let other = create_customer(&context, "Other").await;

        let first = CustomerBankAccount::new(&customer.code, "ES9121000418450200051332");
        let mut first = context.driver().save(first).await.unwrap();
        let second = CustomerBankAccount::new(&customer.code, "GB82WEST12345698765432");
        context.driver().save(second).await.unwrap();

        first.customer_code = other.code.clone();
        context.driver().save(first).await.unwrap();

        let accounts = context.driver().customer_bank_accounts(&customer.code).await.unwrap();
        assert_eq!(
            vec![("2", true)],
            accounts.iter().map(|a| (a.code.as_str(), a.is_primary)).collect::<Vec<_>>()
        );
        let accounts = context.driver().customer_bank_accounts(&other.code).await.unwrap();
        assert_eq!(
            vec![("1", true)],
            accounts.iter().map(|a| (a.code.as_str(), a.is_primary)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_delete_customer_cascades() {
        let context = TestContext::setup().await;
        let customer = create_customer(&context, "Acme").await;
        let other = create_customer(&context, "Other").await;

        for code in [&customer.code, &customer.code, &other.code] {
            context.driver().save(CustomerAddress::new(code, "Street", "City")).await.unwrap();
        }
        let account = CustomerBankAccount::new(&customer.code, "DE89370400440532013000");
        context.driver().save(account).await.unwrap();

        context.driver().delete(customer).await.unwrap();

        let mut ex = context.ex().await;
        assert_eq!(1, table::count::<CustomerAddress>(&mut ex, &[]).await.unwrap());
        assert_eq!(0, table::count::<CustomerBankAccount>(&mut ex, &[]).await.unwrap());
        assert_eq!(1, table::count::<Customer>(&mut ex, &[]).await.unwrap());
    }
}

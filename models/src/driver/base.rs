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

//! Rules of the master tables and of the system defaults that refer to them.

use crate::db;
use crate::driver::{Entity, ErpDriver, HookContext, refuse};
use crate::model::{
    Company, Country, Currency, DEFAULT_SETTINGS_NAME, DefaultSettings, PaymentMethod, Settings,
    Tax, Warehouse,
};
use erp_core::db::{Record, Value, table};
use erp_core::driver::{DriverError, DriverResult};
use std::sync::Arc;

/// Refuses to continue if `code` is the default record of its kind.
///
/// `pick` extracts the code of the default record of the kind from the system defaults.
async fn refuse_if_default(
    ctx: &mut HookContext<'_>,
    kind: &str,
    code: String,
    pick: fn(&DefaultSettings) -> String,
) -> DriverResult<()> {
    let defaults = db::load_default_settings(ctx.ex()).await?;
    if pick(&defaults) == code {
        return refuse(format!("Cannot delete {} {}: it is the default one", kind, code));
    }
    Ok(())
}

/// Checks that the record of `M` with primary key `code` exists.
pub(crate) async fn check_reference<M: Record, V: Into<Value> + Send>(
    ctx: &mut HookContext<'_>,
    kind: &str,
    code: V,
) -> DriverResult<()> {
    let code = code.into();
    match table::load::<M, _>(ctx.ex(), code.clone()).await? {
        Some(_) => Ok(()),
        None => Err(DriverError::InvalidInput(format!("Unknown {} {}", kind, code))),
    }
}

#[async_trait::async_trait]
impl Entity for Country {
    const CACHED: bool = true;

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        refuse_if_default(ctx, "country", self.code.clone(), |d| d.country_code.clone()).await
    }
}

#[async_trait::async_trait]
impl Entity for Currency {
    const CACHED: bool = true;

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        refuse_if_default(ctx, "currency", self.code.clone(), |d| d.currency_code.clone()).await
    }
}

#[async_trait::async_trait]
impl Entity for PaymentMethod {
    const CACHED: bool = true;

    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        check_reference::<Company, _>(ctx, "company", self.company_id).await
    }

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        refuse_if_default(ctx, "payment method", self.code.clone(), |d| {
            d.payment_method_code.clone()
        })
        .await
    }
}

#[async_trait::async_trait]
impl Entity for Company {
    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        let id = self.id.unwrap_or_default().to_string();
        refuse_if_default(ctx, "company", id, |d| d.company_id.to_string()).await
    }
}

#[async_trait::async_trait]
impl Entity for Warehouse {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        check_reference::<Company, _>(ctx, "company", self.company_id).await
    }

    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        refuse_if_default(ctx, "warehouse", self.code.clone(), |d| d.warehouse_code.clone()).await
    }
}

#[async_trait::async_trait]
impl Entity for Tax {
    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        refuse_if_default(ctx, "tax", self.code.clone(), |d| d.tax_code.clone()).await
    }
}

#[async_trait::async_trait]
impl Entity for Settings {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if self.name != DEFAULT_SETTINGS_NAME {
            return Ok(());
        }

        let defaults = self.properties::<DefaultSettings>()?;
        check_reference::<Country, _>(ctx, "country", defaults.country_code.as_str()).await?;
        check_reference::<Currency, _>(ctx, "currency", defaults.currency_code.as_str()).await?;
        check_reference::<Company, _>(ctx, "company", defaults.company_id).await?;
        check_reference::<Warehouse, _>(ctx, "warehouse", defaults.warehouse_code.as_str()).await?;
        check_reference::<PaymentMethod, _>(
            ctx,
            "payment method",
            defaults.payment_method_code.as_str(),
        )
        .await?;
        check_reference::<Tax, _>(ctx, "tax", defaults.tax_code.as_str()).await
    }

    async fn before_delete(&self, _ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if self.name == DEFAULT_SETTINGS_NAME {
            return refuse(format!("Cannot delete the {} settings", self.name));
        }
        Ok(())
    }
}

impl ErpDriver {
    /// Gets all countries.
    pub async fn countries(self) -> DriverResult<Arc<Vec<Country>>> {
        self.cached_all::<Country>().await
    }

    /// Gets all currencies.
    pub async fn currencies(self) -> DriverResult<Arc<Vec<Currency>>> {
        self.cached_all::<Currency>().await
    }

    /// Gets all payment methods.
    pub async fn payment_methods(self) -> DriverResult<Arc<Vec<PaymentMethod>>> {
        self.cached_all::<PaymentMethod>().await
    }

    /// Gets the system defaults.
    pub async fn default_settings(self) -> DriverResult<DefaultSettings> {
        let mut ex = self.db.ex().await?;
        Ok(db::load_default_settings(&mut ex).await?)
    }

    /// Replaces the system defaults, all of which must refer to existing records.
    pub async fn set_default_settings(self, defaults: DefaultSettings) -> DriverResult<()> {
        let settings = Settings::with_properties(DEFAULT_SETTINGS_NAME, &defaults)?;
        self.save(settings).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::testutils::*;
    use crate::model::*;
    use erp_core::db::table;
    use erp_core::driver::DriverError;

    #[tokio::test]
    async fn test_default_records_cannot_be_deleted() {
        let context = TestContext::setup().await;
        let driver = context.driver();
        let defaults = driver.clone().default_settings().await.unwrap();

        let company: Company = driver.clone().get(defaults.company_id).await.unwrap();
        let warehouse: Warehouse =
            driver.clone().get(defaults.warehouse_code.as_str()).await.unwrap();
        let currency: Currency = driver.clone().get(defaults.currency_code.as_str()).await.unwrap();
        let country: Country = driver.clone().get(defaults.country_code.as_str()).await.unwrap();
        let tax: Tax = driver.clone().get(defaults.tax_code.as_str()).await.unwrap();
        let method: PaymentMethod =
            driver.clone().get(defaults.payment_method_code.as_str()).await.unwrap();

        let errors = [
            driver.clone().delete(company).await.unwrap_err(),
            driver.clone().delete(warehouse).await.unwrap_err(),
            driver.clone().delete(currency).await.unwrap_err(),
            driver.clone().delete(country).await.unwrap_err(),
            driver.clone().delete(tax).await.unwrap_err(),
            driver.clone().delete(method).await.unwrap_err(),
        ];
        for error in errors {
            match error {
                DriverError::PreconditionFailed(e) => assert!(e.contains("default")),
                e => panic!("{:?}", e),
            }
        }

        let mut ex = context.ex().await;
        assert_eq!(1, table::count::<Company>(&mut ex, &[]).await.unwrap());
        assert_eq!(1, table::count::<Warehouse>(&mut ex, &[]).await.unwrap());
        assert_eq!(3, table::count::<Currency>(&mut ex, &[]).await.unwrap());
        assert_eq!(11, table::count::<Country>(&mut ex, &[]).await.unwrap());
        assert_eq!(4, table::count::<Tax>(&mut ex, &[]).await.unwrap());
        assert_eq!(3, table::count::<PaymentMethod>(&mut ex, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_non_default_records_can_be_deleted() {
        let context = TestContext::setup().await;

        let usd: Currency = context.driver().get("USD").await.unwrap();
        context.driver().delete(usd).await.unwrap();
        let second = context.driver().save(Company::new("Second", "FRA")).await.unwrap();
        assert_eq!(Some(2), second.id);
        context.driver().delete(second).await.unwrap();

        let mut ex = context.ex().await;
        assert_eq!(2, table::count::<Currency>(&mut ex, &[]).await.unwrap());
        assert_eq!(1, table::count::<Company>(&mut ex, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_default_settings_ok() {
        let context = TestContext::setup().await;

        let mut defaults = context.driver().default_settings().await.unwrap();
        defaults.currency_code = "USD".to_owned();
        context.driver().set_default_settings(defaults.clone()).await.unwrap();
        assert_eq!(defaults, context.driver().default_settings().await.unwrap());

        // The former default is not protected anymore.
        let eur: Currency = context.driver().get("EUR").await.unwrap();
        context.driver().delete(eur).await.unwrap();
        let usd: Currency = context.driver().get("USD").await.unwrap();
        context.driver().delete(usd).await.unwrap_err();
    }

    #[tokio::test]
    async fn test_set_default_settings_unknown_references() {
        let context = TestContext::setup().await;

        let mut defaults = DefaultSettings::default();
        defaults.warehouse_code = "NONE".to_owned();
        match context.driver().set_default_settings(defaults).await {
            Err(DriverError::InvalidInput(e)) => assert!(e.contains("Unknown warehouse NONE")),
            e => panic!("{:?}", e),
        }

        let mut defaults = DefaultSettings::default();
        defaults.company_id = 5;
        context.driver().set_default_settings(defaults).await.unwrap_err();

        assert_eq!(DefaultSettings::default(), context.driver().default_settings().await.unwrap());
    }

    #[tokio::test]
    async fn test_default_settings_row_cannot_be_deleted() {
        let context = TestContext::setup().await;

        let settings: Settings = context.driver().get(DEFAULT_SETTINGS_NAME).await.unwrap();
        match context.driver().delete(settings).await {
            Err(DriverError::PreconditionFailed(_)) => (),
            e => panic!("{:?}", e),
        }

        let other = Settings::with_properties("other", &DefaultSettings::default()).unwrap();
        let other = context.driver().save(other).await.unwrap();
        context.driver().delete(other).await.unwrap();
    }

    #[tokio::test]
    async fn test_warehouses_need_an_existing_company() {
        let context = TestContext::setup().await;

        let mut warehouse = Warehouse::new("WH2", "Second");
        warehouse.company_id = 7;
        match context.driver().save(warehouse).await {
            Err(DriverError::InvalidInput(e)) => assert!(e.contains("Unknown company 7")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_payment_methods_are_cached() {
        let context = TestContext::setup().await;

        let methods = context.driver().payment_methods().await.unwrap();
        assert_eq!(
            vec!["CASH", "DEBIT", "TRANSFER"],
            methods.iter().map(|m| m.code.as_str()).collect::<Vec<&str>>()
        );

        let method = PaymentMethod::new("CHECK", "Check", false, 10, DueUnit::Days);
        context.driver().save(method).await.unwrap();
        assert_eq!(4, context.driver().payment_methods().await.unwrap().len());
    }
}

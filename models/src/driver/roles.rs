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

//! Rules of roles and the resolution of the permissions of users.

use crate::driver::base::check_reference;
use crate::driver::{Entity, ErpDriver, HookContext, save_entity};
use crate::model::{Role, RoleAccess, RoleUser};
use erp_core::db::{OrderBy, Where, table};
use erp_core::driver::{DriverError, DriverResult};

/// Permissions that a user holds on a page.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Permissions {
    /// Whether the user can modify records from the page.
    pub allow_update: bool,

    /// Whether the user can delete records from the page.
    pub allow_delete: bool,
}

#[async_trait::async_trait]
impl Entity for Role {
    async fn before_delete(&self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        let filter = [Where::eq("role_code", self.code.as_str())];
        table::delete_where::<RoleAccess>(ctx.ex(), &filter).await?;
        table::delete_where::<RoleUser>(ctx.ex(), &filter).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Entity for RoleAccess {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        check_reference::<Role, _>(ctx, "role", self.role_code.trim()).await
    }
}

#[async_trait::async_trait]
impl Entity for RoleUser {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        check_reference::<Role, _>(ctx, "role", self.role_code.trim()).await
    }
}

impl ErpDriver {
    /// Grants `role_code` full access to every page in `pages` it cannot access yet.
    ///
    /// Returns the number of accesses that were created.
    pub async fn add_role_accesses(self, role_code: &str, pages: &[&str]) -> DriverResult<u64> {
        let mut tx = self.db.begin().await?;
        let mut ctx = self.context(&mut tx);

        if table::load::<Role, _>(ctx.ex(), role_code).await?.is_none() {
            return Err(DriverError::NotFound(format!("Role {} not found", role_code)));
        }

        let mut created = 0;
        for page in pages {
            let filter = [Where::eq("role_code", role_code), Where::eq("page_name", page.trim())];
            if table::count::<RoleAccess>(ctx.ex(), &filter).await? > 0 {
                continue;
            }
            save_entity(&mut ctx, &mut RoleAccess::new(role_code, page)).await?;
            created += 1;
        }

        tx.commit().await?;
        Ok(created)
    }

    /// Resolves the permissions of the user `nick` on `page` through all of their roles.
    ///
    /// Returns `None` if none of the roles of the user can access the page.
    pub async fn user_can(self, nick: &str, page: &str) -> DriverResult<Option<Permissions>> {
        let mut ex = self.db.ex().await?;

        let filter = [Where::eq("nick", nick)];
        let users = table::all::<RoleUser>(&mut ex, &filter, &[], 0, None).await?;
        if users.is_empty() {
            return Ok(None);
        }

        let filter = [
            Where::in_list("role_code", users.into_iter().map(|u| u.role_code)),
            Where::eq("page_name", page),
        ];
        let order = [OrderBy::asc("id")];
        let accesses = table::all::<RoleAccess>(&mut ex, &filter, &order, 0, None).await?;
        Ok(accesses.into_iter().fold(None, |acc, access| {
            let mut perms = acc.unwrap_or_default();
            perms.allow_update |= access.allow_update;
            perms.allow_delete |= access.allow_delete;
            Some(perms)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;

    /// Creates the `code` role and grants it to every user in `nicks`.
    async fn create_role(context: &TestContext, code: &str, nicks: &[&str]) {
        context.driver().save(Role::new(code, "Some role")).await.unwrap();
        for nick in nicks {
            context.driver().save(RoleUser::new(code, nick)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_add_role_accesses_skips_existing() {
        let context = TestContext::setup().await;
        create_role(&context, "SALES", &[]).await;

        let created = context
            .driver()
            .add_role_accesses("SALES", &["ListCustomer", "EditCustomer"])
            .await
            .unwrap();
        assert_eq!(2, created);

        let created = context
            .driver()
            .add_role_accesses("SALES", &["EditCustomer", "ListInvoice"])
            .await
            .unwrap();
        assert_eq!(1, created);

        assert_eq!(3, context.driver().count::<RoleAccess>(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_role_accesses_unknown_role() {
        let context = TestContext::setup().await;

        match context.driver().add_role_accesses("NOPE", &["ListCustomer"]).await {
            Err(DriverError::NotFound(e)) => assert!(e.contains("NOPE")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_role_members_need_existing_role() {
        let context = TestContext::setup().await;

        match context.driver().save(RoleUser::new("NOPE", "jdoe")).await {
            Err(DriverError::InvalidInput(e)) => assert_eq!("Unknown role NOPE", e),
            e => panic!("{:?}", e),
        }
        context.driver().save(RoleAccess::new("NOPE", "ListCustomer")).await.unwrap_err();
    }

    #[tokio::test]
    async fn test_user_can_merges_roles() {
        let context = TestContext::setup().await;
        create_role(&context, "READER", &["jdoe", "other"]).await;
        create_role(&context, "EDITOR", &["jdoe"]).await;

        let mut access = RoleAccess::new("READER", "ListCustomer");
        access.allow_update = false;
        access.allow_delete = false;
        context.driver().save(access).await.unwrap();

        let mut access = RoleAccess::new("EDITOR", "ListCustomer");
        access.allow_delete = false;
        context.driver().save(access).await.unwrap();

        assert_eq!(
            Some(Permissions { allow_update: true, allow_delete: false }),
            context.driver().user_can("jdoe", "ListCustomer").await.unwrap()
        );
        assert_eq!(
            Some(Permissions { allow_update: false, allow_delete: false }),
            context.driver().user_can("other", "ListCustomer").await.unwrap()
        );
        assert_eq!(None, context.driver().user_can("jdoe", "ListInvoice").await.unwrap());
        assert_eq!(None, context.driver().user_can("nobody", "ListCustomer").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_role_cascades() {
        let context = TestContext::setup().await;
        create_role(&context, "READER", &["jdoe"]).await;
        create_role(&context, "EDITOR", &["jdoe"]).await;
        context.driver().add_role_accesses("READER", &["ListCustomer"]).await.unwrap();
        context.driver().add_role_accesses("EDITOR", &["ListCustomer"]).await.unwrap();

        let role = context.driver().get::<Role, _>("READER").await.unwrap();
        context.driver().delete(role).await.unwrap();

        assert_eq!(1, context.driver().count::<RoleAccess>(&[]).await.unwrap());
        assert_eq!(1, context.driver().count::<RoleUser>(&[]).await.unwrap());
        assert!(context.driver().user_can("jdoe", "ListCustomer").await.unwrap().is_some());
    }
}

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

//! The `Role`, `RoleAccess` and `RoleUser` tables.

use crate::model::test_text;
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_code, check_length, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};

/// Maximum length of the codes of roles.
const ROLE_CODE_LENGTH: usize = 20;

/// Checks that `role_code` names a role, as the references of accesses and users must.
fn test_role_code(role_code: &mut String) -> ModelResult<()> {
    *role_code = role_code.trim().to_owned();
    check_code("role_code", role_code, ROLE_CODE_LENGTH)
}

record! {
    /// A named set of page permissions that can be granted to users.
    #[derive(Deserialize, Serialize)]
    pub struct Role in "roles" {
        /// Code of the role.
        primary code: String,

        /// Human-readable name of the role.
        description: String,
    }
}

impl Role {
    /// Creates a new role.
    pub fn new(code: &str, description: &str) -> Self {
        Self { code: code.to_owned(), description: description.to_owned() }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self { code: String::new(), description: String::new() }
    }
}

impl Table for Role {
    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_owned();
        check_code("code", &self.code, ROLE_CODE_LENGTH)?;

        self.description = no_html(self.description.trim());
        check_length("description", &self.description, 1, 100)
    }
}

record! {
    /// Permissions of a role on a single page.
    #[derive(Deserialize, Serialize)]
    pub struct RoleAccess in "role_accesses" {
        /// Identifier of the access, assigned on insertion.
        serial id: Option<i64>,

        /// Role that this access belongs to.
        role_code: String,

        /// Name of the page that the role can access.
        page_name: String,

        /// Whether the role can delete records from the page.
        allow_delete: bool,

        /// Whether the role can modify records from the page.
        allow_update: bool,
    }
}

impl RoleAccess {
    /// Creates a new access to `page_name` with full permissions.
    pub fn new(role_code: &str, page_name: &str) -> Self {
        Self {
            id: None,
            role_code: role_code.to_owned(),
            page_name: page_name.to_owned(),
            allow_delete: true,
            allow_update: true,
        }
    }
}

impl Default for RoleAccess {
    fn default() -> Self {
        Self {
            id: None,
            role_code: String::new(),
            page_name: String::new(),
            allow_delete: true,
            allow_update: true,
        }
    }
}

impl Table for RoleAccess {
    fn test(&mut self) -> ModelResult<()> {
        test_role_code(&mut self.role_code)?;

        self.page_name = self.page_name.trim().to_owned();
        if self.page_name.is_empty()
            || self.page_name.len() > 100
            || !self.page_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ModelError(format!("Invalid page_name '{}'", self.page_name)));
        }
        Ok(())
    }
}

record! {
    /// Membership of a user in a role.
    #[derive(Deserialize, Serialize)]
    pub struct RoleUser in "role_users" {
        /// Identifier of the membership, assigned on insertion.
        serial id: Option<i64>,

        /// Role granted to the user.
        role_code: String,

        /// Nickname of the user.
        nick: String,
    }
}

impl RoleUser {
    /// Grants `role_code` to the user `nick`.
    pub fn new(role_code: &str, nick: &str) -> Self {
        Self { id: None, role_code: role_code.to_owned(), nick: nick.to_owned() }
    }
}

impl Default for RoleUser {
    fn default() -> Self {
        Self { id: None, role_code: String::new(), nick: String::new() }
    }
}

impl Table for RoleUser {
    fn test(&mut self) -> ModelResult<()> {
        test_role_code(&mut self.role_code)?;

        test_text("nick", &mut self.nick, 50)?;
        if self.nick.is_empty() {
            return Err(ModelError("nick cannot be empty".to_owned()));
        }
        Ok(())
    }
}

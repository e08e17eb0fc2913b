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

//! The `Settings` table and the system defaults stored in it.

use crate::model::DEFAULT_COMPANY_ID;
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult};
use erp_core::record;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Name of the settings row that holds the `DefaultSettings`.
pub const DEFAULT_SETTINGS_NAME: &str = "default";

/// The records that the system uses when no other one is specified.
///
/// These records cannot be deleted while they are the defaults.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DefaultSettings {
    /// Default country of new parties and addresses.
    pub country_code: String,

    /// Default currency of new parties and documents.
    pub currency_code: String,

    /// Default company of new documents.
    pub company_id: i64,

    /// Default warehouse of new documents.
    pub warehouse_code: String,

    /// Default payment method of new parties and documents.
    pub payment_method_code: String,

    /// Default tax of new document lines.
    pub tax_code: String,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            country_code: "ESP".to_owned(),
            currency_code: "EUR".to_owned(),
            company_id: DEFAULT_COMPANY_ID,
            warehouse_code: "MAIN".to_owned(),
            payment_method_code: "CASH".to_owned(),
            tax_code: "IVA21".to_owned(),
        }
    }
}

record! {
    /// A named group of settings stored as a JSON object.
    #[derive(Deserialize, Serialize)]
    pub struct Settings in "settings" {
        /// Name of the group of settings.
        primary name: String,

        /// JSON object with the properties of the group.
        properties: String,
    }
}

impl Settings {
    /// Creates a new settings row named `name` holding the serialized `properties`.
    pub fn with_properties<T: Serialize>(name: &str, properties: &T) -> ModelResult<Self> {
        let properties = serde_json::to_string(properties)
            .map_err(|e| ModelError(format!("Cannot serialize settings '{}': {}", name, e)))?;
        Ok(Self { name: name.to_owned(), properties })
    }

    /// Deserializes the properties of this settings row.
    pub fn properties<T: DeserializeOwned>(&self) -> ModelResult<T> {
        serde_json::from_str(&self.properties)
            .map_err(|e| ModelError(format!("Invalid settings '{}': {}", self.name, e)))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self { name: String::new(), properties: "{}".to_owned() }
    }
}

impl Table for Settings {
    fn test(&mut self) -> ModelResult<()> {
        self.name = self.name.trim().to_owned();
        let valid_name = !self.name.is_empty()
            && self.name.len() <= 50
            && self.name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid_name {
            return Err(ModelError(format!(
                "Invalid name '{}': must have 1 to 50 lowercase letters, digits or underscores",
                self.name
            )));
        }

        match serde_json::from_str::<serde_json::Value>(&self.properties) {
            Ok(serde_json::Value::Object(_)) => Ok(()),
            Ok(_) => Err(ModelError(format!("Settings '{}' must be a JSON object", self.name))),
            Err(e) => Err(ModelError(format!("Invalid settings '{}': {}", self.name, e))),
        }
    }

    fn install() -> Vec<Self> {
        match Settings::with_properties(DEFAULT_SETTINGS_NAME, &DefaultSettings::default()) {
            Ok(settings) => vec![settings],
            Err(_) => vec![],
        }
    }
}

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

//! The `Country` table.

use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_code, check_length, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};

record! {
    /// A country that addresses and parties can refer to.
    #[derive(Deserialize, Serialize)]
    pub struct Country in "countries" {
        /// Code of the country, usually its ISO 3166-1 alpha-3 code.
        primary code: String,

        /// ISO 3166-1 alpha-2 code of the country, if known.
        iso_code: String,

        /// Name of the country.
        name: String,
    }
}

impl Country {
    /// Creates a new country with the given values.
    pub fn new<S: Into<String>>(code: S, iso_code: S, name: S) -> Self {
        Self { code: code.into(), iso_code: iso_code.into(), name: name.into() }
    }
}

impl Default for Country {
    fn default() -> Self {
        Self { code: String::new(), iso_code: String::new(), name: String::new() }
    }
}

impl Table for Country {
    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_owned();
        check_code("code", &self.code, 20)?;

        self.iso_code = self.iso_code.trim().to_uppercase();
        if !self.iso_code.is_empty()
            && (self.iso_code.len() != 2 || !self.iso_code.chars().all(|c| c.is_ascii_uppercase()))
        {
            return Err(ModelError(format!(
                "Invalid iso_code '{}': must have two letters",
                self.iso_code
            )));
        }

        self.name = no_html(self.name.trim());
        check_length("name", &self.name, 1, 100)
    }

    fn install() -> Vec<Self> {
        vec![
            Country::new("ARG", "AR", "Argentina"),
            Country::new("CHL", "CL", "Chile"),
            Country::new("COL", "CO", "Colombia"),
            Country::new("DEU", "DE", "Germany"),
            Country::new("ESP", "ES", "Spain"),
            Country::new("FRA", "FR", "France"),
            Country::new("GBR", "GB", "United Kingdom"),
            Country::new("ITA", "IT", "Italy"),
            Country::new("MEX", "MX", "Mexico"),
            Country::new("PRT", "PT", "Portugal"),
            Country::new("USA", "US", "United States"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_ok() {
        let mut country = Country::new(" ESP ", "es", "Spain");
        country.test().unwrap();
        assert_eq!("ESP", country.code);
        assert_eq!("ES", country.iso_code);

        Country::new("XK", "", "Kosovo").test().unwrap();
    }

    #[test]
    fn test_country_errors() {
        Country::new("esp", "ES", "Spain").test().unwrap_err();
        Country::new("ESP", "ESP", "Spain").test().unwrap_err();
        Country::new("ESP", "E1", "Spain").test().unwrap_err();
        Country::new("ESP", "ES", "").test().unwrap_err();
        Country::new("A".repeat(21).as_str(), "", "Long").test().unwrap_err();
    }

    #[test]
    fn test_country_seeds_are_valid() {
        for mut country in Country::install() {
            country.test().unwrap();
        }
    }
}

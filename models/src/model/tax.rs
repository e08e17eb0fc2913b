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

//! The `Tax` table.

use erp_core::db::Table;
use erp_core::model::{ModelResult, check_code, check_length, check_percentage, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};

record! {
    /// A tax applicable to document lines.
    #[derive(Deserialize, Serialize)]
    pub struct Tax in "taxes" {
        /// Code of the tax.
        primary code: String,

        /// Human-readable name of the tax.
        description: String,

        /// Percentage applied to the taxable base.
        rate: f64,

        /// Percentage of the equivalence surcharge applied on top of the tax.
        surcharge: f64,

        /// Whether the tax can be selected for new documents.
        active: bool,
    }
}

impl Tax {
    /// Creates a new active tax.
    pub fn new(code: &str, description: &str, rate: f64, surcharge: f64) -> Self {
        Self {
            code: code.to_owned(),
            description: description.to_owned(),
            rate,
            surcharge,
            active: true,
        }
    }
}

impl Default for Tax {
    fn default() -> Self {
        Self {
            code: String::new(),
            description: String::new(),
            rate: 0.0,
            surcharge: 0.0,
            active: true,
        }
    }
}

impl Table for Tax {
    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_owned();
        check_code("code", &self.code, 10)?;

        self.description = no_html(self.description.trim());
        check_length("description", &self.description, 1, 50)?;

        check_percentage("rate", self.rate)?;
        check_percentage("surcharge", self.surcharge)
    }

    fn install() -> Vec<Self> {
        vec![
            Tax::new("IVA0", "IVA 0%", 0.0, 0.0),
            Tax::new("IVA10", "IVA 10%", 10.0, 1.4),
            Tax::new("IVA21", "IVA 21%", 21.0, 5.2),
            Tax::new("IVA4", "IVA 4%", 4.0, 0.5),
        ]
    }
}

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

//! The `Currency` table.

use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_code, check_length, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};

record! {
    /// A currency in which documents can be issued.
    #[derive(Deserialize, Serialize)]
    pub struct Currency in "currencies" {
        /// ISO 4217 alphabetic code of the currency.
        primary code: String,

        /// Human-readable name of the currency.
        description: String,

        /// Symbol used to print amounts in this currency.
        symbol: String,

        /// Exchange rate against the default currency for sales.
        rate: f64,

        /// Exchange rate against the default currency for purchases.
        purchase_rate: f64,

        /// ISO 4217 numeric code of the currency, if known.
        iso_code: String,
    }
}

impl Currency {
    /// Creates a new currency with the same `rate` for sales and purchases.
    pub fn new(code: &str, description: &str, symbol: &str, rate: f64, iso_code: &str) -> Self {
        Self {
            code: code.to_owned(),
            description: description.to_owned(),
            symbol: symbol.to_owned(),
            rate,
            purchase_rate: rate,
            iso_code: iso_code.to_owned(),
        }
    }

    /// Converts `amount` expressed in the default currency into this currency.
    pub fn convert(&self, amount: f64) -> f64 {
        amount * self.rate
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self {
            code: String::new(),
            description: String::new(),
            symbol: "?".to_owned(),
            rate: 1.0,
            purchase_rate: 1.0,
            iso_code: String::new(),
        }
    }
}

impl Table for Currency {
    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_uppercase();
        check_code("code", &self.code, 3)?;

        self.description = no_html(self.description.trim());
        check_length("description", &self.description, 1, 100)?;

        self.symbol = no_html(self.symbol.trim());
        check_length("symbol", &self.symbol, 1, 10)?;

        for (field, rate) in [("rate", self.rate), ("purchase_rate", self.purchase_rate)] {
            if rate.is_nan() || rate <= 0.0 {
                return Err(ModelError(format!("Invalid {}: {} must be positive", field, rate)));
            }
        }

        self.iso_code = self.iso_code.trim().to_owned();
        if !self.iso_code.is_empty()
            && (self.iso_code.len() != 3 || !self.iso_code.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(ModelError(format!(
                "Invalid iso_code '{}': must have three digits",
                self.iso_code
            )));
        }
        Ok(())
    }

    fn install() -> Vec<Self> {
        vec![
            Currency::new("EUR", "Euros", "€", 1.0, "978"),
            Currency::new("GBP", "Pounds sterling", "£", 0.86, "826"),
            Currency::new("USD", "US dollars", "$", 1.08, "840"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_ok() {
        let mut currency = Currency::new("usd", "US dollars", "$", 1.25, "840");
        currency.test().unwrap();
        assert_eq!("USD", currency.code);
        assert_eq!(62.5, currency.convert(50.0));
    }

    #[test]
    fn test_currency_errors() {
        Currency::new("EURO", "Euros", "€", 1.0, "978").test().unwrap_err();
        Currency::new("EUR", "", "€", 1.0, "978").test().unwrap_err();
        Currency::new("EUR", "Euros", "", 1.0, "978").test().unwrap_err();
        Currency::new("EUR", "Euros", "€", 0.0, "978").test().unwrap_err();
        Currency::new("EUR", "Euros", "€", f64::NAN, "978").test().unwrap_err();
        Currency::new("EUR", "Euros", "€", 1.0, "97").test().unwrap_err();

        let mut currency = Currency::new("EUR", "Euros", "€", 1.0, "978");
        currency.purchase_rate = -1.0;
        currency.test().unwrap_err();
    }
}

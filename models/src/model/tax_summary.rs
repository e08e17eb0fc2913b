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

//! The `TaxSummary` view.

use erp_core::db::{ColumnType, DataRow, DbResult, FieldValue, View, ViewColumn};
use erp_core::model::round_to;
use serde::Serialize;

/// Taxable bases of an exercise aggregated per subaccount and tax percentages.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TaxSummary {
    /// Exercise of the aggregated entries.
    pub exercise_code: String,

    /// Subaccount of the aggregated lines.
    pub subaccount_code: String,

    /// Tax percentage of the aggregated lines.
    pub tax_rate: f64,

    /// Surcharge percentage of the aggregated lines.
    pub surcharge: f64,

    /// Sum of the taxable bases.
    pub tax_base: f64,

    /// Tax computed over `tax_base`.
    pub tax_amount: f64,

    /// Surcharge computed over `tax_base`.
    pub surcharge_amount: f64,

    /// Sum of `tax_base`, `tax_amount` and `surcharge_amount`.
    pub total: f64,
}

impl View for TaxSummary {
    const TABLES: &'static str =
        "accounting_entry_lines l JOIN accounting_entries e ON e.id = l.entry_id";
    const GROUP_BY: &'static str = "e.exercise_code, l.subaccount_code, l.tax_rate, l.surcharge";

    fn columns() -> &'static [ViewColumn] {
        const COLUMNS: &[ViewColumn] = &[
            ViewColumn { name: "exercise_code", expr: "e.exercise_code", ty: ColumnType::Text },
            ViewColumn { name: "subaccount_code", expr: "l.subaccount_code", ty: ColumnType::Text },
            ViewColumn { name: "tax_rate", expr: "l.tax_rate", ty: ColumnType::Float },
            ViewColumn { name: "surcharge", expr: "l.surcharge", ty: ColumnType::Float },
            ViewColumn { name: "tax_base", expr: "SUM(l.tax_base)", ty: ColumnType::Float },
        ];
        COLUMNS
    }

    fn load_from_data(&mut self, data: &DataRow) -> DbResult<()> {
        if let Some(v) = data.get("exercise_code") {
            self.exercise_code = String::from_value("exercise_code", v.clone())?;
        }
        if let Some(v) = data.get("subaccount_code") {
            self.subaccount_code = String::from_value("subaccount_code", v.clone())?;
        }
        if let Some(v) = data.get("tax_rate") {
            self.tax_rate = f64::from_value("tax_rate", v.clone())?;
        }
        if let Some(v) = data.get("surcharge") {
            self.surcharge = f64::from_value("surcharge", v.clone())?;
        }
        if let Some(v) = data.get("tax_base") {
            self.tax_base = f64::from_value("tax_base", v.clone())?;
        }

        self.tax_amount = round_to(self.tax_base * self.tax_rate / 100.0, 2);
        self.surcharge_amount = round_to(self.tax_base * self.surcharge / 100.0, 2);
        self.total = round_to(self.tax_base + self.tax_amount + self.surcharge_amount, 2);
        Ok(())
    }
}

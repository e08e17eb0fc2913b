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

//! The `Exercise` table.

use crate::model::DEFAULT_COMPANY_ID;
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_code, check_length, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::macros::date;
use time::{Date, Month};

/// Whether an exercise accepts changes to its accounting entries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExerciseStatus {
    /// Entries can be created and modified.
    Open,

    /// The exercise has been closed and its entries are frozen.
    Closed,
}

impl ExerciseStatus {
    /// Returns the name of the status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseStatus::Open => "open",
            ExerciseStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ExerciseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ExerciseStatus::Open),
            "closed" => Ok(ExerciseStatus::Closed),
            s => Err(ModelError(format!("Invalid exercise status '{}'", s))),
        }
    }
}

record! {
    /// An accounting period of a company.
    #[derive(Deserialize, Serialize)]
    pub struct Exercise in "exercises" {
        /// Code of the exercise.
        primary code: String,

        /// Human-readable name of the exercise.
        name: String,

        /// Company that this exercise belongs to.
        company_id: i64,

        /// First day of the exercise.
        start_date: Date,

        /// Last day of the exercise, inclusive.
        end_date: Date,

        /// Status of the exercise as one of the `ExerciseStatus` names.
        status: String,
    }
}

impl Exercise {
    /// Creates an open exercise covering the calendar `year` of `company_id`.
    pub fn for_year(company_id: i64, year: i32) -> ModelResult<Self> {
        let bad_year = |e: time::error::ComponentRange| {
            ModelError(format!("Invalid exercise year {}: {}", year, e))
        };
        let start_date = Date::from_calendar_date(year, Month::January, 1).map_err(bad_year)?;
        let end_date = Date::from_calendar_date(year, Month::December, 31).map_err(bad_year)?;
        Ok(Self {
            code: year.to_string(),
            name: year.to_string(),
            company_id,
            start_date,
            end_date,
            status: ExerciseStatus::Open.as_str().to_owned(),
        })
    }

    /// Returns the parsed status of the exercise.
    pub fn status(&self) -> ModelResult<ExerciseStatus> {
        ExerciseStatus::from_str(&self.status)
    }

    /// Returns true if the exercise accepts changes to its entries.
    pub fn is_open(&self) -> bool {
        self.status == ExerciseStatus::Open.as_str()
    }

    /// Returns true if `date` falls within the exercise.
    pub fn contains(&self, date: Date) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

impl Default for Exercise {
    fn default() -> Self {
        Self {
            code: String::new(),
            name: String::new(),
            company_id: DEFAULT_COMPANY_ID,
            start_date: date!(2000 - 01 - 01),
            end_date: date!(2000 - 12 - 31),
            status: ExerciseStatus::Open.as_str().to_owned(),
        }
    }
}

impl Table for Exercise {
    fn test(&mut self) -> ModelResult<()> {
        self.code = self.code.trim().to_owned();
        check_code("code", &self.code, 4)?;

        self.name = no_html(self.name.trim());
        check_length("name", &self.name, 1, 100)?;

        if self.start_date > self.end_date {
            return Err(ModelError(format!(
                "Exercise {} starts on {} after it ends on {}",
                self.code, self.start_date, self.end_date
            )));
        }

        self.status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exercise_for_year() {
        let mut exercise = Exercise::for_year(3, 2024).unwrap();
        exercise.test().unwrap();
        assert_eq!("2024", exercise.code);
        assert_eq!(3, exercise.company_id);
        assert!(exercise.is_open());
        assert!(exercise.contains(date!(2024 - 01 - 01)));
        assert!(exercise.contains(date!(2024 - 12 - 31)));
        assert!(!exercise.contains(date!(2025 - 01 - 01)));
    }

    #[test]
    fn test_exercise_status() {
        let mut exercise = Exercise::for_year(1, 2024).unwrap();
        exercise.status = "closed".to_owned();
        exercise.test().unwrap();
        assert_eq!(ExerciseStatus::Closed, exercise.status().unwrap());
        assert!(!exercise.is_open());

        exercise.status = "archived".to_owned();
        exercise.test().unwrap_err();
    }

    #[test]
    fn test_exercise_dates_must_be_ordered() {
        let mut exercise = Exercise::for_year(1, 2024).unwrap();
        exercise.end_date = date!(2023 - 12 - 31);
        exercise.test().unwrap_err();
    }
}

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

//! Sources of the current time for business rules.
//!
//! Due dates and deactivation stamps are computed from a `Clock` handed to the driver so that
//! tests can pin the calendar to a known day.

use time::{Date, OffsetDateTime};

/// Provides the current instant.
pub trait Clock {
    /// Returns the current instant in UTC.
    fn now_utc(&self) -> OffsetDateTime;

    /// Returns the current calendar day in UTC.
    fn today_utc(&self) -> Date {
        self.now_utc().date()
    }
}

/// Drops the sub-microsecond part of `instant`, which the databases cannot store.
fn truncate_to_micros(instant: OffsetDateTime) -> OffsetDateTime {
    let micros = instant.microsecond();
    instant.replace_nanosecond(micros * 1000).unwrap_or(instant)
}

/// Clock backed by the operating system.
#[derive(Clone, Default)]
pub struct SystemClock {}

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        truncate_to_micros(OffsetDateTime::now_utc())
    }
}

/// Test utilities.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Clock frozen at an instant that only moves when told to.
    pub struct SettableClock {
        now: Mutex<OffsetDateTime>,
    }

    impl SettableClock {
        /// Creates a clock frozen at `now`, truncated to microseconds.
        pub fn new(now: OffsetDateTime) -> Self {
            Self { now: Mutex::new(truncate_to_micros(now)) }
        }

        /// Moves the clock forward by `delta`.
        pub fn advance(&self, delta: Duration) {
            let mut now = self.now.lock().unwrap();
            *now = truncate_to_micros(*now + delta);
        }
    }

    impl Clock for SettableClock {
        fn now_utc(&self) -> OffsetDateTime {
            *self.now.lock().unwrap()
        }
    }

}

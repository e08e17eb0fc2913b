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

//! Utilities to help testing services that integrate with the ERP driver.

use crate::db;
use crate::driver::{ErpDriver, ErpOptions};
use erp_core::clocks::Clock;
use erp_core::clocks::testutils::SettableClock;
use erp_core::db::{Db, Executor};
use std::sync::Arc;
use time::macros::datetime;

/// State of a running test.
pub struct TestContext {
    /// The clock used by the driver, which tests can move at will.
    pub clock: Arc<SettableClock>,

    /// The driver to handle ERP operations.
    driver: ErpDriver,
}

impl TestContext {
    /// Initializes the driver using an in-memory database with the schema and seed data, a
    /// settable clock and the default options.
    pub async fn setup() -> Self {
        Self::setup_with_opts(ErpOptions::default()).await
    }

    /// Initializes the driver like `setup` but with the given options.
    pub async fn setup_with_opts(opts: ErpOptions) -> Self {
        let db = Arc::from(erp_core::db::sqlite::testutils::setup().await);
        let clock = Arc::from(SettableClock::new(datetime!(2024-05-10 10:00:00 UTC)));
        Self::setup_with(opts, db, clock).await
    }

    /// Initializes the test context using the given already-initialized objects.
    pub async fn setup_with(
        opts: ErpOptions,
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<SettableClock>,
    ) -> Self {
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let driver = ErpDriver::new(db, clock.clone() as Arc<dyn Clock + Send + Sync>, opts);
        TestContext { clock, driver }
    }

    /// Gets a direct executor against the database.
    pub async fn ex(&self) -> Executor {
        self.driver.db.ex().await.unwrap()
    }

    /// Gets a copy of the driver in this test context.
    pub fn driver(&self) -> ErpDriver {
        self.driver.clone()
    }
}

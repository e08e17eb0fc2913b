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

//! Business logic over the ERP tables.
//!
//! Every model is wrapped in an `Entity` whose hooks enforce the rules that span more than one
//! record, such as keeping a single default address per customer or refusing to delete the
//! records named by the system defaults.  The generic operations of `ErpDriver` run those hooks
//! and the persistence operations of the model inside a single transaction.

use derivative::Derivative;
use erp_core::clocks::Clock;
use erp_core::db::{Db, Executor, OrderBy, TxExecutor, Value, Where, table};
use erp_core::driver::{DriverError, DriverResult};
use erp_core::env::get_optional_var;
use futures::lock::Mutex;
use log::{debug, warn};
use lru_time_cache::LruCache;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use time::{Date, OffsetDateTime};

mod accounting;
mod base;
mod events;
mod parties;
mod roles;
mod sales;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use events::LogContext;
pub use roles::Permissions;

/// Default number of tables to keep cached in memory.
const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Default amount of time to keep cached tables in memory.
const DEFAULT_CACHE_TTL_SECONDS: u64 = 5 * 60;

/// Default amount of time to keep non-audit log entries for.
const DEFAULT_LOG_RETENTION_SECONDS: u64 = 90 * 24 * 60 * 60;

/// Configuration options for the ERP driver.
#[derive(Clone, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ErpOptions {
    /// The number of tables to keep cached in memory.
    pub cache_capacity: usize,

    /// The amount of time to keep cached tables in memory.
    pub cache_ttl: Duration,

    /// The amount of time to keep non-audit log entries for before they can be pruned.
    pub log_retention: Duration,
}

impl Default for ErpOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            log_retention: Duration::from_secs(DEFAULT_LOG_RETENTION_SECONDS),
        }
    }
}

impl ErpOptions {
    /// Creates a new set of options from environment variables.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        Ok(Self {
            cache_capacity: get_optional_var::<usize>(prefix, "CACHE_CAPACITY")?
                .unwrap_or(DEFAULT_CACHE_CAPACITY),
            cache_ttl: get_optional_var::<Duration>(prefix, "CACHE_TTL")?
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS)),
            log_retention: get_optional_var::<Duration>(prefix, "LOG_RETENTION")?
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_LOG_RETENTION_SECONDS)),
        })
    }
}

/// Access to the open transaction and the driver state given to the `Entity` hooks.
pub struct HookContext<'a> {
    /// Executor of the transaction the operation runs in.
    ex: &'a mut Executor,

    /// Clock instance to obtain the current time.
    clock: &'a (dyn Clock + Send + Sync),
}

impl<'a> HookContext<'a> {
    /// Creates a new context for an operation running in `ex`.
    fn new(ex: &'a mut Executor, clock: &'a (dyn Clock + Send + Sync)) -> Self {
        Self { ex, clock }
    }

    /// Gets the executor of the transaction the operation runs in.
    pub fn ex(&mut self) -> &mut Executor {
        self.ex
    }

    /// Obtains the current time.
    pub fn now_utc(&self) -> OffsetDateTime {
        self.clock.now_utc()
    }

    /// Obtains the current date.
    pub fn today(&self) -> Date {
        self.clock.today_utc()
    }
}

/// Per-model rules that the driver applies around the persistence operations.
///
/// All hooks do nothing by default.  Hooks that fail abort the whole operation, including any
/// changes that earlier hooks made.
#[async_trait::async_trait]
pub trait Entity: table::Table {
    /// Whether the driver keeps all rows of this table cached in memory.
    const CACHED: bool = false;

    /// Adjusts or validates `self` before it is stored.
    async fn before_save(&mut self, _ctx: &mut HookContext<'_>) -> DriverResult<()> {
        Ok(())
    }

    /// Updates any records that depend on `self` after it has been stored.
    async fn after_save(&self, _ctx: &mut HookContext<'_>) -> DriverResult<()> {
        Ok(())
    }

    /// Validates that `self` can be deleted and removes the records that depend on it.
    ///
    /// `self` is the version of the record stored in the database.
    async fn before_delete(&self, _ctx: &mut HookContext<'_>) -> DriverResult<()> {
        Ok(())
    }

    /// Updates any records that depended on `self` after it has been deleted.
    async fn after_delete(&self, _ctx: &mut HookContext<'_>) -> DriverResult<()> {
        Ok(())
    }
}

/// Loads the stored version of `record`, if any.
pub(crate) async fn stored<M: Entity>(ex: &mut Executor, record: &M) -> DriverResult<Option<M>> {
    Ok(table::load::<M, _>(ex, record.primary_value()).await?)
}

/// Stores `record` running all of its hooks.
pub(crate) async fn save_entity<M: Entity>(
    ctx: &mut HookContext<'_>,
    record: &mut M,
) -> DriverResult<()> {
    record.before_save(ctx).await?;
    table::save(ctx.ex(), record).await?;
    record.after_save(ctx).await
}

/// Deletes the stored version of `record` running all of its hooks.
pub(crate) async fn delete_entity<M: Entity>(
    ctx: &mut HookContext<'_>,
    record: &M,
) -> DriverResult<()> {
    let stored = match stored(ctx.ex(), record).await? {
        Some(stored) => stored,
        None => return Err(DriverError::NotFound(format!("Entity not found in {}", M::TABLE_NAME))),
    };
    stored.before_delete(ctx).await?;
    table::delete(ctx.ex(), &stored).await?;
    stored.after_delete(ctx).await
}

/// Logs and returns the error for an operation refused because of the state of the records.
pub(crate) fn refuse<T>(message: String) -> DriverResult<T> {
    warn!("{}", message);
    Err(DriverError::PreconditionFailed(message))
}

/// Cache of whole tables keyed by table name.
struct TableCache {
    /// Rows of each cached table.
    tables: LruCache<&'static str, Arc<dyn Any + Send + Sync>>,

    /// Counter bumped on every invalidation.
    generation: u64,
}

impl TableCache {
    fn new(opts: &ErpOptions) -> Self {
        let tables =
            LruCache::with_expiry_duration_and_capacity(opts.cache_ttl, opts.cache_capacity);
        Self { tables, generation: 0 }
    }

    /// Drops the rows of `table` and makes loads started before this call unable to store theirs.
    fn invalidate(&mut self, table: &'static str) {
        self.tables.remove(table);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Stores the `rows` of `table` loaded at `generation` unless an invalidation happened since.
    fn store(
        &mut self,
        table: &'static str,
        generation: u64,
        rows: Arc<dyn Any + Send + Sync>,
    ) -> bool {
        if generation != self.generation {
            debug!("Not caching {} because it changed while it was being loaded", table);
            return false;
        }
        self.tables.insert(table, rows);
        true
    }
}

/// Business logic.
///
/// The public operations exposed by the driver are all "one shot": they start and commit a
/// transaction, so it's incorrect for the caller to use two separate calls.  For this reason,
/// these operations consume the driver in an attempt to minimize the possibility of executing
/// two operations.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct ErpDriver {
    /// The database that the driver uses for persistence.
    db: Arc<dyn Db + Send + Sync>,

    /// Clock instance to obtain the current time.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Options for the ERP driver.
    opts: ErpOptions,

    /// Cache of the tables whose entities are marked as `CACHED`.
    cache: Arc<Mutex<TableCache>>,
}

impl ErpDriver {
    /// Creates a new driver backed by the given dependencies.
    pub fn new(
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        opts: ErpOptions,
    ) -> Self {
        let cache = Arc::from(Mutex::from(TableCache::new(&opts)));
        Self { db, clock, opts, cache }
    }

    /// Returns a reference to the options provided at creation time.
    pub(crate) fn opts(&self) -> &ErpOptions {
        &self.opts
    }

    /// Creates a hook context for an operation running in `tx`.
    pub(crate) fn context<'a>(&'a self, tx: &'a mut TxExecutor) -> HookContext<'a> {
        HookContext::new(tx.ex(), self.clock.as_ref())
    }

    /// Drops the cached copy of the table of `M`, if any.
    async fn invalidate<M: Entity>(&self) {
        if M::CACHED {
            let mut cache = self.cache.lock().await;
            cache.invalidate(M::TABLE_NAME);
        }
    }

    /// Gets all rows of the table of `M` sorted by primary key.
    ///
    /// Results come from an internal cache for entities marked as `CACHED`.  The cache is
    /// invalidated whenever the driver modifies the table.
    pub(crate) async fn cached_all<M: Entity>(&self) -> DriverResult<Arc<Vec<M>>> {
        let mut generation = 0;
        if M::CACHED {
            let mut cache = self.cache.lock().await;
            generation = cache.generation;
            if let Some(rows) = cache.tables.get(M::TABLE_NAME) {
                match rows.clone().downcast::<Vec<M>>() {
                    Ok(rows) => return Ok(rows),
                    Err(_) => warn!("Cached rows for {} have an unexpected type", M::TABLE_NAME),
                }
            }
        }

        let mut ex = self.db.ex().await?;
        let order = [OrderBy::asc(M::PRIMARY_COLUMN)];
        let rows = Arc::new(table::all::<M>(&mut ex, &[], &order, 0, None).await?);

        if M::CACHED {
            let mut cache = self.cache.lock().await;
            cache.store(M::TABLE_NAME, generation, rows.clone() as Arc<dyn Any + Send + Sync>);
        }
        Ok(rows)
    }

    /// Gets the record of `M` whose primary key is `code`.
    pub async fn get<M: Entity, V: Into<Value>>(self, code: V) -> DriverResult<M> {
        let mut ex = self.db.ex().await?;
        match table::load::<M, _>(&mut ex, code).await? {
            Some(record) => Ok(record),
            None => Err(DriverError::NotFound(format!("Entity not found in {}", M::TABLE_NAME))),
        }
    }

    /// Finds the first record of `M` that matches `filter` when sorted by `order`.
    pub async fn find<M: Entity>(
        self,
        filter: &[Where],
        order: &[OrderBy],
    ) -> DriverResult<Option<M>> {
        let mut ex = self.db.ex().await?;
        Ok(table::load_where(&mut ex, filter, order).await?)
    }

    /// Lists the records of `M` that match `filter` sorted by `order`, skipping the first
    /// `offset` ones and returning at most `limit` of them.
    pub async fn list<M: Entity>(
        self,
        filter: &[Where],
        order: &[OrderBy],
        offset: u64,
        limit: Option<u64>,
    ) -> DriverResult<Vec<M>> {
        let mut ex = self.db.ex().await?;
        Ok(table::all(&mut ex, filter, order, offset, limit).await?)
    }

    /// Counts the records of `M` that match `filter`.
    pub async fn count<M: Entity>(self, filter: &[Where]) -> DriverResult<u64> {
        let mut ex = self.db.ex().await?;
        Ok(table::count::<M>(&mut ex, filter).await?)
    }

    /// Validates and stores `record`, returning it as stored.
    pub async fn save<M: Entity>(self, mut record: M) -> DriverResult<M> {
        let mut tx = self.db.begin().await?;
        save_entity(&mut self.context(&mut tx), &mut record).await?;
        tx.commit().await?;

        self.invalidate::<M>().await;
        Ok(record)
    }

    /// Deletes the stored version of `record`.
    pub async fn delete<M: Entity>(self, record: M) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        delete_entity(&mut self.context(&mut tx), &record).await?;
        tx.commit().await?;

        self.invalidate::<M>().await;
        Ok(())
    }
}

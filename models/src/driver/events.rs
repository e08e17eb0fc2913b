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

//! Rules of the persistent log.

use crate::driver::{Entity, ErpDriver, HookContext, refuse, save_entity, stored};
use crate::model::{AUDIT_CHANNEL, LogLevel, LogMessage};
use erp_core::db::{Where, table};
use erp_core::driver::{DriverError, DriverResult};
use log::debug;
use std::time::Duration;

/// Details about the request that caused a log entry.
#[derive(Clone, Debug, Default)]
pub struct LogContext {
    /// Address of the client.
    pub ip: String,

    /// Nick of the user.
    pub nick: String,

    /// Page the user was visiting.
    pub uri: String,

    /// Name of the table of the record the entry refers to.
    pub model: String,

    /// Primary key of the record the entry refers to.
    pub model_code: String,
}

#[async_trait::async_trait]
impl Entity for LogMessage {
    async fn before_save(&mut self, ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if let Some(stored) = stored(ctx.ex(), self).await? {
            if stored.is_audit() {
                return refuse(format!("Cannot modify audit log entry {}", self.primary_id()));
            }
        }
        Ok(())
    }

    async fn before_delete(&self, _ctx: &mut HookContext<'_>) -> DriverResult<()> {
        if self.is_audit() {
            return refuse(format!("Cannot delete audit log entry {}", self.primary_id()));
        }
        Ok(())
    }
}

impl LogMessage {
    /// Formats the identifier of the entry for error messages.
    fn primary_id(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }
}

impl ErpDriver {
    /// Records `message` in `channel` with severity `level` and returns the stored entry.
    pub async fn log_event(
        self,
        channel: &str,
        level: LogLevel,
        message: &str,
        context: LogContext,
    ) -> DriverResult<LogMessage> {
        let mut entry = LogMessage {
            id: None,
            channel: channel.to_owned(),
            level: level.as_str().to_owned(),
            message: message.to_owned(),
            time: self.clock.now_utc(),
            ip: context.ip,
            nick: context.nick,
            uri: context.uri,
            model: context.model,
            model_code: context.model_code,
        };

        let mut tx = self.db.begin().await?;
        save_entity(&mut self.context(&mut tx), &mut entry).await?;
        tx.commit().await?;

        debug!("Logged {} event to {}: {}", entry.level, entry.channel, entry.message);
        Ok(entry)
    }

    /// Deletes the non-audit log entries older than `older_than`, or than the configured
    /// retention period if not given, and returns how many there were.
    pub async fn prune_log(self, older_than: Option<Duration>) -> DriverResult<u64> {
        let older_than = older_than.unwrap_or(self.opts().log_retention);
        let cutoff = time::Duration::try_from(older_than)
            .ok()
            .and_then(|d| self.clock.now_utc().checked_sub(d))
            .ok_or_else(|| {
                DriverError::InvalidInput(format!("Invalid log retention {:?}", older_than))
            })?;

        let mut tx = self.db.begin().await?;
        let filter = [Where::neq("channel", AUDIT_CHANNEL), Where::lt("time", cutoff)];
        let deleted = table::delete_where::<LogMessage>(tx.ex(), &filter).await?;
        tx.commit().await?;

        debug!("Pruned {} log entries older than {}", deleted, cutoff);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ErpOptions;
    use crate::driver::testutils::*;
    use time::macros::datetime;

    /// One day.
    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Logs an info event with `message` in `channel`.
    async fn log(context: &TestContext, channel: &str, message: &str) -> LogMessage {
        let driver = context.driver();
        driver.log_event(channel, LogLevel::Info, message, LogContext::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_log_event() {
        let context = TestContext::setup().await;

        let log_context = LogContext {
            ip: "127.0.0.1".to_owned(),
            nick: "jdoe".to_owned(),
            uri: "/EditCustomer".to_owned(),
            model: "customers".to_owned(),
            model_code: "1".to_owned(),
        };
        let entry = context
            .driver()
            .log_event("Audit", LogLevel::Warning, "Customer deleted", log_context)
            .await
            .unwrap();
        assert!(entry.id.is_some());
        assert!(entry.is_audit());
        assert_eq!("warning", entry.level);
        assert_eq!(datetime!(2024-05-10 10:00:00 UTC), entry.time);

        let stored = context.driver().get::<LogMessage, _>(entry.id).await.unwrap();
        assert_eq!(entry, stored);
    }

    #[tokio::test]
    async fn test_audit_entries_are_immutable() {
        let context = TestContext::setup().await;
        let mut entry = log(&context, AUDIT_CHANNEL, "Login").await;

        entry.message = "Tampered".to_owned();
        match context.driver().save(entry.clone()).await {
            Err(DriverError::PreconditionFailed(e)) => assert!(e.contains("Cannot modify")),
            e => panic!("{:?}", e),
        }

        // The stored version is the one checked, not the one given.
        entry.channel = "master".to_owned();
        match context.driver().delete(entry).await {
            Err(DriverError::PreconditionFailed(e)) => assert!(e.contains("Cannot delete")),
            e => panic!("{:?}", e),
        }
        assert_eq!(1, context.driver().count::<LogMessage>(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_other_entries_are_mutable() {
        let context = TestContext::setup().await;
        let mut entry = log(&context, "master", "Started").await;

        entry.message = "Restarted".to_owned();
        let entry = context.driver().save(entry).await.unwrap();
        context.driver().delete(entry).await.unwrap();
        assert_eq!(0, context.driver().count::<LogMessage>(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_log() {
        let context = TestContext::setup().await;
        log(&context, "master", "Old").await;
        log(&context, AUDIT_CHANNEL, "Old audit").await;
        context.clock.advance(DAY * 10);
        log(&context, "master", "Recent").await;
        context.clock.advance(DAY * 10);

        assert_eq!(0, context.driver().prune_log(Some(DAY * 30)).await.unwrap());
        assert_eq!(1, context.driver().prune_log(Some(DAY * 15)).await.unwrap());
        assert_eq!(2, context.driver().count::<LogMessage>(&[]).await.unwrap());

        context.clock.advance(DAY * 90);
        assert_eq!(1, context.driver().prune_log(None).await.unwrap());
        let remaining = context.driver().list::<LogMessage>(&[], &[], 0, None).await.unwrap();
        let messages = remaining.iter().map(|e| e.message.as_str()).collect::<Vec<_>>();
        assert_eq!(vec!["Old audit"], messages);
    }

    #[tokio::test]
    async fn test_prune_log_uses_configured_retention() {
        let opts = ErpOptions { log_retention: DAY, ..Default::default() };
        let context = TestContext::setup_with_opts(opts).await;
        log(&context, "master", "Old").await;

        assert_eq!(0, context.driver().prune_log(None).await.unwrap());
        context.clock.advance(DAY * 2);
        assert_eq!(1, context.driver().prune_log(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_log_retention_out_of_range() {
        let context = TestContext::setup().await;

        match context.driver().prune_log(Some(Duration::MAX)).await {
            Err(DriverError::InvalidInput(e)) => assert!(e.contains("Invalid log retention")),
            e => panic!("{:?}", e),
        }
    }
}

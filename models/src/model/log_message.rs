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

//! The `LogMessage` table.

use crate::model::test_text;
use erp_core::db::Table;
use erp_core::model::{ModelError, ModelResult, check_length, no_html};
use erp_core::record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Channel of the log entries that record user actions and that can never be modified.
pub const AUDIT_CHANNEL: &str = "audit";

/// Severity of a log entry.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum LogLevel {
    /// Details only useful during development.
    Debug,

    /// Normal operation.
    Info,

    /// Normal but significant conditions.
    Notice,

    /// Abnormal conditions that do not prevent operation.
    Warning,

    /// Failed operations.
    Error,

    /// Failures that need immediate attention.
    Critical,
}

impl LogLevel {
    /// Returns the name of the level as stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            _ => Err(ModelError(format!("Invalid level '{}'", s))),
        }
    }
}

record! {
    /// An entry of the persistent log.
    #[derive(Deserialize, Serialize)]
    pub struct LogMessage in "log_messages" {
        /// Identifier of the entry, assigned on insertion.
        serial id: Option<i64>,

        /// Channel the entry belongs to.
        channel: String,

        /// Severity of the entry, as given by `LogLevel::as_str`.
        level: String,

        /// Text of the entry.
        message: String,

        /// Time at which the entry was recorded.
        time: OffsetDateTime,

        /// Address of the client that caused the entry, if any.
        ip: String,

        /// Nick of the user that caused the entry, if any.
        nick: String,

        /// Page the user was visiting, if any.
        uri: String,

        /// Name of the table of the record the entry refers to, if any.
        model: String,

        /// Primary key of the record the entry refers to, if any.
        model_code: String,
    }
}

impl LogMessage {
    /// Returns true if this entry belongs to the audit channel.
    pub fn is_audit(&self) -> bool {
        self.channel == AUDIT_CHANNEL
    }
}

impl Default for LogMessage {
    fn default() -> Self {
        Self {
            id: None,
            channel: "master".to_owned(),
            level: LogLevel::Info.as_str().to_owned(),
            message: String::new(),
            time: OffsetDateTime::UNIX_EPOCH,
            ip: String::new(),
            nick: String::new(),
            uri: String::new(),
            model: String::new(),
            model_code: String::new(),
        }
    }
}

impl Table for LogMessage {
    fn test(&mut self) -> ModelResult<()> {
        self.channel = self.channel.trim().to_lowercase();
        check_length("channel", &self.channel, 1, 40)?;
        LogLevel::from_str(&self.level)?;

        self.message = no_html(self.message.trim());
        check_length("message", &self.message, 1, 4000)?;

        test_text("ip", &mut self.ip, 40)?;
        test_text("nick", &mut self.nick, 50)?;
        test_text("uri", &mut self.uri, 200)?;
        test_text("model", &mut self.model, 50)?;
        test_text("model_code", &mut self.model_code, 50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_names() {
        for level in [
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Notice,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Critical,
        ] {
            assert_eq!(level, LogLevel::from_str(&level.to_string()).unwrap());
        }
        LogLevel::from_str("fatal").unwrap_err();
        assert!(LogLevel::Warning > LogLevel::Info);
    }

    #[test]
    fn test_log_message_validation() {
        let mut entry = LogMessage {
            channel: " Audit ".to_owned(),
            message: "Deleted <customer>".to_owned(),
            ..Default::default()
        };
        entry.test().unwrap();
        assert!(entry.is_audit());
        assert_eq!("Deleted &lt;customer&gt;", entry.message);

        LogMessage { message: String::new(), ..Default::default() }.test().unwrap_err();
        LogMessage { message: "m".to_owned(), level: "loud".to_owned(), ..Default::default() }
            .test()
            .unwrap_err();
    }
}

//! Log record formatting
//!
//! Records render as `YYYY-MM-DD HH:MM:SS,mmm - <name> - <LEVEL> - <message>`.

use chrono::{DateTime, Local};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Log levels, numbered like the classic logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug = 10,
    Info = 20,
    Warning = 30,
    Error = 40,
    Critical = 50,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Numeric level (10, 20, 30, 40, 50)
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            10 => Some(LogLevel::Debug),
            20 => Some(LogLevel::Info),
            30 => Some(LogLevel::Warning),
            40 => Some(LogLevel::Error),
            50 => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u64>() {
            return Self::from_code(code).ok_or_else(|| format!("unknown log level {code}"));
        }
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(format!("unknown log level `{s}`")),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl<'de> Visitor<'de> for LevelVisitor {
            type Value = LogLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a level name such as \"INFO\" or a level number such as 20")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LogLevel, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<LogLevel, E> {
                LogLevel::from_code(v).ok_or_else(|| E::custom(format!("unknown log level {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<LogLevel, E> {
                u64::try_from(v)
                    .ok()
                    .and_then(LogLevel::from_code)
                    .ok_or_else(|| E::custom(format!("unknown log level {v}")))
            }
        }

        deserializer.deserialize_any(LevelVisitor)
    }
}

/// A single log record
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub logger: Arc<str>,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn new(logger: Arc<str>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            logger,
            level,
            message: message.into(),
        }
    }
}

/// Renders records as plain text lines
#[derive(Debug, Clone, Default)]
pub struct LogFormatter;

impl LogFormatter {
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S,%3f";

    pub fn new() -> Self {
        Self
    }

    /// Format a record without the trailing newline.
    pub fn format(&self, record: &LogRecord) -> String {
        format!(
            "{} - {} - {} - {}",
            record.timestamp.format(Self::TIMESTAMP_FORMAT),
            record.logger,
            record.level.as_str(),
            record.message
        )
    }
}

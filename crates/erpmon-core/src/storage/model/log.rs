use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Severity of an application log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Maps a level token to a known level, falling back to `Info`.
    pub fn normalize(token: &str) -> Self {
        match token {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARNING" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "CRITICAL" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }

    /// Levels counted as errors on the dashboard.
    pub const ERRORS: [LogLevel; 2] = [LogLevel::Error, LogLevel::Critical];
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed line from the tail of the application log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Process id token, when numeric.
    pub pid: Option<i32>,
    pub level: LogLevel,
    pub logger_name: String,
    pub message: String,
}

//! Odoo server log line parser.
//!
//! Lines look like:
//!
//! ```text
//! 2026-01-18 21:05:42,573 8816 INFO production odoo.modules.loading: loading 1 modules...
//! ```
//!
//! i.e. date, time with milliseconds, pid, level, database, logger and
//! message, separated by single spaces.

use chrono::{NaiveDateTime, TimeZone, Utc};

use crate::storage::{LogLevel, LogLine};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses one log line; returns `None` for lines that do not match.
///
/// Lines with fewer than six space-separated tokens or an unparseable
/// timestamp are rejected. Timestamps are taken as UTC. Without a message
/// token the whole line is used as the message.
pub fn parse_log_line(line: &str) -> Option<LogLine> {
    let parts: Vec<&str> = line.splitn(7, ' ').collect();
    if parts.len() < 6 {
        return None;
    }

    let time = parts[1].split(',').next().unwrap_or(parts[1]);
    let naive =
        NaiveDateTime::parse_from_str(&format!("{} {}", parts[0], time), TIMESTAMP_FORMAT).ok()?;

    let message = parts.get(6).copied().unwrap_or(line);

    Some(LogLine {
        id: 0,
        timestamp: Utc.from_utc_datetime(&naive),
        pid: parts[2].parse().ok(),
        level: LogLevel::normalize(parts[3]),
        logger_name: parts[5].trim().to_string(),
        message: message.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let line = "2026-01-18 21:05:42,573 8816 INFO production odoo.modules.loading: loading 1 modules...";
        let parsed = parse_log_line(line).unwrap();

        assert_eq!(
            parsed.timestamp,
            Utc.with_ymd_and_hms(2026, 1, 18, 21, 5, 42).unwrap()
        );
        assert_eq!(parsed.pid, Some(8816));
        assert_eq!(parsed.level, LogLevel::Info);
        assert_eq!(parsed.logger_name, "odoo.modules.loading:");
        assert_eq!(parsed.message, "loading 1 modules...");
    }

    #[test]
    fn test_unknown_level_becomes_info() {
        let line = "2026-01-18 21:05:42,573 8816 NOTICE db odoo.http: hello";
        assert_eq!(parse_log_line(line).unwrap().level, LogLevel::Info);
    }

    #[test]
    fn test_error_level() {
        let line = "2026-01-18 21:05:42,573 8816 ERROR db odoo.sql_db: bad query: SELECT";
        let parsed = parse_log_line(line).unwrap();
        assert_eq!(parsed.level, LogLevel::Error);
        assert_eq!(parsed.message, "bad query: SELECT");
    }

    #[test]
    fn test_six_tokens_uses_whole_line_as_message() {
        let line = "2026-01-18 21:05:42,573 8816 WARNING db odoo.http";
        let parsed = parse_log_line(line).unwrap();
        assert_eq!(parsed.logger_name, "odoo.http");
        assert_eq!(parsed.message, line);
    }

    #[test]
    fn test_non_numeric_pid_is_kept_empty() {
        let line = "2026-01-18 21:05:42,573 ? INFO db odoo: started";
        assert_eq!(parse_log_line(line).unwrap().pid, None);
    }

    #[test]
    fn test_rejects_short_and_malformed_lines() {
        assert!(parse_log_line("").is_none());
        assert!(parse_log_line("Traceback (most recent call last):").is_none());
        assert!(parse_log_line("  File \"/opt/odoo/odoo/http.py\", line 1 in x").is_none());
        assert!(parse_log_line("2026-13-40 25:00:00,000 1 INFO db odoo: bad date").is_none());
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Final status of a scheduled job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CronStatus {
    Success,
    Failed,
}

impl CronStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CronStatus::Success => "success",
            CronStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CronStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CronStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(CronStatus::Success),
            "failed" => Ok(CronStatus::Failed),
            other => Err(format!("unknown cron status '{}'", other)),
        }
    }
}

/// One invocation of a scheduled job, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CronExecutionRecord {
    pub id: i64,
    /// Identifier of the job in the scheduler.
    pub cron_job_ref: String,
    pub cron_name: String,
    /// When the run started.
    pub execution_date: DateTime<Utc>,
    pub duration_seconds: f64,
    pub status: CronStatus,
    pub error_message: Option<String>,
}

impl CronExecutionRecord {
    /// Whether this run was slower than `threshold_secs`.
    ///
    /// Not stored: changing the threshold reclassifies past runs.
    pub fn is_slow(&self, threshold_secs: f64) -> bool {
        self.duration_seconds > threshold_secs
    }

    /// Pairs the record with its slow flag for listing.
    pub fn into_view(self, threshold_secs: f64) -> CronExecutionView {
        CronExecutionView {
            is_slow: self.is_slow(threshold_secs),
            record: self,
        }
    }
}

/// A cron record as listed, with `is_slow` computed against the threshold
/// in force when it was read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CronExecutionView {
    #[serde(flatten)]
    pub record: CronExecutionRecord,
    pub is_slow: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(duration_seconds: f64) -> CronExecutionRecord {
        CronExecutionRecord {
            id: 1,
            cron_job_ref: "7".to_string(),
            cron_name: "Mail queue".to_string(),
            execution_date: Utc::now(),
            duration_seconds,
            status: CronStatus::Success,
            error_message: None,
        }
    }

    #[test]
    fn test_is_slow_follows_threshold() {
        let record = record(12.0);
        assert!(record.is_slow(10.0));
        assert!(!record.is_slow(15.0));
    }

    #[test]
    fn test_view_carries_slow_flag() {
        assert!(record(12.0).into_view(10.0).is_slow);
        let fast = record(1.5).into_view(10.0);
        assert!(!fast.is_slow);
        assert_eq!(fast.record.duration_seconds, 1.5);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("failed".parse::<CronStatus>().unwrap(), CronStatus::Failed);
        assert!("running".parse::<CronStatus>().is_err());
    }
}

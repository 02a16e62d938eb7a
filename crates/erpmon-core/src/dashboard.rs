//! Read-only rollup of the latest server sample and today's counters.
//!
//! Nothing here is cached or persisted: every call recomputes from the
//! history tables, so threshold changes apply to past records immediately.

use chrono::{DateTime, Local, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;

use crate::params::slow_cron_threshold;
use crate::storage::{CountFilter, CronStatus, LogLevel, Predicate, Storage, StorageError, Table};

/// Health tier of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Good,
    Warning,
    Critical,
}

/// Percent thresholds at which a resource enters the warning and critical tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoints {
    pub warning: f64,
    pub critical: f64,
}

pub const CPU_BREAKPOINTS: Breakpoints = Breakpoints {
    warning: 60.0,
    critical: 80.0,
};
pub const RAM_BREAKPOINTS: Breakpoints = Breakpoints {
    warning: 70.0,
    critical: 85.0,
};
pub const DISK_BREAKPOINTS: Breakpoints = Breakpoints {
    warning: 75.0,
    critical: 90.0,
};

impl HealthStatus {
    /// Classifies `percent`; a value equal to a breakpoint belongs to the upper tier.
    pub fn classify(percent: f64, breakpoints: Breakpoints) -> Self {
        if percent < breakpoints.warning {
            HealthStatus::Good
        } else if percent < breakpoints.critical {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub disk_percent: f64,
    pub cpu_status: HealthStatus,
    pub ram_status: HealthStatus,
    pub disk_status: HealthStatus,
    /// Timestamp of the latest server sample, `None` before the first one.
    pub last_update: Option<DateTime<Utc>>,

    pub cron_runs_total: u64,
    pub cron_runs_today: u64,
    pub failed_crons_today: u64,
    pub slow_crons_today: u64,
    /// Threshold used for `slow_crons_today`, seconds.
    pub slow_cron_threshold: f64,

    pub slow_queries_total: u64,
    pub slow_queries_today: u64,
    pub locks_today: u64,
    /// ERROR and CRITICAL log lines since midnight.
    pub error_logs_today: u64,

    /// Start of the "today" window, in UTC.
    pub today_start: DateTime<Utc>,
}

/// Local midnight of the day containing `now`, as UTC.
///
/// When midnight does not exist locally (DST gap) the first valid instant
/// of the day is used.
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let tz = now.timezone();
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(1)))
                .earliest()
        })
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

/// Computes the dashboard with "today" in the server's local time zone.
pub fn compute(storage: &mut dyn Storage) -> Result<Dashboard, StorageError> {
    compute_at(storage, Local::now())
}

pub fn compute_at<Tz: TimeZone>(
    storage: &mut dyn Storage,
    now: DateTime<Tz>,
) -> Result<Dashboard, StorageError> {
    let today_start = start_of_day(&now);
    let today = CountFilter::since(today_start);

    let latest = storage.latest_server_metrics()?;
    let (cpu_percent, ram_percent, disk_percent) = latest
        .as_ref()
        .map(|m| (m.cpu_percent, m.ram_percent, m.disk_percent))
        .unwrap_or_default();

    let threshold = slow_cron_threshold(storage)?;

    Ok(Dashboard {
        cpu_percent,
        ram_percent,
        disk_percent,
        cpu_status: HealthStatus::classify(cpu_percent, CPU_BREAKPOINTS),
        ram_status: HealthStatus::classify(ram_percent, RAM_BREAKPOINTS),
        disk_status: HealthStatus::classify(disk_percent, DISK_BREAKPOINTS),
        last_update: latest.map(|m| m.timestamp),

        cron_runs_total: storage.count(Table::CronLogs, &CountFilter::all())?,
        cron_runs_today: storage.count(Table::CronLogs, &today)?,
        failed_crons_today: storage.count(
            Table::CronLogs,
            &today
                .clone()
                .with(Predicate::CronStatus(CronStatus::Failed)),
        )?,
        slow_crons_today: storage.count(
            Table::CronLogs,
            &today.clone().with(Predicate::CronSlowerThan(threshold)),
        )?,
        slow_cron_threshold: threshold,

        slow_queries_total: storage.count(Table::SlowQueries, &CountFilter::all())?,
        slow_queries_today: storage.count(Table::SlowQueries, &today)?,
        locks_today: storage.count(Table::DatabaseLocks, &today)?,
        error_logs_today: storage.count(
            Table::LogLines,
            &today
                .clone()
                .with(Predicate::LogLevelIn(LogLevel::ERRORS.to_vec())),
        )?,

        today_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SLOW_CRON_THRESHOLD_KEY;
    use crate::storage::{
        CronExecutionRecord, DatabaseLockSample, LogLine, MemoryStorage, Row, ServerMetricSample,
        SlowQuerySample,
    };
    use chrono::FixedOffset;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    /// 2026-05-04 15:30 at UTC+2.
    fn now() -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(2026, 5, 4, 15, 30, 0).unwrap()
    }

    fn local(day: u32, hour: u32) -> DateTime<Utc> {
        tz().with_ymd_and_hms(2026, 5, day, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn cron(at: DateTime<Utc>, duration: f64, status: CronStatus) -> Row {
        Row::CronExecution(CronExecutionRecord {
            id: 0,
            cron_job_ref: "3".to_string(),
            cron_name: "Scheduler".to_string(),
            execution_date: at,
            duration_seconds: duration,
            status,
            error_message: None,
        })
    }

    fn log(at: DateTime<Utc>, level: LogLevel) -> Row {
        Row::LogLine(LogLine {
            id: 0,
            timestamp: at,
            pid: Some(1200),
            level,
            logger_name: "odoo.http".to_string(),
            message: "request".to_string(),
        })
    }

    #[test]
    fn test_cpu_breakpoints() {
        assert_eq!(HealthStatus::classify(59.9, CPU_BREAKPOINTS), HealthStatus::Good);
        assert_eq!(HealthStatus::classify(60.0, CPU_BREAKPOINTS), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(79.9, CPU_BREAKPOINTS), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(80.0, CPU_BREAKPOINTS), HealthStatus::Critical);
    }

    #[test]
    fn test_ram_and_disk_breakpoints() {
        assert_eq!(HealthStatus::classify(69.9, RAM_BREAKPOINTS), HealthStatus::Good);
        assert_eq!(HealthStatus::classify(85.0, RAM_BREAKPOINTS), HealthStatus::Critical);
        assert_eq!(HealthStatus::classify(74.9, DISK_BREAKPOINTS), HealthStatus::Good);
        assert_eq!(HealthStatus::classify(75.0, DISK_BREAKPOINTS), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(100.0, DISK_BREAKPOINTS), HealthStatus::Critical);
    }

    #[test]
    fn test_start_of_day_uses_local_midnight() {
        assert_eq!(start_of_day(&now()), local(4, 0));
        assert_eq!(
            start_of_day(&now()),
            Utc.with_ymd_and_hms(2026, 5, 3, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_empty_storage_yields_zeros() {
        let mut storage = MemoryStorage::new();
        let dashboard = compute_at(&mut storage, now()).unwrap();

        assert_eq!(dashboard.cpu_percent, 0.0);
        assert_eq!(dashboard.cpu_status, HealthStatus::Good);
        assert_eq!(dashboard.disk_status, HealthStatus::Good);
        assert_eq!(dashboard.last_update, None);
        assert_eq!(dashboard.cron_runs_total, 0);
        assert_eq!(dashboard.error_logs_today, 0);
    }

    #[test]
    fn test_latest_sample_drives_statuses() {
        let mut storage = MemoryStorage::new();
        let older = ServerMetricSample {
            cpu_percent: 95.0,
            ..ServerMetricSample::empty(local(4, 10))
        };
        let newer = ServerMetricSample {
            cpu_percent: 65.0,
            ram_percent: 90.0,
            disk_percent: 40.0,
            ..ServerMetricSample::empty(local(4, 15))
        };
        storage.insert(Row::ServerMetrics(newer)).unwrap();
        storage.insert(Row::ServerMetrics(older)).unwrap();

        let dashboard = compute_at(&mut storage, now()).unwrap();
        assert_eq!(dashboard.cpu_percent, 65.0);
        assert_eq!(dashboard.cpu_status, HealthStatus::Warning);
        assert_eq!(dashboard.ram_status, HealthStatus::Critical);
        assert_eq!(dashboard.disk_status, HealthStatus::Good);
        assert_eq!(dashboard.last_update, Some(local(4, 15)));
    }

    #[test]
    fn test_counters_are_scoped_to_today() {
        let mut storage = MemoryStorage::new();
        // yesterday, local time
        storage.insert(cron(local(3, 23), 30.0, CronStatus::Failed)).unwrap();
        // today
        storage.insert(cron(local(4, 0), 12.0, CronStatus::Success)).unwrap();
        storage.insert(cron(local(4, 9), 1.0, CronStatus::Failed)).unwrap();
        storage.insert(cron(local(4, 14), 2.0, CronStatus::Success)).unwrap();

        storage.insert(log(local(3, 22), LogLevel::Error)).unwrap();
        storage.insert(log(local(4, 8), LogLevel::Error)).unwrap();
        storage.insert(log(local(4, 9), LogLevel::Critical)).unwrap();
        storage.insert(log(local(4, 10), LogLevel::Warning)).unwrap();

        for (day, hour) in [(3, 12), (4, 11), (4, 12)] {
            storage
                .insert(Row::SlowQuery(SlowQuerySample {
                    id: 0,
                    detected_at: local(day, hour),
                    pid: 10,
                    db_user: "odoo".to_string(),
                    state: "active".to_string(),
                    query_text: "SELECT pg_sleep(5)".to_string(),
                    duration_seconds: 5.0,
                }))
                .unwrap();
        }
        storage
            .insert(Row::DatabaseLock(DatabaseLockSample {
                id: 0,
                detected_at: local(4, 13),
                pid: 11,
                lock_type: "transactionid".to_string(),
                relation: "N/A".to_string(),
                mode: "ShareLock".to_string(),
                query_text: "UPDATE stock_quant SET quantity = 1".to_string(),
                wait_seconds: 4.0,
            }))
            .unwrap();

        let dashboard = compute_at(&mut storage, now()).unwrap();
        assert_eq!(dashboard.cron_runs_total, 4);
        assert_eq!(dashboard.cron_runs_today, 3);
        assert_eq!(dashboard.failed_crons_today, 1);
        assert_eq!(dashboard.slow_crons_today, 1);
        assert_eq!(dashboard.error_logs_today, 2);
        assert_eq!(dashboard.slow_queries_total, 3);
        assert_eq!(dashboard.slow_queries_today, 2);
        assert_eq!(dashboard.locks_today, 1);
    }

    #[test]
    fn test_slow_crons_follow_current_threshold() {
        let mut storage = MemoryStorage::new();
        storage.insert(cron(local(4, 10), 12.0, CronStatus::Success)).unwrap();

        assert_eq!(compute_at(&mut storage, now()).unwrap().slow_crons_today, 1);

        storage.set_param(SLOW_CRON_THRESHOLD_KEY, "15").unwrap();
        let dashboard = compute_at(&mut storage, now()).unwrap();
        assert_eq!(dashboard.slow_crons_today, 0);
        assert_eq!(dashboard.slow_cron_threshold, 15.0);
    }
}

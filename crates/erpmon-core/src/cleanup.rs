//! Age-based retention sweeper.
//!
//! Deletes rows older than each table's configured retention window and
//! stamps `last_cleanup` on the retention configuration. Independent of the
//! offset caps applied by samplers after each append.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::retention::get_or_create_config;
use crate::storage::{Storage, StorageError, Table};

/// Rows deleted from one table by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableSweep {
    pub table: Table,
    pub cutoff: DateTime<Utc>,
    pub deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CleanupReport {
    /// `auto_cleanup` is off; nothing was touched.
    Disabled,
    Completed {
        /// Tables with a finite retention window, in sweep order.
        tables: Vec<TableSweep>,
        finished_at: DateTime<Utc>,
    },
}

impl CleanupReport {
    pub fn total_deleted(&self) -> u64 {
        match self {
            CleanupReport::Disabled => 0,
            CleanupReport::Completed { tables, .. } => tables.iter().map(|t| t.deleted).sum(),
        }
    }
}

/// Runs the sweeper against the current time.
pub fn run_cleanup(storage: &mut dyn Storage) -> Result<CleanupReport, StorageError> {
    run_cleanup_at(storage, Utc::now())
}

/// Runs the sweeper with `now` as the reference for cutoffs and the
/// `last_cleanup` stamp.
pub fn run_cleanup_at(
    storage: &mut dyn Storage,
    now: DateTime<Utc>,
) -> Result<CleanupReport, StorageError> {
    let mut config = get_or_create_config(storage)?;
    if !config.settings.auto_cleanup {
        info!("auto cleanup disabled, skipping");
        return Ok(CleanupReport::Disabled);
    }

    let mut tables = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
        let retention = config.settings.retention_for(table);
        let Some(cutoff) = retention.cutoff_at(now) else {
            debug!(table = %table, "unlimited retention, nothing to delete");
            continue;
        };
        let deleted = storage.trim_by_age(table, cutoff)?;
        info!(table = %table, retention = %retention, deleted, "old records deleted");
        tables.push(TableSweep {
            table,
            cutoff,
            deleted,
        });
    }

    config.last_cleanup = Some(now);
    storage.update_config(&config)?;

    let report = CleanupReport::Completed {
        tables,
        finished_at: now,
    };
    info!(deleted = report.total_deleted(), "cleanup completed");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::{Retention, RetentionSettings, update_config};
    use crate::storage::{
        CountFilter, CronExecutionRecord, CronStatus, DatabaseLockSample, LogLevel, LogLine,
        MemoryStorage, Row, ServerMetricSample, SlowQuerySample,
    };
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn row(table: Table, at: DateTime<Utc>) -> Row {
        match table {
            Table::ServerMetrics => Row::ServerMetrics(ServerMetricSample::empty(at)),
            Table::SlowQueries => Row::SlowQuery(SlowQuerySample {
                id: 0,
                query_text: "SELECT 1".to_string(),
                duration_seconds: 3.0,
                db_user: "odoo".to_string(),
                state: "active".to_string(),
                detected_at: at,
                pid: 42,
            }),
            Table::DatabaseLocks => Row::DatabaseLock(DatabaseLockSample {
                id: 0,
                pid: 42,
                lock_type: "relation".to_string(),
                relation: "res_partner".to_string(),
                mode: "RowExclusiveLock".to_string(),
                query_text: "UPDATE res_partner SET name = 'x'".to_string(),
                wait_seconds: 1.5,
                detected_at: at,
            }),
            Table::CronLogs => Row::CronExecution(CronExecutionRecord {
                id: 0,
                cron_job_ref: "1".to_string(),
                cron_name: "job".to_string(),
                execution_date: at,
                duration_seconds: 1.0,
                status: CronStatus::Success,
                error_message: None,
            }),
            Table::LogLines => Row::LogLine(LogLine {
                id: 0,
                timestamp: at,
                pid: None,
                level: LogLevel::Info,
                logger_name: "odoo.modules".to_string(),
                message: "loading".to_string(),
            }),
        }
    }

    /// Seeds every table with one row per age in days.
    fn seed(storage: &mut MemoryStorage, ages: &[i64]) {
        for table in Table::ALL {
            for age in ages {
                storage
                    .insert(row(table, now() - TimeDelta::days(*age)))
                    .unwrap();
            }
        }
    }

    fn count(storage: &mut MemoryStorage, table: Table) -> u64 {
        storage.count(table, &CountFilter::all()).unwrap()
    }

    #[test]
    fn test_cleanup_applies_per_table_retention() {
        let mut storage = MemoryStorage::new();
        seed(&mut storage, &[1, 10, 20, 40, 100]);

        let report = run_cleanup_at(&mut storage, now()).unwrap();

        // defaults: 30 days everywhere except locks at 15
        assert_eq!(count(&mut storage, Table::ServerMetrics), 3);
        assert_eq!(count(&mut storage, Table::SlowQueries), 3);
        assert_eq!(count(&mut storage, Table::CronLogs), 3);
        assert_eq!(count(&mut storage, Table::LogLines), 3);
        assert_eq!(count(&mut storage, Table::DatabaseLocks), 2);
        assert_eq!(report.total_deleted(), 4 * 2 + 3);
    }

    #[test]
    fn test_cleanup_stamps_last_cleanup() {
        let mut storage = MemoryStorage::new();
        run_cleanup_at(&mut storage, now()).unwrap();

        let config = storage.find_config().unwrap().unwrap();
        assert_eq!(config.last_cleanup, Some(now()));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut storage = MemoryStorage::new();
        seed(&mut storage, &[1, 40]);

        let first = run_cleanup_at(&mut storage, now()).unwrap();
        assert!(first.total_deleted() > 0);
        let second = run_cleanup_at(&mut storage, now()).unwrap();
        assert_eq!(second.total_deleted(), 0);
    }

    #[test]
    fn test_disabled_cleanup_deletes_nothing() {
        let mut storage = MemoryStorage::new();
        seed(&mut storage, &[1, 200, 400]);
        update_config(
            &mut storage,
            RetentionSettings {
                auto_cleanup: false,
                ..RetentionSettings::default()
            },
        )
        .unwrap();

        let report = run_cleanup_at(&mut storage, now()).unwrap();
        assert_eq!(report, CleanupReport::Disabled);
        for table in Table::ALL {
            assert_eq!(count(&mut storage, table), 3, "{} was trimmed", table);
        }
        assert_eq!(storage.find_config().unwrap().unwrap().last_cleanup, None);
    }

    #[test]
    fn test_unlimited_retention_is_skipped() {
        let mut storage = MemoryStorage::new();
        seed(&mut storage, &[1, 400]);
        update_config(
            &mut storage,
            RetentionSettings {
                system_logs_retention: Retention::Unlimited,
                ..RetentionSettings::default()
            },
        )
        .unwrap();

        let report = run_cleanup_at(&mut storage, now()).unwrap();
        assert_eq!(count(&mut storage, Table::LogLines), 2);
        assert_eq!(count(&mut storage, Table::CronLogs), 1);
        let CleanupReport::Completed { tables, .. } = report else {
            panic!("cleanup unexpectedly disabled");
        };
        assert!(tables.iter().all(|t| t.table != Table::LogLines));
    }

    #[test]
    fn test_row_exactly_at_cutoff_survives() {
        let mut storage = MemoryStorage::new();
        storage
            .insert(row(Table::CronLogs, now() - TimeDelta::days(30)))
            .unwrap();
        run_cleanup_at(&mut storage, now()).unwrap();
        assert_eq!(count(&mut storage, Table::CronLogs), 1);
    }
}

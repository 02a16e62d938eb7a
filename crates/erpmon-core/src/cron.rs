//! Execution tracking around scheduled jobs.
//!
//! [`track_execution`] wraps a job: it times the run, always appends one
//! [`CronExecutionRecord`] (success or failure), and hands the job's own
//! result back unchanged. A panicking job is recorded as failed and the
//! panic is resumed afterwards.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info};

use crate::storage::{CronExecutionRecord, CronStatus, History, Storage};

/// Identity of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronJob {
    /// Stable identifier in the scheduler.
    pub job_ref: String,
    /// Display name.
    pub name: String,
}

impl CronJob {
    pub fn new(job_ref: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            job_ref: job_ref.into(),
            name: name.into(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

/// Runs `run` and records its execution.
///
/// The record's `execution_date` is the start of the run. Failing to write
/// the record is logged and does not change the returned value.
pub fn track_execution<T, E, F>(storage: &mut dyn Storage, job: &CronJob, run: F) -> Result<T, E>
where
    E: fmt::Display,
    F: FnOnce(&mut dyn Storage) -> Result<T, E>,
{
    let started_at = Utc::now();
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| run(&mut *storage)));
    let duration_seconds = start.elapsed().as_secs_f64();

    let (status, error_message) = match &result {
        Ok(Ok(_)) => (CronStatus::Success, None),
        Ok(Err(e)) => (CronStatus::Failed, Some(e.to_string())),
        Err(payload) => (CronStatus::Failed, Some(panic_message(payload.as_ref()))),
    };

    let record = CronExecutionRecord {
        id: 0,
        cron_job_ref: job.job_ref.clone(),
        cron_name: job.name.clone(),
        execution_date: started_at,
        duration_seconds,
        status,
        error_message,
    };
    match History::<CronExecutionRecord>::new(storage).append(record) {
        Ok(saved) => info!(
            job = %job.name,
            status = %saved.status,
            duration = saved.duration_seconds,
            "cron execution recorded"
        ),
        Err(e) => error!(job = %job.name, error = %e, "failed to record cron execution"),
    }

    match result {
        Ok(outcome) => outcome,
        Err(payload) => panic::resume_unwind(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::{RetentionConfig, RetentionSettings};
    use crate::storage::{
        CountFilter, MemoryStorage, Row, ServerMetricSample, StorageError, Table,
    };
    use chrono::DateTime;

    fn job() -> CronJob {
        CronJob::new("collect-metrics", "Collect server metrics")
    }

    fn records(storage: &mut dyn Storage) -> Vec<CronExecutionRecord> {
        History::<CronExecutionRecord>::new(storage)
            .recent(100)
            .unwrap()
    }

    #[test]
    fn test_success_is_recorded() {
        let mut storage = MemoryStorage::new();
        let before = Utc::now();
        let value: Result<u32, String> = track_execution(&mut storage, &job(), |_| Ok(7));
        assert_eq!(value, Ok(7));

        let recs = records(&mut storage);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].status, CronStatus::Success);
        assert_eq!(recs[0].error_message, None);
        assert_eq!(recs[0].cron_job_ref, "collect-metrics");
        assert!(recs[0].execution_date >= before);
        assert!(recs[0].duration_seconds >= 0.0);
    }

    #[test]
    fn test_failure_is_recorded_and_returned() {
        let mut storage = MemoryStorage::new();
        let result: Result<(), String> =
            track_execution(&mut storage, &job(), |_| Err("disk full".to_string()));
        assert_eq!(result, Err("disk full".to_string()));

        let recs = records(&mut storage);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].status, CronStatus::Failed);
        assert!(recs[0].error_message.as_deref().unwrap().contains("disk full"));
    }

    #[test]
    fn test_panic_is_recorded_and_resumed() {
        let mut storage = MemoryStorage::new();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), String> =
                track_execution(&mut storage, &job(), |_| panic!("worker exploded"));
        }));
        assert!(caught.is_err());

        let recs = records(&mut storage);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].status, CronStatus::Failed);
        assert!(
            recs[0]
                .error_message
                .as_deref()
                .unwrap()
                .contains("worker exploded")
        );
    }

    #[test]
    fn test_job_sees_the_same_storage() {
        let mut storage = MemoryStorage::new();
        let _: Result<(), StorageError> = track_execution(&mut storage, &job(), |s| {
            s.insert(Row::ServerMetrics(ServerMetricSample::empty(Utc::now())))
                .map(|_| ())
        });
        assert_eq!(
            storage.count(Table::ServerMetrics, &CountFilter::all()).unwrap(),
            1
        );
    }

    /// Storage whose history inserts always fail.
    struct ReadOnly(MemoryStorage);

    impl Storage for ReadOnly {
        fn insert(&mut self, _row: Row) -> Result<Row, StorageError> {
            Err(StorageError::Database("read-only transaction".to_string()))
        }
        fn trim_by_offset(&mut self, table: Table, keep: usize) -> Result<u64, StorageError> {
            self.0.trim_by_offset(table, keep)
        }
        fn trim_by_age(
            &mut self,
            table: Table,
            cutoff: DateTime<Utc>,
        ) -> Result<u64, StorageError> {
            self.0.trim_by_age(table, cutoff)
        }
        fn delete_all(&mut self, table: Table) -> Result<u64, StorageError> {
            self.0.delete_all(table)
        }
        fn count(&mut self, table: Table, filter: &CountFilter) -> Result<u64, StorageError> {
            self.0.count(table, filter)
        }
        fn list(&mut self, table: Table, limit: usize) -> Result<Vec<Row>, StorageError> {
            self.0.list(table, limit)
        }
        fn latest_server_metrics(&mut self) -> Result<Option<ServerMetricSample>, StorageError> {
            self.0.latest_server_metrics()
        }
        fn find_config(&mut self) -> Result<Option<RetentionConfig>, StorageError> {
            self.0.find_config()
        }
        fn insert_config(
            &mut self,
            settings: &RetentionSettings,
        ) -> Result<RetentionConfig, StorageError> {
            self.0.insert_config(settings)
        }
        fn update_config(&mut self, config: &RetentionConfig) -> Result<(), StorageError> {
            self.0.update_config(config)
        }
        fn update_config_with_params(
            &mut self,
            config: &RetentionConfig,
            params: &[(&str, String)],
        ) -> Result<(), StorageError> {
            self.0.update_config_with_params(config, params)
        }
        fn get_param(&mut self, key: &str) -> Result<Option<String>, StorageError> {
            self.0.get_param(key)
        }
        fn set_param(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            self.0.set_param(key, value)
        }
    }

    #[test]
    fn test_record_failure_does_not_mask_result() {
        let mut storage = ReadOnly(MemoryStorage::new());
        let ok: Result<&str, String> = track_execution(&mut storage, &job(), |_| Ok("done"));
        assert_eq!(ok, Ok("done"));

        let err: Result<(), String> =
            track_execution(&mut storage, &job(), |_| Err("boom".to_string()));
        assert_eq!(err, Err("boom".to_string()));
    }
}

//! Persistence for history tables, the retention configuration and
//! key/value parameters.
//!
//! All access goes through the [`Storage`] trait. `PgStorage` is the
//! production backend; `MemoryStorage` keeps everything in process and is
//! used by tests and by `--storage memory`.

pub mod history;
pub mod memory;
pub mod model;
pub mod postgres;

use chrono::{DateTime, Utc};

use crate::retention::{RetentionConfig, RetentionSettings};
use crate::util::format_postgres_error;

pub use history::History;
pub use memory::MemoryStorage;
pub use model::{
    CountFilter, CronExecutionRecord, CronExecutionView, CronStatus, DatabaseLockSample,
    HistoryRecord, LogLevel, LogLine, MAX_QUERY_TEXT_CHARS, Predicate, Row, ServerMetricSample,
    SlowQuerySample, Table,
};
pub use self::postgres::PgStorage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("connection error: {0}")]
    Connection(String),
    /// A stored value could not be decoded.
    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

impl From<::postgres::Error> for StorageError {
    fn from(e: ::postgres::Error) -> Self {
        if e.is_closed() {
            StorageError::Connection(format_postgres_error(&e))
        } else {
            StorageError::Database(format_postgres_error(&e))
        }
    }
}

/// Backend for history tables, configuration and parameters.
///
/// Methods take `&mut self` so that synchronous clients holding a single
/// connection can implement the trait directly.
pub trait Storage: Send {
    /// Inserts a row and returns it with its assigned id.
    fn insert(&mut self, row: Row) -> Result<Row, StorageError>;

    /// Keeps the `keep` most recent rows of `table` (highest ids) and deletes
    /// the rest. Returns the number of deleted rows.
    fn trim_by_offset(&mut self, table: Table, keep: usize) -> Result<u64, StorageError>;

    /// Deletes rows captured strictly before `cutoff`.
    fn trim_by_age(&mut self, table: Table, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;

    fn delete_all(&mut self, table: Table) -> Result<u64, StorageError>;

    /// Replaces the contents of `table` with `rows`.
    ///
    /// Backends with transactions override this so readers never observe the
    /// table empty.
    fn replace_all(&mut self, table: Table, rows: Vec<Row>) -> Result<u64, StorageError> {
        self.delete_all(table)?;
        let mut inserted = 0;
        for row in rows {
            self.insert(row)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    fn count(&mut self, table: Table, filter: &CountFilter) -> Result<u64, StorageError>;

    /// Up to `limit` rows in the table's natural order: newest first, slow
    /// queries worst first. Ties fall back to `id desc`.
    fn list(&mut self, table: Table, limit: usize) -> Result<Vec<Row>, StorageError>;

    /// Most recent server metrics sample by timestamp.
    fn latest_server_metrics(&mut self) -> Result<Option<ServerMetricSample>, StorageError>;

    fn find_config(&mut self) -> Result<Option<RetentionConfig>, StorageError>;

    /// Inserts the singleton configuration, or returns the existing one.
    fn insert_config(
        &mut self,
        settings: &RetentionSettings,
    ) -> Result<RetentionConfig, StorageError>;

    fn update_config(&mut self, config: &RetentionConfig) -> Result<(), StorageError>;

    /// Updates the configuration and sets `params` as one unit: on error
    /// neither the configuration nor any parameter has changed.
    fn update_config_with_params(
        &mut self,
        config: &RetentionConfig,
        params: &[(&str, String)],
    ) -> Result<(), StorageError>;

    fn get_param(&mut self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_param(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

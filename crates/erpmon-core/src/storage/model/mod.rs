//! History table rows and the enums that address them.
//!
//! Every history entity shares the same shape: an auto-incrementing `id`
//! assigned by storage on insert, a capture timestamp, and collector-specific
//! payload fields. Rows are never updated after creation.

mod jobs;
mod log;
mod postgres;
mod system;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use jobs::{CronExecutionRecord, CronExecutionView, CronStatus};
pub use log::{LogLevel, LogLine};
pub use self::postgres::{DatabaseLockSample, MAX_QUERY_TEXT_CHARS, SlowQuerySample};
pub use system::ServerMetricSample;

/// One of the five history tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    ServerMetrics,
    SlowQueries,
    DatabaseLocks,
    CronLogs,
    LogLines,
}

impl Table {
    /// All history tables, in cleanup order.
    pub const ALL: [Table; 5] = [
        Table::LogLines,
        Table::SlowQueries,
        Table::ServerMetrics,
        Table::DatabaseLocks,
        Table::CronLogs,
    ];

    /// Short name used in logs and URLs.
    pub fn name(self) -> &'static str {
        match self {
            Table::ServerMetrics => "server-metrics",
            Table::SlowQueries => "slow-queries",
            Table::DatabaseLocks => "database-locks",
            Table::CronLogs => "cron-logs",
            Table::LogLines => "log-lines",
        }
    }

    /// Physical table name in PostgreSQL.
    pub fn sql_table(self) -> &'static str {
        match self {
            Table::ServerMetrics => "erp_health_server_metrics",
            Table::SlowQueries => "erp_health_slow_query",
            Table::DatabaseLocks => "erp_health_database_lock",
            Table::CronLogs => "erp_health_cron_log",
            Table::LogLines => "erp_health_odoo_log",
        }
    }

    /// Column holding the capture timestamp (used for age-based trims).
    pub fn timestamp_column(self) -> &'static str {
        match self {
            Table::ServerMetrics | Table::LogLines => "timestamp",
            Table::SlowQueries | Table::DatabaseLocks => "detected_at",
            Table::CronLogs => "execution_date",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown table '{}'", s))
    }
}

/// A row of any history table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    ServerMetrics(ServerMetricSample),
    SlowQuery(SlowQuerySample),
    DatabaseLock(DatabaseLockSample),
    CronExecution(CronExecutionRecord),
    LogLine(LogLine),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::ServerMetrics(_) => Table::ServerMetrics,
            Row::SlowQuery(_) => Table::SlowQueries,
            Row::DatabaseLock(_) => Table::DatabaseLocks,
            Row::CronExecution(_) => Table::CronLogs,
            Row::LogLine(_) => Table::LogLines,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Row::ServerMetrics(r) => r.id,
            Row::SlowQuery(r) => r.id,
            Row::DatabaseLock(r) => r.id,
            Row::CronExecution(r) => r.id,
            Row::LogLine(r) => r.id,
        }
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        match self {
            Row::ServerMetrics(r) => r.id = id,
            Row::SlowQuery(r) => r.id = id,
            Row::DatabaseLock(r) => r.id = id,
            Row::CronExecution(r) => r.id = id,
            Row::LogLine(r) => r.id = id,
        }
    }

    /// Capture time of the row (the column age-based trims compare against).
    pub fn captured_at(&self) -> DateTime<Utc> {
        match self {
            Row::ServerMetrics(r) => r.timestamp,
            Row::SlowQuery(r) => r.detected_at,
            Row::DatabaseLock(r) => r.detected_at,
            Row::CronExecution(r) => r.execution_date,
            Row::LogLine(r) => r.timestamp,
        }
    }
}

/// A record type stored in one history table.
pub trait HistoryRecord: Sized {
    const TABLE: Table;

    fn into_row(self) -> Row;

    /// Returns `None` if the row belongs to another table.
    fn from_row(row: Row) -> Option<Self>;
}

macro_rules! history_record {
    ($ty:ty, $table:expr, $variant:ident) => {
        impl HistoryRecord for $ty {
            const TABLE: Table = $table;

            fn into_row(self) -> Row {
                Row::$variant(self)
            }

            fn from_row(row: Row) -> Option<Self> {
                match row {
                    Row::$variant(r) => Some(r),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Row {
            fn from(r: $ty) -> Self {
                Row::$variant(r)
            }
        }
    };
}

history_record!(ServerMetricSample, Table::ServerMetrics, ServerMetrics);
history_record!(SlowQuerySample, Table::SlowQueries, SlowQuery);
history_record!(DatabaseLockSample, Table::DatabaseLocks, DatabaseLock);
history_record!(CronExecutionRecord, Table::CronLogs, CronExecution);
history_record!(LogLine, Table::LogLines, LogLine);

/// Extra condition for `count` queries, scoped to one table's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Cron executions with the given status.
    CronStatus(CronStatus),
    /// Cron executions strictly slower than the threshold (seconds).
    CronSlowerThan(f64),
    /// Log lines at any of the given levels.
    LogLevelIn(Vec<LogLevel>),
}

/// Filter for `Storage::count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountFilter {
    /// Only rows captured at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub predicate: Option<Predicate>,
}

impl CountFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            predicate: None,
        }
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Evaluates the filter against a row.
    ///
    /// A predicate that does not apply to the row's table never matches.
    pub fn matches(&self, row: &Row) -> bool {
        if let Some(since) = self.since
            && row.captured_at() < since
        {
            return false;
        }

        match (&self.predicate, row) {
            (None, _) => true,
            (Some(Predicate::CronStatus(status)), Row::CronExecution(r)) => r.status == *status,
            (Some(Predicate::CronSlowerThan(threshold)), Row::CronExecution(r)) => {
                r.is_slow(*threshold)
            }
            (Some(Predicate::LogLevelIn(levels)), Row::LogLine(r)) => levels.contains(&r.level),
            _ => false,
        }
    }
}

//! PostgreSQL storage backend.
//!
//! History rows, the singleton retention config and parameters live in the
//! ERP database next to the application's own tables. The schema is created
//! by [`PgStorage::ensure_schema`].

use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, GenericClient, NoTls};
use tracing::{debug, warn};

use super::{
    CountFilter, CronExecutionRecord, CronStatus, DatabaseLockSample, LogLevel, LogLine, Predicate,
    Row, ServerMetricSample, SlowQuerySample, Storage, StorageError, Table,
};
use crate::retention::{Retention, RetentionConfig, RetentionSettings};
use crate::util::{format_postgres_error, pg_connection_string_from_env};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS erp_health_server_metrics (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    cpu_percent DOUBLE PRECISION NOT NULL,
    ram_percent DOUBLE PRECISION NOT NULL,
    ram_used_gb DOUBLE PRECISION NOT NULL,
    ram_total_gb DOUBLE PRECISION NOT NULL,
    disk_percent DOUBLE PRECISION NOT NULL,
    disk_used_gb DOUBLE PRECISION NOT NULL,
    disk_total_gb DOUBLE PRECISION NOT NULL,
    load_average_1m DOUBLE PRECISION NOT NULL,
    load_average_5m DOUBLE PRECISION NOT NULL,
    load_average_15m DOUBLE PRECISION NOT NULL
);
CREATE INDEX IF NOT EXISTS erp_health_server_metrics_timestamp_idx
    ON erp_health_server_metrics (timestamp);

CREATE TABLE IF NOT EXISTS erp_health_slow_query (
    id BIGSERIAL PRIMARY KEY,
    detected_at TIMESTAMPTZ NOT NULL,
    pid INTEGER NOT NULL,
    db_user TEXT NOT NULL,
    state TEXT NOT NULL,
    query_text TEXT NOT NULL,
    duration_seconds DOUBLE PRECISION NOT NULL
);
CREATE INDEX IF NOT EXISTS erp_health_slow_query_detected_at_idx
    ON erp_health_slow_query (detected_at);

CREATE TABLE IF NOT EXISTS erp_health_database_lock (
    id BIGSERIAL PRIMARY KEY,
    detected_at TIMESTAMPTZ NOT NULL,
    pid INTEGER NOT NULL,
    lock_type TEXT NOT NULL,
    relation TEXT NOT NULL,
    mode TEXT NOT NULL,
    query_text TEXT NOT NULL,
    wait_seconds DOUBLE PRECISION NOT NULL
);
CREATE INDEX IF NOT EXISTS erp_health_database_lock_detected_at_idx
    ON erp_health_database_lock (detected_at);

CREATE TABLE IF NOT EXISTS erp_health_cron_log (
    id BIGSERIAL PRIMARY KEY,
    cron_job_ref TEXT NOT NULL,
    cron_name TEXT NOT NULL,
    execution_date TIMESTAMPTZ NOT NULL,
    duration_seconds DOUBLE PRECISION NOT NULL,
    status TEXT NOT NULL,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS erp_health_cron_log_execution_date_idx
    ON erp_health_cron_log (execution_date);

CREATE TABLE IF NOT EXISTS erp_health_odoo_log (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    pid INTEGER,
    level TEXT NOT NULL,
    logger_name TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS erp_health_config (
    id BIGSERIAL PRIMARY KEY,
    singleton BOOLEAN NOT NULL DEFAULT TRUE UNIQUE CHECK (singleton),
    system_logs_retention TEXT NOT NULL,
    slow_queries_retention TEXT NOT NULL,
    server_metrics_retention TEXT NOT NULL,
    database_locks_retention TEXT NOT NULL,
    cron_logs_retention TEXT NOT NULL,
    auto_cleanup BOOLEAN NOT NULL,
    last_cleanup TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS erp_health_parameter (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const CONFIG_COLUMNS: &str = "id, system_logs_retention, slow_queries_retention, \
     server_metrics_retention, database_locks_retention, cron_logs_retention, \
     auto_cleanup, last_cleanup";

/// Column list selected for each history table, in decode order.
fn columns(table: Table) -> &'static str {
    match table {
        Table::ServerMetrics => {
            "id, timestamp, cpu_percent, ram_percent, ram_used_gb, ram_total_gb, \
             disk_percent, disk_used_gb, disk_total_gb, \
             load_average_1m, load_average_5m, load_average_15m"
        }
        Table::SlowQueries => "id, detected_at, pid, db_user, state, query_text, duration_seconds",
        Table::DatabaseLocks => {
            "id, detected_at, pid, lock_type, relation, mode, query_text, wait_seconds"
        }
        Table::CronLogs => {
            "id, cron_job_ref, cron_name, execution_date, duration_seconds, status, error_message"
        }
        Table::LogLines => "id, timestamp, pid, level, logger_name, message",
    }
}

/// ORDER BY clause of the table's natural listing order.
fn natural_order(table: Table) -> &'static str {
    match table {
        Table::ServerMetrics => "timestamp DESC, id DESC",
        Table::SlowQueries => "duration_seconds DESC, id DESC",
        Table::DatabaseLocks => "detected_at DESC, id DESC",
        Table::CronLogs => "execution_date DESC, id DESC",
        Table::LogLines => "timestamp DESC, id DESC",
    }
}

type SqlParam = Box<dyn ToSql + Sync>;

/// Builds the COUNT query for a table and filter.
///
/// A predicate that belongs to another table yields `FALSE` so the count is
/// zero, mirroring `CountFilter::matches`.
pub(crate) fn build_count_query(table: Table, filter: &CountFilter) -> (String, Vec<SqlParam>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<SqlParam> = Vec::new();

    if let Some(since) = filter.since {
        params.push(Box::new(since));
        conditions.push(format!("{} >= ${}", table.timestamp_column(), params.len()));
    }

    match (&filter.predicate, table) {
        (None, _) => {}
        (Some(Predicate::CronStatus(status)), Table::CronLogs) => {
            params.push(Box::new(status.as_str().to_string()));
            conditions.push(format!("status = ${}", params.len()));
        }
        (Some(Predicate::CronSlowerThan(threshold)), Table::CronLogs) => {
            params.push(Box::new(*threshold));
            conditions.push(format!("duration_seconds > ${}", params.len()));
        }
        (Some(Predicate::LogLevelIn(levels)), Table::LogLines) => {
            let levels: Vec<String> = levels.iter().map(|l| l.as_str().to_string()).collect();
            params.push(Box::new(levels));
            conditions.push(format!("level = ANY(${})", params.len()));
        }
        (Some(_), _) => conditions.push("FALSE".to_string()),
    }

    let mut sql = format!("SELECT COUNT(*) FROM {}", table.sql_table());
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    (sql, params)
}

fn corrupt(table: Table, e: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt {
        table: table.name(),
        message: e.to_string(),
    }
}

fn decode_row(table: Table, row: &postgres::Row) -> Result<Row, StorageError> {
    let err = |e: postgres::Error| corrupt(table, e);
    let decoded = match table {
        Table::ServerMetrics => Row::ServerMetrics(ServerMetricSample {
            id: row.try_get(0).map_err(err)?,
            timestamp: row.try_get(1).map_err(err)?,
            cpu_percent: row.try_get(2).map_err(err)?,
            ram_percent: row.try_get(3).map_err(err)?,
            ram_used_gb: row.try_get(4).map_err(err)?,
            ram_total_gb: row.try_get(5).map_err(err)?,
            disk_percent: row.try_get(6).map_err(err)?,
            disk_used_gb: row.try_get(7).map_err(err)?,
            disk_total_gb: row.try_get(8).map_err(err)?,
            load_average_1m: row.try_get(9).map_err(err)?,
            load_average_5m: row.try_get(10).map_err(err)?,
            load_average_15m: row.try_get(11).map_err(err)?,
        }),
        Table::SlowQueries => Row::SlowQuery(SlowQuerySample {
            id: row.try_get(0).map_err(err)?,
            detected_at: row.try_get(1).map_err(err)?,
            pid: row.try_get(2).map_err(err)?,
            db_user: row.try_get(3).map_err(err)?,
            state: row.try_get(4).map_err(err)?,
            query_text: row.try_get(5).map_err(err)?,
            duration_seconds: row.try_get(6).map_err(err)?,
        }),
        Table::DatabaseLocks => Row::DatabaseLock(DatabaseLockSample {
            id: row.try_get(0).map_err(err)?,
            detected_at: row.try_get(1).map_err(err)?,
            pid: row.try_get(2).map_err(err)?,
            lock_type: row.try_get(3).map_err(err)?,
            relation: row.try_get(4).map_err(err)?,
            mode: row.try_get(5).map_err(err)?,
            query_text: row.try_get(6).map_err(err)?,
            wait_seconds: row.try_get(7).map_err(err)?,
        }),
        Table::CronLogs => {
            let status: String = row.try_get(5).map_err(err)?;
            Row::CronExecution(CronExecutionRecord {
                id: row.try_get(0).map_err(err)?,
                cron_job_ref: row.try_get(1).map_err(err)?,
                cron_name: row.try_get(2).map_err(err)?,
                execution_date: row.try_get(3).map_err(err)?,
                duration_seconds: row.try_get(4).map_err(err)?,
                status: status.parse::<CronStatus>().map_err(|e| corrupt(table, e))?,
                error_message: row.try_get(6).map_err(err)?,
            })
        }
        Table::LogLines => {
            let level: String = row.try_get(3).map_err(err)?;
            Row::LogLine(LogLine {
                id: row.try_get(0).map_err(err)?,
                timestamp: row.try_get(1).map_err(err)?,
                pid: row.try_get(2).map_err(err)?,
                level: LogLevel::normalize(&level),
                logger_name: row.try_get(4).map_err(err)?,
                message: row.try_get(5).map_err(err)?,
            })
        }
    };
    Ok(decoded)
}

fn decode_config(row: &postgres::Row) -> Result<RetentionConfig, StorageError> {
    let err = |e: &dyn std::fmt::Display| StorageError::Corrupt {
        table: "config",
        message: e.to_string(),
    };
    let retention = |idx: usize| -> Result<Retention, StorageError> {
        let code: String = row.try_get(idx).map_err(|e| err(&e))?;
        code.parse::<Retention>().map_err(|e| err(&e))
    };
    Ok(RetentionConfig {
        id: row.try_get(0).map_err(|e| err(&e))?,
        settings: RetentionSettings {
            system_logs_retention: retention(1)?,
            slow_queries_retention: retention(2)?,
            server_metrics_retention: retention(3)?,
            database_locks_retention: retention(4)?,
            cron_logs_retention: retention(5)?,
            auto_cleanup: row.try_get(6).map_err(|e| err(&e))?,
        },
        last_cleanup: row.try_get(7).map_err(|e| err(&e))?,
    })
}

/// Inserts one history row with `RETURNING id`.
fn insert_row<C: GenericClient>(client: &mut C, mut row: Row) -> Result<Row, StorageError> {
    let inserted = match &row {
        Row::ServerMetrics(r) => client.query_one(
            "INSERT INTO erp_health_server_metrics (timestamp, cpu_percent, ram_percent, \
             ram_used_gb, ram_total_gb, disk_percent, disk_used_gb, disk_total_gb, \
             load_average_1m, load_average_5m, load_average_15m) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
            &[
                &r.timestamp,
                &r.cpu_percent,
                &r.ram_percent,
                &r.ram_used_gb,
                &r.ram_total_gb,
                &r.disk_percent,
                &r.disk_used_gb,
                &r.disk_total_gb,
                &r.load_average_1m,
                &r.load_average_5m,
                &r.load_average_15m,
            ],
        )?,
        Row::SlowQuery(r) => client.query_one(
            "INSERT INTO erp_health_slow_query (detected_at, pid, db_user, state, query_text, \
             duration_seconds) VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            &[
                &r.detected_at,
                &r.pid,
                &r.db_user,
                &r.state,
                &r.query_text,
                &r.duration_seconds,
            ],
        )?,
        Row::DatabaseLock(r) => client.query_one(
            "INSERT INTO erp_health_database_lock (detected_at, pid, lock_type, relation, mode, \
             query_text, wait_seconds) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
            &[
                &r.detected_at,
                &r.pid,
                &r.lock_type,
                &r.relation,
                &r.mode,
                &r.query_text,
                &r.wait_seconds,
            ],
        )?,
        Row::CronExecution(r) => client.query_one(
            "INSERT INTO erp_health_cron_log (cron_job_ref, cron_name, execution_date, \
             duration_seconds, status, error_message) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
            &[
                &r.cron_job_ref,
                &r.cron_name,
                &r.execution_date,
                &r.duration_seconds,
                &r.status.as_str(),
                &r.error_message,
            ],
        )?,
        Row::LogLine(r) => client.query_one(
            "INSERT INTO erp_health_odoo_log (timestamp, pid, level, logger_name, message) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
            &[
                &r.timestamp,
                &r.pid,
                &r.level.as_str(),
                &r.logger_name,
                &r.message,
            ],
        )?,
    };
    row.set_id(inserted.try_get(0)?);
    Ok(row)
}

/// Storage in the ERP's PostgreSQL database.
///
/// The connection is re-established on the next call after the server
/// closes it.
pub struct PgStorage {
    connection_string: String,
    client: Option<Client>,
}

impl PgStorage {
    /// Connects immediately, failing if the server is unreachable.
    pub fn connect(connection_string: &str) -> Result<Self, StorageError> {
        let mut storage = Self::lazy(connection_string.to_string());
        storage.ensure_connected()?;
        Ok(storage)
    }

    /// Creates the storage without connecting; the first call connects.
    pub fn lazy(connection_string: String) -> Self {
        Self {
            connection_string,
            client: None,
        }
    }

    /// Connects using the standard `PG*` environment variables.
    pub fn from_env() -> Result<Self, StorageError> {
        let connection_string = pg_connection_string_from_env()
            .map_err(|var| StorageError::Connection(format!("{} not set", var)))?;
        Self::connect(&connection_string)
    }

    /// Creates the monitor's tables if they do not exist.
    pub fn ensure_schema(&mut self) -> Result<(), StorageError> {
        self.with_client(|client| Ok(client.batch_execute(SCHEMA)?))?;
        debug!("storage schema ensured");
        Ok(())
    }

    fn ensure_connected(&mut self) -> Result<&mut Client, StorageError> {
        if self.client.is_none() {
            let client = Client::connect(&self.connection_string, NoTls)
                .map_err(|e| StorageError::Connection(format_postgres_error(&e)))?;
            debug!("PostgreSQL storage connection established");
            self.client = Some(client);
        }
        self.client
            .as_mut()
            .ok_or_else(|| StorageError::Connection("not connected".to_string()))
    }

    /// Runs `f` on the connection. A connection found closed after a failure
    /// is dropped so the next call reconnects.
    fn with_client<T>(
        &mut self,
        f: impl FnOnce(&mut Client) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let result = f(self.ensure_connected()?);
        let lost = match &result {
            Ok(_) => false,
            Err(StorageError::Connection(_)) => true,
            Err(_) => self.client.as_ref().is_some_and(Client::is_closed),
        };
        if lost {
            warn!("PostgreSQL storage connection lost, reconnecting on next call");
            self.client = None;
        }
        result
    }
}

impl Storage for PgStorage {
    fn insert(&mut self, row: Row) -> Result<Row, StorageError> {
        self.with_client(|client| insert_row(client, row))
    }

    fn trim_by_offset(&mut self, table: Table, keep: usize) -> Result<u64, StorageError> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let sql = format!(
            "DELETE FROM {t} WHERE id NOT IN (SELECT id FROM {t} ORDER BY id DESC LIMIT $1)",
            t = table.sql_table()
        );
        self.with_client(|client| Ok(client.execute(sql.as_str(), &[&keep])?))
    }

    fn trim_by_age(&mut self, table: Table, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} < $1",
            table.sql_table(),
            table.timestamp_column()
        );
        self.with_client(|client| Ok(client.execute(sql.as_str(), &[&cutoff])?))
    }

    fn delete_all(&mut self, table: Table) -> Result<u64, StorageError> {
        let sql = format!("DELETE FROM {}", table.sql_table());
        self.with_client(|client| Ok(client.execute(sql.as_str(), &[])?))
    }

    fn replace_all(&mut self, table: Table, rows: Vec<Row>) -> Result<u64, StorageError> {
        let sql = format!("DELETE FROM {}", table.sql_table());
        self.with_client(|client| {
            let mut tx = client.transaction()?;
            tx.execute(sql.as_str(), &[])?;
            let mut inserted = 0;
            for row in rows {
                insert_row(&mut tx, row)?;
                inserted += 1;
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    fn count(&mut self, table: Table, filter: &CountFilter) -> Result<u64, StorageError> {
        let (sql, params) = build_count_query(table, filter);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        self.with_client(|client| {
            let row = client.query_one(sql.as_str(), &refs)?;
            let count: i64 = row.try_get(0)?;
            Ok(count.max(0) as u64)
        })
    }

    fn list(&mut self, table: Table, limit: usize) -> Result<Vec<Row>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT $1",
            columns(table),
            table.sql_table(),
            natural_order(table)
        );
        self.with_client(|client| {
            client
                .query(sql.as_str(), &[&limit])?
                .iter()
                .map(|row| decode_row(table, row))
                .collect()
        })
    }

    fn latest_server_metrics(&mut self) -> Result<Option<ServerMetricSample>, StorageError> {
        let table = Table::ServerMetrics;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY timestamp DESC, id DESC LIMIT 1",
            columns(table),
            table.sql_table()
        );
        let row = self.with_client(|client| Ok(client.query_opt(sql.as_str(), &[])?))?;
        match row {
            Some(row) => match decode_row(table, &row)? {
                Row::ServerMetrics(sample) => Ok(Some(sample)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    fn find_config(&mut self) -> Result<Option<RetentionConfig>, StorageError> {
        let sql = format!("SELECT {} FROM erp_health_config LIMIT 1", CONFIG_COLUMNS);
        let row = self.with_client(|client| Ok(client.query_opt(sql.as_str(), &[])?))?;
        row.map(|row| decode_config(&row)).transpose()
    }

    fn insert_config(
        &mut self,
        settings: &RetentionSettings,
    ) -> Result<RetentionConfig, StorageError> {
        self.with_client(|client| {
            client.execute(
                "INSERT INTO erp_health_config (system_logs_retention, slow_queries_retention, \
                 server_metrics_retention, database_locks_retention, cron_logs_retention, \
                 auto_cleanup) VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (singleton) DO NOTHING",
                &[
                    &settings.system_logs_retention.code(),
                    &settings.slow_queries_retention.code(),
                    &settings.server_metrics_retention.code(),
                    &settings.database_locks_retention.code(),
                    &settings.cron_logs_retention.code(),
                    &settings.auto_cleanup,
                ],
            )?;
            Ok(())
        })?;
        self.find_config()?.ok_or(StorageError::Corrupt {
            table: "config",
            message: "singleton missing after insert".to_string(),
        })
    }

    fn update_config(&mut self, config: &RetentionConfig) -> Result<(), StorageError> {
        self.with_client(|client| write_config(client, config))
    }

    fn update_config_with_params(
        &mut self,
        config: &RetentionConfig,
        params: &[(&str, String)],
    ) -> Result<(), StorageError> {
        self.with_client(|client| {
            let mut tx = client.transaction()?;
            write_config(&mut tx, config)?;
            for (key, value) in params {
                upsert_param(&mut tx, key, value)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn get_param(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_client(|client| {
            let row = client.query_opt(
                "SELECT value FROM erp_health_parameter WHERE key = $1",
                &[&key],
            )?;
            Ok(row.map(|r| r.try_get(0)).transpose()?)
        })
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_client(|client| upsert_param(client, key, value))
    }
}

fn write_config<C: GenericClient>(
    client: &mut C,
    config: &RetentionConfig,
) -> Result<(), StorageError> {
    let s = &config.settings;
    let updated = client.execute(
        "UPDATE erp_health_config SET system_logs_retention = $2, \
         slow_queries_retention = $3, server_metrics_retention = $4, \
         database_locks_retention = $5, cron_logs_retention = $6, \
         auto_cleanup = $7, last_cleanup = $8 WHERE id = $1",
        &[
            &config.id,
            &s.system_logs_retention.code(),
            &s.slow_queries_retention.code(),
            &s.server_metrics_retention.code(),
            &s.database_locks_retention.code(),
            &s.cron_logs_retention.code(),
            &s.auto_cleanup,
            &config.last_cleanup,
        ],
    )?;
    if updated == 0 {
        return Err(StorageError::Database(format!(
            "retention config {} does not exist",
            config.id
        )));
    }
    Ok(())
}

fn upsert_param<C: GenericClient>(client: &mut C, key: &str, value: &str) -> Result<(), StorageError> {
    client.execute(
        "INSERT INTO erp_health_parameter (key, value) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        &[&key, &value],
    )?;
    Ok(())
}

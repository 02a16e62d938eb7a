//! PostgreSQL activity collector.
//!
//! Reads two activity views of the ERP database:
//! - `pg_stat_activity`: active sessions, for slow query detection
//! - `pg_locks` joined with `pg_stat_activity`: sessions waiting on a lock
//!
//! Connects using the standard `PG*` environment variables. A failed query
//! drops the connection; the next call reconnects.

mod activity;
mod locks;
mod queries;

use postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::util::{format_postgres_error, pg_connection_string_from_env};

/// Error type for PostgreSQL collection.
#[derive(Debug, thiserror::Error)]
pub enum PgCollectError {
    /// Connection failed or connection settings are missing.
    #[error("PostgreSQL: {0}")]
    Connection(String),
    /// Query execution failed.
    #[error("PostgreSQL query error: {0}")]
    Query(String),
}

/// An active session whose current query has been running for a while.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveQuery {
    pub pid: i32,
    pub db_user: String,
    pub state: String,
    pub query: String,
    pub duration_seconds: f64,
}

/// A lock request that has not been granted.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingLock {
    pub pid: i32,
    pub lock_type: String,
    /// Locked relation; `None` for non-relation locks.
    pub relation: Option<String>,
    pub mode: String,
    pub query: Option<String>,
    pub wait_seconds: Option<f64>,
}

/// Source of session and lock activity.
pub trait ActivitySource: Send {
    /// Active queries running for at least `threshold_secs`, longest first.
    fn slow_queries(
        &mut self,
        threshold_secs: f64,
        limit: usize,
    ) -> Result<Vec<ActiveQuery>, PgCollectError>;

    /// Ungranted locks held by sessions with a query, longest wait first.
    fn waiting_locks(&mut self, limit: usize) -> Result<Vec<WaitingLock>, PgCollectError>;
}

/// PostgreSQL activity collector.
///
/// Connects to PostgreSQL using standard environment variables:
/// - PGHOST (default: localhost)
/// - PGPORT (default: 5432)
/// - PGUSER (default: $USER)
/// - PGPASSWORD (default: empty)
/// - PGDATABASE (default: same as PGUSER)
pub struct PostgresCollector {
    /// `None` when connection settings could not be determined.
    connection_string: Option<String>,
    pub(crate) client: Option<Client>,
    pub(crate) last_error: Option<String>,
}

impl PostgresCollector {
    /// Creates a new collector from environment variables.
    pub fn from_env() -> Result<Self, PgCollectError> {
        let connection_string = pg_connection_string_from_env()
            .map_err(|var| PgCollectError::Connection(format!("{} not set", var)))?;
        Ok(Self::with_connection_string(connection_string))
    }

    /// Creates a collector with explicit connection string.
    pub fn with_connection_string(connection_string: String) -> Self {
        Self {
            connection_string: Some(connection_string),
            client: None,
            last_error: None,
        }
    }

    /// Like [`PostgresCollector::from_env`], but a missing setting yields a
    /// collector whose every call fails with the setting error instead.
    pub fn from_env_lenient() -> Self {
        match Self::from_env() {
            Ok(collector) => collector,
            Err(e) => {
                warn!(error = %e, "PostgreSQL activity collection not configured");
                Self {
                    connection_string: None,
                    client: None,
                    last_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Ensures the connection is established, reconnecting if needed.
    pub(crate) fn ensure_connected(&mut self) -> Result<&mut Client, PgCollectError> {
        if self.client.is_none() {
            let Some(connection_string) = self.connection_string.as_deref() else {
                return Err(PgCollectError::Connection(
                    self.last_error
                        .clone()
                        .unwrap_or_else(|| "connection settings missing".to_string()),
                ));
            };
            match Client::connect(connection_string, NoTls) {
                Ok(client) => {
                    debug!("PostgreSQL activity connection established");
                    self.client = Some(client);
                    self.last_error = None;
                }
                Err(e) => {
                    let msg = format_postgres_error(&e);
                    self.last_error = Some(msg.clone());
                    return Err(PgCollectError::Connection(msg));
                }
            }
        }
        self.client
            .as_mut()
            .ok_or_else(|| PgCollectError::Connection("not connected".to_string()))
    }

    /// Records a query failure and drops the connection.
    pub(crate) fn query_failed(&mut self, e: &postgres::Error) -> PgCollectError {
        let msg = format_postgres_error(e);
        warn!(error = %msg, "PostgreSQL query failed, dropping connection");
        self.last_error = Some(msg.clone());
        self.client = None;
        PgCollectError::Query(msg)
    }
}

impl ActivitySource for PostgresCollector {
    fn slow_queries(
        &mut self,
        threshold_secs: f64,
        limit: usize,
    ) -> Result<Vec<ActiveQuery>, PgCollectError> {
        self.collect_slow_queries(threshold_secs, limit)
    }

    fn waiting_locks(&mut self, limit: usize) -> Result<Vec<WaitingLock>, PgCollectError> {
        self.collect_waiting_locks(limit)
    }
}

/// Converts a row limit to a SQL `LIMIT` parameter.
fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

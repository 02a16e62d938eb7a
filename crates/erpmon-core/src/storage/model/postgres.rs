//! Rows captured from PostgreSQL activity views.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum stored length of free-text query columns, in characters.
pub const MAX_QUERY_TEXT_CHARS: usize = 5000;

/// A query that had been running longer than the slow-query threshold.
///
/// Source: `pg_stat_activity` (state = 'active').
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowQuerySample {
    pub id: i64,
    pub detected_at: DateTime<Utc>,
    pub pid: i32,
    pub db_user: String,
    pub state: String,
    /// Query text, truncated to `MAX_QUERY_TEXT_CHARS`.
    pub query_text: String,
    pub duration_seconds: f64,
}

/// A session waiting on a lock that has not been granted.
///
/// Source: `pg_locks` joined with `pg_stat_activity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseLockSample {
    pub id: i64,
    pub detected_at: DateTime<Utc>,
    pub pid: i32,
    pub lock_type: String,
    /// Locked relation, `N/A` for non-relation locks.
    pub relation: String,
    pub mode: String,
    /// Query text, truncated to `MAX_QUERY_TEXT_CHARS`.
    pub query_text: String,
    pub wait_seconds: f64,
}

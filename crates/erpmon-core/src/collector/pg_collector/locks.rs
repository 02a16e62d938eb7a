//! Lock wait collection from pg_locks.

use super::queries::WAITING_LOCKS_QUERY;
use super::{PgCollectError, PostgresCollector, WaitingLock, limit_param};

impl PostgresCollector {
    /// Collects ungranted locks, longest wait first.
    ///
    /// No caching: lock state changes rapidly.
    pub fn collect_waiting_locks(
        &mut self,
        limit: usize,
    ) -> Result<Vec<WaitingLock>, PgCollectError> {
        let client = self.ensure_connected()?;
        let result = client.query(WAITING_LOCKS_QUERY, &[&limit_param(limit)]);

        match result {
            Ok(rows) => Ok(rows.iter().filter_map(parse_waiting_lock_row).collect()),
            Err(e) => Err(self.query_failed(&e)),
        }
    }
}

/// Returns None for locks without a backend pid (prepared transactions).
fn parse_waiting_lock_row(row: &postgres::Row) -> Option<WaitingLock> {
    let pid: Option<i32> = row.try_get("pid").ok()?;
    Some(WaitingLock {
        pid: pid?,
        lock_type: row.try_get("locktype").unwrap_or_default(),
        relation: row.try_get("relation").ok().flatten(),
        mode: row.try_get("mode").unwrap_or_default(),
        query: row.try_get("query").ok().flatten(),
        wait_seconds: row.try_get("wait_time").ok().flatten(),
    })
}

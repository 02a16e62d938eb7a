//! pg_stat_activity collection.

use super::queries::SLOW_QUERIES_QUERY;
use super::{ActiveQuery, PgCollectError, PostgresCollector, limit_param};

impl PostgresCollector {
    /// Collects active queries running for at least `threshold_secs`.
    ///
    /// Rows that fail to decode are skipped.
    pub fn collect_slow_queries(
        &mut self,
        threshold_secs: f64,
        limit: usize,
    ) -> Result<Vec<ActiveQuery>, PgCollectError> {
        let client = self.ensure_connected()?;
        let result = client.query(SLOW_QUERIES_QUERY, &[&threshold_secs, &limit_param(limit)]);

        match result {
            Ok(rows) => Ok(rows.iter().filter_map(parse_active_query_row).collect()),
            Err(e) => Err(self.query_failed(&e)),
        }
    }
}

fn parse_active_query_row(row: &postgres::Row) -> Option<ActiveQuery> {
    Some(ActiveQuery {
        pid: row.try_get("pid").ok()?,
        db_user: row.try_get("db_user").unwrap_or_default(),
        state: row.try_get("state").unwrap_or_default(),
        query: row.try_get("query").unwrap_or_default(),
        duration_seconds: row.try_get("duration").ok()?,
    })
}

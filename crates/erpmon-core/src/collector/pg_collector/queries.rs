//! SQL for the activity views.

/// Active sessions running longer than `$1` seconds, longest first, at most `$2` rows.
///
/// The monitor's own sessions are excluded by skipping queries that read
/// `pg_stat_activity`.
pub(super) const SLOW_QUERIES_QUERY: &str = r#"
    SELECT
        pid,
        COALESCE(usename, '') AS db_user,
        COALESCE(state, '') AS state,
        COALESCE(query, '') AS query,
        EXTRACT(EPOCH FROM (now() - query_start))::float8 AS duration
    FROM pg_stat_activity
    WHERE state = 'active'
      AND query_start IS NOT NULL
      AND query NOT LIKE '%pg_stat_activity%'
      AND EXTRACT(EPOCH FROM (now() - query_start))::float8 >= $1::float8
    ORDER BY duration DESC
    LIMIT $2
"#;

/// Ungranted locks of sessions with a query, longest wait first, at most `$1` rows.
pub(super) const WAITING_LOCKS_QUERY: &str = r#"
    SELECT
        l.pid,
        COALESCE(l.locktype, '') AS locktype,
        l.relation::regclass::text AS relation,
        COALESCE(l.mode, '') AS mode,
        a.query,
        EXTRACT(EPOCH FROM (now() - a.query_start))::float8 AS wait_time
    FROM pg_locks l
    LEFT JOIN pg_stat_activity a ON l.pid = a.pid
    WHERE NOT l.granted
      AND a.query IS NOT NULL
    ORDER BY wait_time DESC NULLS LAST
    LIMIT $1
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_query_filters() {
        assert!(SLOW_QUERIES_QUERY.contains("state = 'active'"));
        assert!(SLOW_QUERIES_QUERY.contains("NOT LIKE '%pg_stat_activity%'"));
        assert!(SLOW_QUERIES_QUERY.contains(">= $1::float8"));
        assert!(SLOW_QUERIES_QUERY.contains("LIMIT $2"));
    }

    #[test]
    fn test_lock_query_filters() {
        assert!(WAITING_LOCKS_QUERY.contains("NOT l.granted"));
        assert!(WAITING_LOCKS_QUERY.contains("a.query IS NOT NULL"));
        assert!(WAITING_LOCKS_QUERY.contains("LIMIT $1"));
    }
}

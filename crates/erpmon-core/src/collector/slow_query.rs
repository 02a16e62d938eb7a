//! Slow query sampler.

use chrono::Utc;

use super::pg_collector::{ActiveQuery, ActivitySource};
use super::{RefreshStats, SampleError, Sampler};
use crate::params;
use crate::storage::{History, MAX_QUERY_TEXT_CHARS, SlowQuerySample, Storage};
use crate::util::truncate_chars;

/// Maximum rows fetched per refresh.
pub const SLOW_QUERY_FETCH_LIMIT: usize = 50;
/// Number of samples kept by the offset trim.
pub const SLOW_QUERY_KEEP: usize = 1000;

pub struct SlowQuerySampler<A: ActivitySource> {
    source: A,
    keep: usize,
}

impl<A: ActivitySource> SlowQuerySampler<A> {
    pub fn new(source: A) -> Self {
        Self {
            source,
            keep: SLOW_QUERY_KEEP,
        }
    }
}

/// Keeps queries at or over the threshold, longest first, capped at the fetch limit.
fn select_slow(mut queries: Vec<ActiveQuery>, threshold_secs: f64) -> Vec<ActiveQuery> {
    queries.retain(|q| q.duration_seconds >= threshold_secs);
    queries.sort_by(|a, b| b.duration_seconds.total_cmp(&a.duration_seconds));
    queries.truncate(SLOW_QUERY_FETCH_LIMIT);
    queries
}

impl<A: ActivitySource> Sampler for SlowQuerySampler<A> {
    fn name(&self) -> &'static str {
        "slow-queries"
    }

    fn collect(&mut self, storage: &mut dyn Storage) -> Result<RefreshStats, SampleError> {
        let threshold = params::slow_query_threshold(storage)?;
        let fetched = self
            .source
            .slow_queries(threshold, SLOW_QUERY_FETCH_LIMIT)?;
        let fetched_count = fetched.len();

        let detected_at = Utc::now();
        let samples: Vec<SlowQuerySample> = select_slow(fetched, threshold)
            .into_iter()
            .map(|q| SlowQuerySample {
                id: 0,
                detected_at,
                pid: q.pid,
                db_user: q.db_user,
                state: q.state,
                query_text: truncate_chars(&q.query, MAX_QUERY_TEXT_CHARS),
                duration_seconds: q.duration_seconds,
            })
            .collect();

        let mut history = History::<SlowQuerySample>::new(storage);
        let appended = history.append_all(samples)?;
        let trimmed = history.trim_by_offset(self.keep)?;

        Ok(RefreshStats {
            fetched: fetched_count,
            appended,
            trimmed,
        })
    }
}

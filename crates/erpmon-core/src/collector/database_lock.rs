//! Database lock sampler.

use chrono::Utc;

use super::pg_collector::ActivitySource;
use super::{RefreshStats, SampleError, Sampler};
use crate::storage::{DatabaseLockSample, History, MAX_QUERY_TEXT_CHARS, Storage};
use crate::util::truncate_chars;

/// Maximum rows fetched per refresh.
pub const LOCK_FETCH_LIMIT: usize = 50;
/// Number of samples kept by the offset trim.
pub const LOCK_KEEP: usize = 500;

/// Relation shown for locks that are not on a relation.
const NO_RELATION: &str = "N/A";

pub struct DatabaseLockSampler<A: ActivitySource> {
    source: A,
    keep: usize,
}

impl<A: ActivitySource> DatabaseLockSampler<A> {
    pub fn new(source: A) -> Self {
        Self {
            source,
            keep: LOCK_KEEP,
        }
    }
}

impl<A: ActivitySource> Sampler for DatabaseLockSampler<A> {
    fn name(&self) -> &'static str {
        "database-locks"
    }

    fn collect(&mut self, storage: &mut dyn Storage) -> Result<RefreshStats, SampleError> {
        let locks = self.source.waiting_locks(LOCK_FETCH_LIMIT)?;
        let fetched = locks.len();

        let detected_at = Utc::now();
        let samples: Vec<DatabaseLockSample> = locks
            .into_iter()
            .take(LOCK_FETCH_LIMIT)
            .filter_map(|lock| {
                let query = lock.query?;
                Some(DatabaseLockSample {
                    id: 0,
                    detected_at,
                    pid: lock.pid,
                    lock_type: lock.lock_type,
                    relation: lock
                        .relation
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| NO_RELATION.to_string()),
                    mode: lock.mode,
                    query_text: truncate_chars(&query, MAX_QUERY_TEXT_CHARS),
                    wait_seconds: lock.wait_seconds.unwrap_or(0.0),
                })
            })
            .collect();

        let mut history = History::<DatabaseLockSample>::new(storage);
        let appended = history.append_all(samples)?;
        let trimmed = history.trim_by_offset(self.keep)?;

        Ok(RefreshStats {
            fetched,
            appended,
            trimmed,
        })
    }
}

//! Samplers that capture host and database health into history tables.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Sampler                             │
//! │  ┌──────────────────┐ ┌─────────────────┐ ┌────────────────┐ │
//! │  │ ServerMetrics    │ │ SlowQuery/Lock  │ │ LogTail        │ │
//! │  │  SystemSource    │ │  ActivitySource │ │  log file tail │ │
//! │  └────────┬─────────┘ └────────┬────────┘ └───────┬────────┘ │
//! │           │                    │                  │          │
//! │    ┌──────▼──────┐      ┌──────▼──────────┐       │          │
//! │    │ FileSystem  │      │PostgresCollector│       │          │
//! │    │ + statvfs   │      │ pg_stat_activity│       │          │
//! │    └─────────────┘      │ pg_locks        │       │          │
//! │                         └─────────────────┘       │          │
//! └───────────────────────────────┬───────────────────┴──────────┘
//!                                 │
//!                          ┌──────▼──────┐
//!                          │   Storage   │ append + trim / replace
//!                          └─────────────┘
//! ```
//!
//! Every sampler runs the same cycle: fetch a bounded snapshot, transform
//! it into history rows, persist them, then trim the history. A failure
//! anywhere in the cycle is logged and reported as [`Outcome::Failure`];
//! it never propagates to the caller.

pub mod database_lock;
pub mod log_collector;
pub mod mock;
pub mod pg_collector;
pub mod procfs;
pub mod server_metrics;
pub mod slow_query;
pub mod traits;

use tracing::{error, info};

use crate::storage::{Storage, StorageError};

pub use database_lock::DatabaseLockSampler;
pub use log_collector::LogTailSampler;
pub use mock::MockFs;
pub use pg_collector::{ActiveQuery, ActivitySource, PgCollectError, PostgresCollector, WaitingLock};
pub use procfs::{CollectError, SystemCollector, SystemSource};
pub use server_metrics::ServerMetricsSampler;
pub use slow_query::SlowQuerySampler;
pub use traits::{FileSystem, RealFs};

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// The external source cannot be reached or does not exist.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    /// The source was reached but returned an error.
    #[error("query failed: {0}")]
    Query(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<PgCollectError> for SampleError {
    fn from(e: PgCollectError) -> Self {
        match e {
            PgCollectError::Connection(msg) => SampleError::SourceUnavailable(msg),
            PgCollectError::Query(msg) => SampleError::Query(msg),
        }
    }
}

/// Counters of one successful refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Rows returned by the source.
    pub fetched: usize,
    /// Rows written to history.
    pub appended: usize,
    /// Rows deleted by the trim step.
    pub trimmed: u64,
}

/// Result of a sampler refresh as seen by callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(RefreshStats),
    /// The refresh failed; the message is already logged.
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// A collector that snapshots an external source into a history table.
pub trait Sampler {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one fetch/transform/persist/trim cycle.
    fn collect(&mut self, storage: &mut dyn Storage) -> Result<RefreshStats, SampleError>;

    /// Runs [`Sampler::collect`] and converts any error into a logged failure.
    fn refresh(&mut self, storage: &mut dyn Storage) -> Outcome {
        match self.collect(storage) {
            Ok(stats) => {
                info!(
                    sampler = self.name(),
                    fetched = stats.fetched,
                    appended = stats.appended,
                    trimmed = stats.trimmed,
                    "refresh completed"
                );
                Outcome::Success(stats)
            }
            Err(e) => {
                error!(sampler = self.name(), error = %e, "refresh failed");
                Outcome::Failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    struct Failing;

    impl Sampler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn collect(&mut self, _storage: &mut dyn Storage) -> Result<RefreshStats, SampleError> {
            Err(SampleError::SourceUnavailable("no route to host".to_string()))
        }
    }

    #[test]
    fn test_refresh_swallows_errors() {
        let mut storage = MemoryStorage::new();
        let outcome = Failing.refresh(&mut storage);
        assert_eq!(
            outcome,
            Outcome::Failure("source unavailable: no route to host".to_string())
        );
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_pg_errors_map_to_sample_errors() {
        let e: SampleError = PgCollectError::Connection("refused".to_string()).into();
        assert!(matches!(e, SampleError::SourceUnavailable(_)));
        let e: SampleError = PgCollectError::Query("syntax".to_string()).into();
        assert!(matches!(e, SampleError::Query(_)));
    }
}

//! Manual triggers and scheduled job dispatch.
//!
//! A [`Monitor`] owns the four polling samplers. Each [`Action`] maps to one
//! sampler refresh or to the cleanup sweeper. [`Monitor::execute`] reports
//! failures as errors (the daemon records them through the cron hook);
//! [`Monitor::trigger`] turns the same result into a user-facing [`Notice`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::error;

use crate::cleanup::{CleanupReport, run_cleanup};
use crate::collector::log_collector::DEFAULT_TAIL_LINES;
use crate::collector::procfs::system::DEFAULT_CPU_WINDOW;
use crate::collector::{
    DatabaseLockSampler, LogTailSampler, Outcome, PostgresCollector, RealFs, RefreshStats,
    Sampler, ServerMetricsSampler, SlowQuerySampler, SystemCollector,
};
use crate::cron::CronJob;
use crate::notice::Notice;
use crate::storage::{Storage, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    CollectMetrics,
    RefreshSlowQueries,
    RefreshLocks,
    RefreshLogs,
    Cleanup,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::CollectMetrics,
        Action::RefreshSlowQueries,
        Action::RefreshLocks,
        Action::RefreshLogs,
        Action::Cleanup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::CollectMetrics => "collect-metrics",
            Action::RefreshSlowQueries => "refresh-slow-queries",
            Action::RefreshLocks => "refresh-locks",
            Action::RefreshLogs => "refresh-logs",
            Action::Cleanup => "cleanup",
        }
    }

    /// Human-readable job name stored in cron execution records.
    pub fn title(self) -> &'static str {
        match self {
            Action::CollectMetrics => "Collect server metrics",
            Action::RefreshSlowQueries => "Refresh slow queries",
            Action::RefreshLocks => "Refresh database locks",
            Action::RefreshLogs => "Refresh application logs",
            Action::Cleanup => "Clean up old monitoring data",
        }
    }

    pub fn job(self) -> CronJob {
        CronJob::new(self.name(), self.title())
    }

    fn success_message(self) -> &'static str {
        match self {
            Action::CollectMetrics => "Server metrics collected successfully",
            Action::RefreshSlowQueries => "Slow queries refreshed successfully",
            Action::RefreshLocks => "Database locks refreshed successfully",
            Action::RefreshLogs => "Application logs refreshed successfully",
            Action::Cleanup => "Old data cleaned up successfully based on retention settings",
        }
    }

    fn failure_prefix(self) -> &'static str {
        match self {
            Action::CollectMetrics => "Failed to collect metrics",
            Action::RefreshSlowQueries => "Failed to refresh queries",
            Action::RefreshLocks => "Failed to refresh locks",
            Action::RefreshLogs => "Failed to refresh logs",
            Action::Cleanup => "Cleanup failed",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("unknown action '{}'", s))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// A sampler refresh failed; the message is already logged.
    #[error("{0}")]
    Refresh(String),
    #[error(transparent)]
    Cleanup(#[from] StorageError),
}

/// What a successful action did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionReport {
    Refreshed {
        fetched: usize,
        appended: usize,
        trimmed: u64,
    },
    Cleaned(CleanupReport),
}

impl From<RefreshStats> for ActionReport {
    fn from(stats: RefreshStats) -> Self {
        ActionReport::Refreshed {
            fetched: stats.fetched,
            appended: stats.appended,
            trimmed: stats.trimmed,
        }
    }
}

/// Settings for the production samplers.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub proc_path: String,
    /// Mount point whose usage is reported as disk usage.
    pub disk_path: PathBuf,
    pub cpu_window: Duration,
    /// Explicit application log file; default locations are probed when unset.
    pub log_file: Option<PathBuf>,
    pub log_lines: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            proc_path: "/proc".to_string(),
            disk_path: PathBuf::from("/"),
            cpu_window: DEFAULT_CPU_WINDOW,
            log_file: None,
            log_lines: DEFAULT_TAIL_LINES,
        }
    }
}

type BoxedSampler = Box<dyn Sampler + Send>;

pub struct Monitor {
    metrics: BoxedSampler,
    slow_queries: BoxedSampler,
    locks: BoxedSampler,
    logs: BoxedSampler,
}

impl Monitor {
    pub fn new(
        metrics: BoxedSampler,
        slow_queries: BoxedSampler,
        locks: BoxedSampler,
        logs: BoxedSampler,
    ) -> Self {
        Self {
            metrics,
            slow_queries,
            locks,
            logs,
        }
    }

    /// Builds the production samplers: `/proc` for host metrics, the `PG*`
    /// environment for activity, and the configured log file.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let system = SystemCollector::new(RealFs, config.proc_path.clone())
            .with_disk_path(config.disk_path.clone())
            .with_cpu_window(config.cpu_window);

        let mut logs = LogTailSampler::new().with_lines(config.log_lines);
        if let Some(path) = &config.log_file {
            logs = logs.with_path(path.clone());
        }

        Self::new(
            Box::new(ServerMetricsSampler::new(system)),
            Box::new(SlowQuerySampler::new(PostgresCollector::from_env_lenient())),
            Box::new(DatabaseLockSampler::new(PostgresCollector::from_env_lenient())),
            Box::new(logs),
        )
    }

    fn sampler(&mut self, action: Action) -> Option<&mut BoxedSampler> {
        match action {
            Action::CollectMetrics => Some(&mut self.metrics),
            Action::RefreshSlowQueries => Some(&mut self.slow_queries),
            Action::RefreshLocks => Some(&mut self.locks),
            Action::RefreshLogs => Some(&mut self.logs),
            Action::Cleanup => None,
        }
    }

    /// Runs `action` to completion.
    pub fn execute(
        &mut self,
        action: Action,
        storage: &mut dyn Storage,
    ) -> Result<ActionReport, ActionError> {
        match self.sampler(action) {
            Some(sampler) => match sampler.refresh(storage) {
                Outcome::Success(stats) => Ok(stats.into()),
                Outcome::Failure(message) => Err(ActionError::Refresh(message)),
            },
            None => run_cleanup(storage).map(ActionReport::Cleaned).map_err(|e| {
                error!(error = %e, "cleanup failed");
                ActionError::Cleanup(e)
            }),
        }
    }

    /// Runs `action` on behalf of a user and reports the result as a notice.
    pub fn trigger(&mut self, action: Action, storage: &mut dyn Storage) -> Notice {
        match self.execute(action, storage) {
            Ok(ActionReport::Cleaned(CleanupReport::Disabled)) => Notice::success(
                "Success",
                "Auto cleanup is disabled, no records were deleted",
            ),
            Ok(_) => Notice::success("Success", action.success_message()),
            Err(e) => Notice::danger("Error", format!("{}: {}", action.failure_prefix(), e)),
        }
    }
}

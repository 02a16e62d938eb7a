//! erpmond - ERP health monitor daemon.
//!
//! Runs the server metrics, slow query, lock and log tail samplers and the
//! retention cleanup on fixed intervals. Every run is recorded as a cron
//! execution.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use erpmon_core::cron::track_execution;
use erpmon_core::monitor::{Action, ActionReport, Monitor, MonitorConfig};
use erpmon_core::retention::get_or_create_config;
use erpmon_core::scheduler::Schedule;
use erpmon_core::storage::{MemoryStorage, PgStorage, Storage};
use erpmon_core::util::print_pg_warning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StorageKind {
    /// Tables in the ERP PostgreSQL database (PG* environment variables).
    Postgres,
    /// In-process tables, lost on exit.
    Memory,
}

/// ERP health monitor daemon.
#[derive(Parser, Debug)]
#[command(name = "erpmond", about = "ERP health monitor daemon", version)]
struct Args {
    /// Server metrics interval in seconds.
    #[arg(long, env = "ERPMON_METRICS_INTERVAL", default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    metrics_interval: u64,

    /// Slow query detection interval in seconds.
    #[arg(long, env = "ERPMON_SLOW_QUERY_INTERVAL", default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    slow_query_interval: u64,

    /// Lock detection interval in seconds.
    #[arg(long, env = "ERPMON_LOCK_INTERVAL", default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    lock_interval: u64,

    /// Log tail refresh interval in seconds.
    #[arg(long, env = "ERPMON_LOG_INTERVAL", default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
    log_interval: u64,

    /// Retention cleanup interval in seconds.
    #[arg(long, env = "ERPMON_CLEANUP_INTERVAL", default_value = "86400", value_parser = clap::value_parser!(u64).range(1..))]
    cleanup_interval: u64,

    /// Application log file. Default locations are probed when unset.
    #[arg(long, env = "ERPMON_LOG_FILE", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Lines read from the end of the log file per refresh.
    #[arg(long, env = "ERPMON_LOG_LINES", default_value = "500")]
    log_lines: usize,

    /// Mount point reported as disk usage.
    #[arg(long, env = "ERPMON_DISK_PATH", default_value = "/")]
    disk_path: PathBuf,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Where history is stored.
    #[arg(long, env = "ERPMON_STORAGE", value_enum, default_value_t = StorageKind::Postgres)]
    storage: StorageKind,

    /// Run every job once and exit.
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            proc_path: self.proc_path.clone(),
            disk_path: self.disk_path.clone(),
            log_file: self.log_file.clone(),
            log_lines: self.log_lines,
            ..MonitorConfig::default()
        }
    }

    fn intervals(&self) -> [(Action, Duration); 5] {
        [
            (Action::CollectMetrics, Duration::from_secs(self.metrics_interval)),
            (Action::RefreshSlowQueries, Duration::from_secs(self.slow_query_interval)),
            (Action::RefreshLocks, Duration::from_secs(self.lock_interval)),
            (Action::RefreshLogs, Duration::from_secs(self.log_interval)),
            (Action::Cleanup, Duration::from_secs(self.cleanup_interval)),
        ]
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["erpmond", "erpmon_core"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn open_storage(kind: StorageKind) -> Result<Box<dyn Storage>, String> {
    match kind {
        StorageKind::Memory => {
            warn!("Using in-memory storage, history is lost on exit");
            Ok(Box::new(MemoryStorage::new()))
        }
        StorageKind::Postgres => {
            let mut storage = PgStorage::from_env().map_err(|e| e.to_string())?;
            storage.ensure_schema().map_err(|e| e.to_string())?;
            Ok(Box::new(storage))
        }
    }
}

/// Runs one scheduled job through the cron hook.
fn run_job(monitor: &mut Monitor, storage: &mut dyn Storage, action: Action) {
    let result = track_execution(storage, &action.job(), |s| monitor.execute(action, s));
    match result {
        Ok(ActionReport::Refreshed { appended, .. }) => {
            debug!(job = %action, appended, "job finished")
        }
        Ok(ActionReport::Cleaned(report)) => {
            debug!(job = %action, deleted = report.total_deleted(), "job finished")
        }
        Err(e) => warn!(job = %action, error = %e, "job failed, retrying at next run"),
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("erpmond {} starting", erpmon_core::VERSION);

    let mut storage = match open_storage(args.storage) {
        Ok(storage) => storage,
        Err(e) => {
            error!("Storage unavailable: {}", e);
            print_pg_warning(&e);
            std::process::exit(1);
        }
    };

    match get_or_create_config(storage.as_mut()) {
        Ok(config) => info!(
            "Retention: logs={}, slow_queries={}, metrics={}, locks={}, cron={}, auto_cleanup={}",
            config.settings.system_logs_retention,
            config.settings.slow_queries_retention,
            config.settings.server_metrics_retention,
            config.settings.database_locks_retention,
            config.settings.cron_logs_retention,
            config.settings.auto_cleanup
        ),
        Err(e) => error!("Failed to load retention config: {}", e),
    }

    let mut monitor = Monitor::from_config(&args.monitor_config());

    let start = Instant::now();
    let mut schedule = Schedule::new();
    for (action, interval) in args.intervals() {
        schedule.add(action, interval, start);
    }
    for job in schedule.jobs() {
        info!("Job {}: every {}s", job.key, job.interval.as_secs());
    }

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting scheduler loop");

    while running.load(Ordering::SeqCst) {
        for action in schedule.due(Instant::now()) {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            run_job(&mut monitor, storage.as_mut(), action);
        }

        if args.once {
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let wake_at = schedule.next_due().unwrap_or_else(Instant::now);
        while running.load(Ordering::SeqCst) {
            let remaining = wake_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(sleep_interval));
        }
    }

    info!("Shutdown complete");
}

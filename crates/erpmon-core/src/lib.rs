//! erpmon-core: health monitoring library for an ERP server.
//!
//! Provides:
//! - `retention`: retention codes, cutoff calculation, singleton retention config
//! - `storage`: history tables (`Storage` trait, PostgreSQL and in-memory backends)
//! - `collector`: the four polling samplers and their external sources
//! - `cron`: execution-tracking hook for scheduled jobs
//! - `cleanup`: age-based retention sweeper
//! - `dashboard`: read-only rollup of the latest samples and today's counters
//! - `monitor`: manual triggers and scheduled job dispatch
//! - `scheduler`: fixed-interval job schedule used by the daemon
//! - `params`: free-standing thresholds in the configuration store
//! - `notice`: user-facing success/failure notices
//! - `util`: helper utilities

pub mod cleanup;
pub mod collector;
pub mod cron;
pub mod dashboard;
pub mod monitor;
pub mod notice;
pub mod params;
pub mod retention;
pub mod scheduler;
pub mod storage;
pub mod util;

/// Library version, shared by the daemon and the web server.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

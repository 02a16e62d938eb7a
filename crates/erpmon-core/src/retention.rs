//! Retention windows and the singleton retention configuration.
//!
//! A retention window is either a fixed number of days (7, 15, 30 or 90) or
//! unlimited. The cutoff for a window is `now - days`; rows captured strictly
//! before the cutoff are eligible for deletion by the cleanup sweeper.
//!
//! At most one `RetentionConfig` exists in storage. Creation goes through
//! [`create_config`] / [`get_or_create_config`], which return the existing
//! instance instead of inserting a second one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::params::ThresholdChange;
use crate::storage::{Storage, StorageError, Table};

/// Day counts accepted for a retention window.
pub const ALLOWED_DAYS: [u32; 4] = [7, 15, 30, 90];

/// Code for the unlimited retention window.
const UNLIMITED_CODE: &str = "all";

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// The textual code is neither a day count nor `all`.
    #[error("invalid retention code '{0}', expected one of 7, 15, 30, 90, all")]
    InvalidCode(String),
    /// A day count outside `ALLOWED_DAYS`.
    #[error("unsupported retention of {0} days, expected one of 7, 15, 30, 90")]
    InvalidDays(u32),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Retention window for one history table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Retention {
    Days(u32),
    Unlimited,
}

impl Retention {
    /// Cutoff relative to the current time.
    pub fn cutoff(self) -> Option<DateTime<Utc>> {
        self.cutoff_at(Utc::now())
    }

    /// Cutoff relative to `now`; `None` means nothing expires.
    pub fn cutoff_at(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Retention::Unlimited => None,
            Retention::Days(days) => Some(now - TimeDelta::days(i64::from(days))),
        }
    }

    /// Checks the window against `ALLOWED_DAYS`.
    pub fn validate(self) -> Result<Self, RetentionError> {
        match self {
            Retention::Days(days) if !ALLOWED_DAYS.contains(&days) => {
                Err(RetentionError::InvalidDays(days))
            }
            other => Ok(other),
        }
    }

    /// Stored code: the day count, or `all`.
    pub fn code(self) -> String {
        match self {
            Retention::Days(days) => days.to_string(),
            Retention::Unlimited => UNLIMITED_CODE.to_string(),
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Days(days) => write!(f, "{} days", days),
            Retention::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl FromStr for Retention {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == UNLIMITED_CODE {
            return Ok(Retention::Unlimited);
        }
        let days: u32 = s
            .parse()
            .map_err(|_| RetentionError::InvalidCode(s.to_string()))?;
        Retention::Days(days).validate()
    }
}

impl TryFrom<String> for Retention {
    type Error = RetentionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Retention> for String {
    fn from(value: Retention) -> Self {
        value.code()
    }
}

/// User-editable part of the retention configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionSettings {
    pub system_logs_retention: Retention,
    pub slow_queries_retention: Retention,
    pub server_metrics_retention: Retention,
    pub database_locks_retention: Retention,
    pub cron_logs_retention: Retention,
    /// Whether the cleanup sweeper deletes anything at all.
    pub auto_cleanup: bool,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            system_logs_retention: Retention::Days(30),
            slow_queries_retention: Retention::Days(30),
            server_metrics_retention: Retention::Days(30),
            database_locks_retention: Retention::Days(15),
            cron_logs_retention: Retention::Days(30),
            auto_cleanup: true,
        }
    }
}

impl RetentionSettings {
    /// Retention window configured for a history table.
    pub fn retention_for(&self, table: Table) -> Retention {
        match table {
            Table::LogLines => self.system_logs_retention,
            Table::SlowQueries => self.slow_queries_retention,
            Table::ServerMetrics => self.server_metrics_retention,
            Table::DatabaseLocks => self.database_locks_retention,
            Table::CronLogs => self.cron_logs_retention,
        }
    }

    /// Rejects any window outside the allowed set.
    pub fn validate(&self) -> Result<(), RetentionError> {
        for table in Table::ALL {
            self.retention_for(table).validate()?;
        }
        Ok(())
    }
}

/// The persisted singleton configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionConfig {
    pub id: i64,
    #[serde(flatten)]
    pub settings: RetentionSettings,
    /// When the cleanup sweeper last completed.
    pub last_cleanup: Option<DateTime<Utc>>,
}

/// Fetches the singleton configuration, creating it with defaults if absent.
pub fn get_or_create_config(storage: &mut dyn Storage) -> Result<RetentionConfig, StorageError> {
    if let Some(config) = storage.find_config()? {
        return Ok(config);
    }
    let config = storage.insert_config(&RetentionSettings::default())?;
    info!(id = config.id, "retention config created with defaults");
    Ok(config)
}

/// Creates the configuration with the given settings.
///
/// If a configuration already exists it is returned unchanged and no new
/// instance is created.
pub fn create_config(
    storage: &mut dyn Storage,
    settings: &RetentionSettings,
) -> Result<RetentionConfig, RetentionError> {
    settings.validate()?;
    if let Some(existing) = storage.find_config()? {
        return Ok(existing);
    }
    Ok(storage.insert_config(settings)?)
}

/// Replaces the settings of the singleton, keeping its identity and `last_cleanup`.
pub fn update_config(
    storage: &mut dyn Storage,
    settings: RetentionSettings,
) -> Result<RetentionConfig, RetentionError> {
    update_config_with_thresholds(storage, settings, &[])
}

/// Like [`update_config`], also writing threshold changes in the same
/// storage update.
pub fn update_config_with_thresholds(
    storage: &mut dyn Storage,
    settings: RetentionSettings,
    thresholds: &[ThresholdChange],
) -> Result<RetentionConfig, RetentionError> {
    settings.validate()?;
    let mut config = get_or_create_config(storage)?;
    config.settings = settings;
    let params: Vec<(&str, String)> = thresholds.iter().map(|t| (t.key(), t.value())).collect();
    storage.update_config_with_params(&config, &params)?;
    info!(id = config.id, thresholds = thresholds.len(), "retention config updated");
    Ok(config)
}

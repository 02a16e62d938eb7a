//! Free-standing thresholds kept in the parameter store.

use tracing::warn;

use crate::storage::{Storage, StorageError};

pub const SLOW_CRON_THRESHOLD_KEY: &str = "erp_health_monitor.slow_cron_threshold";
pub const SLOW_QUERY_THRESHOLD_KEY: &str = "erp_health_monitor.slow_query_threshold";

/// Seconds after which a cron execution counts as slow.
pub const DEFAULT_SLOW_CRON_THRESHOLD: f64 = 10.0;
/// Seconds after which an active query counts as slow.
pub const DEFAULT_SLOW_QUERY_THRESHOLD: f64 = 2.0;

#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("threshold must be a finite, non-negative number of seconds, got {0}")]
    InvalidThreshold(f64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reads a threshold, falling back to `default` when unset, unparseable,
/// negative or not finite.
fn read_threshold(storage: &mut dyn Storage, key: &str, default: f64) -> Result<f64, StorageError> {
    let Some(raw) = storage.get_param(key)? else {
        return Ok(default);
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => {
            warn!(key, value = %raw, default, "invalid threshold parameter, using default");
            Ok(default)
        }
    }
}

/// A validated threshold assignment, ready to be written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdChange {
    key: &'static str,
    seconds: f64,
}

impl ThresholdChange {
    fn new(key: &'static str, seconds: f64) -> Result<Self, ParamError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ParamError::InvalidThreshold(seconds));
        }
        Ok(Self { key, seconds })
    }

    pub fn slow_cron(seconds: f64) -> Result<Self, ParamError> {
        Self::new(SLOW_CRON_THRESHOLD_KEY, seconds)
    }

    pub fn slow_query(seconds: f64) -> Result<Self, ParamError> {
        Self::new(SLOW_QUERY_THRESHOLD_KEY, seconds)
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Stored text of the value.
    pub fn value(&self) -> String {
        self.seconds.to_string()
    }
}

pub fn slow_cron_threshold(storage: &mut dyn Storage) -> Result<f64, StorageError> {
    read_threshold(storage, SLOW_CRON_THRESHOLD_KEY, DEFAULT_SLOW_CRON_THRESHOLD)
}

pub fn slow_query_threshold(storage: &mut dyn Storage) -> Result<f64, StorageError> {
    read_threshold(storage, SLOW_QUERY_THRESHOLD_KEY, DEFAULT_SLOW_QUERY_THRESHOLD)
}

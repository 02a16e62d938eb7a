use chrono::{DateTime, Utc};
use serde::Serialize;

/// Server resource usage captured by the server metrics sampler.
///
/// Load averages are zero on platforms where they are unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMetricSample {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// CPU busy time over the sampling window, percent.
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub ram_used_gb: f64,
    pub ram_total_gb: f64,
    pub disk_percent: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
    pub load_average_1m: f64,
    pub load_average_5m: f64,
    pub load_average_15m: f64,
}

impl ServerMetricSample {
    /// An empty sample at the given time (no resource usage recorded).
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            timestamp,
            cpu_percent: 0.0,
            ram_percent: 0.0,
            ram_used_gb: 0.0,
            ram_total_gb: 0.0,
            disk_percent: 0.0,
            disk_used_gb: 0.0,
            disk_total_gb: 0.0,
            load_average_1m: 0.0,
            load_average_5m: 0.0,
            load_average_15m: 0.0,
        }
    }
}

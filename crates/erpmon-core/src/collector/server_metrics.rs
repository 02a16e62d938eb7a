//! Server metrics sampler: CPU, RAM, disk and load average.

use chrono::Utc;
use tracing::{debug, error};

use super::procfs::{SystemSource, Usage};
use super::{RefreshStats, SampleError, Sampler};
use crate::storage::{History, ServerMetricSample, Storage};

/// Number of samples kept by the offset trim.
pub const SERVER_METRICS_KEEP: usize = 1000;

pub struct ServerMetricsSampler<S: SystemSource> {
    source: S,
    keep: usize,
}

impl<S: SystemSource> ServerMetricsSampler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            keep: SERVER_METRICS_KEEP,
        }
    }

    /// Reads every resource; only CPU and memory failures are fatal.
    fn sample(&mut self) -> Result<ServerMetricSample, SampleError> {
        let cpu_percent = self
            .source
            .cpu_percent()
            .map_err(|e| SampleError::SourceUnavailable(format!("cpu: {}", e)))?;
        let memory = self
            .source
            .memory()
            .map_err(|e| SampleError::SourceUnavailable(format!("memory: {}", e)))?;

        let disk = self.source.disk().unwrap_or_else(|e| {
            error!(error = %e, "could not read disk usage, recording zeros");
            Usage::default()
        });

        let load = self.source.load_average().unwrap_or_else(|e| {
            debug!(error = %e, "load average not available");
            Default::default()
        });

        Ok(ServerMetricSample {
            cpu_percent,
            ram_percent: memory.percent,
            ram_used_gb: memory.used_gb(),
            ram_total_gb: memory.total_gb(),
            disk_percent: disk.percent,
            disk_used_gb: disk.used_gb(),
            disk_total_gb: disk.total_gb(),
            load_average_1m: load.one,
            load_average_5m: load.five,
            load_average_15m: load.fifteen,
            ..ServerMetricSample::empty(Utc::now())
        })
    }
}

impl<S: SystemSource> Sampler for ServerMetricsSampler<S> {
    fn name(&self) -> &'static str {
        "server-metrics"
    }

    fn collect(&mut self, storage: &mut dyn Storage) -> Result<RefreshStats, SampleError> {
        let sample = self.sample()?;
        debug!(
            cpu = sample.cpu_percent,
            ram = sample.ram_percent,
            disk = sample.disk_percent,
            "server metrics sampled"
        );

        let mut history = History::<ServerMetricSample>::new(storage);
        history.append(sample)?;
        let trimmed = history.trim_by_offset(self.keep)?;

        Ok(RefreshStats {
            fetched: 1,
            appended: 1,
            trimmed,
        })
    }
}

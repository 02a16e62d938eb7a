//! Host resource usage from `/proc` and `statvfs`.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::collector::procfs::parser::{CpuTimes, parse_cpu_times, parse_loadavg, parse_meminfo};
use crate::collector::traits::FileSystem;

/// Bytes per gigabyte (binary).
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Default window over which CPU usage is measured.
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Used and total bytes of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub used_bytes: u64,
    pub total_bytes: u64,
    /// Usage percentage as reported by the source.
    pub percent: f64,
}

impl Usage {
    pub fn used_gb(&self) -> f64 {
        self.used_bytes as f64 / BYTES_PER_GB
    }

    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_GB
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Source of host resource readings for the server metrics sampler.
pub trait SystemSource: Send {
    /// CPU busy percentage over the source's sampling window.
    fn cpu_percent(&mut self) -> Result<f64, CollectError>;
    fn memory(&mut self) -> Result<Usage, CollectError>;
    fn disk(&mut self) -> Result<Usage, CollectError>;
    fn load_average(&mut self) -> Result<LoadAverage, CollectError>;
}

/// Reads system-wide metrics from `/proc/` and the monitored mount point.
pub struct SystemCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
    disk_path: PathBuf,
    cpu_window: Duration,
    prev_cpu: Option<CpuTimes>,
}

impl<F: FileSystem> SystemCollector<F> {
    /// Creates a new system collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            disk_path: PathBuf::from("/"),
            cpu_window: DEFAULT_CPU_WINDOW,
            prev_cpu: None,
        }
    }

    /// Mount point whose usage is reported as disk usage.
    pub fn with_disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = path.into();
        self
    }

    /// Sets the CPU sampling window.
    ///
    /// With a zero window the collector compares against the previous
    /// reading instead of sleeping; the first reading then reports 0%.
    pub fn with_cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window;
        self
    }

    fn read_cpu_times(&self) -> Result<CpuTimes, CollectError> {
        let path = format!("{}/stat", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        parse_cpu_times(&content).map_err(|e| CollectError::Parse(e.message))
    }
}

impl<F: FileSystem> SystemSource for SystemCollector<F> {
    fn cpu_percent(&mut self) -> Result<f64, CollectError> {
        let start = match self.prev_cpu.take() {
            Some(prev) if self.cpu_window.is_zero() => prev,
            _ => {
                let start = self.read_cpu_times()?;
                if !self.cpu_window.is_zero() {
                    thread::sleep(self.cpu_window);
                }
                start
            }
        };
        let end = self.read_cpu_times()?;
        self.prev_cpu = Some(end);
        Ok(start.busy_percent_until(&end))
    }

    fn memory(&mut self) -> Result<Usage, CollectError> {
        let path = format!("{}/meminfo", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        let info = parse_meminfo(&content).map_err(|e| CollectError::Parse(e.message))?;

        let total_bytes = info.mem_total * 1024;
        let used_bytes = info.mem_total.saturating_sub(info.mem_available) * 1024;
        let percent = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };
        Ok(Usage {
            used_bytes,
            total_bytes,
            percent,
        })
    }

    fn disk(&mut self) -> Result<Usage, CollectError> {
        disk_usage(&self.disk_path)
    }

    fn load_average(&mut self) -> Result<LoadAverage, CollectError> {
        let path = format!("{}/loadavg", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        let info = parse_loadavg(&content).map_err(|e| CollectError::Parse(e.message))?;
        Ok(LoadAverage {
            one: info.load1,
            five: info.load5,
            fifteen: info.load15,
        })
    }
}

/// Disk usage of the filesystem containing `path`.
///
/// The percentage excludes blocks reserved for root, like `df`.
#[cfg(unix)]
pub fn disk_usage(path: &Path) -> Result<Usage, CollectError> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|e| CollectError::Io(e.into()))?;
    let fragment = stat.fragment_size() as u64;
    let total_bytes = stat.blocks() as u64 * fragment;
    let free_bytes = stat.blocks_free() as u64 * fragment;
    let avail_bytes = stat.blocks_available() as u64 * fragment;
    let used_bytes = total_bytes.saturating_sub(free_bytes);

    let usable = used_bytes + avail_bytes;
    let percent = if usable == 0 {
        0.0
    } else {
        used_bytes as f64 / usable as f64 * 100.0
    };
    Ok(Usage {
        used_bytes,
        total_bytes,
        percent,
    })
}

#[cfg(not(unix))]
pub fn disk_usage(_path: &Path) -> Result<Usage, CollectError> {
    Err(CollectError::Unsupported("statvfs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    fn collector() -> SystemCollector<MockFs> {
        SystemCollector::new(MockFs::typical_system(), "/proc").with_cpu_window(Duration::ZERO)
    }

    #[test]
    fn test_memory_uses_available() {
        let mut c = collector();
        let mem = c.memory().unwrap();
        // MemTotal 16384000 kB, MemAvailable 12000000 kB.
        assert_eq!(mem.total_bytes, 16_384_000 * 1024);
        assert_eq!(mem.used_bytes, 4_384_000 * 1024);
        assert!((mem.percent - 26.7578125).abs() < 1e-6);
        assert!((mem.total_gb() - 15.625).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_percent_between_readings() {
        let mut c = collector();
        assert_eq!(c.cpu_percent().unwrap(), 0.0);

        c.fs.add_file(
            "/proc/stat",
            "cpu  10300 500 3100 80100 1000 200 100 0 0 0\n",
        );
        // 400 busy ticks out of 500 elapsed.
        assert!((c.cpu_percent().unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_average() {
        let mut c = collector();
        let load = c.load_average().unwrap();
        assert!((load.one - 0.15).abs() < 1e-9);
        assert!((load.fifteen - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_missing_files_fail() {
        let mut c = SystemCollector::new(MockFs::new(), "/proc").with_cpu_window(Duration::ZERO);
        assert!(matches!(c.memory(), Err(CollectError::Io(_))));
        assert!(c.cpu_percent().is_err());
        assert!(c.load_average().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_usage_of_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let usage = disk_usage(dir.path()).unwrap();
        assert!(usage.total_bytes > 0);
        assert!(usage.used_bytes <= usage.total_bytes);
        assert!((0.0..=100.0).contains(&usage.percent));
    }

    #[test]
    fn test_disk_usage_missing_path() {
        assert!(disk_usage(Path::new("/nonexistent/erpmon/12345")).is_err());
    }
}

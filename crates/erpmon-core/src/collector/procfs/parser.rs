//! Parsers for `/proc` filesystem files.
//!
//! Pure functions over file contents, testable with string inputs.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Fields of `/proc/meminfo` used for RAM usage, in kB.
#[derive(Debug, Clone, Default)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
}

/// Parses `/proc/meminfo` content.
///
/// Kernels older than 3.14 lack `MemAvailable`; `MemFree` stands in for it.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut has_available = false;

    let parse_kb = |line: &str| -> u64 {
        line.split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            info.mem_total = parse_kb(line);
        } else if line.starts_with("MemFree:") {
            info.mem_free = parse_kb(line);
        } else if line.starts_with("MemAvailable:") {
            info.mem_available = parse_kb(line);
            has_available = true;
        }
    }

    if info.mem_total == 0 {
        return Err(ParseError::new("MemTotal missing"));
    }
    if !has_available {
        info.mem_available = info.mem_free;
    }

    Ok(info)
}

/// Aggregate CPU times from the `cpu` line of `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Idle time including I/O wait.
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Busy percentage between `self` and a later reading.
    ///
    /// Returns 0 when no ticks elapsed or the counters went backwards.
    pub fn busy_percent_until(&self, later: &CpuTimes) -> f64 {
        let total = later.total().saturating_sub(self.total());
        if total == 0 {
            return 0.0;
        }
        let idle = later.idle_total().saturating_sub(self.idle_total());
        let busy = total.saturating_sub(idle);
        (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
pub fn parse_cpu_times(content: &str) -> Result<CpuTimes, ParseError> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| ParseError::new("aggregate cpu line missing"))?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(ParseError::new("invalid cpu line"));
    }
    let get_val = |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

    Ok(CpuTimes {
        user: get_val(1),
        nice: get_val(2),
        system: get_val(3),
        idle: get_val(4),
        iowait: get_val(5),
        irq: get_val(6),
        softirq: get_val(7),
        steal: get_val(8),
    })
}

/// Parsed data from `/proc/loadavg`.
#[derive(Debug, Clone, Default)]
pub struct LoadAvg {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// Parses `/proc/loadavg` content.
pub fn parse_loadavg(content: &str) -> Result<LoadAvg, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(ParseError::new("invalid loadavg format"));
    }

    let load1 = parts[0]
        .parse()
        .map_err(|_| ParseError::new("invalid load1"))?;
    let load5 = parts[1]
        .parse()
        .map_err(|_| ParseError::new("invalid load5"))?;
    let load15 = parts[2]
        .parse()
        .map_err(|_| ParseError::new("invalid load15"))?;

    Ok(LoadAvg {
        load1,
        load5,
        load15,
    })
}

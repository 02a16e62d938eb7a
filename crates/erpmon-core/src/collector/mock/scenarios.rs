//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide `/proc` states for the host resources the server
//! metrics sampler reads.

use super::filesystem::MockFs;

impl MockFs {
    /// Creates an idle host: 16 GB of RAM with 12 GB available, low load.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/loadavg", "0.15 0.10 0.05 1/150 1234\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
ctxt 500000
btime 1700000000
",
        );

        fs
    }

    /// Creates a host with memory pressure (MemAvailable under 4%).
    pub fn memory_pressure() -> Self {
        let mut fs = Self::typical_system();

        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:          256000 kB
MemAvailable:     512000 kB
Buffers:           64000 kB
Cached:           256000 kB
SwapTotal:       4096000 kB
SwapFree:        1024000 kB
",
        );
        fs.add_file("/proc/loadavg", "4.50 3.20 2.10 8/200 5000\n");

        fs
    }

    /// Creates a host without `/proc/loadavg` (as in some sandboxes).
    pub fn without_loadavg() -> Self {
        let mut fs = Self::typical_system();
        fs.remove_file("/proc/loadavg");
        fs
    }
}

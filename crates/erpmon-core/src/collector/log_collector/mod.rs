//! Application log tail sampler.
//!
//! Unlike the other samplers this one does not accumulate history: each
//! refresh replaces the stored log lines with the freshly parsed tail of
//! the log file.

mod parser;
mod tailer;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{RefreshStats, SampleError, Sampler};
use crate::storage::{History, LogLine, Storage};

pub use parser::parse_log_line;
pub use tailer::read_last_lines;

/// Lines read from the end of the log per refresh.
pub const DEFAULT_TAIL_LINES: usize = 500;

/// Locations probed when no log file is configured.
pub const DEFAULT_LOG_CANDIDATES: [&str; 2] =
    ["/var/log/odoo/odoo.log", "/var/log/odoo/odoo-server.log"];

pub struct LogTailSampler {
    /// Explicitly configured log file, probed first.
    path: Option<PathBuf>,
    candidates: Vec<PathBuf>,
    lines: usize,
}

impl LogTailSampler {
    /// Creates a sampler probing the default locations.
    pub fn new() -> Self {
        Self {
            path: None,
            candidates: DEFAULT_LOG_CANDIDATES.iter().map(PathBuf::from).collect(),
            lines: DEFAULT_TAIL_LINES,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_lines(mut self, lines: usize) -> Self {
        self.lines = lines;
        self
    }

    /// First existing file among the configured path and the candidates.
    pub fn resolve_path(&self) -> Option<&Path> {
        self.path
            .iter()
            .chain(self.candidates.iter())
            .map(PathBuf::as_path)
            .find(|p| p.is_file())
    }
}

impl Default for LogTailSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for LogTailSampler {
    fn name(&self) -> &'static str {
        "log-tail"
    }

    fn collect(&mut self, storage: &mut dyn Storage) -> Result<RefreshStats, SampleError> {
        let Some(path) = self.resolve_path() else {
            let probed = self
                .path
                .iter()
                .chain(self.candidates.iter())
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            warn!(probed = %probed, "log file not found");
            return Err(SampleError::SourceUnavailable(format!(
                "log file not found (probed: {})",
                probed
            )));
        };

        let raw = read_last_lines(path, self.lines).map_err(|e| {
            SampleError::SourceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let fetched = raw.len();
        let parsed: Vec<LogLine> = raw.iter().filter_map(|l| parse_log_line(l)).collect();
        debug!(
            path = %path.display(),
            lines = fetched,
            parsed = parsed.len(),
            "log tail read"
        );

        let appended = History::<LogLine>::new(storage).replace_all(parsed)? as usize;

        Ok(RefreshStats {
            fetched,
            appended,
            trimmed: 0,
        })
    }
}

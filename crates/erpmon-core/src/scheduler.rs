//! Fixed-interval job schedule used by the daemon loop.
//!
//! Jobs are due immediately after being added, then every `interval`.
//! A job that falls behind (the loop was blocked longer than its interval)
//! runs once and is rescheduled from the current time; missed runs are not
//! replayed.

use std::time::{Duration, Instant};

use tracing::warn;

/// Shortest interval accepted by [`Schedule::add`].
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ScheduledJob<K> {
    pub key: K,
    pub interval: Duration,
    pub next_run: Instant,
}

#[derive(Debug, Clone)]
pub struct Schedule<K> {
    jobs: Vec<ScheduledJob<K>>,
}

impl<K> Default for Schedule<K> {
    fn default() -> Self {
        Self { jobs: Vec::new() }
    }
}

impl<K: Copy> Schedule<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job first due at `start`. Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn add(&mut self, key: K, interval: Duration, start: Instant) {
        let interval = if interval < MIN_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "job interval too short, using minimum"
            );
            MIN_INTERVAL
        } else {
            interval
        };
        self.jobs.push(ScheduledJob {
            key,
            interval,
            next_run: start,
        });
    }

    pub fn jobs(&self) -> &[ScheduledJob<K>] {
        &self.jobs
    }

    /// Returns the jobs due at `now` in insertion order and reschedules them.
    pub fn due(&mut self, now: Instant) -> Vec<K> {
        let mut due = Vec::new();
        for job in &mut self.jobs {
            if job.next_run > now {
                continue;
            }
            due.push(job.key);
            let next = job.next_run + job.interval;
            job.next_run = if next <= now { now + job.interval } else { next };
        }
        due
    }

    /// Earliest upcoming run, `None` for an empty schedule.
    pub fn next_due(&self) -> Option<Instant> {
        self.jobs.iter().map(|j| j.next_run).min()
    }
}

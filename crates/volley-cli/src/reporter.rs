//! A console statistics collector: the simplest possible implementation of
//! the "statistics collector" side of the event contract in §6. Counts
//! events and logs them at the granularity `SPEC_FULL.md`'s ambient-stack
//! section sets for this crate (`trace` for per-session detail, `warn` for
//! recoverable anomalies like saturation).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{info, trace, warn};
use volley_common::SessionError;
use volley_scheduler::{BenchmarkObserver, PhaseStatus};

#[derive(Default)]
pub struct ConsoleReporter {
    started: AtomicU64,
    finished: AtomicU64,
    failed: AtomicU64,
    blocked: AtomicU64,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> String {
        format!(
            "started={} finished={} failed={} blocked={}",
            self.started.load(Ordering::Relaxed),
            self.finished.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.blocked.load(Ordering::Relaxed),
        )
    }
}

impl BenchmarkObserver for ConsoleReporter {
    fn session_start(&self, phase: &str) {
        self.started.fetch_add(1, Ordering::Relaxed);
        trace!(phase, "session started");
    }

    fn session_finish(&self, phase: &str) {
        self.finished.fetch_add(1, Ordering::Relaxed);
        trace!(phase, "session finished");
    }

    fn session_fail(&self, phase: &str, err: &SessionError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        warn!(phase, %err, "session failed");
    }

    fn session_blocked(&self, phase: &str) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
        warn!(phase, "session blocked: pool saturated");
    }

    fn phase_status_change(&self, phase: &str, from: PhaseStatus, to: PhaseStatus, _at: Instant) {
        info!(phase, %from, %to, "phase status change");
    }
}

//! The scheduler's status-change condition variable (§4.4, §4.5, §5): "the
//! only operations that take the phase's lock... signal the scheduler's
//! condition variable." Every phase instance and executor thread shares one
//! of these per benchmark run.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct SchedulerSignal {
    gate: Mutex<()>,
    condvar: Condvar,
}

impl SchedulerSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wake the scheduler thread. Called after any status transition or
    /// `activeSessions` sentinel swap.
    pub fn notify(&self) {
        let _guard = self.gate.lock().unwrap();
        self.condvar.notify_all();
    }

    /// Block until `notify` is called or `deadline` passes, whichever is
    /// first. `None` deadline waits indefinitely (used when no phase has a
    /// pending deadline at all, e.g. an all-`NOT_STARTED` benchmark with no
    /// `startTime`s).
    pub fn wait_until(&self, deadline: Option<Instant>) {
        let guard = self.gate.lock().unwrap();
        match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if deadline > now {
                    let _ = self
                        .condvar
                        .wait_timeout(guard, deadline - now)
                        .unwrap();
                }
            }
            None => {
                // Still bounded: a scheduler that oversleeps because every
                // phase is NOT_STARTED with no startTime would otherwise
                // never notice newly-satisfied dependencies signalled from
                // another thread without a spurious wake; fall back to a
                // coarse poll interval.
                let _ = self
                    .condvar
                    .wait_timeout(guard, Duration::from_millis(50))
                    .unwrap();
            }
        }
    }
}

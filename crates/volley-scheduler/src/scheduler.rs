//! The phase scheduler (Component E, §4.4): the global coordinator that
//! starts, finishes, and terminates every phase instance in one benchmark
//! according to its dependency graph and deadlines.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use volley_common::{Benchmark, SessionError};
use volley_executor::VariableSchema;

use crate::observer::{BenchmarkObserver, NullObserver};
use crate::phase_instance::PhaseInstance;
use crate::signal::SchedulerSignal;
use crate::slot::ExecutorSlot;
use crate::status::PhaseStatus;

/// The terminal result of one `PhaseScheduler::run()` (§4.4: "If any phase
/// has a recorded error, the benchmark result is FAILED; otherwise
/// COMPLETED").
#[derive(Debug)]
pub enum BenchmarkOutcome {
    Completed,
    Failed(Vec<(String, SessionError)>),
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

/// Owns every phase instance in one benchmark run, plus the executor slots
/// (§5) phases are assigned to. Runs on its own thread in a real deployment
/// (§5); `tick` is exposed separately from `run` so tests can drive the
/// state machine with controlled timestamps instead of real wall-clock
/// sleeps.
pub struct PhaseScheduler {
    phases: Vec<PhaseInstance>,
    by_name: HashMap<String, usize>,
    slots: Vec<ExecutorSlot>,
    slot_of: Vec<usize>,
    signal: Arc<SchedulerSignal>,
    benchmark_start: Option<Instant>,
    shutting_down: std::sync::atomic::AtomicBool,
}

impl PhaseScheduler {
    /// Build a scheduler for `benchmark`, spreading its phases round-robin
    /// across `executor_count` executor slots (SPEC_FULL's multi-executor
    /// single-process mode; a real distributed run assigns phases to agents
    /// first and builds one `PhaseScheduler` per agent over its share),
    /// reporting every observable event (§6) to `observer`.
    pub fn new(
        benchmark: &Benchmark,
        executor_count: usize,
        observer: Arc<dyn BenchmarkObserver>,
    ) -> Self {
        let executor_count = executor_count.max(1);
        let signal = SchedulerSignal::new();
        let mut phases = Vec::with_capacity(benchmark.phases().len());
        let mut by_name = HashMap::with_capacity(benchmark.phases().len());
        let mut slot_of = Vec::with_capacity(benchmark.phases().len());

        for (idx, def) in benchmark.phases().iter().enumerate() {
            by_name.insert(def.name.clone(), idx);
            slot_of.push(idx % executor_count);
            let schema = Arc::new(VariableSchema::new(&def.scenario.variables));
            phases.push(PhaseInstance::new(
                def.clone(),
                schema,
                signal.clone(),
                observer.clone(),
            ));
        }

        let slots = (0..executor_count).map(|_| ExecutorSlot::new()).collect();

        Self {
            phases,
            by_name,
            slots,
            slot_of,
            signal,
            benchmark_start: None,
            shutting_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Convenience constructor for callers (tests, property checks) that
    /// don't care about statistics events.
    pub fn new_unobserved(benchmark: &Benchmark, executor_count: usize) -> Self {
        Self::new(benchmark, executor_count, Arc::new(NullObserver))
    }

    /// Request a graceful shutdown: no further `NOT_STARTED` phase is
    /// allowed to start, and every `RUNNING`/`FINISHED` phase is asked to
    /// `terminate()` (§4.3 "Design notes": mirrors the teacher's drain-then-
    /// force `Ctrl-C` handling). Idempotent.
    pub fn request_shutdown(&mut self) {
        self.shutting_down.store(true, std::sync::atomic::Ordering::SeqCst);
        for phase in &self.phases {
            phase.terminate();
        }
        self.signal.notify();
    }

    pub fn phase_status(&self, name: &str) -> Option<PhaseStatus> {
        self.by_name.get(name).map(|&i| self.phases[i].status())
    }

    pub fn all_terminated(&self) -> bool {
        self.phases.iter().all(|p| p.status() == PhaseStatus::Terminated)
    }

    fn status_of(&self, name: &str) -> Option<PhaseStatus> {
        self.by_name.get(name).map(|&i| self.phases[i].status())
    }

    /// One pass of §4.4's four-step contract. Returns the nearest upcoming
    /// deadline across all phases, for the caller to sleep until.
    pub fn tick(&mut self, now: Instant) -> Option<Instant> {
        let benchmark_start = *self.benchmark_start.get_or_insert(now);
        let mut next_deadline = None;

        // Step 1: NOT_STARTED -> RUNNING for every ready phase. Suppressed
        // entirely once a shutdown has been requested.
        let shutting_down = self.shutting_down.load(std::sync::atomic::Ordering::SeqCst);
        for idx in 0..self.phases.len() {
            if self.phases[idx].status() == PhaseStatus::NotStarted {
                let ready = !shutting_down
                    && self.phases[idx].ready_to_start(|name| self.status_of(name), benchmark_start, now);
                if ready {
                    let slot_idx = self.slot_of[idx];
                    self.phases[idx].start(&mut self.slots[slot_idx], idx, now);
                }
            } else if let Some(start_time) = self.phases[idx].def.start_time {
                next_deadline = earliest(next_deadline, Some(benchmark_start + start_time));
            }
        }

        // Step 2: RUNNING -> FINISHED (duration elapsed or arrival done) or
        // RUNNING -> TERMINATING (maxDuration exceeded); arrival ticks for
        // phases still running afterward.
        for idx in 0..self.phases.len() {
            if self.phases[idx].status() != PhaseStatus::Running {
                continue;
            }
            let start = self.phases[idx]
                .absolute_start_time()
                .expect("RUNNING phase always has a start time");
            let finish_at = start + self.phases[idx].def.duration;

            if now >= finish_at || self.phases[idx].arrival_completed_naturally() {
                self.phases[idx].finish();
            } else if let Some(max_duration) = self.phases[idx].def.max_duration {
                if now >= start + max_duration {
                    self.phases[idx].terminate();
                }
            }

            if self.phases[idx].status() == PhaseStatus::Running {
                next_deadline = earliest(next_deadline, Some(finish_at));
                let slot_idx = self.slot_of[idx];
                let arrival_deadline = self.phases[idx].arrival_tick(&mut self.slots[slot_idx], idx, now);
                next_deadline = earliest(next_deadline, arrival_deadline);
            }
        }

        // Step 3: FINISHED -> TERMINATING once terminateAfterStrict clears.
        for idx in 0..self.phases.len() {
            if self.phases[idx].status() == PhaseStatus::Finished
                && self.phases[idx].ready_to_terminate(|name| self.status_of(name))
            {
                self.phases[idx].terminate();
            }
        }

        // Drain session lifecycle events from every executor slot back to
        // their owning phase instances.
        for slot_idx in 0..self.slots.len() {
            let events = self.slots[slot_idx].tick(now);
            for (phase_idx, event) in events {
                if phase_idx != usize::MAX {
                    self.phases[phase_idx].handle_session_event(&mut self.slots[slot_idx], phase_idx, event);
                }
            }
        }

        next_deadline
    }

    /// Run to completion, sleeping on the status-change condition variable
    /// between ticks (§4.4 step 4).
    pub fn run(&mut self) -> BenchmarkOutcome {
        loop {
            let now = Instant::now();
            let next_deadline = self.tick(now);
            if self.all_terminated() {
                break;
            }
            self.signal.wait_until(next_deadline);
        }
        self.outcome()
    }

    pub fn outcome(&self) -> BenchmarkOutcome {
        let errors: Vec<(String, SessionError)> = self
            .phases
            .iter()
            .filter_map(|p| p.error().map(|e| (p.name().to_string(), e)))
            .collect();
        if errors.is_empty() {
            BenchmarkOutcome::Completed
        } else {
            BenchmarkOutcome::Failed(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::time::Duration;
    use volley_common::{ArrivalSpec, PhaseDef, Scenario, Sequence, SessionContext, Step, StepAction};

    struct AdvanceStep;
    impl Step for AdvanceStep {
        fn name(&self) -> &str {
            "advance"
        }
        fn invoke(&self, _s: &mut dyn SessionContext) -> StepAction {
            StepAction::Advance
        }
    }

    fn scenario() -> StdArc<Scenario> {
        StdArc::new(Scenario {
            initial_sequences: vec![Sequence::new("main", vec![StdArc::new(AdvanceStep)])],
            template_sequences: vec![],
            variables: vec![],
        })
    }

    fn at_once_phase(name: &str, users: u32, start_after: Vec<&str>) -> PhaseDef {
        PhaseDef {
            name: name.to_string(),
            scenario: scenario(),
            start_time: None,
            start_after: start_after.into_iter().map(String::from).collect(),
            start_after_strict: vec![],
            terminate_after_strict: vec![],
            duration: Duration::from_millis(10),
            max_duration: None,
            arrival: ArrivalSpec::AtOnce { users },
        }
    }

    fn drive_to_completion(scheduler: &mut PhaseScheduler, start: Instant) {
        let mut now = start;
        for _ in 0..10_000 {
            scheduler.tick(now);
            if scheduler.all_terminated() {
                return;
            }
            now += Duration::from_millis(1);
        }
        panic!("benchmark did not terminate within the simulated window");
    }

    #[test]
    fn at_once_zero_users_reaches_terminated_without_any_sessions() {
        let benchmark =
            Benchmark::build("bm", vec![], vec![at_once_phase("only", 0, vec![])]).unwrap();
        let mut scheduler = PhaseScheduler::new_unobserved(&benchmark, 1);
        drive_to_completion(&mut scheduler, Instant::now());
        assert!(matches!(scheduler.outcome(), BenchmarkOutcome::Completed));
    }

    #[test]
    fn dependent_phase_starts_after_its_dependency_finishes() {
        let benchmark = Benchmark::build(
            "bm",
            vec![],
            vec![at_once_phase("a", 1, vec![]), at_once_phase("b", 1, vec!["a"])],
        )
        .unwrap();
        let mut scheduler = PhaseScheduler::new_unobserved(&benchmark, 1);
        let start = Instant::now();
        drive_to_completion(&mut scheduler, start);

        assert!(matches!(scheduler.outcome(), BenchmarkOutcome::Completed));
        assert_eq!(scheduler.phase_status("a"), Some(PhaseStatus::Terminated));
        assert_eq!(scheduler.phase_status("b"), Some(PhaseStatus::Terminated));
    }

    #[test]
    fn sessions_started_equals_users_for_a_simple_at_once_scenario() {
        let benchmark =
            Benchmark::build("bm", vec![], vec![at_once_phase("only", 5, vec![])]).unwrap();
        let mut scheduler = PhaseScheduler::new_unobserved(&benchmark, 1);
        let start = Instant::now();
        scheduler.tick(start);
        assert_eq!(scheduler.phases[0].active_sessions(), 5);
        drive_to_completion(&mut scheduler, start);
        assert!(matches!(scheduler.outcome(), BenchmarkOutcome::Completed));
    }
}

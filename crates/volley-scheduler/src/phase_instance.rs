//! Phase instance (Component D, §3, §4.3, §4.5): a phase definition plus
//! its mutable runtime state — status, the `activeSessions` sentinel
//! counter, arrival-process local state, and the error slot `fail()` writes
//! to.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use volley_common::{PhaseDef, SessionError};
use volley_executor::{SessionEvent, VariableSchema};

use crate::arrival::{
    constant_per_sec_next_deadline_ms, constant_per_sec_required, ramp_next_deadline_ms,
    ramp_required,
};
use crate::observer::BenchmarkObserver;
use crate::signal::SchedulerSignal;
use crate::slot::ExecutorSlot;
use crate::status::PhaseStatus;

/// `activeSessions` uses a sentinel (§4.5): once a phase starts finishing,
/// if the counter reads 0 it is swapped to `MIN` to publish "no further
/// starts" to the arrival loop. Racing starters that increment from `MIN`
/// see a still-negative value and know to abort without dispatching.
const NO_MORE_STARTS: i64 = i64::MIN / 2;

fn is_closed(active: i64) -> bool {
    active <= NO_MORE_STARTS
}

/// Per-arrival-kind mutable state (§4.3). Kept separate from `ArrivalSpec`
/// (which is immutable benchmark-definition data) so the same `PhaseDef`
/// can, in principle, be instantiated more than once.
enum ArrivalRuntime {
    AtOnce {
        users: u32,
        dispatched: bool,
    },
    Always {
        users: u32,
    },
    ConstantPerSec {
        users_per_sec: f64,
        started_users: u64,
    },
    RampPerSec {
        initial_users_per_sec: f64,
        target_users_per_sec: f64,
        duration_ms: f64,
        started_users: u64,
    },
    Sequentially {
        repeats: u32,
        completed: u32,
        dispatched: bool,
    },
}

impl ArrivalRuntime {
    fn from_spec(spec: &volley_common::ArrivalSpec, duration: Duration) -> Self {
        match *spec {
            volley_common::ArrivalSpec::AtOnce { users } => ArrivalRuntime::AtOnce {
                users,
                dispatched: false,
            },
            volley_common::ArrivalSpec::Always { users } => ArrivalRuntime::Always { users },
            volley_common::ArrivalSpec::ConstantPerSec { users_per_sec, .. } => {
                ArrivalRuntime::ConstantPerSec {
                    users_per_sec,
                    started_users: 0,
                }
            }
            volley_common::ArrivalSpec::RampPerSec {
                initial_users_per_sec,
                target_users_per_sec,
                ..
            } => ArrivalRuntime::RampPerSec {
                initial_users_per_sec,
                target_users_per_sec,
                duration_ms: duration.as_millis() as f64,
                started_users: 0,
            },
            volley_common::ArrivalSpec::Sequentially { repeats } => ArrivalRuntime::Sequentially {
                repeats,
                completed: 0,
                dispatched: false,
            },
        }
    }
}

/// One running copy of a `PhaseDef` (§3, §4.5).
pub struct PhaseInstance {
    pub def: Arc<PhaseDef>,
    pub schema: Arc<VariableSchema>,
    status: Mutex<PhaseStatus>,
    /// Negative once finishing has started publishing "no more starts"
    /// (§4.5). Positive values are the live count.
    active_sessions: AtomicI64,
    /// Saturation events attributable to this phase specifically (§8 E2E
    /// scenario 4: "saturation events are emitted on the phase whose VU was
    /// blocked"), kept alongside the shared observer's global tally.
    saturation_count: AtomicI64,
    absolute_start_time: Mutex<Option<Instant>>,
    error: Mutex<Option<SessionError>>,
    arrival: Mutex<ArrivalRuntime>,
    signal: Arc<SchedulerSignal>,
    observer: Arc<dyn BenchmarkObserver>,
}

impl PhaseInstance {
    pub fn new(
        def: Arc<PhaseDef>,
        schema: Arc<VariableSchema>,
        signal: Arc<SchedulerSignal>,
        observer: Arc<dyn BenchmarkObserver>,
    ) -> Self {
        let arrival = ArrivalRuntime::from_spec(&def.arrival, def.duration);
        Self {
            def,
            schema,
            status: Mutex::new(PhaseStatus::NotStarted),
            active_sessions: AtomicI64::new(0),
            saturation_count: AtomicI64::new(0),
            absolute_start_time: Mutex::new(None),
            error: Mutex::new(None),
            arrival: Mutex::new(arrival),
            signal,
            observer,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn status(&self) -> PhaseStatus {
        *self.status.lock().unwrap()
    }

    pub fn active_sessions(&self) -> i64 {
        let v = self.active_sessions.load(Ordering::SeqCst);
        if is_closed(v) {
            0
        } else {
            v
        }
    }

    pub fn absolute_start_time(&self) -> Option<Instant> {
        *self.absolute_start_time.lock().unwrap()
    }

    /// Count of saturation events (pool exhaustion) attributed to this
    /// phase over its whole run.
    pub fn saturation_count(&self) -> i64 {
        self.saturation_count.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<SessionError> {
        self.error.lock().unwrap().clone()
    }

    fn transition(&self, next: PhaseStatus) -> bool {
        let mut status = self.status.lock().unwrap();
        if !status.can_transition_to(next) {
            return false;
        }
        let from = *status;
        tracing::debug!(phase = %self.def.name, from = %from, to = %next, "phase status transition");
        *status = next;
        drop(status);
        self.observer.phase_status_change(&self.def.name, from, next, Instant::now());
        self.signal.notify();
        true
    }

    /// §4.4 step 1: dispatch `start()` once the scheduler has decided this
    /// phase is ready. Reserves the pool capacity and dispatches the initial
    /// wave of sessions for closed models / the single session for
    /// `Sequentially`. Open models dispatch nothing until their first
    /// `arrival_tick`.
    pub fn start(&self, slot: &mut ExecutorSlot, phase_idx: usize, now: Instant) {
        if !self.transition(PhaseStatus::Running) {
            return;
        }
        *self.absolute_start_time.lock().unwrap() = Some(now);
        slot.reserve(self.def.arrival.max_concurrent_sessions() as usize);

        let mut arrival = self.arrival.lock().unwrap();
        match &mut *arrival {
            ArrivalRuntime::AtOnce { users, dispatched } => {
                self.active_sessions.store(*users as i64, Ordering::SeqCst);
                for _ in 0..*users {
                    self.dispatch_one(slot, phase_idx);
                }
                *dispatched = true;
            }
            ArrivalRuntime::Always { users } => {
                self.active_sessions.store(*users as i64, Ordering::SeqCst);
                for _ in 0..*users {
                    self.dispatch_one(slot, phase_idx);
                }
            }
            ArrivalRuntime::Sequentially { dispatched, .. } => {
                self.active_sessions.store(1, Ordering::SeqCst);
                self.dispatch_one(slot, phase_idx);
                *dispatched = true;
            }
            ArrivalRuntime::ConstantPerSec { .. } | ArrivalRuntime::RampPerSec { .. } => {
                // First arrival_tick (called immediately after start by the
                // scheduler) performs the initial dispatch.
            }
        }
    }

    /// Attempt to start one session for this phase. Returns whether the
    /// pool actually had room: closed models (`AtOnce`, `Always`,
    /// `Sequentially`) reserve exactly enough capacity up front and can
    /// never see `false` here ("closed models cannot saturate by
    /// construction", §4.1); open models must check it (§4.3.3, §4.3.4).
    fn dispatch_one(&self, slot: &mut ExecutorSlot, phase_idx: usize) -> bool {
        if slot
            .start_session(phase_idx, self.def.scenario.clone(), self.schema.clone())
            .is_none()
        {
            tracing::debug!(phase = %self.def.name, "saturation: pool exhausted");
            self.saturation_count.fetch_add(1, Ordering::SeqCst);
            self.observer.session_blocked(&self.def.name);
            false
        } else {
            self.observer.session_start(&self.def.name);
            true
        }
    }

    /// Open-loop arrival processes self-schedule (§4.3): this is one firing
    /// of that self-scheduled callback. Returns the next deadline at which
    /// it should fire again, or `None` if this arrival kind has no recurring
    /// tick (closed models).
    pub fn arrival_tick(&self, slot: &mut ExecutorSlot, phase_idx: usize, now: Instant) -> Option<Instant> {
        if self.status() != PhaseStatus::Running {
            return None;
        }
        let start = self.absolute_start_time()?;
        let delta_ms = now.saturating_duration_since(start).as_millis() as u64;

        let mut arrival = self.arrival.lock().unwrap();
        match &mut *arrival {
            ArrivalRuntime::ConstantPerSec {
                users_per_sec,
                started_users,
            } => {
                let required = constant_per_sec_required(delta_ms, *users_per_sec);
                for _ in *started_users..required {
                    if is_closed(self.active_sessions.load(Ordering::SeqCst)) {
                        // Phase started finishing concurrently with this
                        // arrival tick; abort without dispatching (§4.5).
                        break;
                    }
                    // A saturated attempt (pool exhausted) is counted as a
                    // statistics event, not as an active session: the spec
                    // text increments `activeSessions` unconditionally
                    // before the acquire attempt, but a session that never
                    // started also never calls `notifyFinished`, which
                    // would otherwise leave the phase unable to reach zero
                    // active sessions and terminate.
                    if self.dispatch_one(slot, phase_idx) {
                        self.active_sessions.fetch_add(1, Ordering::SeqCst);
                    }
                }
                *started_users = (*started_users).max(required);
                let next_ms = constant_per_sec_next_deadline_ms(*started_users, *users_per_sec);
                if next_ms == u64::MAX {
                    None
                } else {
                    Some(start + Duration::from_millis(next_ms))
                }
            }
            ArrivalRuntime::RampPerSec {
                initial_users_per_sec,
                target_users_per_sec,
                duration_ms,
                started_users,
            } => {
                let required = ramp_required(
                    delta_ms,
                    *initial_users_per_sec,
                    *target_users_per_sec,
                    *duration_ms,
                );
                for _ in *started_users..required {
                    if is_closed(self.active_sessions.load(Ordering::SeqCst)) {
                        break;
                    }
                    if self.dispatch_one(slot, phase_idx) {
                        self.active_sessions.fetch_add(1, Ordering::SeqCst);
                    }
                }
                *started_users = (*started_users).max(required);
                let next_ms = ramp_next_deadline_ms(
                    *started_users,
                    *initial_users_per_sec,
                    *target_users_per_sec,
                    *duration_ms,
                );
                if next_ms == u64::MAX {
                    None
                } else {
                    Some(start + Duration::from_millis(next_ms))
                }
            }
            _ => None,
        }
    }

    /// A session bound to this phase reached a terminal outcome this tick.
    /// Dispatch per arrival kind (§4.3.1-§4.3.5), then check whether the
    /// phase as a whole is done.
    pub fn handle_session_event(&self, slot: &mut ExecutorSlot, phase_idx: usize, event: SessionEvent) {
        match &event {
            SessionEvent::Failed(_, err) => {
                self.fail(err.clone());
                self.observer.session_fail(&self.def.name, err);
            }
            SessionEvent::Finished(_) => self.observer.session_finish(&self.def.name),
            SessionEvent::Terminated(_) => {}
        }

        let status = self.status();
        let mut arrival = self.arrival.lock().unwrap();
        match &mut *arrival {
            ArrivalRuntime::AtOnce { .. } => {
                self.active_sessions.fetch_sub(1, Ordering::SeqCst);
            }
            ArrivalRuntime::Always { .. } => {
                if status == PhaseStatus::Running {
                    // "do not release... immediately re-drive" (§4.3.2): the
                    // executor already released the slot on this terminal
                    // event, so we simply re-acquire and restart in its
                    // place — observably identical since sessions are
                    // interchangeable within one phase.
                    self.dispatch_one(slot, phase_idx);
                } else {
                    self.active_sessions.fetch_sub(1, Ordering::SeqCst);
                }
            }
            ArrivalRuntime::ConstantPerSec { .. } | ArrivalRuntime::RampPerSec { .. } => {
                self.active_sessions.fetch_sub(1, Ordering::SeqCst);
            }
            ArrivalRuntime::Sequentially {
                repeats,
                completed,
                ..
            } => {
                *completed += 1;
                if *completed < *repeats && status == PhaseStatus::Running {
                    self.dispatch_one(slot, phase_idx);
                } else {
                    self.active_sessions.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        drop(arrival);
        self.signal.notify();
    }

    /// Whether this phase's arrival process has naturally run its course
    /// (§4.3.1, §4.3.5): `AtOnce` once every burst session has finished,
    /// `Sequentially` once its repeat count is exhausted. Open and `Always`
    /// models never finish on their own; only `duration` elapsing (§4.4)
    /// or an explicit `terminate()` ends them.
    pub fn arrival_completed_naturally(&self) -> bool {
        let arrival = self.arrival.lock().unwrap();
        match &*arrival {
            ArrivalRuntime::AtOnce { dispatched, .. } => {
                *dispatched && self.active_sessions() == 0
            }
            ArrivalRuntime::Sequentially {
                repeats, completed, ..
            } => *completed >= *repeats,
            _ => false,
        }
    }

    /// §4.4 step 2 / §4.5: `RUNNING -> FINISHED`.
    pub fn finish(&self) {
        if self.transition(PhaseStatus::Finished) {
            self.publish_no_more_starts();
            self.maybe_terminate_on_zero();
        }
    }

    /// §4.4 step 2-3 / §4.5: `RUNNING|FINISHED -> TERMINATING`. Idempotent
    /// per §8 — calling it N times on an already-terminating-or-terminated
    /// phase is a no-op past the first successful transition.
    pub fn terminate(&self) {
        let status = self.status();
        if status == PhaseStatus::Running {
            if self.transition(PhaseStatus::Terminating) {
                self.publish_no_more_starts();
                self.maybe_terminate_on_zero();
            }
        } else if status == PhaseStatus::Finished && self.transition(PhaseStatus::Terminating) {
            self.maybe_terminate_on_zero();
        }
    }

    fn publish_no_more_starts(&self) {
        let _ = self
            .active_sessions
            .compare_exchange(0, NO_MORE_STARTS, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Called after every decrement; transitions to TERMINATED once the
    /// active count reaches zero while in a finishing state (§4.5).
    pub fn maybe_terminate_on_zero(&self) {
        let status = self.status();
        if !status.is_finishing() {
            return;
        }
        let active = self.active_sessions.load(Ordering::SeqCst);
        if active == 0 {
            self.publish_no_more_starts();
            self.transition(PhaseStatus::Terminated);
        } else if is_closed(active) {
            self.transition(PhaseStatus::Terminated);
        }
    }

    pub fn fail(&self, err: SessionError) {
        let mut slot = self.error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Dependency-ready predicate for `startAfter`/`startAfterStrict`/
    /// `startTime` (§4.4 step 1).
    pub fn ready_to_start(&self, resolve: impl Fn(&str) -> Option<PhaseStatus>, benchmark_start: Instant, now: Instant) -> bool {
        if self.status() != PhaseStatus::NotStarted {
            return false;
        }
        if let Some(start_time) = self.def.start_time {
            if now < benchmark_start + start_time {
                return false;
            }
        }
        for dep in &self.def.start_after {
            match resolve(dep) {
                Some(s) if s == PhaseStatus::Finished || s == PhaseStatus::Terminating || s == PhaseStatus::Terminated => {}
                _ => return false,
            }
        }
        for dep in &self.def.start_after_strict {
            match resolve(dep) {
                Some(PhaseStatus::Terminated) => {}
                _ => return false,
            }
        }
        true
    }

    /// Whether a FINISHED phase's `terminateAfterStrict` set is satisfied
    /// (§4.4 step 3).
    pub fn ready_to_terminate(&self, resolve: impl Fn(&str) -> Option<PhaseStatus>) -> bool {
        if self.def.terminate_after_strict.is_empty() {
            return false;
        }
        self.def
            .terminate_after_strict
            .iter()
            .all(|dep| matches!(resolve(dep), Some(PhaseStatus::Terminated)))
    }
}

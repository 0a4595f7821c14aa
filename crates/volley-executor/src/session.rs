//! The session runtime (§3, §4.2, §4.6): one virtual user's execution
//! context — its variable table, its concurrently-running sequence cursors,
//! and the scheduled wake-ups those cursors are waiting on.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use volley_common::{Scenario, Sequence, SequenceStep, SessionContext, Value};

use crate::thread_data::ThreadData;
use crate::vars::{VariableSchema, VariableTable};

/// Most scenarios run one sequence per session, occasionally two (a main
/// sequence plus one spawned background sequence); inlining up to that many
/// cursors avoids a heap allocation for the common case.
type CursorList = SmallVec<[SequenceCursor; 2]>;

/// Index into a [`crate::pool::SessionPool`]'s backing storage. Stable for
/// the lifetime of one acquisition; reused once the session is released.
pub type SessionId = usize;

/// One concurrently-running instance of a sequence within a session. A
/// session may have several of these live at once (§3: "a session can run
/// more than one sequence concurrently").
#[derive(Clone)]
pub struct SequenceCursor {
    pub sequence: Sequence,
    pub pc: usize,
    pub parked: bool,
    pub wake_at: Option<Instant>,
    pub done: bool,
}

impl SequenceCursor {
    fn new(sequence: Sequence) -> Self {
        Self {
            sequence,
            pc: 0,
            parked: false,
            wake_at: None,
            done: false,
        }
    }

    fn current_step(&self) -> Option<&SequenceStep> {
        self.sequence.steps.get(self.pc)
    }
}

/// A pooled virtual-user execution context. Reused across acquisitions;
/// `reset` must leave it indistinguishable from a freshly-reserved session.
pub struct Session {
    id: SessionId,
    thread_data: Rc<ThreadData>,
    scenario: Option<Arc<Scenario>>,
    schema: Option<Arc<VariableSchema>>,
    vars: VariableTable,
    cursors: CursorList,
    /// Cursor-index-keyed wake-ups, ordered by wake time (§8: "the
    /// scheduled-actions heap of a session is processed in non-decreasing
    /// time order").
    scheduled: BinaryHeap<Reverse<(Instant, usize)>>,
    active_cursor: Option<usize>,
    tick_now: Instant,
    error: Option<volley_common::SessionError>,
    terminated: bool,
}

impl Session {
    pub(crate) fn new(id: SessionId, thread_data: Rc<ThreadData>) -> Self {
        Self {
            id,
            thread_data,
            scenario: None,
            schema: None,
            vars: VariableTable::new(),
            cursors: CursorList::new(),
            scheduled: BinaryHeap::new(),
            active_cursor: None,
            tick_now: Instant::now(),
            error: None,
            terminated: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn error(&self) -> Option<&volley_common::SessionError> {
        self.error.as_ref()
    }

    /// True once every cursor has run its sequence to completion.
    pub fn is_finished(&self) -> bool {
        !self.cursors.is_empty() && self.cursors.iter().all(|c| c.done)
    }

    /// Bind a freshly-acquired session to the scenario it will execute,
    /// seeding one cursor per initial sequence.
    pub fn start(&mut self, scenario: Arc<Scenario>, schema: Arc<VariableSchema>) {
        self.vars.reset(&schema);
        self.cursors = scenario
            .initial_sequences
            .iter()
            .cloned()
            .map(SequenceCursor::new)
            .collect();
        self.scenario = Some(scenario);
        self.schema = Some(schema);
        self.scheduled.clear();
        self.active_cursor = None;
        self.error = None;
        self.terminated = false;
    }

    /// Instantiate a template sequence as a new concurrently-running cursor.
    /// Used by steps that fork background work (§3's "template sequences").
    pub fn spawn_sequence(&mut self, name: &str) -> bool {
        let Some(scenario) = &self.scenario else {
            return false;
        };
        let Some(sequence) = scenario.template(name).cloned() else {
            return false;
        };
        self.cursors.push(SequenceCursor::new(sequence));
        true
    }

    /// Clear this session back to its just-reserved state so the pool can
    /// hand it to an unrelated scenario later. Invariant checked by the pool:
    /// a released session's variable table is fully unset (§8).
    pub fn reset(&mut self) {
        self.scenario = None;
        self.schema = None;
        self.vars.clear();
        self.cursors.clear();
        self.scheduled.clear();
        self.active_cursor = None;
        self.error = None;
        self.terminated = false;
    }

    pub fn mark_terminated(&mut self) {
        self.terminated = true;
    }

    pub fn fail(&mut self, err: volley_common::SessionError) {
        self.error = Some(err);
        self.terminated = true;
    }

    pub(crate) fn cursors(&self) -> &[SequenceCursor] {
        &self.cursors
    }

    pub(crate) fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub(crate) fn cursor_done(&self, idx: usize) -> bool {
        self.cursors[idx].done
    }

    /// Whether cursor `idx` should be invoked this tick: done cursors never
    /// are, and a parked cursor with a future wake time is skipped. A parked
    /// cursor with no wake time (parked by something other than a timer, e.g.
    /// waiting on a shared counter) is re-polled every tick, per §4.2's
    /// explicit allowance of either explicit wake-lists or optimistic
    /// re-polling.
    pub(crate) fn should_invoke(&self, idx: usize, now: Instant) -> bool {
        let cursor = &self.cursors[idx];
        if cursor.done {
            return false;
        }
        if cursor.parked {
            if let Some(wake_at) = cursor.wake_at {
                return wake_at <= now;
            }
        }
        true
    }

    pub(crate) fn begin_tick(&mut self, now: Instant) {
        self.tick_now = now;
        while let Some(&Reverse((wake_at, idx))) = self.scheduled.peek() {
            if wake_at > now {
                break;
            }
            self.scheduled.pop();
            if let Some(cursor) = self.cursors.get_mut(idx) {
                if cursor.wake_at == Some(wake_at) {
                    cursor.parked = false;
                    cursor.wake_at = None;
                }
            }
        }
    }

    pub(crate) fn current_step(&self, idx: usize) -> Option<SequenceStep> {
        self.cursors[idx].current_step().cloned()
    }

    pub(crate) fn invoke_cursor(
        &mut self,
        idx: usize,
        step: &SequenceStep,
    ) -> volley_common::StepAction {
        self.active_cursor = Some(idx);
        let action = step.invoke(self);
        self.active_cursor = None;
        action
    }

    pub(crate) fn advance_cursor(&mut self, idx: usize) {
        let cursor = &mut self.cursors[idx];
        cursor.pc += 1;
        cursor.parked = false;
        cursor.wake_at = None;
        if cursor.pc >= cursor.sequence.steps.len() {
            cursor.done = true;
        }
    }

    pub(crate) fn park_cursor(&mut self, idx: usize) {
        let already_scheduled = self.cursors[idx].wake_at.is_some();
        if !already_scheduled {
            self.cursors[idx].parked = true;
        }
    }

    /// An external callback (e.g. an HTTP response) woke this session up.
    /// Only cursors parked on something other than a timer are affected —
    /// a cursor with its own `wake_at` keeps waiting for it.
    pub fn wake_external(&mut self) {
        for cursor in self.cursors.iter_mut() {
            if cursor.parked && cursor.wake_at.is_none() {
                cursor.parked = false;
            }
        }
    }
}

impl SessionContext for Session {
    fn get_var(&self, name: &str) -> Option<Value> {
        let schema = self.schema.as_ref()?;
        self.vars.get(schema, name)
    }

    fn set_var(&mut self, name: &str, value: Value) {
        if let Some(schema) = self.schema.clone() {
            self.vars.set(&schema, name, value);
        }
    }

    fn is_set(&self, name: &str) -> bool {
        self.schema
            .as_ref()
            .is_some_and(|schema| self.vars.is_set(schema, name))
    }

    fn unset(&mut self, name: &str) {
        if let Some(schema) = self.schema.clone() {
            self.vars.unset(&schema, name);
        }
    }

    fn get_int(&self, name: &str) -> Option<i64> {
        let schema = self.schema.as_ref()?;
        self.vars.get_int(schema, name)
    }

    fn set_int(&mut self, name: &str, value: i64) {
        if let Some(schema) = self.schema.clone() {
            self.vars.set_int(&schema, name, value);
        }
    }

    fn schedule_delay(&mut self, delay: Duration) {
        let Some(idx) = self.active_cursor else {
            return;
        };
        let wake_at = self.tick_now + delay;
        self.cursors[idx].parked = true;
        self.cursors[idx].wake_at = Some(wake_at);
        self.scheduled.push(Reverse((wake_at, idx)));
    }

    fn counter_get(&self, key: &str) -> i64 {
        self.thread_data.counter_get(key)
    }

    fn counter_set(&self, key: &str, value: i64) {
        self.thread_data.counter_set(key, value);
    }

    fn counter_add(&self, key: &str, delta: i64) -> i64 {
        self.thread_data.counter_add(key, delta)
    }

    fn counter_compare_and_set(&self, key: &str, expected: i64, new: i64) -> bool {
        self.thread_data.counter_compare_and_set(key, expected, new)
    }

    fn current_sequence(&self) -> &str {
        self.active_cursor
            .and_then(|idx| self.cursors.get(idx))
            .map(|c| c.sequence.name.as_str())
            .unwrap_or("")
    }

    fn spawn_sequence(&mut self, name: &str) -> bool {
        Session::spawn_sequence(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use volley_common::{Step, StepAction, VariableDecl};

    struct AdvanceStep;
    impl Step for AdvanceStep {
        fn name(&self) -> &str {
            "advance"
        }
        fn invoke(&self, _s: &mut dyn SessionContext) -> StepAction {
            StepAction::Advance
        }
    }

    struct ParkOnceStep;
    impl Step for ParkOnceStep {
        fn name(&self) -> &str {
            "park-once"
        }
        fn invoke(&self, session: &mut dyn SessionContext) -> StepAction {
            if session.is_set("waited") {
                StepAction::Advance
            } else {
                session.set_int("waited", 1);
                session.schedule_delay(Duration::from_millis(50));
                StepAction::Park
            }
        }
    }

    fn scenario_with(steps: Vec<SequenceStep>) -> Arc<Scenario> {
        Arc::new(Scenario {
            initial_sequences: vec![Sequence::new("main", steps)],
            template_sequences: vec![],
            variables: vec![VariableDecl {
                name: "waited".into(),
                var_type: volley_common::VarType::Int,
            }],
        })
    }

    #[test]
    fn spawn_sequence_adds_a_concurrently_running_cursor() {
        let td = Rc::new(ThreadData::new());
        let mut session = Session::new(0, td);
        let scenario = Arc::new(Scenario {
            initial_sequences: vec![Sequence::new("main", vec![Arc::new(AdvanceStep)])],
            template_sequences: vec![Sequence::new("background", vec![Arc::new(AdvanceStep)])],
            variables: vec![],
        });
        let schema = Arc::new(VariableSchema::new(&scenario.variables));
        session.start(scenario, schema);
        assert_eq!(session.cursor_count(), 1);

        assert!(SessionContext::spawn_sequence(&mut session, "background"));
        assert_eq!(session.cursor_count(), 2);
        assert!(!SessionContext::spawn_sequence(&mut session, "ghost"));
        assert_eq!(session.cursor_count(), 2);
    }

    #[test]
    fn fresh_session_has_one_cursor_per_initial_sequence() {
        let td = Rc::new(ThreadData::new());
        let mut session = Session::new(0, td);
        let scenario = scenario_with(vec![Arc::new(AdvanceStep)]);
        let schema = Arc::new(VariableSchema::new(&scenario.variables));
        session.start(scenario, schema);
        assert_eq!(session.cursor_count(), 1);
        assert!(!session.is_finished());
    }

    #[test]
    fn advancing_past_last_step_marks_cursor_done() {
        let td = Rc::new(ThreadData::new());
        let mut session = Session::new(0, td);
        let scenario = scenario_with(vec![Arc::new(AdvanceStep)]);
        let schema = Arc::new(VariableSchema::new(&scenario.variables));
        session.start(scenario, schema);
        session.advance_cursor(0);
        assert!(session.cursor_done(0));
        assert!(session.is_finished());
    }

    #[test]
    fn reset_clears_variables_and_cursors() {
        let td = Rc::new(ThreadData::new());
        let mut session = Session::new(0, td);
        let scenario = scenario_with(vec![Arc::new(AdvanceStep)]);
        let schema = Arc::new(VariableSchema::new(&scenario.variables));
        session.start(scenario, schema);
        session.set_int("waited", 7);
        session.reset();
        assert_eq!(session.cursor_count(), 0);
        assert_eq!(session.get_var("waited"), None);
    }

    #[test]
    fn schedule_delay_parks_and_wakes_the_cursor() {
        let td = Rc::new(ThreadData::new());
        let mut session = Session::new(0, td);
        let scenario = scenario_with(vec![Arc::new(ParkOnceStep), Arc::new(AdvanceStep)]);
        let schema = Arc::new(VariableSchema::new(&scenario.variables));
        session.start(scenario, schema);

        let now = Instant::now();
        session.begin_tick(now);
        assert!(session.should_invoke(0, now));
        let step = session.current_step(0).unwrap();
        let action = session.invoke_cursor(0, &step);
        assert!(matches!(action, StepAction::Park));
        session.park_cursor(0);

        assert!(!session.should_invoke(0, now));
        let later = now + Duration::from_millis(51);
        session.begin_tick(later);
        assert!(session.should_invoke(0, later));
    }
}

//! Ties a session pool and its shared thread data together into the unit a
//! phase instance drives one tick at a time (§4, §4.6). One `Executor` runs
//! on exactly one OS thread for its whole lifetime; nothing here is `Send`.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use volley_common::{Scenario, SessionError};

use crate::interpreter::{self, TickOutcome};
use crate::mailbox::ExecutorMailbox;
use crate::pool::SessionPool;
use crate::session::SessionId;
use crate::thread_data::ThreadData;
use crate::vars::VariableSchema;

/// A session lifecycle event a tick produced, for the owning phase instance
/// to fold into its own bookkeeping and for the reporter to observe (§6).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Finished(SessionId),
    Failed(SessionId, SessionError),
    Terminated(SessionId),
}

/// Owns one executor's session pool and shared state, and drives every live
/// session through one interpreter tick per call to `tick`.
pub struct Executor {
    thread_data: Rc<ThreadData>,
    pool: SessionPool,
    live: Vec<SessionId>,
    mailbox: ExecutorMailbox,
}

impl Executor {
    pub fn new() -> Self {
        let thread_data = Rc::new(ThreadData::new());
        Self {
            pool: SessionPool::new(thread_data.clone()),
            thread_data,
            live: Vec::new(),
            mailbox: ExecutorMailbox::new(),
        }
    }

    pub fn thread_data(&self) -> &Rc<ThreadData> {
        &self.thread_data
    }

    /// A handle an external thread (e.g. the HTTP transport's own worker
    /// threads) can clone and use to wake a session once its response
    /// arrives (§5, §9). Never blocks the caller.
    pub fn callback_sender(&self) -> flume::Sender<SessionId> {
        self.mailbox.sender()
    }

    /// Eagerly grow the session pool, sized from a phase's
    /// `ArrivalSpec::max_concurrent_sessions` estimate.
    pub fn reserve(&mut self, additional: usize) {
        self.pool.reserve(additional);
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn free_count(&self) -> usize {
        self.pool.free_count()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Acquire a session from the pool and bind it to `scenario`. `None`
    /// means the pool is exhausted — the caller should record a saturation
    /// event rather than treat it as an error (§4.3).
    pub fn start_session(&mut self, scenario: Arc<Scenario>, schema: Arc<VariableSchema>) -> Option<SessionId> {
        let id = self.pool.acquire()?;
        self.pool.get_mut(id).start(scenario, schema);
        self.live.push(id);
        Some(id)
    }

    /// Advance every live session by one interpreter tick, releasing any
    /// that reached a terminal outcome back to the pool.
    pub fn tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        for id in self.mailbox.drain() {
            if self.live.contains(&id) {
                self.pool.get_mut(id).wake_external();
            }
        }

        let mut events = Vec::with_capacity(self.live.len());
        let mut finished = Vec::new();

        for &id in &self.live {
            let session = self.pool.get_mut(id);
            match interpreter::tick(session, now) {
                TickOutcome::Running => {}
                TickOutcome::Finished => {
                    events.push(SessionEvent::Finished(id));
                    finished.push(id);
                }
                TickOutcome::Failed(err) => {
                    events.push(SessionEvent::Failed(id, err));
                    finished.push(id);
                }
                TickOutcome::Terminated => {
                    events.push(SessionEvent::Terminated(id));
                    finished.push(id);
                }
            }
        }

        for id in finished {
            self.live.retain(|&live_id| live_id != id);
            self.pool.release(id);
        }

        events
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_common::{Sequence, SessionContext, Step, StepAction, VarType, VariableDecl};

    struct AdvanceStep;
    impl Step for AdvanceStep {
        fn name(&self) -> &str {
            "advance"
        }
        fn invoke(&self, _s: &mut dyn SessionContext) -> StepAction {
            StepAction::Advance
        }
    }

    fn scenario() -> Arc<Scenario> {
        Arc::new(Scenario {
            initial_sequences: vec![Sequence::new("main", vec![Arc::new(AdvanceStep)])],
            template_sequences: vec![],
            variables: vec![VariableDecl {
                name: "x".into(),
                var_type: VarType::Int,
            }],
        })
    }

    #[test]
    fn start_session_fails_once_the_pool_is_exhausted() {
        let mut executor = Executor::new();
        executor.reserve(1);
        let scenario = scenario();
        let schema = Arc::new(VariableSchema::new(&scenario.variables));
        assert!(executor.start_session(scenario.clone(), schema.clone()).is_some());
        assert!(executor.start_session(scenario, schema).is_none());
    }

    #[test]
    fn finished_sessions_are_released_back_to_the_pool() {
        let mut executor = Executor::new();
        executor.reserve(1);
        let scenario = scenario();
        let schema = Arc::new(VariableSchema::new(&scenario.variables));
        executor.start_session(scenario, schema).unwrap();
        assert_eq!(executor.free_count(), 0);

        let events = executor.tick(Instant::now());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SessionEvent::Finished(_)));
        assert_eq!(executor.free_count(), 1);
        assert_eq!(executor.live_count(), 0);
    }
}

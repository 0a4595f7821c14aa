//! The bounded, pre-allocated session pool (§4.1). Capacity is sized from
//! a phase's `ArrivalSpec::max_concurrent_sessions` estimate and never grows
//! past it at runtime — exhaustion is a saturation event, not a resize.

use std::rc::Rc;

use crate::session::{Session, SessionId};
use crate::thread_data::ThreadData;

/// Owns every `Session` slot an executor will ever use, plus a free-list of
/// the ones not currently assigned to a live sequence run.
pub struct SessionPool {
    sessions: Vec<Session>,
    free: Vec<SessionId>,
    thread_data: Rc<ThreadData>,
}

impl SessionPool {
    pub fn new(thread_data: Rc<ThreadData>) -> Self {
        Self {
            sessions: Vec::new(),
            free: Vec::new(),
            thread_data,
        }
    }

    /// Eagerly allocate `additional` more session shells. Called once at
    /// phase-instance setup with the arrival process's
    /// `max_concurrent_sessions` estimate; never called mid-phase.
    pub fn reserve(&mut self, additional: usize) {
        let start = self.sessions.len();
        self.sessions.reserve(additional);
        self.free.reserve(additional);
        for offset in 0..additional {
            let id = start + offset;
            self.sessions.push(Session::new(id, self.thread_data.clone()));
            self.free.push(id);
        }
    }

    pub fn capacity(&self) -> usize {
        self.sessions.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Whether the pool has no free slots left. A caller seeing this on an
    /// arrival attempt should record a saturation event (§4.3) rather than
    /// retry immediately.
    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }

    /// Take a session out of the free list. `None` means saturation.
    pub fn acquire(&mut self) -> Option<SessionId> {
        self.free.pop()
    }

    /// Return a session to the free list, resetting it to its
    /// just-reserved state first.
    pub fn release(&mut self, id: SessionId) {
        self.sessions[id].reset();
        self.free.push(id);
    }

    pub fn get(&self, id: SessionId) -> &Session {
        &self.sessions[id]
    }

    pub fn get_mut(&mut self, id: SessionId) -> &mut Session {
        &mut self.sessions[id]
    }
}

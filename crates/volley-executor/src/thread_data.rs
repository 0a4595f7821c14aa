//! Per-executor shared state (§3, §4.6, §5): counters, queues, and named
//! locks visible to every session bound to one executor. Single-threaded by
//! construction — the scheduler guarantees serial execution within one
//! executor, so none of this needs synchronization primitives, only
//! interior mutability for sharing between sessions that each hold a
//! `Rc<ThreadData>`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use ahash::AHashMap;

use crate::session::SessionId;
use volley_common::Value;

/// A mutable 64-bit counter, reserved once and then read/written freely
/// from the owning executor thread.
#[derive(Default)]
pub struct SharedCounter {
    value: Cell<i64>,
}

impl SharedCounter {
    pub fn get(&self) -> i64 {
        self.value.get()
    }

    pub fn set(&self, v: i64) {
        self.value.set(v);
    }

    pub fn add(&self, delta: i64) -> i64 {
        let next = self.value.get() + delta;
        self.value.set(next);
        next
    }

    /// Equivalent to `add`, but returns the value *before* the add, matching
    /// the `getAndAdd` accessor named in §3.
    pub fn get_and_add(&self, delta: i64) -> i64 {
        let prev = self.value.get();
        self.value.set(prev + delta);
        prev
    }

    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        if self.value.get() == expected {
            self.value.set(new);
            true
        } else {
            false
        }
    }
}

/// A FIFO queue shared between sessions co-located on one executor.
#[derive(Default)]
pub struct SharedQueue {
    items: RefCell<VecDeque<Value>>,
}

impl SharedQueue {
    pub fn push(&self, value: Value) {
        self.items.borrow_mut().push_back(value);
    }

    pub fn pop(&self) -> Option<Value> {
        self.items.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

/// Per-executor shared data area: counters, queues, and a registry of named
/// locks, all keyed by the name a step uses to refer to them.
#[derive(Default)]
pub struct ThreadData {
    counters: RefCell<AHashMap<String, SharedCounter>>,
    queues: RefCell<AHashMap<String, SharedQueue>>,
    locks: RefCell<AHashMap<String, Option<SessionId>>>,
}

impl ThreadData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a counter slot exists for `key`. Idempotent: calling this `M`
    /// times yields exactly one counter slot (§8).
    pub fn reserve_counter(&self, key: &str) {
        self.counters
            .borrow_mut()
            .entry(key.to_string())
            .or_default();
    }

    pub fn counter_get(&self, key: &str) -> i64 {
        self.reserve_counter(key);
        self.counters.borrow()[key].get()
    }

    pub fn counter_set(&self, key: &str, value: i64) {
        self.reserve_counter(key);
        self.counters.borrow()[key].set(value);
    }

    pub fn counter_add(&self, key: &str, delta: i64) -> i64 {
        self.reserve_counter(key);
        self.counters.borrow()[key].add(delta)
    }

    pub fn counter_compare_and_set(&self, key: &str, expected: i64, new: i64) -> bool {
        self.reserve_counter(key);
        self.counters.borrow()[key].compare_and_set(expected, new)
    }

    pub fn counter_count(&self) -> usize {
        self.counters.borrow().len()
    }

    pub fn reserve_queue(&self, key: &str) {
        self.queues.borrow_mut().entry(key.to_string()).or_default();
    }

    pub fn queue_push(&self, key: &str, value: Value) {
        self.reserve_queue(key);
        self.queues.borrow()[key].push(value);
    }

    pub fn queue_pop(&self, key: &str) -> Option<Value> {
        self.reserve_queue(key);
        self.queues.borrow()[key].pop()
    }

    /// Attempt to acquire a named lock for `session`. Re-entrant for the
    /// same session; fails if another session holds it.
    pub fn try_lock(&self, key: &str, session: SessionId) -> bool {
        let mut locks = self.locks.borrow_mut();
        match locks.get(key).copied().flatten() {
            Some(holder) if holder != session => false,
            _ => {
                locks.insert(key.to_string(), Some(session));
                true
            }
        }
    }

    pub fn unlock(&self, key: &str, session: SessionId) {
        let mut locks = self.locks.borrow_mut();
        if locks.get(key).copied().flatten() == Some(session) {
            locks.insert(key.to_string(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_counter_is_idempotent() {
        let td = ThreadData::new();
        for _ in 0..5 {
            td.reserve_counter("requests");
        }
        assert_eq!(td.counter_count(), 1);
    }

    #[test]
    fn counter_add_and_compare_and_set() {
        let td = ThreadData::new();
        assert_eq!(td.counter_add("hits", 3), 3);
        assert_eq!(td.counter_add("hits", 4), 7);
        assert!(td.counter_compare_and_set("hits", 7, 0));
        assert!(!td.counter_compare_and_set("hits", 7, 1));
        assert_eq!(td.counter_get("hits"), 0);
    }

    #[test]
    fn locks_are_reentrant_and_exclusive() {
        let td = ThreadData::new();
        assert!(td.try_lock("gate", 1));
        assert!(td.try_lock("gate", 1));
        assert!(!td.try_lock("gate", 2));
        td.unlock("gate", 1);
        assert!(td.try_lock("gate", 2));
    }

    #[test]
    fn queue_is_fifo() {
        let td = ThreadData::new();
        td.queue_push("work", Value::Int(1));
        td.queue_push("work", Value::Int(2));
        assert_eq!(td.queue_pop("work"), Some(Value::Int(1)));
        assert_eq!(td.queue_pop("work"), Some(Value::Int(2)));
        assert_eq!(td.queue_pop("work"), None);
    }
}

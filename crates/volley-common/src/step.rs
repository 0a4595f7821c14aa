//! The step contract (§3, §4.2, §6): a sequence is an ordered list of
//! `Step`s, each of which inspects/mutates a session and returns one of
//! four outcomes. Steps never block; "park" is how a step says "not yet".

use std::time::Duration;

use crate::error::SessionError;
use crate::value::Value;

/// What a step tells the interpreter to do next.
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Consume this step, advance the program counter to the next one.
    Advance,
    /// Leave the program counter where it is; re-invoke this same step next
    /// tick. The session will only be re-ticked once one of its wake
    /// sources (timer, counter write, external callback) fires.
    Park,
    /// Abort the sequence this step lives in. Propagates to the owning
    /// phase via `PhaseInstance::fail`.
    Fail(SessionError),
    /// Drop the session immediately, skipping any remaining sequences.
    TerminateSession,
}

/// Everything a step is allowed to see or touch on the session it runs
/// against. Implemented by `volley_executor::Session`; kept as a trait here
/// so `volley-common` has no dependency on the executor crate (mirrors how
/// the teacher's `tasks::sessions::Session` trait sits between the VM and
/// the connection implementation).
pub trait SessionContext {
    /// Read a session variable. `None` if unset.
    fn get_var(&self, name: &str) -> Option<Value>;
    /// Write a session variable, creating it if the schema declared it.
    fn set_var(&mut self, name: &str, value: Value);
    /// Whether a session variable currently holds a value.
    fn is_set(&self, name: &str) -> bool;
    /// Clear a session variable back to unset.
    fn unset(&mut self, name: &str);
    /// Int-specialized read, avoiding the `Value` boxing on the hot path.
    fn get_int(&self, name: &str) -> Option<i64>;
    /// Int-specialized write.
    fn set_int(&mut self, name: &str, value: i64);

    /// Enqueue a wake-up for this same step at `now + delay`. The step will
    /// be re-invoked (not skipped) once the delay elapses.
    fn schedule_delay(&mut self, delay: Duration);

    /// Per-executor shared counter access (§4.6). All access is from this
    /// session's owning executor thread, so no synchronization is needed
    /// beneath this interface.
    fn counter_get(&self, key: &str) -> i64;
    fn counter_set(&self, key: &str, value: i64);
    fn counter_add(&self, key: &str, delta: i64) -> i64;
    fn counter_compare_and_set(&self, key: &str, expected: i64, new: i64) -> bool;

    /// The name of the sequence instance currently executing this step.
    fn current_sequence(&self) -> &str;

    /// Instantiate a template sequence as a new concurrently-running cursor
    /// on this session (§3: template sequences "may be instantiated
    /// dynamically at runtime"). Returns `false` if the scenario declares no
    /// template sequence by that name.
    fn spawn_sequence(&mut self, name: &str) -> bool;
}

/// A single unit of work within a sequence. Implementations are provided by
/// the step library (out of scope for this core, §1); the core only ever
/// calls `invoke` and never reflects on the concrete type.
pub trait Step: Send + Sync {
    /// Short, human-readable name used in logging and error messages.
    fn name(&self) -> &str;

    /// Evaluate this step against the given session.
    fn invoke(&self, session: &mut dyn SessionContext) -> StepAction;

    /// Names of the session variables this step reads or writes. Used at
    /// benchmark-build time to derive the session variable schema (§4.6).
    /// Most steps touch no variables; default is empty.
    fn variables(&self) -> &[&str] {
        &[]
    }

    /// Names of template sequences this step may instantiate via
    /// `SessionContext::spawn_sequence`. Used at benchmark-build time to
    /// check that every declared template sequence is reachable from some
    /// step. Most steps spawn nothing; default is empty.
    fn spawns(&self) -> &[&str] {
        &[]
    }
}

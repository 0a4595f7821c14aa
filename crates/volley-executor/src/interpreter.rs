//! The non-blocking step interpreter (§4.2): one tick of one session. Walks
//! every live cursor, invoking at most one step each, and folds the result
//! into a single outcome for the owning phase instance to react to.

use std::time::Instant;

use volley_common::{SessionError, StepAction};

use crate::session::Session;

/// What happened to a session during one `tick` call.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// At least one cursor is still live; nothing terminal happened.
    Running,
    /// Every cursor ran its sequence to completion.
    Finished,
    /// A step raised `StepAction::Fail`.
    Failed(SessionError),
    /// A step raised `StepAction::TerminateSession`.
    Terminated,
}

/// Advance `session` by one tick. Invokes every cursor whose wake condition
/// is satisfied at `now` (§4.2), in cursor order; stops early on the first
/// `Fail` or `TerminateSession` since those end the session outright.
pub fn tick(session: &mut Session, now: Instant) -> TickOutcome {
    session.begin_tick(now);

    for idx in 0..session.cursor_count() {
        // §4.2: a cursor is driven repeatedly within one tick — "advance"
        // consumes a step and re-invokes the next one immediately — until it
        // parks or runs out of steps; only then does the tick move on to the
        // next cursor.
        loop {
            if !session.should_invoke(idx, now) {
                break;
            }
            let Some(step) = session.current_step(idx) else {
                break;
            };
            match session.invoke_cursor(idx, &step) {
                StepAction::Advance => {
                    session.advance_cursor(idx);
                    if session.cursor_done(idx) {
                        break;
                    }
                }
                StepAction::Park => {
                    session.park_cursor(idx);
                    break;
                }
                StepAction::Fail(err) => {
                    session.fail(err.clone());
                    return TickOutcome::Failed(err);
                }
                StepAction::TerminateSession => {
                    session.mark_terminated();
                    return TickOutcome::Terminated;
                }
            }
        }
    }

    if session.is_finished() {
        TickOutcome::Finished
    } else {
        TickOutcome::Running
    }
}

//! A small demonstration step library. None of this is part of the core's
//! contract (§1 names the step library itself out of scope) — it exists so
//! `volley` has something to run a YAML benchmark definition against.

use std::time::Duration;

use tracing::info;
use volley_common::{SessionContext, SessionError, Step, StepAction, Value};

/// Logs a fixed message and advances. The simplest possible step.
pub struct LogStep {
    pub message: String,
}

impl Step for LogStep {
    fn name(&self) -> &str {
        "log"
    }

    fn invoke(&self, session: &mut dyn SessionContext) -> StepAction {
        info!(sequence = session.current_sequence(), message = %self.message, "log");
        StepAction::Advance
    }
}

/// Writes a fixed value into a declared session variable.
pub struct SetVarStep {
    pub var: &'static str,
    pub value: Value,
}

impl Step for SetVarStep {
    fn name(&self) -> &str {
        "set-var"
    }

    fn invoke(&self, session: &mut dyn SessionContext) -> StepAction {
        session.set_var(self.var, self.value.clone());
        StepAction::Advance
    }

    fn variables(&self) -> &[&str] {
        std::slice::from_ref(&self.var)
    }
}

/// Adds `delta` to a per-executor shared counter (§4.6).
pub struct IncrCounterStep {
    pub key: String,
    pub delta: i64,
}

impl Step for IncrCounterStep {
    fn name(&self) -> &str {
        "incr-counter"
    }

    fn invoke(&self, session: &mut dyn SessionContext) -> StepAction {
        session.counter_add(&self.key, self.delta);
        StepAction::Advance
    }
}

/// Parks until a shared counter reaches an exact value, re-polling every
/// tick with no timer armed — the "optimistic re-polling" pattern the
/// interpreter's wake contract explicitly allows (§4.2).
pub struct AwaitCounterStep {
    pub key: String,
    pub equals: i64,
}

impl Step for AwaitCounterStep {
    fn name(&self) -> &str {
        "await-counter"
    }

    fn invoke(&self, session: &mut dyn SessionContext) -> StepAction {
        if session.counter_get(&self.key) == self.equals {
            StepAction::Advance
        } else {
            StepAction::Park
        }
    }
}

/// Parks for a fixed duration, then advances. Uses a private "armed" flag
/// variable so the timer is scheduled exactly once rather than re-armed on
/// every re-invocation while parked.
pub struct DelayStep {
    pub duration: Duration,
    pub armed_var: &'static str,
}

impl Step for DelayStep {
    fn name(&self) -> &str {
        "delay"
    }

    fn invoke(&self, session: &mut dyn SessionContext) -> StepAction {
        if session.is_set(self.armed_var) {
            StepAction::Advance
        } else {
            session.set_int(self.armed_var, 1);
            session.schedule_delay(self.duration);
            StepAction::Park
        }
    }

    fn variables(&self) -> &[&str] {
        std::slice::from_ref(&self.armed_var)
    }
}

/// Instantiates a named template sequence as a new concurrently-running
/// cursor on the session, then advances (§3: template sequences "may be
/// instantiated dynamically at runtime").
pub struct SpawnStep {
    pub template: &'static str,
}

impl Step for SpawnStep {
    fn name(&self) -> &str {
        "spawn"
    }

    fn invoke(&self, session: &mut dyn SessionContext) -> StepAction {
        if !session.spawn_sequence(self.template) {
            return StepAction::Fail(SessionError::new(
                "spawn",
                format!("no template sequence named `{}`", self.template),
            ));
        }
        StepAction::Advance
    }

    fn spawns(&self) -> &[&str] {
        std::slice::from_ref(&self.template)
    }
}

/// Unconditionally fails the sequence, propagating to the owning phase.
pub struct FailStep {
    pub message: String,
}

impl Step for FailStep {
    fn name(&self) -> &str {
        "fail"
    }

    fn invoke(&self, _session: &mut dyn SessionContext) -> StepAction {
        StepAction::Fail(SessionError::new("fail", self.message.clone()))
    }
}

/// Unconditionally drops the session, skipping any remaining sequences.
pub struct TerminateStep;

impl Step for TerminateStep {
    fn name(&self) -> &str {
        "terminate"
    }

    fn invoke(&self, _session: &mut dyn SessionContext) -> StepAction {
        StepAction::TerminateSession
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;
    use std::time::Duration as StdDuration;

    /// A minimal standalone `SessionContext`, independent of
    /// `volley-executor`'s pooled `Session` (whose cursor/tick machinery is
    /// crate-private to that crate). Exercises exactly the surface a step
    /// is allowed to touch.
    #[derive(Default)]
    struct FakeSession {
        vars: AHashMap<String, Value>,
        counters: AHashMap<String, i64>,
        last_delay: Option<StdDuration>,
        spawned: Vec<String>,
        known_templates: Vec<&'static str>,
    }

    impl SessionContext for FakeSession {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.vars.get(name).cloned()
        }
        fn set_var(&mut self, name: &str, value: Value) {
            self.vars.insert(name.to_string(), value);
        }
        fn is_set(&self, name: &str) -> bool {
            self.vars.contains_key(name)
        }
        fn unset(&mut self, name: &str) {
            self.vars.remove(name);
        }
        fn get_int(&self, name: &str) -> Option<i64> {
            self.get_var(name).and_then(|v| v.as_int())
        }
        fn set_int(&mut self, name: &str, value: i64) {
            self.set_var(name, Value::Int(value));
        }
        fn schedule_delay(&mut self, delay: StdDuration) {
            self.last_delay = Some(delay);
        }
        fn counter_get(&self, key: &str) -> i64 {
            *self.counters.get(key).unwrap_or(&0)
        }
        fn counter_set(&self, key: &str, value: i64) {
            let ptr = self as *const Self as *mut Self;
            unsafe { (*ptr).counters.insert(key.to_string(), value) };
        }
        fn counter_add(&self, key: &str, delta: i64) -> i64 {
            let next = self.counter_get(key) + delta;
            self.counter_set(key, next);
            next
        }
        fn counter_compare_and_set(&self, key: &str, expected: i64, new: i64) -> bool {
            if self.counter_get(key) == expected {
                self.counter_set(key, new);
                true
            } else {
                false
            }
        }
        fn current_sequence(&self) -> &str {
            "main"
        }
        fn spawn_sequence(&mut self, name: &str) -> bool {
            if self.known_templates.iter().any(|t| *t == name) {
                self.spawned.push(name.to_string());
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn set_var_step_writes_the_declared_variable() {
        let mut session = FakeSession::default();
        let step = SetVarStep {
            var: "greeting",
            value: Value::Str("hi".into()),
        };
        assert!(matches!(step.invoke(&mut session), StepAction::Advance));
        assert_eq!(session.get_var("greeting"), Some(Value::Str("hi".into())));
        assert_eq!(step.variables(), &["greeting"]);
    }

    #[test]
    fn incr_counter_step_adds_the_delta() {
        let mut session = FakeSession::default();
        let step = IncrCounterStep {
            key: "hits".into(),
            delta: 3,
        };
        step.invoke(&mut session);
        step.invoke(&mut session);
        assert_eq!(session.counter_get("hits"), 6);
    }

    #[test]
    fn await_counter_step_parks_until_the_value_matches() {
        let mut session = FakeSession::default();
        let step = AwaitCounterStep {
            key: "done".into(),
            equals: 1,
        };
        assert!(matches!(step.invoke(&mut session), StepAction::Park));
        session.counters.insert("done".into(), 1);
        assert!(matches!(step.invoke(&mut session), StepAction::Advance));
    }

    #[test]
    fn delay_step_arms_once_then_advances_without_re_arming() {
        let mut session = FakeSession::default();
        let step = DelayStep {
            duration: Duration::from_millis(10),
            armed_var: "__armed",
        };
        assert!(matches!(step.invoke(&mut session), StepAction::Park));
        assert_eq!(session.last_delay, Some(Duration::from_millis(10)));
        session.last_delay = None;

        assert!(matches!(step.invoke(&mut session), StepAction::Advance));
        assert_eq!(session.last_delay, None);
        assert_eq!(step.variables(), &["__armed"]);
    }

    #[test]
    fn spawn_step_instantiates_a_known_template() {
        let mut session = FakeSession {
            known_templates: vec!["background"],
            ..Default::default()
        };
        let step = SpawnStep { template: "background" };
        assert!(matches!(step.invoke(&mut session), StepAction::Advance));
        assert_eq!(session.spawned, vec!["background".to_string()]);
        assert_eq!(step.spawns(), &["background"]);
    }

    #[test]
    fn spawn_step_fails_on_an_unknown_template() {
        let mut session = FakeSession::default();
        let step = SpawnStep { template: "ghost" };
        match step.invoke(&mut session) {
            StepAction::Fail(err) => assert!(err.cause.contains("ghost")),
            other => panic!("expected Fail, got {other:?}"),
        }
    }

    #[test]
    fn fail_step_returns_a_session_error() {
        let mut session = FakeSession::default();
        let step = FailStep {
            message: "boom".into(),
        };
        match step.invoke(&mut session) {
            StepAction::Fail(err) => assert_eq!(err.cause, "boom"),
            other => panic!("expected Fail, got {other:?}"),
        }
    }

    #[test]
    fn terminate_step_terminates_the_session() {
        let mut session = FakeSession::default();
        assert!(matches!(
            TerminateStep.invoke(&mut session),
            StepAction::TerminateSession
        ));
    }
}

//! An executor slot (§4.1, §5): one `volley_executor::Executor` — one OS
//! thread's worth of sessions and shared state — shared by every phase
//! assigned to it. Capacity is the sum of each co-located phase's
//! `maxConcurrentSessions` estimate, per §4.1.

use std::time::Instant;

use ahash::AHashMap;
use volley_executor::{Executor, SessionEvent, SessionId};

/// Wraps one `Executor`, tagging each live session with the index (within
/// one `PhaseScheduler`) of the phase instance that owns it, so a single
/// pool can be shared across co-located phases without `volley-executor`
/// needing to know phases exist.
pub struct ExecutorSlot {
    executor: Executor,
    owners: AHashMap<SessionId, usize>,
}

impl ExecutorSlot {
    pub fn new() -> Self {
        Self {
            executor: Executor::new(),
            owners: AHashMap::new(),
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        self.executor.reserve(additional);
    }

    pub fn capacity(&self) -> usize {
        self.executor.capacity()
    }

    pub fn free_count(&self) -> usize {
        self.executor.free_count()
    }

    pub fn start_session(
        &mut self,
        phase_idx: usize,
        scenario: std::sync::Arc<volley_common::Scenario>,
        schema: std::sync::Arc<volley_executor::VariableSchema>,
    ) -> Option<SessionId> {
        let id = self.executor.start_session(scenario, schema)?;
        self.owners.insert(id, phase_idx);
        Some(id)
    }

    /// Drive every live session one tick, tagging each resulting event with
    /// the phase index that owned the session.
    pub fn tick(&mut self, now: Instant) -> Vec<(usize, SessionEvent)> {
        self.executor
            .tick(now)
            .into_iter()
            .map(|event| {
                let id = match &event {
                    SessionEvent::Finished(id) => *id,
                    SessionEvent::Failed(id, _) => *id,
                    SessionEvent::Terminated(id) => *id,
                };
                let phase_idx = self.owners.remove(&id).unwrap_or(usize::MAX);
                (phase_idx, event)
            })
            .collect()
    }
}

impl Default for ExecutorSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use volley_common::{Scenario, SessionContext, Sequence, Step, StepAction, VariableDecl, VarType};
    use volley_executor::VariableSchema;

    struct AdvanceStep;
    impl Step for AdvanceStep {
        fn name(&self) -> &str {
            "advance"
        }
        fn invoke(&self, _s: &mut dyn SessionContext) -> StepAction {
            StepAction::Advance
        }
    }

    #[test]
    fn tick_tags_events_with_owning_phase_index() {
        let mut slot = ExecutorSlot::new();
        slot.reserve(2);
        let scenario = Arc::new(Scenario {
            initial_sequences: vec![Sequence::new("main", vec![Arc::new(AdvanceStep)])],
            template_sequences: vec![],
            variables: vec![VariableDecl {
                name: "x".into(),
                var_type: VarType::Int,
            }],
        });
        let schema = Arc::new(VariableSchema::new(&scenario.variables));

        slot.start_session(7, scenario.clone(), schema.clone()).unwrap();
        slot.start_session(9, scenario, schema).unwrap();

        let events = slot.tick(Instant::now());
        let phases: Vec<usize> = events.iter().map(|(idx, _)| *idx).collect();
        assert!(phases.contains(&7));
        assert!(phases.contains(&9));
    }
}

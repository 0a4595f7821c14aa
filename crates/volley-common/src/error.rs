//! Error kinds shared across the core (§7 of the design: structural errors
//! detected at build time, and the per-session error a step can raise).

use thiserror::Error;

/// A structural problem detected while building a [`crate::model::Benchmark`]
/// from its phase definitions. Fatal at setup; never raised once a benchmark
/// is running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BenchmarkDefinitionError {
    #[error("duplicate phase name `{0}`")]
    DuplicatePhase(String),
    #[error("phase `{0}` references unknown phase `{1}` in its dependencies")]
    UnknownDependency(String, String),
    #[error("phase `{0}` depends on itself, directly or transitively")]
    DependencyCycle(String),
    #[error("step `{step}` in sequence `{sequence}` references undeclared variable `{variable}`")]
    UnknownVariable {
        sequence: String,
        step: String,
        variable: String,
    },
    #[error("phase `{0}` has no sequences in its scenario")]
    EmptyScenario(String),
    #[error("template sequence `{0}` is never instantiated and has no initial sequences")]
    UnreachableSequence(String),
}

/// Raised by a step via `fail`. Attached to the session; propagates to the
/// owning phase (`PhaseInstance::fail`), which transitions to TERMINATING.
/// The benchmark result is FAILED but unrelated phases keep running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("step `{step}` failed: {cause}")]
pub struct SessionError {
    pub step: String,
    pub cause: String,
}

impl SessionError {
    pub fn new(step: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            cause: cause.into(),
        }
    }
}

//! Data model, step contract, and shared error types for the volley
//! phase-driven load-injection core. Everything in this crate is immutable
//! once built; mutable runtime state lives in `volley-executor` (sessions)
//! and `volley-scheduler` (phase instances).

pub mod error;
pub mod model;
pub mod step;
pub mod value;

pub use error::{BenchmarkDefinitionError, SessionError};
pub use model::{
    ArrivalSpec, ArrivalSpecDto, Benchmark, PhaseDef, Scenario, Sequence, SequenceStep,
    VariableDecl,
};
pub use step::{SessionContext, Step, StepAction};
pub use value::{VarType, Value};

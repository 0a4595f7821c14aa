//! The phase instance, the five arrival processes, and the phase scheduler
//! (Components D and E, §4.3-§4.5): the coordinator that decides when and
//! how many virtual users run, driving `volley-executor`'s executors one
//! tick at a time.

pub mod arrival;
pub mod observer;
pub mod phase_instance;
pub mod scheduler;
pub mod signal;
pub mod slot;
pub mod status;

pub use observer::{BenchmarkObserver, NullObserver};
pub use phase_instance::PhaseInstance;
pub use scheduler::{BenchmarkOutcome, PhaseScheduler};
pub use signal::SchedulerSignal;
pub use slot::ExecutorSlot;
pub use status::PhaseStatus;

//! Session & ThreadData, the step interpreter, and the bounded session pool
//! (§4.1, §4.2, §4.6): the single-threaded-per-executor runtime that
//! `volley-scheduler`'s phase instances drive one tick at a time.

pub mod executor;
pub mod interpreter;
pub mod mailbox;
pub mod pool;
pub mod session;
pub mod thread_data;
pub mod vars;

pub use executor::{Executor, SessionEvent};
pub use interpreter::TickOutcome;
pub use mailbox::ExecutorMailbox;
pub use pool::SessionPool;
pub use session::{Session, SessionId};
pub use thread_data::{SharedCounter, SharedQueue, ThreadData};
pub use vars::{VariableSchema, VariableTable};

//! Interpretation of CIL over partially known values.
//!
//! A `Dispatcher` executes one instruction at a time against an
//! `ExecutionContext`. Handlers never fail with a `crate::Error`: anything
//! the runtime would report, and anything we cannot model, comes back as a
//! `DispatchFault` the caller may recover from. The `Driver` replays slices
//! of a method through a dispatcher.

mod context;
mod dispatcher;
mod driver;
mod environment;
mod fault;
mod handlers;
mod options;
mod successor;

pub use self::context::{ExecutionContext, OperandStack, VariableStore};
pub use self::dispatcher::{DispatchHook, Dispatcher, OpCodeHandler};
pub use self::driver::{Argument, Driver, NullTokenHook, RunOutcome};
pub use self::environment::{DefaultEnvironment, Devirtualization, RuntimeEnvironment};
pub use self::fault::{DispatchFault, DispatchResult};
pub use self::options::{Options, OptionsBuilder};
pub use self::successor::Successor;

//! Cilflow: control-flow recovery, data-flow slicing and partial-knowledge
//! emulation for CIL bytecode.
//!
//! A method body is described by `cil::MethodBody`. From it, cilflow builds:
//!
//! * a `control_flow::ControlFlowGraph`, with typed edges and the tree of
//!   protected regions;
//! * a `data_flow::DataFlowGraph`, recording which instructions produce the
//!   stack slots and variables each instruction consumes.
//!
//! The `executor` interprets instructions over values whose bits may be only
//! partly known, and replays the slice of a method which computes the stack
//! at a chosen instruction.

pub mod architecture;
pub mod cil;
pub mod control_flow;
pub mod data_flow;
mod error;
pub mod executor;
pub mod graph;
pub mod memory;
#[cfg(test)]
mod tests;
pub mod types;
pub mod value;

pub use error::Error;

#[cfg(not(feature = "thread_safe"))]
pub use std::rc::Rc as RC;
#[cfg(feature = "thread_safe")]
pub use std::sync::Arc as RC;

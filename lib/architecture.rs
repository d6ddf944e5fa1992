//! The instruction-set abstraction the graph builders are generic over.
//!
//! Control-flow and data-flow construction only needs to know a few things
//! about each instruction: where it is, how it transfers control, how it
//! changes the evaluation stack and which variables it touches. An
//! `InstructionSetArchitecture` answers these questions for one instruction
//! type.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// How an instruction transfers control.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum FlowControl {
    /// Execution continues with the next instruction.
    Next,
    Branch,
    ConditionalBranch,
    Return,
    Throw,
    /// A call, after which execution continues with the next instruction.
    Call,
    /// A prefix which modifies the following instruction.
    Meta,
    Break,
}

impl FlowControl {
    /// Returns true if this instruction ends a basic block.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            FlowControl::Branch | FlowControl::ConditionalBranch | FlowControl::Return | FlowControl::Throw
        )
    }

    /// Returns true if execution may continue with the next instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(self, FlowControl::Branch | FlowControl::Return | FlowControl::Throw)
    }
}

/// Necessary functions for analysis over an instruction set.
pub trait InstructionSetArchitecture<I> {
    /// The type naming a variable slot.
    type Variable: Clone + Ord + Debug;

    fn offset(&self, instruction: &I) -> u32;
    fn size(&self, instruction: &I) -> u32;
    fn flow_control(&self, instruction: &I) -> FlowControl;
    /// Explicit branch targets, in operand order.
    fn branch_targets(&self, instruction: &I) -> Vec<u32>;
    fn stack_pop_count(&self, instruction: &I) -> usize;
    fn stack_push_count(&self, instruction: &I) -> usize;
    /// Returns true if the instruction empties the evaluation stack, as
    /// `leave` does.
    fn clears_stack(&self, instruction: &I) -> bool;
    fn variables_read(&self, instruction: &I) -> Vec<Self::Variable>;
    fn variables_written(&self, instruction: &I) -> Vec<Self::Variable>;
}

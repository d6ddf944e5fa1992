use thiserror::Error;

use crate::cil::{OpCode, Variable};
use crate::executor::Successor;
use crate::Error as CrateError;

/// A recoverable failure while dispatching one instruction.
///
/// Faults model what the runtime would raise, or why the interpreter could
/// not go on. They travel as values inside a `DispatchResult`, so a caller
/// can decide whether to stop, skip the instruction, or try another path.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DispatchFault {
    #[error("Invalid program: {0}")]
    InvalidProgram(String),
    #[error("No handler for {0}")]
    UnresolvedInstruction(OpCode),
    #[error("Devirtualization failed: {0}")]
    Devirtualization(String),
    #[error("Division by zero")]
    DivideByZero,
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Null reference")]
    NullReference,
    #[error("Invalid cast: {0}")]
    InvalidCast(String),
    #[error("Index out of range")]
    IndexOutOfRange,
    #[error("Access violation: {0}")]
    AccessViolation(String),
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Invalid operand: {0}")]
    InvalidOperand(String),
    #[error("Unknown variable {0}")]
    UnknownVariable(Variable),
    #[error("Aborted: {0}")]
    Aborted(String),
}

impl From<CrateError> for DispatchFault {
    fn from(error: CrateError) -> DispatchFault {
        match error {
            CrateError::DivideByZero => DispatchFault::DivideByZero,
            CrateError::ArithmeticOverflow => DispatchFault::Overflow,
            CrateError::MemoryAccessOutOfBounds { .. } | CrateError::MemoryBlockNotFound(_) => {
                DispatchFault::AccessViolation(error.to_string())
            }
            error => DispatchFault::InvalidProgram(error.to_string()),
        }
    }
}

/// The outcome of dispatching one instruction.
pub type DispatchResult = Result<Successor, DispatchFault>;

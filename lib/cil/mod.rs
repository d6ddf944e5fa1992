//! The CIL instruction model.
//!
//! Decoding of method bodies happens elsewhere. This module describes the
//! decoded form: opcodes, operands, instructions, exception handler clauses
//! and the opaque type, method and field handles instructions refer to.

mod architecture;
mod body;
mod descriptor;
mod instruction;
mod opcode;

pub use self::architecture::CilArchitecture;
pub use self::body::{ExceptionHandler, ExceptionHandlerKind, MethodBody};
pub use self::descriptor::{FieldRef, Member, MethodRef, MethodSignature, Token, TypeRef, TypeSig};
pub use self::instruction::{Instruction, Operand, Variable};
pub use self::opcode::{OpCode, OperandType, StackPop, StackPush};

use crate::cil::{Instruction, OpCode};
use crate::executor::{DispatchResult, ExecutionContext, OpCodeHandler, Successor};

/// `nop`, `break`, and the prefixes, none of which change the state we
/// track.
pub struct Nop;

impl OpCodeHandler for Nop {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Nop,
            OpCode::Break,
            OpCode::Unaligned,
            OpCode::Volatile,
            OpCode::Tailcall,
            OpCode::Constrained,
            OpCode::No,
            OpCode::Readonly,
        ]
    }

    fn execute(&self, _context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        Ok(Successor::FallThrough)
    }
}

pub struct Dup;

impl OpCodeHandler for Dup {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Dup]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        let value = context.stack().peek()?.clone();
        context.stack_mut().push(value)?;
        Ok(Successor::FallThrough)
    }
}

pub struct Pop;

impl OpCodeHandler for Pop {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Pop]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        context.stack_mut().pop()?;
        Ok(Successor::FallThrough)
    }
}

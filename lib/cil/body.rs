use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cil::{Instruction, OpCode, Operand, TypeRef, TypeSig};
use crate::Error;

/// The kind of an exception handler clause.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ExceptionHandlerKind {
    Catch(TypeRef),
    Filter { filter_start: u32 },
    Finally,
    Fault,
}

impl ExceptionHandlerKind {
    /// Returns true if the handler is entered with the exception object on
    /// the stack.
    pub fn receives_exception(&self) -> bool {
        matches!(self, ExceptionHandlerKind::Catch(_) | ExceptionHandlerKind::Filter { .. })
    }
}

/// An exception handler clause. Ranges are half-open byte offsets.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ExceptionHandler {
    pub kind: ExceptionHandlerKind,
    pub try_start: u32,
    pub try_end: u32,
    pub handler_start: u32,
    pub handler_end: u32,
}

impl ExceptionHandler {
    pub fn new(
        kind: ExceptionHandlerKind,
        try_start: u32,
        try_end: u32,
        handler_start: u32,
        handler_end: u32,
    ) -> ExceptionHandler {
        ExceptionHandler {
            kind,
            try_start,
            try_end,
            handler_start,
            handler_end,
        }
    }

    /// Where control first enters the handler: the filter for filter
    /// clauses, the handler body otherwise.
    pub fn entry(&self) -> u32 {
        match self.kind {
            ExceptionHandlerKind::Filter { filter_start } => filter_start,
            _ => self.handler_start,
        }
    }

    pub fn filter_start(&self) -> Option<u32> {
        match self.kind {
            ExceptionHandlerKind::Filter { filter_start } => Some(filter_start),
            _ => None,
        }
    }
}

impl fmt::Display for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match &self.kind {
            ExceptionHandlerKind::Catch(ty) => format!("catch {}", ty),
            ExceptionHandlerKind::Filter { filter_start } => format!("filter IL_{:04x}", filter_start),
            ExceptionHandlerKind::Finally => "finally".to_string(),
            ExceptionHandlerKind::Fault => "fault".to_string(),
        };
        write!(
            f,
            "try IL_{:04x}-IL_{:04x} {} IL_{:04x}-IL_{:04x}",
            self.try_start, self.try_end, kind, self.handler_start, self.handler_end
        )
    }
}

/// The body of a CIL method: its instructions, exception handler clauses and
/// the signatures of its variable slots.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MethodBody {
    instructions: Vec<Instruction>,
    exception_handlers: Vec<ExceptionHandler>,
    locals: Vec<TypeSig>,
    parameters: Vec<TypeSig>,
    return_type: TypeSig,
    init_locals: bool,
}

impl MethodBody {
    /// Create a method body. Instructions must be in ascending offset order.
    pub fn new(
        instructions: Vec<Instruction>,
        exception_handlers: Vec<ExceptionHandler>,
        locals: Vec<TypeSig>,
        parameters: Vec<TypeSig>,
        return_type: TypeSig,
    ) -> MethodBody {
        MethodBody {
            instructions,
            exception_handlers,
            locals,
            parameters,
            return_type,
            init_locals: true,
        }
    }

    /// A body without handlers, locals or parameters, returning `void`.
    pub fn from_instructions(instructions: Vec<Instruction>) -> MethodBody {
        MethodBody::new(instructions, Vec::new(), Vec::new(), Vec::new(), TypeSig::Void)
    }

    pub fn with_init_locals(mut self, init_locals: bool) -> MethodBody {
        self.init_locals = init_locals;
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }

    /// The types of the local variables.
    pub fn locals(&self) -> &[TypeSig] {
        &self.locals
    }

    /// The types of the arguments, including `this` for instance methods.
    pub fn parameters(&self) -> &[TypeSig] {
        &self.parameters
    }

    pub fn return_type(&self) -> &TypeSig {
        &self.return_type
    }

    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }

    pub fn init_locals(&self) -> bool {
        self.init_locals
    }

    /// Get the index of the instruction at `offset`.
    pub fn index_of(&self, offset: u32) -> Result<usize, Error> {
        self.instructions
            .binary_search_by_key(&offset, |instruction| instruction.offset())
            .map_err(|_| Error::InstructionNotFound(offset))
    }

    pub fn instruction(&self, offset: u32) -> Result<&Instruction, Error> {
        Ok(&self.instructions[self.index_of(offset)?])
    }

    /// Replace the opcode and operand of the instruction at `offset`. The
    /// instruction keeps its offset and size, so no other offset moves.
    pub fn rewrite(&mut self, offset: u32, opcode: OpCode, operand: Operand) -> Result<(), Error> {
        let index = self.index_of(offset)?;
        self.instructions[index] = self.instructions[index].rewrite(opcode, operand);
        Ok(())
    }

    pub fn nop(&mut self, offset: u32) -> Result<(), Error> {
        self.rewrite(offset, OpCode::Nop, Operand::None)
    }

    /// Rewrite every short form into its long form. Offsets are kept, so
    /// exception handler ranges and branch targets stay valid.
    pub fn expand_macros(&mut self) {
        for instruction in self.instructions.iter_mut() {
            if instruction.opcode().long_form().is_some() {
                *instruction = instruction.expand_macro();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_macros_keeps_offsets() {
        let mut body = MethodBody::from_instructions(vec![
            Instruction::simple(0, OpCode::Ldc_I4_1),
            Instruction::new(1, OpCode::Brtrue_S, Operand::BranchTarget(4)),
            Instruction::simple(3, OpCode::Ldarg_0),
            Instruction::simple(4, OpCode::Ret),
        ]);
        body.expand_macros();

        let opcodes = body
            .instructions()
            .iter()
            .map(|instruction| (instruction.offset(), instruction.opcode()))
            .collect::<Vec<(u32, OpCode)>>();
        assert_eq!(
            opcodes,
            vec![(0, OpCode::Ldc_I4), (1, OpCode::Brtrue), (3, OpCode::Ldarg), (4, OpCode::Ret)]
        );
        assert_eq!(body.instruction(1).unwrap().branch_targets(), vec![4]);
        assert!(body.instruction(2).is_err());

        let next = body
            .instructions()
            .iter()
            .map(|instruction| instruction.next_offset())
            .collect::<Vec<u32>>();
        assert_eq!(next, vec![1, 3, 4, 5]);
    }

    #[test]
    fn rewrites_keep_the_layout() {
        let mut body = MethodBody::from_instructions(vec![
            Instruction::new(0, OpCode::Ldc_I4, Operand::Int32(7)),
            Instruction::simple(5, OpCode::Pop),
            Instruction::simple(6, OpCode::Ret),
        ]);
        body.nop(0).unwrap();
        body.rewrite(5, OpCode::Nop, Operand::None).unwrap();

        assert_eq!(body.instruction(0).unwrap().opcode(), OpCode::Nop);
        assert_eq!(body.instruction(0).unwrap().next_offset(), 5);
        assert_eq!(body.instruction(5).unwrap().next_offset(), 6);
        assert!(matches!(body.nop(3), Err(Error::InstructionNotFound(3))));
    }

    #[test]
    fn filter_entry() {
        let handler = ExceptionHandler::new(ExceptionHandlerKind::Filter { filter_start: 10 }, 0, 5, 14, 20);

        assert_eq!(handler.entry(), 10);
        assert!(handler.kind.receives_exception());
        assert!(!ExceptionHandlerKind::Finally.receives_exception());
    }
}

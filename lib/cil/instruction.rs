use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cil::{FieldRef, Member, MethodRef, MethodSignature, OpCode, OperandType, StackPop, StackPush, TypeSig};

/// A local variable or argument slot.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Variable {
    Local(u16),
    Argument(u16),
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Variable::Local(index) => write!(f, "V_{}", index),
            Variable::Argument(index) => write!(f, "A_{}", index),
        }
    }
}

/// The decoded operand of an instruction.
///
/// Branch targets are absolute offsets in the method body.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Operand {
    None,
    Int8(i8),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    BranchTarget(u32),
    Switch(Vec<u32>),
    Local(u16),
    Argument(u16),
    Method(MethodRef),
    Field(FieldRef),
    Type(TypeSig),
    Signature(MethodSignature),
    String(String),
    Member(Member),
}

/// A single CIL instruction.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Instruction {
    offset: u32,
    opcode: OpCode,
    operand: Operand,
    size: u32,
}

fn encoded_size(opcode: OpCode, operand: &Operand) -> u32 {
    let operand = match operand {
        Operand::Switch(targets) => 4 + 4 * targets.len() as u32,
        _ => opcode.operand_type().size(),
    };
    opcode.size() + operand
}

impl Instruction {
    pub fn new(offset: u32, opcode: OpCode, operand: Operand) -> Instruction {
        let size = encoded_size(opcode, &operand);
        Instruction {
            offset,
            opcode,
            operand,
            size,
        }
    }

    /// An instruction without an operand.
    pub fn simple(offset: u32, opcode: OpCode) -> Instruction {
        Instruction::new(offset, opcode, Operand::None)
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// The number of bytes this instruction occupies in the method body.
    ///
    /// An instruction produced by `rewrite` or `expand_macro` keeps the size
    /// of the one it replaced.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn next_offset(&self) -> u32 {
        self.offset + self.size()
    }

    pub fn branch_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::BranchTarget(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            Operand::Member(Member::Method(method)) => Some(method),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(field) => Some(field),
            Operand::Member(Member::Field(field)) => Some(field),
            _ => None,
        }
    }

    pub fn type_sig(&self) -> Option<&TypeSig> {
        match &self.operand {
            Operand::Type(sig) => Some(sig),
            _ => None,
        }
    }

    /// The calling signature of a call instruction.
    pub fn signature(&self) -> Option<&MethodSignature> {
        match &self.operand {
            Operand::Signature(signature) => Some(signature),
            _ => self.method().map(|method| method.signature()),
        }
    }

    /// The variable this instruction loads, stores, or takes the address of.
    ///
    /// Short forms like `ldloc.2` name their slot in the opcode.
    pub fn variable(&self) -> Option<Variable> {
        match self.opcode {
            OpCode::Ldarg_0 => return Some(Variable::Argument(0)),
            OpCode::Ldarg_1 => return Some(Variable::Argument(1)),
            OpCode::Ldarg_2 => return Some(Variable::Argument(2)),
            OpCode::Ldarg_3 => return Some(Variable::Argument(3)),
            OpCode::Ldloc_0 | OpCode::Stloc_0 => return Some(Variable::Local(0)),
            OpCode::Ldloc_1 | OpCode::Stloc_1 => return Some(Variable::Local(1)),
            OpCode::Ldloc_2 | OpCode::Stloc_2 => return Some(Variable::Local(2)),
            OpCode::Ldloc_3 | OpCode::Stloc_3 => return Some(Variable::Local(3)),
            _ => {}
        }
        match self.operand {
            Operand::Local(index) => Some(Variable::Local(index)),
            Operand::Argument(index) => Some(Variable::Argument(index)),
            _ => None,
        }
    }

    /// The constant an `ldc.i4` family instruction loads.
    pub fn int32_constant(&self) -> Option<i32> {
        match self.opcode {
            OpCode::Ldc_I4_M1 => Some(-1),
            OpCode::Ldc_I4_0 => Some(0),
            OpCode::Ldc_I4_1 => Some(1),
            OpCode::Ldc_I4_2 => Some(2),
            OpCode::Ldc_I4_3 => Some(3),
            OpCode::Ldc_I4_4 => Some(4),
            OpCode::Ldc_I4_5 => Some(5),
            OpCode::Ldc_I4_6 => Some(6),
            OpCode::Ldc_I4_7 => Some(7),
            OpCode::Ldc_I4_8 => Some(8),
            OpCode::Ldc_I4_S | OpCode::Ldc_I4 => match self.operand {
                Operand::Int8(value) => Some(value as i32),
                Operand::Int32(value) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    /// The number of values this instruction pops. `ret` pops one value when
    /// the method returns one.
    pub fn stack_pop_count(&self, returns_value: bool) -> usize {
        match self.opcode.stack_pop() {
            StackPop::VarPop => match self.opcode {
                OpCode::Ret => usize::from(returns_value),
                OpCode::Newobj => self
                    .signature()
                    .map(|signature| signature.parameters().len())
                    .unwrap_or(0),
                OpCode::Calli => self
                    .signature()
                    .map(|signature| signature.argument_count() + 1)
                    .unwrap_or(1),
                _ => self
                    .signature()
                    .map(|signature| signature.argument_count())
                    .unwrap_or(0),
            },
            StackPop::PopAll => 0,
            pop => pop.fixed_count().unwrap_or(0),
        }
    }

    pub fn stack_push_count(&self) -> usize {
        match self.opcode.stack_push() {
            StackPush::VarPush => self
                .signature()
                .map(|signature| usize::from(signature.returns_value()))
                .unwrap_or(0),
            push => push.fixed_count().unwrap_or(0),
        }
    }

    /// Rewrite a macro form into its long form, keeping the offset.
    pub fn expand_macro(&self) -> Instruction {
        let long = match self.opcode.long_form() {
            Some(long) => long,
            None => return self.clone(),
        };
        let operand = if let Some(value) = self.int32_constant() {
            Operand::Int32(value)
        } else if let Some(variable) = self.variable() {
            match variable {
                Variable::Local(index) => Operand::Local(index),
                Variable::Argument(index) => Operand::Argument(index),
            }
        } else {
            self.operand.clone()
        };
        self.rewrite(long, operand)
    }

    /// Replace the opcode and operand in place: the offset and size stay
    /// those of `self`.
    pub fn rewrite(&self, opcode: OpCode, operand: Operand) -> Instruction {
        Instruction {
            offset: self.offset,
            opcode,
            operand,
            size: self.size,
        }
    }

    /// Returns true if the operand shape matches what the opcode expects.
    pub fn is_well_formed(&self) -> bool {
        match (self.opcode.operand_type(), &self.operand) {
            (OperandType::None, Operand::None) => true,
            (OperandType::ShortBrTarget, Operand::BranchTarget(_))
            | (OperandType::BrTarget, Operand::BranchTarget(_)) => true,
            (OperandType::ShortI, Operand::Int8(_)) | (OperandType::ShortI, Operand::Int32(_)) => true,
            (OperandType::I, Operand::Int32(_)) => true,
            (OperandType::I8, Operand::Int64(_)) => true,
            (OperandType::ShortR, Operand::Float32(_)) => true,
            (OperandType::R, Operand::Float64(_)) => true,
            (OperandType::ShortVariable, Operand::Local(_))
            | (OperandType::ShortVariable, Operand::Argument(_))
            | (OperandType::Variable, Operand::Local(_))
            | (OperandType::Variable, Operand::Argument(_)) => true,
            (OperandType::Method, Operand::Method(_)) => true,
            (OperandType::Field, Operand::Field(_)) => true,
            (OperandType::Type, Operand::Type(_)) => true,
            (OperandType::Sig, Operand::Signature(_)) => true,
            (OperandType::String, Operand::String(_)) => true,
            (OperandType::Tok, Operand::Member(_)) => true,
            (OperandType::Switch, Operand::Switch(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int8(value) => write!(f, " {}", value),
            Operand::Int32(value) => write!(f, " {}", value),
            Operand::Int64(value) => write!(f, " {}", value),
            Operand::Float32(value) => write!(f, " {}", value),
            Operand::Float64(value) => write!(f, " {}", value),
            Operand::BranchTarget(target) => write!(f, " IL_{:04x}", target),
            Operand::Switch(targets) => write!(
                f,
                " ({})",
                targets
                    .iter()
                    .map(|target| format!("IL_{:04x}", target))
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            Operand::Local(index) => write!(f, " V_{}", index),
            Operand::Argument(index) => write!(f, " A_{}", index),
            Operand::Method(method) => write!(f, " {}", method),
            Operand::Field(field) => write!(f, " {}", field),
            Operand::Type(sig) => write!(f, " {}", sig),
            Operand::Signature(signature) => write!(f, " ({} params)", signature.parameters().len()),
            Operand::String(string) => write!(f, " {:?}", string),
            Operand::Member(member) => write!(f, " {}", member),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cil::{Token, TypeRef};

    fn concat() -> MethodRef {
        let string = TypeRef::new(Token::new(0x0100_0001), "System", "String", false);
        MethodRef::new(
            Token::new(0x0A00_0001),
            string,
            "Concat",
            MethodSignature::static_method(vec![TypeSig::String, TypeSig::String], TypeSig::String),
            false,
        )
    }

    #[test]
    fn sizes() {
        assert_eq!(Instruction::simple(0, OpCode::Add).size(), 1);
        assert_eq!(Instruction::new(0, OpCode::Ldc_I4_S, Operand::Int8(9)).size(), 2);
        assert_eq!(Instruction::new(0, OpCode::Ldloc, Operand::Local(300)).size(), 4);
        assert_eq!(Instruction::new(0, OpCode::Switch, Operand::Switch(vec![1, 2, 3])).size(), 17);
        assert_eq!(Instruction::new(6, OpCode::Ldc_I8, Operand::Int64(1)).next_offset(), 15);
    }

    #[test]
    fn stack_counts_follow_the_signature() {
        let call = Instruction::new(0, OpCode::Call, Operand::Method(concat()));
        assert_eq!(call.stack_pop_count(false), 2);
        assert_eq!(call.stack_push_count(), 1);

        let ret = Instruction::simple(0, OpCode::Ret);
        assert_eq!(ret.stack_pop_count(true), 1);
        assert_eq!(ret.stack_pop_count(false), 0);

        let calli = Instruction::new(
            0,
            OpCode::Calli,
            Operand::Signature(MethodSignature::instance_method(vec![TypeSig::I4], TypeSig::Void)),
        );
        assert_eq!(calli.stack_pop_count(false), 3);
        assert_eq!(calli.stack_push_count(), 0);
        assert_eq!(Instruction::simple(0, OpCode::Dup).stack_push_count(), 2);
    }

    #[test]
    fn macros_expand_in_place() {
        let ldloc = Instruction::simple(4, OpCode::Ldloc_2).expand_macro();
        assert_eq!((ldloc.opcode(), ldloc.operand()), (OpCode::Ldloc, &Operand::Local(2)));
        assert_eq!(ldloc.size(), 1);
        assert_eq!(ldloc.next_offset(), 5);

        let ldc = Instruction::new(5, OpCode::Ldc_I4_S, Operand::Int8(-3)).expand_macro();
        assert_eq!((ldc.opcode(), ldc.operand()), (OpCode::Ldc_I4, &Operand::Int32(-3)));
        assert_eq!(ldc.next_offset(), 7);

        let branch = Instruction::new(7, OpCode::Brtrue_S, Operand::BranchTarget(2)).expand_macro();
        assert_eq!(branch.opcode(), OpCode::Brtrue);
        assert_eq!(branch.branch_targets(), vec![2]);
        assert_eq!(branch.next_offset(), 9);
        assert!(branch.is_well_formed());

        let starg = Instruction::new(9, OpCode::Starg_S, Operand::Argument(1)).expand_macro();
        assert_eq!(starg.variable(), Some(Variable::Argument(1)));
    }

    #[test]
    fn rewrite_keeps_offset_and_size() {
        let call = Instruction::new(0x12, OpCode::Call, Operand::Method(concat()));
        let ldstr = call.rewrite(OpCode::Ldstr, Operand::String("plain".to_string()));
        assert_eq!(ldstr.offset(), 0x12);
        assert_eq!(ldstr.next_offset(), 0x17);

        let nop = Instruction::new(0x20, OpCode::Ldc_I4, Operand::Int32(1)).rewrite(OpCode::Nop, Operand::None);
        assert_eq!(nop.size(), 5);
        assert_eq!(nop.to_string(), "IL_0020: nop");
    }

    #[test]
    fn display() {
        let instruction = Instruction::new(0x1c, OpCode::Ldstr, Operand::String("key".to_string()));
        assert_eq!(instruction.to_string(), "IL_001c: ldstr \"key\"");
    }
}

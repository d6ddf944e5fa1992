use crate::architecture::{FlowControl, InstructionSetArchitecture};
use crate::cil::{Instruction, OpCode, StackPop, Variable};

/// The CIL instruction set, as seen from inside one method.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CilArchitecture {
    returns_value: bool,
}

impl CilArchitecture {
    /// `returns_value` tells whether `ret` pops a value in this method.
    pub fn new(returns_value: bool) -> CilArchitecture {
        CilArchitecture { returns_value }
    }

    pub fn returns_value(&self) -> bool {
        self.returns_value
    }
}

impl InstructionSetArchitecture<Instruction> for CilArchitecture {
    type Variable = Variable;

    fn offset(&self, instruction: &Instruction) -> u32 {
        instruction.offset()
    }

    fn size(&self, instruction: &Instruction) -> u32 {
        instruction.size()
    }

    fn flow_control(&self, instruction: &Instruction) -> FlowControl {
        instruction.opcode().flow_control()
    }

    fn branch_targets(&self, instruction: &Instruction) -> Vec<u32> {
        instruction.branch_targets()
    }

    fn stack_pop_count(&self, instruction: &Instruction) -> usize {
        instruction.stack_pop_count(self.returns_value)
    }

    fn stack_push_count(&self, instruction: &Instruction) -> usize {
        instruction.stack_push_count()
    }

    fn clears_stack(&self, instruction: &Instruction) -> bool {
        instruction.opcode().stack_pop() == StackPop::PopAll
    }

    fn variables_read(&self, instruction: &Instruction) -> Vec<Variable> {
        match instruction.opcode() {
            OpCode::Ldarg_0
            | OpCode::Ldarg_1
            | OpCode::Ldarg_2
            | OpCode::Ldarg_3
            | OpCode::Ldarg_S
            | OpCode::Ldarg
            | OpCode::Ldloc_0
            | OpCode::Ldloc_1
            | OpCode::Ldloc_2
            | OpCode::Ldloc_3
            | OpCode::Ldloc_S
            | OpCode::Ldloc => instruction.variable().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn variables_written(&self, instruction: &Instruction) -> Vec<Variable> {
        match instruction.opcode() {
            OpCode::Starg_S
            | OpCode::Starg
            | OpCode::Stloc_0
            | OpCode::Stloc_1
            | OpCode::Stloc_2
            | OpCode::Stloc_3
            | OpCode::Stloc_S
            | OpCode::Stloc => instruction.variable().into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

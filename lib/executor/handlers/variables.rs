use crate::cil::{Instruction, OpCode};
use crate::executor::handlers::invalid_operand;
use crate::executor::{DispatchResult, ExecutionContext, OpCodeHandler, Successor};
use crate::value::{Integer64, Pointer, Value};

pub struct LoadVariable;

impl OpCodeHandler for LoadVariable {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Ldarg_0,
            OpCode::Ldarg_1,
            OpCode::Ldarg_2,
            OpCode::Ldarg_3,
            OpCode::Ldarg_S,
            OpCode::Ldarg,
            OpCode::Ldloc_0,
            OpCode::Ldloc_1,
            OpCode::Ldloc_2,
            OpCode::Ldloc_3,
            OpCode::Ldloc_S,
            OpCode::Ldloc,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let variable = instruction
            .variable()
            .ok_or_else(|| invalid_operand(instruction, "variable"))?;
        let value = context.variables().get(variable)?.clone();
        context.stack_mut().push(value)?;
        Ok(Successor::FallThrough)
    }
}

pub struct StoreVariable;

impl OpCodeHandler for StoreVariable {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Stloc_0,
            OpCode::Stloc_1,
            OpCode::Stloc_2,
            OpCode::Stloc_3,
            OpCode::Stloc_S,
            OpCode::Stloc,
            OpCode::Starg_S,
            OpCode::Starg,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let variable = instruction
            .variable()
            .ok_or_else(|| invalid_operand(instruction, "variable"))?;
        let value = context.stack_mut().pop()?;
        context.variables_mut().set(variable, value)?;
        Ok(Successor::FallThrough)
    }
}

/// Taking the address of a variable lets writes reach it which we do not
/// track, so the variable becomes unknown.
pub struct LoadVariableAddress;

impl OpCodeHandler for LoadVariableAddress {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldarga_S, OpCode::Ldarga, OpCode::Ldloca_S, OpCode::Ldloca]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let variable = instruction
            .variable()
            .ok_or_else(|| invalid_operand(instruction, "variable"))?;
        context.variables_mut().mark_unknown(variable)?;
        let is_32bit = context.is_32bit();
        context.stack_mut().push(Value::Pointer(Pointer::unknown(is_32bit)))?;
        Ok(Successor::FallThrough)
    }
}

pub struct ArgList;

impl OpCodeHandler for ArgList {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Arglist]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        context.stack_mut().push(Value::NativeInt(Integer64::unknown()))?;
        Ok(Successor::FallThrough)
    }
}

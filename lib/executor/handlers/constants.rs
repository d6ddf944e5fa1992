use crate::cil::{Instruction, OpCode, Operand};
use crate::executor::handlers::invalid_operand;
use crate::executor::{DispatchResult, ExecutionContext, OpCodeHandler, Successor};
use crate::memory::HeapObject;
use crate::value::{ObjectReference, Value};

pub struct LdNull;

impl OpCodeHandler for LdNull {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldnull]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        context.stack_mut().push(Value::null())?;
        Ok(Successor::FallThrough)
    }
}

pub struct LdcI4;

impl OpCodeHandler for LdcI4 {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Ldc_I4_M1,
            OpCode::Ldc_I4_0,
            OpCode::Ldc_I4_1,
            OpCode::Ldc_I4_2,
            OpCode::Ldc_I4_3,
            OpCode::Ldc_I4_4,
            OpCode::Ldc_I4_5,
            OpCode::Ldc_I4_6,
            OpCode::Ldc_I4_7,
            OpCode::Ldc_I4_8,
            OpCode::Ldc_I4_S,
            OpCode::Ldc_I4,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let value = instruction
            .int32_constant()
            .ok_or_else(|| invalid_operand(instruction, "int32"))?;
        context.stack_mut().push(Value::int32(value))?;
        Ok(Successor::FallThrough)
    }
}

pub struct LdcI8;

impl OpCodeHandler for LdcI8 {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldc_I8]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let value = match instruction.operand() {
            Operand::Int64(value) => *value,
            _ => return Err(invalid_operand(instruction, "int64")),
        };
        context.stack_mut().push(Value::int64(value))?;
        Ok(Successor::FallThrough)
    }
}

pub struct LdcR;

impl OpCodeHandler for LdcR {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldc_R4, OpCode::Ldc_R8]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let value = match instruction.operand() {
            Operand::Float32(value) => *value as f64,
            Operand::Float64(value) => *value,
            _ => return Err(invalid_operand(instruction, "float")),
        };
        context.stack_mut().push(Value::float(value))?;
        Ok(Successor::FallThrough)
    }
}

pub struct LdStr;

impl OpCodeHandler for LdStr {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldstr]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let string = match instruction.operand() {
            Operand::String(string) => string.clone(),
            _ => return Err(invalid_operand(instruction, "string")),
        };
        let reference = context.heap_mut().allocate(HeapObject::String(string));
        context
            .stack_mut()
            .push(Value::Object(ObjectReference::Known(reference)))?;
        Ok(Successor::FallThrough)
    }
}

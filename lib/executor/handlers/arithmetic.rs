//! Binary and unary numeric operators.
//!
//! Operands are matched by their stack types as the CLI prescribes:
//! `int32` with `int32`, `int64` with `int64`, native integers with `int32`
//! or native integers, floats with floats, and the pointer forms `add` and
//! `sub` allow. Anything else is an invalid program.

use crate::cil::{Instruction, OpCode};
use crate::executor::{DispatchFault, DispatchResult, ExecutionContext, OpCodeHandler, Successor};
use crate::value::{Float64, Integer32, Integer64, PartialInteger, Pointer, Value, Word};

/// The operands of a binary numeric instruction, brought to a common shape.
pub(super) enum NumericOperands {
    Int32(Integer32, Integer32),
    Int64(Integer64, Integer64),
    Native(Integer64, Integer64),
    Float(Float64, Float64),
    PointerInteger(Pointer, Integer64),
    IntegerPointer(Integer64, Pointer),
    Pointers(Pointer, Pointer),
}

pub(super) fn numeric_operands(lhs: &Value, rhs: &Value, is_32bit: bool) -> Result<NumericOperands, DispatchFault> {
    let native = |value: &Integer32| Value::native(value.resize(true), is_32bit);
    Ok(match (lhs, rhs) {
        (Value::Int32(lhs), Value::Int32(rhs)) => NumericOperands::Int32(*lhs, *rhs),
        (Value::Int64(lhs), Value::Int64(rhs)) => NumericOperands::Int64(*lhs, *rhs),
        (Value::NativeInt(lhs), Value::NativeInt(rhs)) => NumericOperands::Native(*lhs, *rhs),
        (Value::NativeInt(lhs), Value::Int32(rhs)) => NumericOperands::Native(*lhs, native(rhs)),
        (Value::Int32(lhs), Value::NativeInt(rhs)) => NumericOperands::Native(native(lhs), *rhs),
        (Value::Float(lhs), Value::Float(rhs)) => NumericOperands::Float(*lhs, *rhs),
        (Value::Pointer(lhs), Value::Int32(rhs)) => NumericOperands::PointerInteger(*lhs, rhs.resize(true)),
        (Value::Pointer(lhs), Value::NativeInt(rhs)) => NumericOperands::PointerInteger(*lhs, *rhs),
        (Value::Int32(lhs), Value::Pointer(rhs)) => NumericOperands::IntegerPointer(lhs.resize(true), *rhs),
        (Value::NativeInt(lhs), Value::Pointer(rhs)) => NumericOperands::IntegerPointer(*lhs, *rhs),
        (Value::Pointer(lhs), Value::Pointer(rhs)) => NumericOperands::Pointers(*lhs, *rhs),
        (lhs, rhs) => {
            return Err(DispatchFault::InvalidProgram(format!(
                "operands of type {} and {} do not match",
                lhs.kind(),
                rhs.kind()
            )))
        }
    })
}

fn unsupported(opcode: OpCode, operands: &str) -> DispatchFault {
    DispatchFault::InvalidProgram(format!("{} is not defined for {} operands", opcode, operands))
}

fn integer_operation<T: Word>(
    opcode: OpCode,
    lhs: &PartialInteger<T>,
    rhs: &PartialInteger<T>,
) -> Result<PartialInteger<T>, DispatchFault> {
    Ok(match opcode {
        OpCode::Add => lhs.add(rhs),
        OpCode::Sub => lhs.sub(rhs),
        OpCode::Mul => lhs.mul(rhs),
        OpCode::Div => lhs.div(rhs, true)?,
        OpCode::Div_Un => lhs.div(rhs, false)?,
        OpCode::Rem => lhs.rem(rhs, true)?,
        OpCode::Rem_Un => lhs.rem(rhs, false)?,
        OpCode::And => lhs.and(rhs),
        OpCode::Or => lhs.or(rhs),
        OpCode::Xor => lhs.xor(rhs),
        OpCode::Add_Ovf => lhs.checked_add(rhs, true)?,
        OpCode::Add_Ovf_Un => lhs.checked_add(rhs, false)?,
        OpCode::Sub_Ovf => lhs.checked_sub(rhs, true)?,
        OpCode::Sub_Ovf_Un => lhs.checked_sub(rhs, false)?,
        OpCode::Mul_Ovf => lhs.checked_mul(rhs, true)?,
        OpCode::Mul_Ovf_Un => lhs.checked_mul(rhs, false)?,
        opcode => return Err(unsupported(opcode, "integer")),
    })
}

/// Native integer arithmetic happens at the pointer width.
fn native_operation(
    opcode: OpCode,
    lhs: &Integer64,
    rhs: &Integer64,
    is_32bit: bool,
) -> Result<Integer64, DispatchFault> {
    if is_32bit {
        let result = integer_operation(opcode, &lhs.resize::<u32>(false), &rhs.resize::<u32>(false))?;
        Ok(result.resize(true))
    } else {
        integer_operation(opcode, lhs, rhs)
    }
}

fn float_operation(opcode: OpCode, lhs: &Float64, rhs: &Float64) -> Result<Float64, DispatchFault> {
    Ok(match opcode {
        OpCode::Add => lhs.add(rhs),
        OpCode::Sub => lhs.sub(rhs),
        OpCode::Mul => lhs.mul(rhs),
        OpCode::Div => lhs.div(rhs),
        OpCode::Rem => lhs.rem(rhs),
        opcode => return Err(unsupported(opcode, "float")),
    })
}

fn offset_pointer(pointer: &Pointer, offset: &Integer64, negate: bool) -> Pointer {
    match offset.known_value() {
        Some(offset) if negate => pointer.sub(offset as i64),
        Some(offset) => pointer.add(offset as i64),
        None => Pointer::unknown(pointer.is_32bit()),
    }
}

/// Evaluate a binary numeric operator.
pub(super) fn binary(opcode: OpCode, lhs: &Value, rhs: &Value, is_32bit: bool) -> Result<Value, DispatchFault> {
    Ok(match numeric_operands(lhs, rhs, is_32bit)? {
        NumericOperands::Int32(lhs, rhs) => Value::Int32(integer_operation(opcode, &lhs, &rhs)?),
        NumericOperands::Int64(lhs, rhs) => Value::Int64(integer_operation(opcode, &lhs, &rhs)?),
        NumericOperands::Native(lhs, rhs) => Value::NativeInt(native_operation(opcode, &lhs, &rhs, is_32bit)?),
        NumericOperands::Float(lhs, rhs) => Value::Float(float_operation(opcode, &lhs, &rhs)?),
        NumericOperands::PointerInteger(pointer, offset) => match opcode {
            OpCode::Add | OpCode::Add_Ovf_Un => Value::Pointer(offset_pointer(&pointer, &offset, false)),
            OpCode::Sub | OpCode::Sub_Ovf_Un => Value::Pointer(offset_pointer(&pointer, &offset, true)),
            opcode => return Err(unsupported(opcode, "pointer and integer")),
        },
        NumericOperands::IntegerPointer(offset, pointer) => match opcode {
            OpCode::Add | OpCode::Add_Ovf_Un => Value::Pointer(offset_pointer(&pointer, &offset, false)),
            opcode => return Err(unsupported(opcode, "integer and pointer")),
        },
        NumericOperands::Pointers(lhs, rhs) => match opcode {
            OpCode::Sub | OpCode::Sub_Ovf_Un => match lhs.difference(&rhs) {
                Some(difference) => Value::native_int(difference, is_32bit),
                None => Value::NativeInt(Integer64::unknown()),
            },
            opcode => return Err(unsupported(opcode, "pointer")),
        },
    })
}

pub struct BinaryNumeric;

impl OpCodeHandler for BinaryNumeric {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Add,
            OpCode::Sub,
            OpCode::Mul,
            OpCode::Div,
            OpCode::Div_Un,
            OpCode::Rem,
            OpCode::Rem_Un,
            OpCode::And,
            OpCode::Or,
            OpCode::Xor,
            OpCode::Add_Ovf,
            OpCode::Add_Ovf_Un,
            OpCode::Sub_Ovf,
            OpCode::Sub_Ovf_Un,
            OpCode::Mul_Ovf,
            OpCode::Mul_Ovf_Un,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let rhs = context.stack_mut().pop()?;
        let lhs = context.stack_mut().pop()?;
        let result = binary(instruction.opcode(), &lhs, &rhs, context.is_32bit())?;
        context.stack_mut().push(result)?;
        Ok(Successor::FallThrough)
    }
}

/// `shl`, `shr` and `shr.un`. The shifted value keeps its type. The amount
/// is an `int32` or native integer.
pub struct Shift;

impl Shift {
    fn shift<T: Word>(opcode: OpCode, value: &PartialInteger<T>, amount: Option<u64>) -> PartialInteger<T> {
        let amount = match amount {
            Some(amount) => amount.min(u64::from(u32::MAX)) as u32,
            None => return PartialInteger::unknown(),
        };
        match opcode {
            OpCode::Shl => value.shl(amount),
            OpCode::Shr => value.shr(amount, true),
            _ => value.shr(amount, false),
        }
    }
}

impl OpCodeHandler for Shift {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Shl, OpCode::Shr, OpCode::Shr_Un]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let amount = context.stack_mut().pop()?;
        let value = context.stack_mut().pop()?;
        let opcode = instruction.opcode();
        let is_32bit = context.is_32bit();

        let amount = match &amount {
            Value::Int32(amount) => amount.known_value().map(u64::from),
            Value::NativeInt(amount) => amount.known_value(),
            amount => {
                return Err(DispatchFault::InvalidProgram(format!(
                    "shift amount of type {}",
                    amount.kind()
                )))
            }
        };

        let result = match &value {
            Value::Int32(value) => Value::Int32(Shift::shift(opcode, value, amount)),
            Value::Int64(value) => Value::Int64(Shift::shift(opcode, value, amount)),
            Value::NativeInt(value) if is_32bit => {
                let narrow = value.resize::<u32>(false);
                Value::NativeInt(Shift::shift(opcode, &narrow, amount).resize(true))
            }
            Value::NativeInt(value) => Value::NativeInt(Shift::shift(opcode, value, amount)),
            value => return Err(unsupported(opcode, value.kind())),
        };
        context.stack_mut().push(result)?;
        Ok(Successor::FallThrough)
    }
}

pub struct Neg;

impl OpCodeHandler for Neg {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Neg]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let is_32bit = context.is_32bit();
        let result = match context.stack_mut().pop()? {
            Value::Int32(value) => Value::Int32(value.neg()),
            Value::Int64(value) => Value::Int64(value.neg()),
            Value::NativeInt(value) => Value::NativeInt(Value::native(value.neg(), is_32bit)),
            Value::Float(value) => Value::Float(value.neg()),
            value => return Err(unsupported(instruction.opcode(), value.kind())),
        };
        context.stack_mut().push(result)?;
        Ok(Successor::FallThrough)
    }
}

pub struct Not;

impl OpCodeHandler for Not {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Not]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let result = match context.stack_mut().pop()? {
            Value::Int32(value) => Value::Int32(value.not()),
            Value::Int64(value) => Value::Int64(value.not()),
            Value::NativeInt(value) => Value::NativeInt(value.not()),
            value => return Err(unsupported(instruction.opcode(), value.kind())),
        };
        context.stack_mut().push(result)?;
        Ok(Successor::FallThrough)
    }
}

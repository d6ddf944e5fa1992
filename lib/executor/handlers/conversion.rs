//! The `conv` family.

use crate::cil::{Instruction, OpCode, TypeSig};
use crate::executor::{DispatchFault, DispatchResult, ExecutionContext, OpCodeHandler, Successor};
use crate::types::Trilean;
use crate::value::{Float64, Integer64, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Target {
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    I,
    U,
}

/// How an overflow-checked conversion interprets its source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Check {
    None,
    Signed,
    Unsigned,
}

impl Target {
    fn of(opcode: OpCode) -> Option<(Target, Check)> {
        Some(match opcode {
            OpCode::Conv_I1 => (Target::I1, Check::None),
            OpCode::Conv_U1 => (Target::U1, Check::None),
            OpCode::Conv_I2 => (Target::I2, Check::None),
            OpCode::Conv_U2 => (Target::U2, Check::None),
            OpCode::Conv_I4 => (Target::I4, Check::None),
            OpCode::Conv_U4 => (Target::U4, Check::None),
            OpCode::Conv_I8 => (Target::I8, Check::None),
            OpCode::Conv_U8 => (Target::U8, Check::None),
            OpCode::Conv_I => (Target::I, Check::None),
            OpCode::Conv_U => (Target::U, Check::None),
            OpCode::Conv_Ovf_I1 => (Target::I1, Check::Signed),
            OpCode::Conv_Ovf_U1 => (Target::U1, Check::Signed),
            OpCode::Conv_Ovf_I2 => (Target::I2, Check::Signed),
            OpCode::Conv_Ovf_U2 => (Target::U2, Check::Signed),
            OpCode::Conv_Ovf_I4 => (Target::I4, Check::Signed),
            OpCode::Conv_Ovf_U4 => (Target::U4, Check::Signed),
            OpCode::Conv_Ovf_I8 => (Target::I8, Check::Signed),
            OpCode::Conv_Ovf_U8 => (Target::U8, Check::Signed),
            OpCode::Conv_Ovf_I => (Target::I, Check::Signed),
            OpCode::Conv_Ovf_U => (Target::U, Check::Signed),
            OpCode::Conv_Ovf_I1_Un => (Target::I1, Check::Unsigned),
            OpCode::Conv_Ovf_U1_Un => (Target::U1, Check::Unsigned),
            OpCode::Conv_Ovf_I2_Un => (Target::I2, Check::Unsigned),
            OpCode::Conv_Ovf_U2_Un => (Target::U2, Check::Unsigned),
            OpCode::Conv_Ovf_I4_Un => (Target::I4, Check::Unsigned),
            OpCode::Conv_Ovf_U4_Un => (Target::U4, Check::Unsigned),
            OpCode::Conv_Ovf_I8_Un => (Target::I8, Check::Unsigned),
            OpCode::Conv_Ovf_U8_Un => (Target::U8, Check::Unsigned),
            OpCode::Conv_Ovf_I_Un => (Target::I, Check::Unsigned),
            OpCode::Conv_Ovf_U_Un => (Target::U, Check::Unsigned),
            _ => return None,
        })
    }

    fn type_sig(self) -> TypeSig {
        match self {
            Target::I1 => TypeSig::I1,
            Target::U1 => TypeSig::U1,
            Target::I2 => TypeSig::I2,
            Target::U2 => TypeSig::U2,
            Target::I4 => TypeSig::I4,
            Target::U4 => TypeSig::U4,
            Target::I8 => TypeSig::I8,
            Target::U8 => TypeSig::U8,
            Target::I => TypeSig::I,
            Target::U => TypeSig::U,
        }
    }

    fn is_unsigned(self) -> bool {
        matches!(self, Target::U1 | Target::U2 | Target::U4 | Target::U8 | Target::U)
    }

    /// The inclusive range of values the target holds.
    fn range(self, is_32bit: bool) -> (i128, i128) {
        match self {
            Target::I1 => (i8::MIN.into(), i8::MAX.into()),
            Target::U1 => (0, u8::MAX.into()),
            Target::I2 => (i16::MIN.into(), i16::MAX.into()),
            Target::U2 => (0, u16::MAX.into()),
            Target::I4 => (i32::MIN.into(), i32::MAX.into()),
            Target::U4 => (0, u32::MAX.into()),
            Target::I8 => (i64::MIN.into(), i64::MAX.into()),
            Target::U8 => (0, u64::MAX.into()),
            Target::I if is_32bit => Target::I4.range(true),
            Target::U if is_32bit => Target::U4.range(true),
            Target::I => Target::I8.range(false),
            Target::U => Target::U8.range(false),
        }
    }

    /// Build a value of this type from an integer known to fit.
    fn value(self, value: i128, is_32bit: bool) -> Value {
        Value::Int64(Integer64::known(value as u64)).coerce(&self.type_sig(), is_32bit)
    }
}

/// The bits of an integer value widened to 64 bits, zero-extending when
/// `zero_extend` is set.
fn integer_bits(value: &Value, zero_extend: bool, is_32bit: bool) -> Option<Integer64> {
    match value {
        Value::Int32(value) => Some(value.resize(!zero_extend)),
        Value::Int64(value) => Some(*value),
        Value::NativeInt(value) if is_32bit => Some(value.resize::<u32>(false).resize(!zero_extend)),
        Value::NativeInt(value) => Some(*value),
        _ => None,
    }
}

/// The numeric value of a fully known integer, read as signed or unsigned.
fn integer_value(value: &Value, unsigned: bool, is_32bit: bool) -> Option<i128> {
    match value {
        Value::Int32(value) => value
            .known_value()
            .map(|value| if unsigned { value.into() } else { (value as i32).into() }),
        Value::Int64(value) => value
            .known_value()
            .map(|value| if unsigned { value.into() } else { (value as i64).into() }),
        Value::NativeInt(value) if is_32bit && unsigned => value.known_value().map(|value| (value as u32).into()),
        Value::NativeInt(value) => value
            .known_value()
            .map(|value| if unsigned { value.into() } else { (value as i64).into() }),
        _ => None,
    }
}

fn float_to_integer(value: &Float64, target: Target, check: Check, is_32bit: bool) -> Result<Value, DispatchFault> {
    let value = match value.known_value() {
        Some(value) => value.trunc(),
        None => return Ok(Value::unknown_of(&target.type_sig(), is_32bit)),
    };
    let (min, max) = target.range(is_32bit);
    if value.is_nan() || value < min as f64 || value > max as f64 {
        if check != Check::None {
            return Err(DispatchFault::Overflow);
        }
        // The result is unspecified.
        return Ok(Value::unknown_of(&target.type_sig(), is_32bit));
    }
    Ok(target.value(value as i128, is_32bit))
}

pub struct ConvertInteger;

impl OpCodeHandler for ConvertInteger {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Conv_I1,
            OpCode::Conv_U1,
            OpCode::Conv_I2,
            OpCode::Conv_U2,
            OpCode::Conv_I4,
            OpCode::Conv_U4,
            OpCode::Conv_I8,
            OpCode::Conv_U8,
            OpCode::Conv_I,
            OpCode::Conv_U,
            OpCode::Conv_Ovf_I1,
            OpCode::Conv_Ovf_U1,
            OpCode::Conv_Ovf_I2,
            OpCode::Conv_Ovf_U2,
            OpCode::Conv_Ovf_I4,
            OpCode::Conv_Ovf_U4,
            OpCode::Conv_Ovf_I8,
            OpCode::Conv_Ovf_U8,
            OpCode::Conv_Ovf_I,
            OpCode::Conv_Ovf_U,
            OpCode::Conv_Ovf_I1_Un,
            OpCode::Conv_Ovf_U1_Un,
            OpCode::Conv_Ovf_I2_Un,
            OpCode::Conv_Ovf_U2_Un,
            OpCode::Conv_Ovf_I4_Un,
            OpCode::Conv_Ovf_U4_Un,
            OpCode::Conv_Ovf_I8_Un,
            OpCode::Conv_Ovf_U8_Un,
            OpCode::Conv_Ovf_I_Un,
            OpCode::Conv_Ovf_U_Un,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let (target, check) = Target::of(instruction.opcode())
            .ok_or_else(|| DispatchFault::InvalidProgram(format!("{} is not a conversion", instruction.opcode())))?;
        let is_32bit = context.is_32bit();
        let value = context.stack_mut().pop()?;

        let result = match &value {
            Value::Float(value) => float_to_integer(value, target, check, is_32bit)?,
            Value::Pointer(pointer) if matches!(target, Target::I | Target::U) => Value::Pointer(*pointer),
            Value::Pointer(_) => Value::unknown_of(&target.type_sig(), is_32bit),
            Value::Object(_) => {
                return Err(DispatchFault::InvalidProgram(format!(
                    "{} of an object reference",
                    instruction.opcode()
                )))
            }
            value if check == Check::None => match integer_bits(value, target.is_unsigned(), is_32bit) {
                Some(bits) => Value::Int64(bits).coerce(&target.type_sig(), is_32bit),
                None => Value::unknown_of(&target.type_sig(), is_32bit),
            },
            value => match integer_value(value, check == Check::Unsigned, is_32bit) {
                Some(number) => {
                    let (min, max) = target.range(is_32bit);
                    if number < min || number > max {
                        return Err(DispatchFault::Overflow);
                    }
                    target.value(number, is_32bit)
                }
                None => Value::unknown_of(&target.type_sig(), is_32bit),
            },
        };

        context.stack_mut().push(result)?;
        Ok(Successor::FallThrough)
    }
}

pub struct ConvertFloat;

impl OpCodeHandler for ConvertFloat {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Conv_R4, OpCode::Conv_R8, OpCode::Conv_R_Un]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let opcode = instruction.opcode();
        let is_32bit = context.is_32bit();
        let value = context.stack_mut().pop()?;

        let result = match &value {
            Value::Float(value) => *value,
            Value::Int32(_) | Value::Int64(_) | Value::NativeInt(_) => {
                match integer_value(&value, opcode == OpCode::Conv_R_Un, is_32bit) {
                    Some(number) => Float64::known(number as f64),
                    None => Float64::unknown(),
                }
            }
            value => {
                return Err(DispatchFault::InvalidProgram(format!(
                    "{} of a value of type {}",
                    opcode,
                    value.kind()
                )))
            }
        };
        let result = if opcode == OpCode::Conv_R4 {
            result.narrow().widen()
        } else {
            result
        };

        context.stack_mut().push(Value::Float(result))?;
        Ok(Successor::FallThrough)
    }
}

/// `ckfinite` raises an arithmetic exception for NaN and infinities.
pub struct CheckFinite;

impl OpCodeHandler for CheckFinite {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ckfinite]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        match context.stack().peek()? {
            Value::Float(value) => {
                if value.is_finite() == Trilean::False {
                    return Err(DispatchFault::Overflow);
                }
            }
            value => return Err(DispatchFault::InvalidProgram(format!("{} of {}", instruction.opcode(), value.kind()))),
        }
        Ok(Successor::FallThrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::handlers::tests::{context, run};
    use crate::value::Integer32;

    #[test]
    fn truncation_and_extension() {
        let mut context = context();
        assert_eq!(
            run(&mut context, &[Value::int32(0x1ff)], OpCode::Conv_I1).unwrap(),
            vec![Value::int32(-1)]
        );
        assert_eq!(
            run(&mut context, &[Value::int32(-1)], OpCode::Conv_U8).unwrap(),
            vec![Value::int64(0xffff_ffff)]
        );
        assert_eq!(
            run(&mut context, &[Value::int32(-1)], OpCode::Conv_I8).unwrap(),
            vec![Value::int64(-1)]
        );
        assert_eq!(
            run(&mut context, &[Value::int64(0x1_0000_0005)], OpCode::Conv_I4).unwrap(),
            vec![Value::int32(5)]
        );
        assert_eq!(
            run(&mut context, &[Value::float(-2.75)], OpCode::Conv_I4).unwrap(),
            vec![Value::int32(-2)]
        );
    }

    #[test]
    fn partially_known_bits_survive() {
        let mut context = context();
        let value = Value::Int32(Integer32::parse_bits(&format!("{}{}", "?".repeat(24), "10100101")).unwrap());
        let stack = run(&mut context, &[value], OpCode::Conv_U1).unwrap();
        assert_eq!(stack, vec![Value::int32(0xa5)]);
    }

    #[test]
    fn overflow_checks() {
        let mut context = context();
        assert_eq!(
            run(&mut context, &[Value::int32(300)], OpCode::Conv_Ovf_U1),
            Err(DispatchFault::Overflow)
        );
        assert_eq!(
            run(&mut context, &[Value::int32(-1)], OpCode::Conv_Ovf_U4),
            Err(DispatchFault::Overflow)
        );
        assert_eq!(
            run(&mut context, &[Value::int32(-1)], OpCode::Conv_Ovf_U4_Un).unwrap(),
            vec![Value::int32(-1)]
        );
        assert_eq!(
            run(&mut context, &[Value::float(f64::NAN)], OpCode::Conv_Ovf_I4),
            Err(DispatchFault::Overflow)
        );
    }

    #[test]
    fn floats() {
        let mut context = context();
        assert_eq!(
            run(&mut context, &[Value::int32(-1)], OpCode::Conv_R_Un).unwrap(),
            vec![Value::float(4294967295.0)]
        );
        assert_eq!(
            run(&mut context, &[Value::float(0.1)], OpCode::Conv_R4).unwrap(),
            vec![Value::float(0.1f32 as f64)]
        );
        assert_eq!(
            run(&mut context, &[Value::float(f64::INFINITY)], OpCode::Ckfinite),
            Err(DispatchFault::Overflow)
        );
    }
}

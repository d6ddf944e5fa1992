use crate::cil::{Instruction, OpCode};
use crate::executor::handlers::arithmetic::{numeric_operands, NumericOperands};
use crate::executor::{DispatchFault, DispatchResult, ExecutionContext, OpCodeHandler, Successor};
use crate::types::Trilean;
use crate::value::{Integer32, PartialInteger, Pointer, Value, Word};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Comparison {
    Equal,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

fn compare_integers<T: Word>(
    comparison: Comparison,
    unsigned: bool,
    lhs: &PartialInteger<T>,
    rhs: &PartialInteger<T>,
) -> Trilean {
    let signed = !unsigned;
    match comparison {
        Comparison::Equal => lhs.is_equal_to(rhs),
        Comparison::Greater => lhs.is_greater_than(rhs, signed),
        Comparison::Less => lhs.is_less_than(rhs, signed),
        Comparison::GreaterOrEqual => !lhs.is_less_than(rhs, signed),
        Comparison::LessOrEqual => !lhs.is_greater_than(rhs, signed),
    }
}

fn compare_pointers(comparison: Comparison, lhs: &Pointer, rhs: &Pointer) -> Trilean {
    if comparison == Comparison::Equal {
        return lhs.is_equal_to(rhs);
    }
    match lhs.difference(rhs) {
        Some(difference) => Trilean::from(match comparison {
            Comparison::Greater => difference > 0,
            Comparison::Less => difference < 0,
            Comparison::GreaterOrEqual => difference >= 0,
            _ => difference <= 0,
        }),
        None => Trilean::Unknown,
    }
}

/// Compare two stack values.
///
/// `unsigned` selects the `.un` form: an unsigned comparison for integers,
/// and one which holds for unordered operands for floats. For object
/// references only equality, and `cgt.un` as its negation, are defined.
pub(super) fn compare(
    comparison: Comparison,
    unsigned: bool,
    lhs: &Value,
    rhs: &Value,
    is_32bit: bool,
) -> Result<Trilean, DispatchFault> {
    if let (Value::Object(lhs), Value::Object(rhs)) = (lhs, rhs) {
        return match (comparison, unsigned) {
            (Comparison::Equal, _) => Ok(lhs.is_equal_to(rhs)),
            (Comparison::Greater, true) => Ok(!lhs.is_equal_to(rhs)),
            _ => Err(DispatchFault::InvalidProgram(format!(
                "{:?} is not defined for object references",
                comparison
            ))),
        };
    }

    Ok(match numeric_operands(lhs, rhs, is_32bit)? {
        NumericOperands::Int32(lhs, rhs) => compare_integers(comparison, unsigned, &lhs, &rhs),
        NumericOperands::Int64(lhs, rhs) => compare_integers(comparison, unsigned, &lhs, &rhs),
        NumericOperands::Native(lhs, rhs) if is_32bit => compare_integers(
            comparison,
            unsigned,
            &lhs.resize::<u32>(false),
            &rhs.resize::<u32>(false),
        ),
        NumericOperands::Native(lhs, rhs) => compare_integers(comparison, unsigned, &lhs, &rhs),
        NumericOperands::Float(lhs, rhs) => match comparison {
            Comparison::Equal => lhs.is_equal_to(&rhs),
            Comparison::Greater => lhs.is_greater_than(&rhs, unsigned),
            Comparison::Less => lhs.is_less_than(&rhs, unsigned),
            Comparison::GreaterOrEqual => !lhs.is_less_than(&rhs, !unsigned),
            Comparison::LessOrEqual => !lhs.is_greater_than(&rhs, !unsigned),
        },
        NumericOperands::Pointers(lhs, rhs) => compare_pointers(comparison, &lhs, &rhs),
        NumericOperands::PointerInteger(pointer, integer) | NumericOperands::IntegerPointer(integer, pointer) => {
            if comparison == Comparison::Equal && integer.is_zero() == Trilean::True {
                pointer.is_zero()
            } else {
                Trilean::Unknown
            }
        }
    })
}

pub struct Compare;

impl OpCodeHandler for Compare {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ceq, OpCode::Cgt, OpCode::Cgt_Un, OpCode::Clt, OpCode::Clt_Un]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let (comparison, unsigned) = match instruction.opcode() {
            OpCode::Ceq => (Comparison::Equal, false),
            OpCode::Cgt => (Comparison::Greater, false),
            OpCode::Cgt_Un => (Comparison::Greater, true),
            OpCode::Clt => (Comparison::Less, false),
            _ => (Comparison::Less, true),
        };
        let rhs = context.stack_mut().pop()?;
        let lhs = context.stack_mut().pop()?;
        let result = compare(comparison, unsigned, &lhs, &rhs, context.is_32bit())?;
        context
            .stack_mut()
            .push(Value::Int32(Integer32::from_trilean(result)))?;
        Ok(Successor::FallThrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::handlers::tests::{context, run};
    use crate::value::{Float64, ObjectReference};

    #[test]
    fn signed_and_unsigned() {
        let mut context = context();
        assert_eq!(
            run(&mut context, &[Value::int32(-1), Value::int32(1)], OpCode::Clt).unwrap(),
            vec![Value::int32(1)]
        );
        assert_eq!(
            run(&mut context, &[Value::int32(-1), Value::int32(1)], OpCode::Clt_Un).unwrap(),
            vec![Value::int32(0)]
        );
        assert_eq!(
            run(&mut context, &[Value::int64(3), Value::int64(3)], OpCode::Ceq).unwrap(),
            vec![Value::int32(1)]
        );
    }

    #[test]
    fn partially_known_operands() {
        let mut context = context();
        // An odd number is never zero, whatever its other bits are.
        let odd = Value::Int32(Integer32::parse_bits(&format!("{}1", "?".repeat(31))).unwrap());
        assert_eq!(
            run(&mut context, &[odd.clone(), Value::int32(0)], OpCode::Ceq).unwrap(),
            vec![Value::int32(0)]
        );

        let unknown = run(&mut context, &[odd, Value::int32(5)], OpCode::Ceq).unwrap();
        assert_eq!(unknown[0].as_int32().unwrap().known_mask(), !1);
    }

    #[test]
    fn floats_and_references() {
        let nan = Value::float(f64::NAN);
        assert_eq!(
            compare(Comparison::Less, true, &nan, &Value::float(1.0), false).unwrap(),
            Trilean::True
        );
        assert_eq!(
            compare(Comparison::Less, false, &nan, &Value::float(1.0), false).unwrap(),
            Trilean::False
        );
        assert_eq!(
            compare(Comparison::GreaterOrEqual, false, &nan, &Value::float(1.0), false).unwrap(),
            Trilean::False
        );
        let unknown = Value::Float(Float64::unknown());
        assert_eq!(
            compare(Comparison::Equal, false, &unknown, &Value::float(1.0), false).unwrap(),
            Trilean::Unknown
        );

        let null = Value::null();
        let other = Value::Object(ObjectReference::Unknown);
        assert_eq!(compare(Comparison::Equal, false, &null, &null, false).unwrap(), Trilean::True);
        assert_eq!(compare(Comparison::Greater, true, &other, &null, false).unwrap(), Trilean::Unknown);
        assert!(compare(Comparison::Less, false, &other, &null, false).is_err());
    }
}

use log::debug;

use crate::cil::{Instruction, OpCode, TypeSig};
use crate::executor::handlers::{invalid_operand, known_index};
use crate::executor::{DispatchFault, DispatchResult, ExecutionContext, OpCodeHandler, Successor};
use crate::memory::{ArrayValue, HeapObject, HeapRef};
use crate::value::{Integer64, ObjectReference, Pointer, Value};

fn array_reference(value: &Value) -> Result<Option<HeapRef>, DispatchFault> {
    match value {
        Value::Object(ObjectReference::Null) => Err(DispatchFault::NullReference),
        Value::Object(ObjectReference::Known(reference)) => Ok(Some(*reference)),
        Value::Object(ObjectReference::Unknown) => Ok(None),
        value => Err(DispatchFault::InvalidProgram(format!("{} is not an array", value.kind()))),
    }
}

fn array(context: &ExecutionContext, reference: HeapRef) -> Result<&ArrayValue, DispatchFault> {
    match context.heap().get(reference)? {
        HeapObject::Array(array) => Ok(array),
        object => Err(DispatchFault::InvalidProgram(format!("{} is not an array", object.type_sig()))),
    }
}

fn array_mut(context: &mut ExecutionContext, reference: HeapRef) -> Result<&mut ArrayValue, DispatchFault> {
    match context.heap_mut().get_mut(reference)? {
        HeapObject::Array(array) => Ok(array),
        object => Err(DispatchFault::InvalidProgram(format!("{} is not an array", object.type_sig()))),
    }
}

/// Resolve the operands of an element access.
///
/// Returns `None` when the array is unknown, and no index when the index is.
/// A known index outside the array is an `IndexOutOfRange` fault.
fn element(
    context: &ExecutionContext,
    array_value: &Value,
    index: &Value,
) -> Result<Option<(HeapRef, Option<usize>)>, DispatchFault> {
    let reference = match array_reference(array_value)? {
        Some(reference) => reference,
        None => return Ok(None),
    };
    let length = array(context, reference)?.len();
    match known_index(index)? {
        Some(index) if index < 0 || index as u64 >= length as u64 => Err(DispatchFault::IndexOutOfRange),
        Some(index) => Ok(Some((reference, Some(index as usize)))),
        None => Ok(Some((reference, None))),
    }
}

/// The element type named by a typed `ldelem`/`stelem`, or `None` for the
/// forms which take it from the array or the operand.
fn element_type(opcode: OpCode) -> Option<TypeSig> {
    Some(match opcode {
        OpCode::Ldelem_I1 | OpCode::Stelem_I1 => TypeSig::I1,
        OpCode::Ldelem_U1 => TypeSig::U1,
        OpCode::Ldelem_I2 | OpCode::Stelem_I2 => TypeSig::I2,
        OpCode::Ldelem_U2 => TypeSig::U2,
        OpCode::Ldelem_I4 | OpCode::Stelem_I4 => TypeSig::I4,
        OpCode::Ldelem_U4 => TypeSig::U4,
        OpCode::Ldelem_I8 | OpCode::Stelem_I8 => TypeSig::I8,
        OpCode::Ldelem_I | OpCode::Stelem_I => TypeSig::I,
        OpCode::Ldelem_R4 | OpCode::Stelem_R4 => TypeSig::R4,
        OpCode::Ldelem_R8 | OpCode::Stelem_R8 => TypeSig::R8,
        _ => return None,
    })
}

pub struct NewArray;

impl OpCodeHandler for NewArray {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Newarr]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let element = instruction
            .type_sig()
            .ok_or_else(|| invalid_operand(instruction, "type"))?
            .clone();
        let length = context.stack_mut().pop()?;
        let is_32bit = context.is_32bit();

        let reference = match known_index(&length)? {
            Some(length) if length < 0 => return Err(DispatchFault::Overflow),
            Some(length) if length as u64 <= context.options().max_allocation() as u64 => {
                let array = ArrayValue::new(element, length as usize, is_32bit);
                ObjectReference::Known(context.heap_mut().allocate(HeapObject::Array(array)))
            }
            Some(length) => {
                debug!("not materializing an array of {} elements", length);
                ObjectReference::Unknown
            }
            None => ObjectReference::Unknown,
        };

        context.stack_mut().push(Value::Object(reference))?;
        Ok(Successor::FallThrough)
    }
}

pub struct ArrayLength;

impl OpCodeHandler for ArrayLength {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldlen]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        let array_value = context.stack_mut().pop()?;
        let length = match array_reference(&array_value)? {
            Some(reference) => Integer64::known(array(context, reference)?.len() as u64),
            None => Integer64::unknown(),
        };
        context.stack_mut().push(Value::NativeInt(length))?;
        Ok(Successor::FallThrough)
    }
}

pub struct LoadElement;

impl OpCodeHandler for LoadElement {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Ldelem_I1,
            OpCode::Ldelem_U1,
            OpCode::Ldelem_I2,
            OpCode::Ldelem_U2,
            OpCode::Ldelem_I4,
            OpCode::Ldelem_U4,
            OpCode::Ldelem_I8,
            OpCode::Ldelem_I,
            OpCode::Ldelem_R4,
            OpCode::Ldelem_R8,
            OpCode::Ldelem_Ref,
            OpCode::Ldelem,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let index = context.stack_mut().pop()?;
        let array_value = context.stack_mut().pop()?;
        let is_32bit = context.is_32bit();

        let value = match element(context, &array_value, &index)? {
            Some((reference, index)) => {
                let array = array(context, reference)?;
                let ty = element_type(instruction.opcode()).unwrap_or_else(|| array.element_type().clone());
                match index.and_then(|index| array.get(index)) {
                    Some(value) => value.coerce(&ty, is_32bit),
                    None => Value::unknown_of(&ty, is_32bit),
                }
            }
            None => {
                let ty = element_type(instruction.opcode())
                    .or_else(|| instruction.type_sig().cloned())
                    .unwrap_or(TypeSig::Object);
                Value::unknown_of(&ty, is_32bit)
            }
        };

        context.stack_mut().push(value)?;
        Ok(Successor::FallThrough)
    }
}

/// A store to an unknown index may hit any element, so every element of
/// the array becomes unknown.
pub struct StoreElement;

impl OpCodeHandler for StoreElement {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Stelem_I,
            OpCode::Stelem_I1,
            OpCode::Stelem_I2,
            OpCode::Stelem_I4,
            OpCode::Stelem_I8,
            OpCode::Stelem_R4,
            OpCode::Stelem_R8,
            OpCode::Stelem_Ref,
            OpCode::Stelem,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        let value = context.stack_mut().pop()?;
        let index = context.stack_mut().pop()?;
        let array_value = context.stack_mut().pop()?;
        let is_32bit = context.is_32bit();

        match element(context, &array_value, &index)? {
            Some((reference, Some(index))) => {
                let array = array_mut(context, reference)?;
                let value = value.coerce(array.element_type(), is_32bit);
                array.set(index, value)?;
            }
            Some((reference, None)) => {
                debug!("store to an unknown index of {}", reference);
                array_mut(context, reference)?.mark_unknown(is_32bit);
            }
            None => {}
        }
        Ok(Successor::FallThrough)
    }
}

/// Element addresses are not tracked. The element may be written through
/// the address, so it becomes unknown.
pub struct LoadElementAddress;

impl OpCodeHandler for LoadElementAddress {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldelema]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        let index = context.stack_mut().pop()?;
        let array_value = context.stack_mut().pop()?;
        let is_32bit = context.is_32bit();

        match element(context, &array_value, &index)? {
            Some((reference, Some(index))) => {
                let array = array_mut(context, reference)?;
                let unknown = Value::unknown_of(array.element_type(), is_32bit);
                array.set(index, unknown)?;
            }
            Some((reference, None)) => array_mut(context, reference)?.mark_unknown(is_32bit),
            None => {}
        }

        context.stack_mut().push(Value::Pointer(Pointer::unknown(is_32bit)))?;
        Ok(Successor::FallThrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cil::Operand;
    use crate::executor::handlers::tests::{context, run};
    use crate::executor::Dispatcher;
    use crate::value::Integer32;

    fn new_array(context: &mut ExecutionContext, element: TypeSig, length: Value) -> DispatchResult {
        context.stack_mut().clear();
        context.stack_mut().push(length).unwrap();
        let newarr = Instruction::new(0, OpCode::Newarr, Operand::Type(element));
        Dispatcher::new().dispatch(context, &newarr)
    }

    #[test]
    fn element_access() {
        let mut context = context();
        new_array(&mut context, TypeSig::U1, Value::int32(4)).unwrap();
        let array = context.stack_mut().pop().unwrap();

        run(&mut context, &[array.clone(), Value::int32(1), Value::int32(0x1ff)], OpCode::Stelem_I1).unwrap();
        assert_eq!(
            run(&mut context, &[array.clone(), Value::int32(1)], OpCode::Ldelem_U1).unwrap(),
            vec![Value::int32(0xff)]
        );
        assert_eq!(
            run(&mut context, &[array.clone(), Value::int32(1)], OpCode::Ldelem_I1).unwrap(),
            vec![Value::int32(-1)]
        );
        assert_eq!(
            run(&mut context, &[array.clone()], OpCode::Ldlen).unwrap(),
            vec![Value::NativeInt(Integer64::known(4))]
        );
        assert_eq!(
            run(&mut context, &[array.clone(), Value::int32(4)], OpCode::Ldelem_U1),
            Err(DispatchFault::IndexOutOfRange)
        );
        assert_eq!(
            run(&mut context, &[Value::null(), Value::int32(0)], OpCode::Ldelem_U1),
            Err(DispatchFault::NullReference)
        );
    }

    #[test]
    fn unknown_index_stores_forget_the_array() {
        let mut context = context();
        new_array(&mut context, TypeSig::I4, Value::int32(2)).unwrap();
        let array = context.stack_mut().pop().unwrap();

        let unknown = Value::Int32(Integer32::unknown());
        run(&mut context, &[array.clone(), unknown, Value::int32(7)], OpCode::Stelem_I4).unwrap();
        let stack = run(&mut context, &[array, Value::int32(0)], OpCode::Ldelem_I4).unwrap();
        assert!(!stack[0].is_known());
    }

    #[test]
    fn allocation_limits() {
        let mut context = context();
        assert_eq!(
            new_array(&mut context, TypeSig::I4, Value::int32(-1)),
            Err(DispatchFault::Overflow)
        );

        new_array(&mut context, TypeSig::I4, Value::int32(i32::MAX)).unwrap();
        assert_eq!(context.stack().values(), &[Value::Object(ObjectReference::Unknown)]);
    }
}

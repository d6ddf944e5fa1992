//! Loads and stores through pointers, and raw memory blocks.
//!
//! Only pointers into `localloc` memory are tracked. Reads through any other
//! address produce unknown values and writes through them are dropped.

use log::trace;

use crate::cil::{Instruction, OpCode, TypeSig};
use crate::executor::handlers::known_index;
use crate::executor::{DispatchFault, DispatchResult, ExecutionContext, OpCodeHandler, Successor};
use crate::memory::{Heap, HeapObject, MemoryBlock};
use crate::value::{Float64, Integer64, Pointer, Value};

fn address(value: &Value) -> Result<Option<Pointer>, DispatchFault> {
    match value {
        Value::Pointer(pointer) if pointer.is_known() => Ok(Some(*pointer)),
        Value::Pointer(_) | Value::NativeInt(_) | Value::Int32(_) => Ok(None),
        value => Err(DispatchFault::InvalidProgram(format!(
            "{} is not an address",
            value.kind()
        ))),
    }
}

fn read_bits(pointer: &Pointer, heap: &Heap, size: u32) -> Result<Integer64, DispatchFault> {
    Ok(match size {
        1 => pointer.read_integer::<u8>(heap, 0)?.resize(false),
        2 => pointer.read_integer::<u16>(heap, 0)?.resize(false),
        4 => pointer.read_integer::<u32>(heap, 0)?.resize(false),
        _ => pointer.read_integer::<u64>(heap, 0)?,
    })
}

fn write_bits(pointer: &Pointer, heap: &mut Heap, size: u32, bits: &Integer64) -> Result<(), DispatchFault> {
    match size {
        1 => pointer.write_integer(heap, 0, &bits.resize::<u8>(false))?,
        2 => pointer.write_integer(heap, 0, &bits.resize::<u16>(false))?,
        4 => pointer.write_integer(heap, 0, &bits.resize::<u32>(false))?,
        _ => pointer.write_integer(heap, 0, bits)?,
    }
    Ok(())
}

/// Forget `size` bytes at `pointer`, or everything from `pointer` to the end
/// of its block when the size is unknown.
fn forget(heap: &mut Heap, pointer: &Pointer, size: Option<usize>) -> Result<(), DispatchFault> {
    if let Some(base) = pointer.base() {
        let block = heap.memory_mut(base)?;
        let size = size.unwrap_or_else(|| (block.len() as i64 - pointer.offset()).max(0) as usize);
        block.mark_unknown(pointer.offset(), size)?;
    }
    Ok(())
}

/// Read a value of type `ty` from `address`.
pub(super) fn load(context: &ExecutionContext, address_value: &Value, ty: &TypeSig) -> Result<Value, DispatchFault> {
    let is_32bit = context.is_32bit();
    let pointer = match address(address_value)? {
        Some(pointer) => pointer,
        None => return Ok(Value::unknown_of(ty, is_32bit)),
    };
    let heap = context.heap();
    Ok(match ty {
        TypeSig::R4 => Value::Float(pointer.read_float32(heap, 0)?.widen()),
        TypeSig::R8 => Value::Float(pointer.read_float64(heap, 0)?),
        TypeSig::Boolean
        | TypeSig::Char
        | TypeSig::I1
        | TypeSig::U1
        | TypeSig::I2
        | TypeSig::U2
        | TypeSig::I4
        | TypeSig::U4
        | TypeSig::I8
        | TypeSig::U8
        | TypeSig::I
        | TypeSig::U => match ty.size(is_32bit) {
            Some(size) => Value::Int64(read_bits(&pointer, heap, size)?).coerce(ty, is_32bit),
            None => Value::unknown_of(ty, is_32bit),
        },
        _ => Value::unknown_of(ty, is_32bit),
    })
}

/// Write `value` as a value of type `ty` to `address`.
pub(super) fn store(
    context: &mut ExecutionContext,
    address_value: &Value,
    ty: &TypeSig,
    value: &Value,
) -> Result<(), DispatchFault> {
    let is_32bit = context.is_32bit();
    let pointer = match address(address_value)? {
        Some(pointer) => pointer,
        None => {
            trace!("dropping store through untracked address {}", address_value);
            return Ok(());
        }
    };
    let float = match value {
        Value::Float(float) => *float,
        _ => Float64::unknown(),
    };
    let heap = context.heap_mut();
    match ty {
        TypeSig::R4 => pointer.write_float32(heap, 0, &float.narrow())?,
        TypeSig::R8 => pointer.write_float64(heap, 0, &float)?,
        TypeSig::Boolean
        | TypeSig::Char
        | TypeSig::I1
        | TypeSig::U1
        | TypeSig::I2
        | TypeSig::U2
        | TypeSig::I4
        | TypeSig::U4
        | TypeSig::I8
        | TypeSig::U8
        | TypeSig::I
        | TypeSig::U => {
            let size = ty.size(is_32bit).unwrap_or(8);
            write_bits(&pointer, heap, size, &value.to_integer64())?;
        }
        _ => forget(heap, &pointer, ty.size(is_32bit).map(|size| size as usize))?,
    }
    Ok(())
}

fn indirect_type(opcode: OpCode) -> TypeSig {
    match opcode {
        OpCode::Ldind_I1 | OpCode::Stind_I1 => TypeSig::I1,
        OpCode::Ldind_U1 => TypeSig::U1,
        OpCode::Ldind_I2 | OpCode::Stind_I2 => TypeSig::I2,
        OpCode::Ldind_U2 => TypeSig::U2,
        OpCode::Ldind_I4 | OpCode::Stind_I4 => TypeSig::I4,
        OpCode::Ldind_U4 => TypeSig::U4,
        OpCode::Ldind_I8 | OpCode::Stind_I8 => TypeSig::I8,
        OpCode::Ldind_I | OpCode::Stind_I => TypeSig::I,
        OpCode::Ldind_R4 | OpCode::Stind_R4 => TypeSig::R4,
        OpCode::Ldind_R8 | OpCode::Stind_R8 => TypeSig::R8,
        _ => TypeSig::Object,
    }
}

pub struct LoadIndirect;

impl OpCodeHandler for LoadIndirect {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Ldind_I1,
            OpCode::Ldind_U1,
            OpCode::Ldind_I2,
            OpCode::Ldind_U2,
            OpCode::Ldind_I4,
            OpCode::Ldind_U4,
            OpCode::Ldind_I8,
            OpCode::Ldind_I,
            OpCode::Ldind_R4,
            OpCode::Ldind_R8,
            OpCode::Ldind_Ref,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let address = context.stack_mut().pop()?;
        let value = load(context, &address, &indirect_type(instruction.opcode()))?;
        context.stack_mut().push(value)?;
        Ok(Successor::FallThrough)
    }
}

pub struct StoreIndirect;

impl OpCodeHandler for StoreIndirect {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Stind_Ref,
            OpCode::Stind_I1,
            OpCode::Stind_I2,
            OpCode::Stind_I4,
            OpCode::Stind_I8,
            OpCode::Stind_R4,
            OpCode::Stind_R8,
            OpCode::Stind_I,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let value = context.stack_mut().pop()?;
        let address = context.stack_mut().pop()?;
        store(context, &address, &indirect_type(instruction.opcode()), &value)?;
        Ok(Successor::FallThrough)
    }
}

/// `localloc` materializes a block when its size is known and small enough.
pub struct LocalAlloc;

impl OpCodeHandler for LocalAlloc {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Localloc]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        let size = context.stack_mut().pop()?;
        let is_32bit = context.is_32bit();
        let size = known_index(&size)?.and_then(|size| usize::try_from(size).ok());

        let pointer = match size {
            Some(size) if size <= context.options().max_allocation() => {
                let block = if context.init_locals() {
                    MemoryBlock::new(size)
                } else {
                    MemoryBlock::uninitialized(size)
                };
                let base = context.heap_mut().allocate(HeapObject::Memory(block));
                Pointer::new(base, 0, is_32bit)
            }
            _ => Pointer::unknown(is_32bit),
        };

        context.stack_mut().push(Value::Pointer(pointer))?;
        Ok(Successor::FallThrough)
    }
}

pub struct CopyBlock;

impl OpCodeHandler for CopyBlock {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Cpblk]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        let size = context.stack_mut().pop()?;
        let source = context.stack_mut().pop()?;
        let destination = context.stack_mut().pop()?;

        let size = known_index(&size)?.and_then(|size| usize::try_from(size).ok());
        let destination = match address(&destination)? {
            Some(destination) => destination,
            None => return Ok(Successor::FallThrough),
        };

        match (address(&source)?, size) {
            (Some(source), Some(size)) => {
                let mut bits = vec![0; size];
                let mut mask = vec![0; size];
                if let Some(base) = source.base() {
                    context
                        .heap()
                        .memory(base)?
                        .read_bytes(source.offset(), &mut bits, &mut mask)?;
                }
                if let Some(base) = destination.base() {
                    context
                        .heap_mut()
                        .memory_mut(base)?
                        .write_bytes(destination.offset(), &bits, &mask)?;
                }
            }
            (_, size) => forget(context.heap_mut(), &destination, size)?,
        }
        Ok(Successor::FallThrough)
    }
}

pub struct InitBlock;

impl OpCodeHandler for InitBlock {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Initblk]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        let size = context.stack_mut().pop()?;
        let value = context.stack_mut().pop()?;
        let destination = context.stack_mut().pop()?;

        let size = known_index(&size)?.and_then(|size| usize::try_from(size).ok());
        let destination = match address(&destination)? {
            Some(destination) => destination,
            None => return Ok(Successor::FallThrough),
        };

        match (destination.base(), size) {
            (Some(base), Some(size)) => {
                let byte = value.to_integer64().resize::<u8>(false);
                let bits = vec![byte.value(); size];
                let mask = vec![byte.known_mask(); size];
                context
                    .heap_mut()
                    .memory_mut(base)?
                    .write_bytes(destination.offset(), &bits, &mask)?;
            }
            (_, size) => forget(context.heap_mut(), &destination, size)?,
        }
        Ok(Successor::FallThrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::handlers::tests::{context, run};
    use crate::executor::Dispatcher;

    fn allocate(context: &mut ExecutionContext, size: i32) -> Value {
        run(context, &[Value::int32(size)], OpCode::Localloc).unwrap().remove(0)
    }

    #[test]
    fn stores_and_loads_through_localloc() {
        let mut context = context();
        let pointer = allocate(&mut context, 16);
        assert!(pointer.as_pointer().unwrap().is_known());

        run(&mut context, &[pointer.clone(), Value::int32(-2)], OpCode::Stind_I2).unwrap();
        assert_eq!(
            run(&mut context, &[pointer.clone()], OpCode::Ldind_I2).unwrap(),
            vec![Value::int32(-2)]
        );
        assert_eq!(
            run(&mut context, &[pointer.clone()], OpCode::Ldind_U2).unwrap(),
            vec![Value::int32(0xfffe)]
        );

        run(&mut context, &[pointer.clone(), Value::float(1.5)], OpCode::Stind_R8).unwrap();
        assert_eq!(
            run(&mut context, &[pointer], OpCode::Ldind_R8).unwrap(),
            vec![Value::float(1.5)]
        );
    }

    #[test]
    fn untracked_addresses_read_unknown() {
        let mut context = context();
        let stack = run(&mut context, &[Value::Pointer(Pointer::unknown(false))], OpCode::Ldind_I4).unwrap();
        assert_eq!(stack[0].as_int32().unwrap().known_mask(), 0);

        assert!(run(&mut context, &[Value::null()], OpCode::Ldind_I4).is_err());
    }

    #[test]
    fn blocks() {
        let mut context = context();
        let destination = allocate(&mut context, 8);

        let mut dispatch = |inputs: &[Value], opcode| {
            for input in inputs {
                context.stack_mut().push(input.clone()).unwrap();
            }
            Dispatcher::new()
                .dispatch(&mut context, &Instruction::simple(0, opcode))
                .unwrap();
        };
        dispatch(&[destination.clone(), Value::int32(0x41), Value::int32(4)], OpCode::Initblk);

        let stack = run(&mut context, &[destination.clone()], OpCode::Ldind_I4).unwrap();
        assert_eq!(stack, vec![Value::int32(0x4141_4141)]);

        let word = run(&mut context, &[destination.clone()], OpCode::Ldind_I8).unwrap();
        assert_eq!(word[0], Value::int64(0x4141_4141));
    }
}

//! Calls, fields, casts, boxing, and the other object model instructions.

use log::debug;

use crate::cil::{FieldRef, Instruction, Member, MethodRef, MethodSignature, OpCode, Operand, TypeSig};
use crate::executor::handlers::{indirect, invalid_operand};
use crate::executor::{
    DispatchFault, DispatchResult, Devirtualization, ExecutionContext, OpCodeHandler, Successor,
};
use crate::memory::{HeapObject, HeapRef, ObjectValue};
use crate::types::Trilean;
use crate::value::{Integer32, Integer64, ObjectReference, Pointer, Value};

fn method(instruction: &Instruction) -> Result<&MethodRef, DispatchFault> {
    instruction.method().ok_or_else(|| invalid_operand(instruction, "method"))
}

fn field(instruction: &Instruction) -> Result<&FieldRef, DispatchFault> {
    instruction.field().ok_or_else(|| invalid_operand(instruction, "field"))
}

fn type_operand(instruction: &Instruction) -> Result<&TypeSig, DispatchFault> {
    instruction.type_sig().ok_or_else(|| invalid_operand(instruction, "type"))
}

/// Pop the arguments of a call, converting each to its parameter type.
fn pop_arguments(context: &mut ExecutionContext, signature: &MethodSignature) -> Result<Vec<Value>, DispatchFault> {
    let is_32bit = context.is_32bit();
    let mut arguments = context.stack_mut().pop_many(signature.argument_count())?;
    let skip = usize::from(signature.has_this());
    for (argument, parameter) in arguments.iter_mut().skip(skip).zip(signature.parameters()) {
        *argument = argument.coerce(parameter, is_32bit);
    }
    Ok(arguments)
}

fn push_result(
    context: &mut ExecutionContext,
    result: Option<Value>,
    signature: &MethodSignature,
) -> Result<(), DispatchFault> {
    if !signature.returns_value() {
        return Ok(());
    }
    let is_32bit = context.is_32bit();
    let value = match result {
        Some(value) => value.coerce(signature.return_type(), is_32bit),
        None => Value::unknown_of(signature.return_type(), is_32bit),
    };
    context.stack_mut().push(value)
}

fn invoke(
    context: &mut ExecutionContext,
    method: &MethodRef,
    arguments: Vec<Value>,
) -> Result<Option<Value>, DispatchFault> {
    let environment = context.environment().clone();
    environment.invoke(context, method, arguments)
}

/// The heap object a reference points to, with `null` a fault and unknown
/// references `None`.
fn dereference(value: &Value) -> Result<Option<HeapRef>, DispatchFault> {
    match value {
        Value::Object(ObjectReference::Null) => Err(DispatchFault::NullReference),
        Value::Object(ObjectReference::Known(reference)) => Ok(Some(*reference)),
        Value::Object(ObjectReference::Unknown) | Value::Pointer(_) | Value::NativeInt(_) => Ok(None),
        value => Err(DispatchFault::InvalidProgram(format!(
            "{} is not an object reference",
            value.kind()
        ))),
    }
}

pub struct Call;

impl OpCodeHandler for Call {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Call, OpCode::Callvirt]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let method = method(instruction)?.clone();
        let signature = method.signature().clone();
        let arguments = pop_arguments(context, &signature)?;

        let target = if instruction.opcode() == OpCode::Callvirt {
            let receiver = match arguments.first().map(dereference).transpose()?.flatten() {
                Some(reference) => Some(context.heap().type_sig(reference)?),
                None => None,
            };
            match context.environment().resolve_virtual(receiver.as_ref(), &method) {
                Devirtualization::Method(target) => target,
                Devirtualization::Signature(target) => {
                    debug!("{} resolves to an unknown method of signature {:?}", instruction, target);
                    push_result(context, None, &target)?;
                    return Ok(Successor::FallThrough);
                }
                Devirtualization::Failure(fault) => return Err(fault),
                Devirtualization::UnknownReceiver => {
                    debug!("{} on an unknown receiver", instruction);
                    push_result(context, None, &signature)?;
                    return Ok(Successor::FallThrough);
                }
            }
        } else {
            method
        };

        let result = invoke(context, &target, arguments)?;
        push_result(context, result, &signature)?;
        Ok(Successor::FallThrough)
    }
}

/// An indirect call. The target is a function pointer we cannot follow.
pub struct CallIndirect;

impl OpCodeHandler for CallIndirect {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Calli]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let signature = instruction
            .signature()
            .ok_or_else(|| invalid_operand(instruction, "signature"))?
            .clone();
        context.stack_mut().pop()?;
        pop_arguments(context, &signature)?;
        push_result(context, None, &signature)?;
        Ok(Successor::FallThrough)
    }
}

/// `jmp` leaves this method for another which receives the current
/// arguments. Its return value is ours.
pub struct Jump;

impl OpCodeHandler for Jump {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Jmp]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let method = method(instruction)?.clone();
        let arguments = context.variables().arguments();
        let result = invoke(context, &method, arguments)?;
        if context.returns_value() {
            let is_32bit = context.is_32bit();
            let value = result.unwrap_or_else(|| Value::unknown_of(method.signature().return_type(), is_32bit));
            context.set_return_value(Some(value));
        }
        Ok(Successor::Return)
    }
}

/// `newobj` allocates an instance of the constructor's type and runs the
/// constructor on it. An environment may hand back a different object, as
/// for strings.
pub struct NewObject;

impl OpCodeHandler for NewObject {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Newobj]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let constructor = method(instruction)?.clone();
        let parameters = MethodSignature::static_method(
            constructor.signature().parameters().to_vec(),
            TypeSig::Void,
        );
        let mut arguments = pop_arguments(context, &parameters)?;

        let declaring_type = constructor.declaring_type().clone();
        let ty = if declaring_type.is_value_type() {
            TypeSig::ValueType(declaring_type)
        } else {
            TypeSig::Class(declaring_type)
        };
        let reference = context
            .heap_mut()
            .allocate(HeapObject::Object(ObjectValue::new(ty)));
        let object = Value::Object(ObjectReference::Known(reference));
        arguments.insert(0, object.clone());

        let result = invoke(context, &constructor, arguments)?;
        context.stack_mut().push(result.unwrap_or(object))?;
        Ok(Successor::FallThrough)
    }
}

pub struct LoadField;

impl OpCodeHandler for LoadField {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldfld, OpCode::Ldsfld]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let field = field(instruction)?.clone();
        let is_32bit = context.is_32bit();
        let object = match instruction.opcode() {
            OpCode::Ldfld => Some(context.stack_mut().pop()?),
            _ => None,
        };

        let value = if field.is_static() {
            context.load_static(&field)
        } else {
            match object.as_ref().map(dereference).transpose()?.flatten() {
                Some(reference) => match context.heap().get(reference)? {
                    HeapObject::Object(object) => object.field(&field, is_32bit),
                    _ => Value::unknown_of(field.field_type(), is_32bit),
                },
                None => Value::unknown_of(field.field_type(), is_32bit),
            }
        };

        context.stack_mut().push(value)?;
        Ok(Successor::FallThrough)
    }
}

pub struct StoreField;

impl OpCodeHandler for StoreField {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Stfld, OpCode::Stsfld]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let field = field(instruction)?.clone();
        let is_32bit = context.is_32bit();
        let value = context.stack_mut().pop()?;
        let object = match instruction.opcode() {
            OpCode::Stfld => Some(context.stack_mut().pop()?),
            _ => None,
        };

        if field.is_static() {
            context.store_static(&field, value);
            return Ok(Successor::FallThrough);
        }

        // Stores to objects we do not know are dropped.
        if let Some(reference) = object.as_ref().map(dereference).transpose()?.flatten() {
            if let HeapObject::Object(object) = context.heap_mut().get_mut(reference)? {
                let value = value.coerce(field.field_type(), is_32bit);
                object.set_field(field, value);
            }
        }
        Ok(Successor::FallThrough)
    }
}

/// The address of a field escapes, so the field becomes unknown.
pub struct LoadFieldAddress;

impl OpCodeHandler for LoadFieldAddress {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldflda, OpCode::Ldsflda]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let field = field(instruction)?.clone();
        let is_32bit = context.is_32bit();
        let object = match instruction.opcode() {
            OpCode::Ldflda => Some(context.stack_mut().pop()?),
            _ => None,
        };

        if field.is_static() {
            context.mark_static_unknown(&field);
        } else if let Some(reference) = object.as_ref().map(dereference).transpose()?.flatten() {
            if let HeapObject::Object(object) = context.heap_mut().get_mut(reference)? {
                let unknown = Value::unknown_of(field.field_type(), is_32bit);
                object.set_field(field, unknown);
            }
        }

        context.stack_mut().push(Value::Pointer(Pointer::unknown(is_32bit)))?;
        Ok(Successor::FallThrough)
    }
}

/// Whether the object behind `reference` is an instance of `target`.
fn instance_of(context: &ExecutionContext, reference: &ObjectReference, target: &TypeSig) -> Result<Trilean, DispatchFault> {
    match reference {
        ObjectReference::Known(reference) => {
            let ty = context.heap().type_sig(*reference)?;
            Ok(context.environment().is_instance_of(&ty, target))
        }
        _ => Ok(Trilean::Unknown),
    }
}

fn object_operand(value: &Value) -> Result<ObjectReference, DispatchFault> {
    match value {
        Value::Object(reference) => Ok(*reference),
        value => Err(DispatchFault::InvalidProgram(format!(
            "{} is not an object reference",
            value.kind()
        ))),
    }
}

pub struct CastClass;

impl OpCodeHandler for CastClass {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Castclass, OpCode::Isinst]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let target = type_operand(instruction)?.clone();
        let reference = object_operand(&context.stack_mut().pop()?)?;

        let result = match (reference, instance_of(context, &reference, &target)?) {
            (ObjectReference::Null, _) | (_, Trilean::True) => reference,
            (_, Trilean::False) if instruction.opcode() == OpCode::Castclass => {
                return Err(DispatchFault::InvalidCast(format!("not an instance of {}", target)))
            }
            (_, Trilean::False) => ObjectReference::Null,
            (_, Trilean::Unknown) if instruction.opcode() == OpCode::Castclass => reference,
            (_, Trilean::Unknown) => ObjectReference::Unknown,
        };

        context.stack_mut().push(Value::Object(result))?;
        Ok(Successor::FallThrough)
    }
}

/// Boxing a reference type leaves the reference alone.
pub struct BoxValue;

impl OpCodeHandler for BoxValue {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Box]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let ty = type_operand(instruction)?.clone();
        let value = context.stack_mut().pop()?;
        if !ty.is_value_type() {
            context.stack_mut().push(value)?;
            return Ok(Successor::FallThrough);
        }

        let value = value.coerce(&ty, context.is_32bit());
        let reference = context.heap_mut().allocate(HeapObject::Boxed { ty, value });
        context
            .stack_mut()
            .push(Value::Object(ObjectReference::Known(reference)))?;
        Ok(Successor::FallThrough)
    }
}

pub struct UnboxValue;

impl OpCodeHandler for UnboxValue {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Unbox, OpCode::Unbox_Any]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let ty = type_operand(instruction)?.clone();
        let is_32bit = context.is_32bit();
        let reference = object_operand(&context.stack_mut().pop()?)?;

        // `unbox.any` on a reference type is `castclass`.
        if instruction.opcode() == OpCode::Unbox_Any && !ty.is_value_type() {
            if instance_of(context, &reference, &ty)? == Trilean::False && reference != ObjectReference::Null {
                return Err(DispatchFault::InvalidCast(format!("not an instance of {}", ty)));
            }
            context.stack_mut().push(Value::Object(reference))?;
            return Ok(Successor::FallThrough);
        }

        if reference == ObjectReference::Null {
            return Err(DispatchFault::NullReference);
        }
        if instruction.opcode() == OpCode::Unbox {
            context.stack_mut().push(Value::Pointer(Pointer::unknown(is_32bit)))?;
            return Ok(Successor::FallThrough);
        }

        let value = match reference {
            ObjectReference::Known(heap_ref) => match context.heap().get(heap_ref)? {
                HeapObject::Boxed { ty: boxed, value } => {
                    if context.environment().is_instance_of(boxed, &ty) == Trilean::False {
                        return Err(DispatchFault::InvalidCast(format!("{} is not {}", boxed, ty)));
                    }
                    value.coerce(&ty, is_32bit)
                }
                _ => Value::unknown_of(&ty, is_32bit),
            },
            _ => Value::unknown_of(&ty, is_32bit),
        };
        context.stack_mut().push(value)?;
        Ok(Successor::FallThrough)
    }
}

/// `ldobj`, `stobj`, `cpobj` and `initobj` move typed values through
/// addresses.
pub struct ObjectCopy;

impl OpCodeHandler for ObjectCopy {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldobj, OpCode::Stobj, OpCode::Cpobj, OpCode::Initobj]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let ty = type_operand(instruction)?.clone();
        let is_32bit = context.is_32bit();
        match instruction.opcode() {
            OpCode::Ldobj => {
                let address = context.stack_mut().pop()?;
                let value = indirect::load(context, &address, &ty)?;
                context.stack_mut().push(value)?;
            }
            OpCode::Stobj => {
                let value = context.stack_mut().pop()?;
                let address = context.stack_mut().pop()?;
                indirect::store(context, &address, &ty, &value)?;
            }
            OpCode::Cpobj => {
                let source = context.stack_mut().pop()?;
                let destination = context.stack_mut().pop()?;
                let value = indirect::load(context, &source, &ty)?;
                indirect::store(context, &destination, &ty, &value)?;
            }
            _ => {
                let address = context.stack_mut().pop()?;
                indirect::store(context, &address, &ty, &Value::default_of(&ty, is_32bit))?;
            }
        }
        Ok(Successor::FallThrough)
    }
}

pub struct SizeOf;

impl OpCodeHandler for SizeOf {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Sizeof]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let size = match type_operand(instruction)?.size(context.is_32bit()) {
            Some(size) => Integer32::known(size),
            None => Integer32::unknown(),
        };
        context.stack_mut().push(Value::Int32(size))?;
        Ok(Successor::FallThrough)
    }
}

/// Runtime handles cannot be resolved without the runtime, so `ldtoken`
/// pushes an unknown handle.
pub struct LoadToken;

impl OpCodeHandler for LoadToken {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldtoken]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        match instruction.operand() {
            Operand::Member(Member::Type(_))
            | Operand::Member(Member::Method(_))
            | Operand::Member(Member::Field(_))
            | Operand::Type(_)
            | Operand::Method(_)
            | Operand::Field(_) => {}
            _ => return Err(invalid_operand(instruction, "token")),
        }
        context
            .stack_mut()
            .push(Value::Object(ObjectReference::Unknown))?;
        Ok(Successor::FallThrough)
    }
}

pub struct LoadFunction;

impl OpCodeHandler for LoadFunction {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ldftn, OpCode::Ldvirtftn]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        method(instruction)?;
        if instruction.opcode() == OpCode::Ldvirtftn {
            let receiver = context.stack_mut().pop()?;
            dereference(&receiver)?;
        }
        context.stack_mut().push(Value::NativeInt(Integer64::unknown()))?;
        Ok(Successor::FallThrough)
    }
}

/// Typed references are opaque.
pub struct TypedReference;

impl OpCodeHandler for TypedReference {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Mkrefany, OpCode::Refanyval, OpCode::Refanytype]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let is_32bit = context.is_32bit();
        context.stack_mut().pop()?;
        let value = match instruction.opcode() {
            OpCode::Refanyval => Value::Pointer(Pointer::unknown(is_32bit)),
            _ => Value::Object(ObjectReference::Unknown),
        };
        context.stack_mut().push(value)?;
        Ok(Successor::FallThrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cil::{Token, TypeRef};
    use crate::executor::handlers::tests::context;
    use crate::cil::MethodBody;
    use crate::executor::{Dispatcher, Options, RuntimeEnvironment};
    use crate::RC;

    fn point() -> TypeRef {
        TypeRef::new(Token::new(0x0200_0002), "Geometry", "Point", false)
    }

    fn dispatch(context: &mut ExecutionContext, inputs: &[Value], instruction: Instruction) -> Result<Vec<Value>, DispatchFault> {
        context.stack_mut().clear();
        for input in inputs {
            context.stack_mut().push(input.clone()).unwrap();
        }
        Dispatcher::new().dispatch(context, &instruction)?;
        Ok(context.stack().values().to_vec())
    }

    #[test]
    fn calls_return_unknown_values_of_their_type() {
        let mut context = context();
        let decrypt = MethodRef::new(
            Token::new(0x0600_0010),
            point(),
            "Decrypt",
            MethodSignature::static_method(vec![TypeSig::String, TypeSig::I4], TypeSig::U1),
            false,
        );
        let call = Instruction::new(0, OpCode::Call, Operand::Method(decrypt));
        let stack = dispatch(&mut context, &[Value::null(), Value::int32(3)], call).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].as_int32().unwrap().known_mask(), !0xff);

        let call = Instruction::new(
            0,
            OpCode::Call,
            Operand::Method(MethodRef::new(
                Token::new(0x0600_0011),
                point(),
                "Decrypt",
                MethodSignature::static_method(vec![TypeSig::I4], TypeSig::Void),
                false,
            )),
        );
        assert_eq!(dispatch(&mut context, &[], call), Err(DispatchFault::StackUnderflow));
    }

    #[test]
    fn virtual_calls_on_null_fault() {
        let mut context = context();
        let to_string = MethodRef::new(
            Token::new(0x0a00_0001),
            point(),
            "ToString",
            MethodSignature::instance_method(Vec::new(), TypeSig::String),
            true,
        );
        let callvirt = Instruction::new(0, OpCode::Callvirt, Operand::Method(to_string));
        assert_eq!(
            dispatch(&mut context, &[Value::null()], callvirt.clone()),
            Err(DispatchFault::NullReference)
        );
        assert_eq!(
            dispatch(&mut context, &[Value::Object(ObjectReference::Unknown)], callvirt).unwrap(),
            vec![Value::Object(ObjectReference::Unknown)]
        );
    }

    #[test]
    fn fields_of_new_objects() {
        let mut context = context();
        let constructor = MethodRef::new(
            Token::new(0x0600_0001),
            point(),
            ".ctor",
            MethodSignature::instance_method(Vec::new(), TypeSig::Void),
            false,
        );
        let x = FieldRef::new(Token::new(0x0400_0001), point(), "x", TypeSig::I2, false);

        let object = dispatch(
            &mut context,
            &[],
            Instruction::new(0, OpCode::Newobj, Operand::Method(constructor)),
        )
        .unwrap()
        .remove(0);

        let stfld = Instruction::new(0, OpCode::Stfld, Operand::Field(x.clone()));
        dispatch(&mut context, &[object.clone(), Value::int32(0x18000)], stfld).unwrap();

        let ldfld = Instruction::new(0, OpCode::Ldfld, Operand::Field(x.clone()));
        assert_eq!(
            dispatch(&mut context, &[object.clone()], ldfld.clone()).unwrap(),
            vec![Value::int32(-0x8000)]
        );
        assert_eq!(
            dispatch(&mut context, &[Value::null()], ldfld.clone()),
            Err(DispatchFault::NullReference)
        );

        let ldflda = Instruction::new(0, OpCode::Ldflda, Operand::Field(x));
        dispatch(&mut context, &[object.clone()], ldflda).unwrap();
        assert!(!dispatch(&mut context, &[object], ldfld).unwrap()[0].is_known());
    }

    #[test]
    fn statics_start_unknown() {
        let mut context = context();
        let key = FieldRef::new(Token::new(0x0400_0002), point(), "key", TypeSig::I4, true);

        let ldsfld = Instruction::new(0, OpCode::Ldsfld, Operand::Field(key.clone()));
        assert!(!dispatch(&mut context, &[], ldsfld.clone()).unwrap()[0].is_known());

        let stsfld = Instruction::new(0, OpCode::Stsfld, Operand::Field(key));
        dispatch(&mut context, &[Value::int32(42)], stsfld).unwrap();
        assert_eq!(dispatch(&mut context, &[], ldsfld).unwrap(), vec![Value::int32(42)]);
    }

    #[test]
    fn boxing_and_casts() {
        let mut context = context();
        let boxed = dispatch(
            &mut context,
            &[Value::int32(7)],
            Instruction::new(0, OpCode::Box, Operand::Type(TypeSig::I4)),
        )
        .unwrap()
        .remove(0);

        let unbox = Instruction::new(0, OpCode::Unbox_Any, Operand::Type(TypeSig::I4));
        assert_eq!(dispatch(&mut context, &[boxed.clone()], unbox).unwrap(), vec![Value::int32(7)]);

        let unbox = Instruction::new(0, OpCode::Unbox_Any, Operand::Type(TypeSig::I8));
        assert!(matches!(
            dispatch(&mut context, &[boxed.clone()], unbox),
            Err(DispatchFault::InvalidCast(_))
        ));

        let isinst = Instruction::new(0, OpCode::Isinst, Operand::Type(TypeSig::String));
        assert_eq!(dispatch(&mut context, &[boxed.clone()], isinst).unwrap(), vec![Value::null()]);

        let castclass = Instruction::new(0, OpCode::Castclass, Operand::Type(TypeSig::Object));
        assert_eq!(dispatch(&mut context, &[boxed.clone()], castclass).unwrap(), vec![boxed]);

        assert_eq!(
            context.environment().is_instance_of(&TypeSig::I4, &TypeSig::Object),
            Trilean::True
        );
    }

    /// Resolves every virtual call the same way. Calls it is asked to invoke
    /// return 7.
    struct Resolver(Devirtualization);

    impl RuntimeEnvironment for Resolver {
        fn resolve_virtual(&self, _receiver: Option<&TypeSig>, _method: &MethodRef) -> Devirtualization {
            self.0.clone()
        }

        fn invoke(
            &self,
            _context: &mut ExecutionContext,
            _method: &MethodRef,
            _arguments: Vec<Value>,
        ) -> Result<Option<Value>, DispatchFault> {
            Ok(Some(Value::int32(7)))
        }

        fn initial_static_value(&self, field: &FieldRef, is_32bit: bool) -> Value {
            Value::unknown_of(field.field_type(), is_32bit)
        }

        fn is_instance_of(&self, _object_type: &TypeSig, _target: &TypeSig) -> Trilean {
            Trilean::Unknown
        }
    }

    fn callvirt_with(resolution: Devirtualization) -> Result<Vec<Value>, DispatchFault> {
        let body = MethodBody::new(Vec::new(), Vec::new(), Vec::new(), Vec::new(), TypeSig::Void);
        let mut context = ExecutionContext::new(&body, RC::new(Resolver(resolution)), Options::default());
        let next = MethodRef::new(
            Token::new(0x0a00_0002),
            point(),
            "Next",
            MethodSignature::instance_method(Vec::new(), TypeSig::I4),
            true,
        );
        dispatch(
            &mut context,
            &[Value::Object(ObjectReference::Unknown)],
            Instruction::new(0, OpCode::Callvirt, Operand::Method(next)),
        )
    }

    #[test]
    fn every_devirtualization_outcome() {
        let target = MethodRef::new(
            Token::new(0x0600_0020),
            point(),
            "Next",
            MethodSignature::instance_method(Vec::new(), TypeSig::I4),
            false,
        );
        assert_eq!(
            callvirt_with(Devirtualization::Method(target)).unwrap(),
            vec![Value::int32(7)]
        );

        let signature = MethodSignature::instance_method(Vec::new(), TypeSig::U2);
        let stack = callvirt_with(Devirtualization::Signature(signature)).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].as_int32().unwrap().known_mask(), !0xffff);

        let fault = DispatchFault::Devirtualization("no implementation of Next".to_string());
        assert_eq!(callvirt_with(Devirtualization::Failure(fault.clone())), Err(fault));

        let stack = callvirt_with(Devirtualization::UnknownReceiver).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].as_int32().unwrap().known_mask(), 0);
    }
}

//! The boundary between the interpreter and the world outside the method.

use crate::cil::{FieldRef, MethodRef, MethodSignature, TypeSig};
use crate::executor::{DispatchFault, ExecutionContext};
use crate::types::Trilean;
use crate::value::Value;

/// The outcome of resolving the target of a virtual call.
#[derive(Clone, Debug)]
pub enum Devirtualization {
    /// The call dispatches to this method.
    Method(MethodRef),
    /// Only the signature of the target is known, as with `calli`.
    Signature(MethodSignature),
    /// Resolution failed in a way the runtime would report.
    Failure(DispatchFault),
    /// The receiver is not known well enough to pick a method.
    UnknownReceiver,
}

/// Answers the questions the interpreter cannot answer from within the
/// method: where calls go, what they return, and what static fields hold.
pub trait RuntimeEnvironment {
    /// Resolve a virtual call on a receiver of type `receiver`, or on an
    /// unknown receiver when `receiver` is `None`.
    fn resolve_virtual(&self, receiver: Option<&TypeSig>, method: &MethodRef) -> Devirtualization;

    /// Invoke `method`. For instance methods the first argument is the
    /// receiver. Returns the return value, or `None` for `void` methods and
    /// for constructors.
    fn invoke(
        &self,
        context: &mut ExecutionContext,
        method: &MethodRef,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, DispatchFault>;

    /// The value of a static field before the method writes it.
    fn initial_static_value(&self, field: &FieldRef, is_32bit: bool) -> Value;

    /// Whether an object of type `object_type` can be cast to `target`.
    fn is_instance_of(&self, object_type: &TypeSig, target: &TypeSig) -> Trilean;
}

/// An environment which knows nothing beyond the signatures it is handed.
///
/// Calls resolve to the referenced method and return an unknown value of the
/// declared return type. Static fields start out unknown.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEnvironment;

impl DefaultEnvironment {
    pub fn new() -> DefaultEnvironment {
        DefaultEnvironment
    }
}

fn is_exact_type(sig: &TypeSig) -> bool {
    !matches!(
        sig,
        TypeSig::Object | TypeSig::Class(_) | TypeSig::SzArray(_) | TypeSig::Generic(_) | TypeSig::TypedReference
    )
}

impl RuntimeEnvironment for DefaultEnvironment {
    fn resolve_virtual(&self, receiver: Option<&TypeSig>, method: &MethodRef) -> Devirtualization {
        match receiver {
            None if method.is_virtual() => Devirtualization::UnknownReceiver,
            _ => Devirtualization::Method(method.clone()),
        }
    }

    fn invoke(
        &self,
        context: &mut ExecutionContext,
        method: &MethodRef,
        _arguments: Vec<Value>,
    ) -> Result<Option<Value>, DispatchFault> {
        let signature = method.signature();
        if signature.returns_value() {
            Ok(Some(Value::unknown_of(signature.return_type(), context.is_32bit())))
        } else {
            Ok(None)
        }
    }

    fn initial_static_value(&self, field: &FieldRef, is_32bit: bool) -> Value {
        Value::unknown_of(field.field_type(), is_32bit)
    }

    fn is_instance_of(&self, object_type: &TypeSig, target: &TypeSig) -> Trilean {
        if object_type == target || *target == TypeSig::Object {
            Trilean::True
        } else if is_exact_type(object_type) && is_exact_type(target) {
            Trilean::False
        } else {
            Trilean::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cil::{Token, TypeRef};

    #[test]
    fn instance_checks() {
        let environment = DefaultEnvironment::new();
        let list = TypeSig::Class(TypeRef::new(Token::new(0x0100_0003), "System.Collections", "ArrayList", false));

        assert_eq!(environment.is_instance_of(&TypeSig::String, &TypeSig::Object), Trilean::True);
        assert_eq!(environment.is_instance_of(&TypeSig::String, &TypeSig::String), Trilean::True);
        assert_eq!(environment.is_instance_of(&TypeSig::I4, &TypeSig::String), Trilean::False);
        assert_eq!(environment.is_instance_of(&list, &TypeSig::String), Trilean::Unknown);
    }
}

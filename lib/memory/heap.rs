//! The managed heap of an execution context.
//!
//! Objects are kept in an arena and referred to by `HeapRef` handles. A
//! handle is only meaningful for the heap which allocated it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cil::{FieldRef, TypeSig};
use crate::memory::MemoryBlock;
use crate::value::Value;
use crate::Error;

/// A handle to an object on a `Heap`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HeapRef(usize);

impl HeapRef {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "heap[{}]", self.0)
    }
}

/// An instance of a class or a boxed value type.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ObjectValue {
    ty: TypeSig,
    fields: FxHashMap<FieldRef, Value>,
}

impl ObjectValue {
    pub fn new(ty: TypeSig) -> ObjectValue {
        ObjectValue {
            ty,
            fields: FxHashMap::default(),
        }
    }

    pub fn ty(&self) -> &TypeSig {
        &self.ty
    }

    /// Fields which were never written read as unknown values of their type.
    pub fn field(&self, field: &FieldRef, is_32bit: bool) -> Value {
        self.fields
            .get(field)
            .cloned()
            .unwrap_or_else(|| Value::unknown_of(field.field_type(), is_32bit))
    }

    pub fn set_field(&mut self, field: FieldRef, value: Value) {
        self.fields.insert(field, value);
    }
}

/// A single-dimension, zero-based array.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ArrayValue {
    element: TypeSig,
    elements: Vec<Value>,
}

impl ArrayValue {
    /// Create an array of `length` default-initialized elements.
    pub fn new(element: TypeSig, length: usize, is_32bit: bool) -> ArrayValue {
        let elements = vec![Value::default_of(&element, is_32bit); length];
        ArrayValue { element, elements }
    }

    pub fn element_type(&self) -> &TypeSig {
        &self.element
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.elements.get(index)
    }

    pub fn set(&mut self, index: usize, value: Value) -> Result<(), Error> {
        match self.elements.get_mut(index) {
            Some(element) => {
                *element = value;
                Ok(())
            }
            None => Err(format!("array index {} out of range", index).into()),
        }
    }

    /// Replace every element with an unknown value, used when a store goes
    /// to an index we cannot resolve.
    pub fn mark_unknown(&mut self, is_32bit: bool) {
        let unknown = Value::unknown_of(&self.element, is_32bit);
        for element in self.elements.iter_mut() {
            *element = unknown.clone();
        }
    }
}

/// Anything which can live on the heap.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum HeapObject {
    Object(ObjectValue),
    Array(ArrayValue),
    String(String),
    Boxed { ty: TypeSig, value: Value },
    Memory(MemoryBlock),
}

impl HeapObject {
    /// The type of this object as a signature.
    pub fn type_sig(&self) -> TypeSig {
        match self {
            HeapObject::Object(object) => object.ty().clone(),
            HeapObject::Array(array) => TypeSig::SzArray(Box::new(array.element_type().clone())),
            HeapObject::String(_) => TypeSig::String,
            HeapObject::Boxed { ty, .. } => ty.clone(),
            HeapObject::Memory(_) => TypeSig::Pointer(Box::new(TypeSig::U1)),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn allocate(&mut self, object: HeapObject) -> HeapRef {
        self.objects.push(object);
        HeapRef(self.objects.len() - 1)
    }

    pub fn get(&self, reference: HeapRef) -> Result<&HeapObject, Error> {
        self.objects
            .get(reference.0)
            .ok_or(Error::MemoryBlockNotFound(reference.0))
    }

    pub fn get_mut(&mut self, reference: HeapRef) -> Result<&mut HeapObject, Error> {
        self.objects
            .get_mut(reference.0)
            .ok_or(Error::MemoryBlockNotFound(reference.0))
    }

    pub fn memory(&self, reference: HeapRef) -> Result<&MemoryBlock, Error> {
        match self.get(reference)? {
            HeapObject::Memory(block) => Ok(block),
            _ => Err(format!("{} is not a memory block", reference).into()),
        }
    }

    pub fn memory_mut(&mut self, reference: HeapRef) -> Result<&mut MemoryBlock, Error> {
        match self.get_mut(reference)? {
            HeapObject::Memory(block) => Ok(block),
            _ => Err(format!("{} is not a memory block", reference).into()),
        }
    }

    pub fn string(&self, reference: HeapRef) -> Result<&str, Error> {
        match self.get(reference)? {
            HeapObject::String(string) => Ok(string),
            _ => Err(format!("{} is not a string", reference).into()),
        }
    }

    pub fn type_sig(&self, reference: HeapRef) -> Result<TypeSig, Error> {
        Ok(self.get(reference)?.type_sig())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cil::{Token, TypeRef};
    use crate::value::Integer32;

    #[test]
    fn allocation_hands_out_distinct_handles() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapObject::String("a".to_string()));
        let b = heap.allocate(HeapObject::Memory(MemoryBlock::new(4)));

        assert_ne!(a, b);
        assert_eq!(heap.string(a).unwrap(), "a");
        assert!(heap.string(b).is_err());
        assert_eq!(heap.memory(b).unwrap().len(), 4);
        assert!(heap.get(HeapRef(7)).is_err());
    }

    #[test]
    fn unwritten_fields_are_unknown() {
        let owner = TypeRef::new(Token::new(0x0200_0002), "", "Holder", false);
        let field = FieldRef::new(Token::new(0x0400_0001), owner.clone(), "count", TypeSig::I4, false);
        let mut object = ObjectValue::new(TypeSig::Class(owner));

        assert_eq!(object.field(&field, false), Value::Int32(Integer32::unknown()));
        object.set_field(field.clone(), Value::Int32(Integer32::known(3)));
        assert_eq!(object.field(&field, false), Value::Int32(Integer32::known(3)));
    }

    #[test]
    fn arrays_start_zeroed() {
        let mut array = ArrayValue::new(TypeSig::I4, 3, false);

        assert_eq!(array.get(2), Some(&Value::Int32(Integer32::known(0))));
        assert!(array.set(3, Value::Int32(Integer32::known(1))).is_err());
        array.mark_unknown(false);
        assert_eq!(array.get(0), Some(&Value::Int32(Integer32::unknown())));
    }
}

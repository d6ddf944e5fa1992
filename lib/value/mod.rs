//! Values whose bits may be only partially known.
//!
//! The CIL evaluation stack only ever holds a handful of value shapes: 32-bit
//! integers, 64-bit integers, native integers, floats, object references and
//! pointers. Narrower types are widened on load and truncated on store, which
//! `Value::coerce` takes care of.

mod float;
mod integer;
mod object;
mod pointer;

pub use self::float::{Float32, Float64, PartialFloat};
pub use self::integer::{Integer16, Integer32, Integer64, Integer8, PartialInteger, Word};
pub use self::object::ObjectReference;
pub use self::pointer::Pointer;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cil::TypeSig;
use crate::types::Trilean;

/// A value on the evaluation stack or in a variable slot.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Int32(Integer32),
    Int64(Integer64),
    /// A native-sized integer. Stored with 64 bits. In 32-bit mode the upper
    /// half is the sign extension of the lower half.
    NativeInt(Integer64),
    /// Both `float32` and `float64`. `float32` values are rounded on store.
    Float(Float64),
    Object(ObjectReference),
    Pointer(Pointer),
}

impl Value {
    pub fn int32(value: i32) -> Value {
        Value::Int32(Integer32::from_signed(value))
    }

    pub fn int64(value: i64) -> Value {
        Value::Int64(Integer64::from_signed(value))
    }

    pub fn native_int(value: i64, is_32bit: bool) -> Value {
        Value::NativeInt(Value::native(Integer64::from_signed(value), is_32bit))
    }

    pub fn float(value: f64) -> Value {
        Value::Float(Float64::known(value))
    }

    pub fn null() -> Value {
        Value::Object(ObjectReference::Null)
    }

    /// Bring a native integer into the canonical form for the pointer width.
    pub fn native(value: Integer64, is_32bit: bool) -> Integer64 {
        if is_32bit {
            value.resize::<u32>(false).resize::<u64>(true)
        } else {
            value
        }
    }

    /// A value of type `sig` about which nothing is known, except what the
    /// type itself tells us.
    pub fn unknown_of(sig: &TypeSig, is_32bit: bool) -> Value {
        match sig {
            TypeSig::Boolean => Value::Int32(Integer32::new(0, !1)),
            TypeSig::U1 => Value::Int32(Integer32::new(0, !0xff)),
            TypeSig::U2 | TypeSig::Char => Value::Int32(Integer32::new(0, !0xffff)),
            TypeSig::I1 | TypeSig::I2 | TypeSig::I4 | TypeSig::U4 => Value::Int32(Integer32::unknown()),
            TypeSig::I8 | TypeSig::U8 => Value::Int64(Integer64::unknown()),
            TypeSig::I | TypeSig::U => Value::NativeInt(Integer64::unknown()),
            TypeSig::R4 | TypeSig::R8 => Value::Float(Float64::unknown()),
            TypeSig::Pointer(_) | TypeSig::ByRef(_) => Value::Pointer(Pointer::unknown(is_32bit)),
            _ => Value::Object(ObjectReference::Unknown),
        }
    }

    /// The zero value of type `sig`, as found in freshly initialized locals,
    /// fields and array elements.
    pub fn default_of(sig: &TypeSig, is_32bit: bool) -> Value {
        match sig {
            TypeSig::Boolean
            | TypeSig::Char
            | TypeSig::I1
            | TypeSig::U1
            | TypeSig::I2
            | TypeSig::U2
            | TypeSig::I4
            | TypeSig::U4 => Value::Int32(Integer32::known(0)),
            TypeSig::I8 | TypeSig::U8 => Value::Int64(Integer64::known(0)),
            TypeSig::I | TypeSig::U => Value::NativeInt(Integer64::known(0)),
            TypeSig::R4 | TypeSig::R8 => Value::Float(Float64::known(0.0)),
            TypeSig::Pointer(_) | TypeSig::ByRef(_) => Value::Pointer(Pointer::unknown(is_32bit)),
            TypeSig::ValueType(_) | TypeSig::TypedReference | TypeSig::Generic(_) => {
                Value::Object(ObjectReference::Unknown)
            }
            _ => Value::null(),
        }
    }

    /// The integer bits of this value as 64 bits, sign-extending 32-bit
    /// integers. Floats, references and pointers have no integer bits we know.
    pub fn to_integer64(&self) -> Integer64 {
        match self {
            Value::Int32(value) => value.resize(true),
            Value::Int64(value) | Value::NativeInt(value) => *value,
            _ => Integer64::unknown(),
        }
    }

    /// Convert this value for storage in a location of type `sig`.
    ///
    /// Small integers are truncated and re-extended to 32 bits, `float32`
    /// values are rounded, native integers are brought to the pointer width.
    /// Values of a shape the location cannot hold are passed through.
    pub fn coerce(&self, sig: &TypeSig, is_32bit: bool) -> Value {
        let integer = match self {
            Value::Int32(_) | Value::Int64(_) | Value::NativeInt(_) => Some(self.to_integer64()),
            _ => None,
        };
        match (sig, integer) {
            (TypeSig::Boolean, Some(value)) | (TypeSig::U1, Some(value)) => {
                Value::Int32(value.resize::<u8>(false).resize(false))
            }
            (TypeSig::I1, Some(value)) => Value::Int32(value.resize::<u8>(false).resize(true)),
            (TypeSig::U2, Some(value)) | (TypeSig::Char, Some(value)) => {
                Value::Int32(value.resize::<u16>(false).resize(false))
            }
            (TypeSig::I2, Some(value)) => Value::Int32(value.resize::<u16>(false).resize(true)),
            (TypeSig::I4, Some(value)) | (TypeSig::U4, Some(value)) => Value::Int32(value.resize(false)),
            (TypeSig::I8, Some(value)) | (TypeSig::U8, Some(value)) => Value::Int64(value),
            (TypeSig::I, Some(value)) | (TypeSig::U, Some(value)) => {
                Value::NativeInt(Value::native(value, is_32bit))
            }
            (TypeSig::R4, _) => match self {
                Value::Float(value) => Value::Float(value.narrow().widen()),
                _ => self.clone(),
            },
            (TypeSig::Pointer(_), Some(_)) | (TypeSig::ByRef(_), Some(_)) => {
                Value::Pointer(Pointer::unknown(is_32bit))
            }
            _ => self.clone(),
        }
    }

    /// Whether this value is zero, null, or false, as tested by `brfalse`.
    pub fn is_zero(&self) -> Trilean {
        match self {
            Value::Int32(value) => value.is_zero(),
            Value::Int64(value) | Value::NativeInt(value) => value.is_zero(),
            Value::Float(value) => value.is_zero(),
            Value::Object(reference) => reference.is_null(),
            Value::Pointer(pointer) => pointer.is_zero(),
        }
    }

    pub fn is_known(&self) -> bool {
        match self {
            Value::Int32(value) => value.is_known(),
            Value::Int64(value) | Value::NativeInt(value) => value.is_known(),
            Value::Float(value) => value.is_known(),
            Value::Object(reference) => reference.is_known(),
            Value::Pointer(pointer) => pointer.is_known(),
        }
    }

    pub fn as_int32(&self) -> Option<&Integer32> {
        match self {
            Value::Int32(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectReference> {
        match self {
            Value::Object(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Value::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }

    /// The name of this value's stack type, as used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::NativeInt(_) => "native int",
            Value::Float(_) => "F",
            Value::Object(_) => "O",
            Value::Pointer(_) => "&",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int32(value) => write!(f, "i4 {}", value),
            Value::Int64(value) => write!(f, "i8 {}", value),
            Value::NativeInt(value) => write!(f, "i {}", value),
            Value::Float(value) => write!(f, "r {}", value),
            Value::Object(reference) => write!(f, "{}", reference),
            Value::Pointer(pointer) => write!(f, "{}", pointer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Heap, HeapObject};

    #[test]
    fn unknown_values_keep_what_the_type_implies() {
        let boolean = Value::unknown_of(&TypeSig::Boolean, false);
        assert_eq!(boolean, Value::Int32(Integer32::parse_bits(&format!("{}?", "0".repeat(31))).unwrap()));

        let character = Value::unknown_of(&TypeSig::Char, false);
        assert_eq!(character.as_int32().unwrap().known_mask(), 0xffff_0000);
        assert_eq!(Value::unknown_of(&TypeSig::String, false), Value::Object(ObjectReference::Unknown));
        assert!(matches!(Value::unknown_of(&TypeSig::U, true), Value::NativeInt(_)));
    }

    #[test]
    fn coercion_truncates_and_extends() {
        assert_eq!(Value::int32(0x1ff).coerce(&TypeSig::I1, false), Value::int32(-1));
        assert_eq!(Value::int32(0x1ff).coerce(&TypeSig::U1, false), Value::int32(0xff));
        assert_eq!(Value::int32(-2).coerce(&TypeSig::U2, false), Value::int32(0xfffe));
        assert_eq!(Value::int64(0x1_0000_0002).coerce(&TypeSig::I4, false), Value::int32(2));
        assert_eq!(Value::int32(-1).coerce(&TypeSig::I8, false), Value::int64(-1));
        assert_eq!(
            Value::int64(0x1_8000_0000).coerce(&TypeSig::I, true),
            Value::NativeInt(Integer64::from_signed(i32::MIN as i64))
        );
        assert_eq!(Value::float(0.1).coerce(&TypeSig::R4, false), Value::float(0.1f32 as f64));
        assert_eq!(Value::null().coerce(&TypeSig::I4, false), Value::null());
    }

    #[test]
    fn truthiness() {
        let mut heap = Heap::new();
        let string = heap.allocate(HeapObject::String(String::new()));

        assert_eq!(Value::int32(0).is_zero(), Trilean::True);
        assert_eq!(Value::Int32(Integer32::new(4, 4)).is_zero(), Trilean::False);
        assert_eq!(Value::null().is_zero(), Trilean::True);
        assert_eq!(Value::Object(ObjectReference::Known(string)).is_zero(), Trilean::False);
        assert_eq!(Value::Object(ObjectReference::Unknown).is_zero(), Trilean::Unknown);
        assert_eq!(Value::Pointer(Pointer::unknown(false)).is_zero(), Trilean::Unknown);
    }

    #[test]
    fn reference_equality() {
        let mut heap = Heap::new();
        let a = ObjectReference::Known(heap.allocate(HeapObject::String("a".to_string())));
        let b = ObjectReference::Known(heap.allocate(HeapObject::String("b".to_string())));

        assert_eq!(a.is_equal_to(&a), Trilean::True);
        assert_eq!(a.is_equal_to(&b), Trilean::False);
        assert_eq!(a.is_equal_to(&ObjectReference::Null), Trilean::False);
        assert_eq!(ObjectReference::Null.is_equal_to(&ObjectReference::Null), Trilean::True);
        assert_eq!(a.is_equal_to(&ObjectReference::Unknown), Trilean::Unknown);
    }
}

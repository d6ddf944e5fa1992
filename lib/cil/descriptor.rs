//! Handles for the types, methods and fields referenced by CIL instructions.
//!
//! These are opaque to the analyses. Identity is the metadata token, so two
//! handles with the same token compare equal and hash the same, regardless of
//! which copy of the descriptor they point at.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::RC;

/// A metadata token. The high byte names the metadata table, the low three
/// bytes the row.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Token(u32);

impl Token {
    pub fn new(value: u32) -> Token {
        Token(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn rid(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

macro_rules! token_identity {
    ($name:ident) => {
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.token() == other.token()
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.token().hash(state)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.token().cmp(&other.token())
            }
        }
    };
}

#[derive(Debug, Deserialize, Serialize)]
struct TypeData {
    token: Token,
    namespace: String,
    name: String,
    is_value_type: bool,
}

/// A type definition or reference.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TypeRef(RC<TypeData>);

impl TypeRef {
    pub fn new<S: Into<String>>(token: Token, namespace: S, name: S, is_value_type: bool) -> TypeRef {
        TypeRef(RC::new(TypeData {
            token,
            namespace: namespace.into(),
            name: name.into(),
            is_value_type,
        }))
    }

    pub fn token(&self) -> Token {
        self.0.token
    }

    pub fn namespace(&self) -> &str {
        &self.0.namespace
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn full_name(&self) -> String {
        if self.0.namespace.is_empty() {
            self.0.name.clone()
        } else {
            format!("{}.{}", self.0.namespace, self.0.name)
        }
    }

    pub fn is_value_type(&self) -> bool {
        self.0.is_value_type
    }
}

token_identity!(TypeRef);

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// The shape of a type as it appears in a signature.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TypeSig {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    I,
    U,
    String,
    Object,
    TypedReference,
    Class(TypeRef),
    ValueType(TypeRef),
    SzArray(Box<TypeSig>),
    Pointer(Box<TypeSig>),
    ByRef(Box<TypeSig>),
    /// A generic parameter of the enclosing type or method.
    Generic(u16),
}

impl TypeSig {
    /// Returns true for value types, including primitives and pointers.
    pub fn is_value_type(&self) -> bool {
        match self {
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
            | TypeSig::R4
            | TypeSig::R8
            | TypeSig::I
            | TypeSig::U
            | TypeSig::TypedReference
            | TypeSig::ValueType(_)
            | TypeSig::Pointer(_)
            | TypeSig::ByRef(_) => true,
            TypeSig::Void
            | TypeSig::String
            | TypeSig::Object
            | TypeSig::Class(_)
            | TypeSig::SzArray(_)
            | TypeSig::Generic(_) => false,
        }
    }

    pub fn is_void(&self) -> bool {
        *self == TypeSig::Void
    }

    /// The size of a value of this type in bytes, where it does not depend on
    /// a type layout we do not have.
    pub fn size(&self, is_32bit: bool) -> Option<u32> {
        let pointer_size = if is_32bit { 4 } else { 8 };
        match self {
            TypeSig::Boolean | TypeSig::I1 | TypeSig::U1 => Some(1),
            TypeSig::Char | TypeSig::I2 | TypeSig::U2 => Some(2),
            TypeSig::I4 | TypeSig::U4 | TypeSig::R4 => Some(4),
            TypeSig::I8 | TypeSig::U8 | TypeSig::R8 => Some(8),
            TypeSig::I
            | TypeSig::U
            | TypeSig::String
            | TypeSig::Object
            | TypeSig::Class(_)
            | TypeSig::SzArray(_)
            | TypeSig::Pointer(_)
            | TypeSig::ByRef(_) => Some(pointer_size),
            TypeSig::TypedReference => Some(pointer_size * 2),
            TypeSig::Void | TypeSig::ValueType(_) | TypeSig::Generic(_) => None,
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Boolean => write!(f, "bool"),
            TypeSig::Char => write!(f, "char"),
            TypeSig::I1 => write!(f, "int8"),
            TypeSig::U1 => write!(f, "uint8"),
            TypeSig::I2 => write!(f, "int16"),
            TypeSig::U2 => write!(f, "uint16"),
            TypeSig::I4 => write!(f, "int32"),
            TypeSig::U4 => write!(f, "uint32"),
            TypeSig::I8 => write!(f, "int64"),
            TypeSig::U8 => write!(f, "uint64"),
            TypeSig::R4 => write!(f, "float32"),
            TypeSig::R8 => write!(f, "float64"),
            TypeSig::I => write!(f, "native int"),
            TypeSig::U => write!(f, "native uint"),
            TypeSig::String => write!(f, "string"),
            TypeSig::Object => write!(f, "object"),
            TypeSig::TypedReference => write!(f, "typedref"),
            TypeSig::Class(ty) => write!(f, "class {}", ty),
            TypeSig::ValueType(ty) => write!(f, "valuetype {}", ty),
            TypeSig::SzArray(element) => write!(f, "{}[]", element),
            TypeSig::Pointer(element) => write!(f, "{}*", element),
            TypeSig::ByRef(element) => write!(f, "{}&", element),
            TypeSig::Generic(index) => write!(f, "!{}", index),
        }
    }
}

/// The calling signature of a method or of an indirect call site.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MethodSignature {
    has_this: bool,
    parameters: Vec<TypeSig>,
    return_type: TypeSig,
}

impl MethodSignature {
    pub fn new(has_this: bool, parameters: Vec<TypeSig>, return_type: TypeSig) -> MethodSignature {
        MethodSignature {
            has_this,
            parameters,
            return_type,
        }
    }

    /// Signature of a static method.
    pub fn static_method(parameters: Vec<TypeSig>, return_type: TypeSig) -> MethodSignature {
        MethodSignature::new(false, parameters, return_type)
    }

    /// Signature of an instance method.
    pub fn instance_method(parameters: Vec<TypeSig>, return_type: TypeSig) -> MethodSignature {
        MethodSignature::new(true, parameters, return_type)
    }

    pub fn has_this(&self) -> bool {
        self.has_this
    }

    pub fn parameters(&self) -> &[TypeSig] {
        &self.parameters
    }

    pub fn return_type(&self) -> &TypeSig {
        &self.return_type
    }

    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }

    /// The number of stack slots a call with this signature consumes,
    /// including the `this` pointer.
    pub fn argument_count(&self) -> usize {
        self.parameters.len() + usize::from(self.has_this)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct MethodData {
    token: Token,
    declaring_type: TypeRef,
    name: String,
    signature: MethodSignature,
    is_virtual: bool,
}

/// A method definition or reference.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MethodRef(RC<MethodData>);

impl MethodRef {
    pub fn new<S: Into<String>>(
        token: Token,
        declaring_type: TypeRef,
        name: S,
        signature: MethodSignature,
        is_virtual: bool,
    ) -> MethodRef {
        MethodRef(RC::new(MethodData {
            token,
            declaring_type,
            name: name.into(),
            signature,
            is_virtual,
        }))
    }

    pub fn token(&self) -> Token {
        self.0.token
    }

    pub fn declaring_type(&self) -> &TypeRef {
        &self.0.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.0.signature
    }

    pub fn is_virtual(&self) -> bool {
        self.0.is_virtual
    }

    pub fn is_constructor(&self) -> bool {
        self.0.name == ".ctor" || self.0.name == ".cctor"
    }
}

token_identity!(MethodRef);

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::{}", self.0.declaring_type, self.0.name)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct FieldData {
    token: Token,
    declaring_type: TypeRef,
    name: String,
    field_type: TypeSig,
    is_static: bool,
}

/// A field definition or reference.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FieldRef(RC<FieldData>);

impl FieldRef {
    pub fn new<S: Into<String>>(
        token: Token,
        declaring_type: TypeRef,
        name: S,
        field_type: TypeSig,
        is_static: bool,
    ) -> FieldRef {
        FieldRef(RC::new(FieldData {
            token,
            declaring_type,
            name: name.into(),
            field_type,
            is_static,
        }))
    }

    pub fn token(&self) -> Token {
        self.0.token
    }

    pub fn declaring_type(&self) -> &TypeRef {
        &self.0.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn field_type(&self) -> &TypeSig {
        &self.0.field_type
    }

    pub fn is_static(&self) -> bool {
        self.0.is_static
    }
}

token_identity!(FieldRef);

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::{}", self.0.declaring_type, self.0.name)
    }
}

/// Any member a token can resolve to, as used by `ldtoken`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Member {
    Type(TypeRef),
    Method(MethodRef),
    Field(FieldRef),
}

impl Member {
    pub fn token(&self) -> Token {
        match self {
            Member::Type(ty) => ty.token(),
            Member::Method(method) => method.token(),
            Member::Field(field) => field.token(),
        }
    }

    pub fn as_type(&self) -> Option<&TypeRef> {
        match self {
            Member::Type(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&MethodRef> {
        match self {
            Member::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldRef> {
        match self {
            Member::Field(field) => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Member::Type(ty) => write!(f, "{}", ty),
            Member::Method(method) => write!(f, "{}", method),
            Member::Field(field) => write!(f, "{}", field),
        }
    }
}

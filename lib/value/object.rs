use serde::{Deserialize, Serialize};
use std::fmt;

use crate::memory::HeapRef;
use crate::types::Trilean;

/// A managed object reference.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ObjectReference {
    Null,
    Known(HeapRef),
    Unknown,
}

impl ObjectReference {
    pub fn is_known(&self) -> bool {
        *self != ObjectReference::Unknown
    }

    pub fn heap_ref(&self) -> Option<HeapRef> {
        match self {
            ObjectReference::Known(reference) => Some(*reference),
            _ => None,
        }
    }

    pub fn is_null(&self) -> Trilean {
        match self {
            ObjectReference::Null => Trilean::True,
            ObjectReference::Known(_) => Trilean::False,
            ObjectReference::Unknown => Trilean::Unknown,
        }
    }

    /// Reference equality. Two distinct allocations are never the same
    /// object, but an unknown reference may alias anything.
    pub fn is_equal_to(&self, other: &ObjectReference) -> Trilean {
        match (self, other) {
            (ObjectReference::Null, ObjectReference::Null) => Trilean::True,
            (ObjectReference::Known(lhs), ObjectReference::Known(rhs)) => Trilean::from(lhs == rhs),
            (ObjectReference::Null, ObjectReference::Known(_))
            | (ObjectReference::Known(_), ObjectReference::Null) => Trilean::False,
            _ => Trilean::Unknown,
        }
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectReference::Null => write!(f, "null"),
            ObjectReference::Known(reference) => write!(f, "{}", reference),
            ObjectReference::Unknown => write!(f, "object?"),
        }
    }
}

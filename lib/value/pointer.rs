//! Pointers into unmanaged memory.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::memory::{Heap, HeapRef};
use crate::types::Trilean;
use crate::value::{Float32, Float64, PartialInteger, Word};
use crate::Error;

/// A pointer is either unknown, or a known memory block plus a byte offset.
///
/// Reads through an unknown pointer produce fully unknown data and writes
/// through it are dropped. Neither ever fails.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Pointer {
    base: Option<HeapRef>,
    offset: i64,
    is_32bit: bool,
}

impl Pointer {
    /// A pointer to `offset` bytes into the block at `base`.
    pub fn new(base: HeapRef, offset: i64, is_32bit: bool) -> Pointer {
        Pointer {
            base: Some(base),
            offset,
            is_32bit,
        }
    }

    pub fn unknown(is_32bit: bool) -> Pointer {
        Pointer {
            base: None,
            offset: 0,
            is_32bit,
        }
    }

    pub fn is_known(&self) -> bool {
        self.base.is_some()
    }

    pub fn base(&self) -> Option<HeapRef> {
        self.base
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn is_32bit(&self) -> bool {
        self.is_32bit
    }

    /// The width of this pointer in bits.
    pub fn bits(&self) -> u32 {
        if self.is_32bit {
            32
        } else {
            64
        }
    }

    pub fn add(&self, delta: i64) -> Pointer {
        Pointer {
            offset: self.offset.wrapping_add(delta),
            ..*self
        }
    }

    pub fn sub(&self, delta: i64) -> Pointer {
        self.add(delta.wrapping_neg())
    }

    /// The distance in bytes between two pointers into the same block.
    pub fn difference(&self, other: &Pointer) -> Option<i64> {
        match (self.base, other.base) {
            (Some(lhs), Some(rhs)) if lhs == rhs => Some(self.offset.wrapping_sub(other.offset)),
            _ => None,
        }
    }

    pub fn read_integer<T: Word>(&self, heap: &Heap, offset: i64) -> Result<PartialInteger<T>, Error> {
        match self.base {
            Some(base) => heap.memory(base)?.read_integer(self.offset.wrapping_add(offset)),
            None => Ok(PartialInteger::unknown()),
        }
    }

    pub fn write_integer<T: Word>(
        &self,
        heap: &mut Heap,
        offset: i64,
        value: &PartialInteger<T>,
    ) -> Result<(), Error> {
        match self.base {
            Some(base) => heap
                .memory_mut(base)?
                .write_integer(self.offset.wrapping_add(offset), value),
            None => Ok(()),
        }
    }

    pub fn read_float32(&self, heap: &Heap, offset: i64) -> Result<Float32, Error> {
        Ok(Float32::from_bits(&self.read_integer(heap, offset)?))
    }

    pub fn read_float64(&self, heap: &Heap, offset: i64) -> Result<Float64, Error> {
        Ok(Float64::from_bits(&self.read_integer(heap, offset)?))
    }

    pub fn write_float32(&self, heap: &mut Heap, offset: i64, value: &Float32) -> Result<(), Error> {
        self.write_integer(heap, offset, &value.to_bits())
    }

    pub fn write_float64(&self, heap: &mut Heap, offset: i64, value: &Float64) -> Result<(), Error> {
        self.write_integer(heap, offset, &value.to_bits())
    }

    /// Known pointers always point into a live block, so they are never null.
    pub fn is_zero(&self) -> Trilean {
        if self.is_known() {
            Trilean::False
        } else {
            Trilean::Unknown
        }
    }

    pub fn is_non_zero(&self) -> Trilean {
        self.is_zero().not()
    }

    pub fn is_positive(&self) -> Trilean {
        Trilean::True
    }

    pub fn is_negative(&self) -> Trilean {
        Trilean::False
    }

    pub fn is_equal_to(&self, other: &Pointer) -> Trilean {
        match (self.base, other.base) {
            (Some(lhs), Some(rhs)) if lhs == rhs => Trilean::from(self.offset == other.offset),
            _ => Trilean::Unknown,
        }
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.base {
            Some(base) => write!(f, "&{}+0x{:x}", base, self.offset),
            None => write!(f, "&?"),
        }
    }
}

//! Memory representations for the interpreter.
//!
//! The interpreter keeps every managed object, array, string and block of
//! unmanaged memory in a single `Heap`. Pointers and object references name
//! heap entries by `HeapRef`, which keeps an execution context free of shared
//! mutable state.

mod block;
mod heap;

pub use self::block::MemoryBlock;
pub use self::heap::{ArrayValue, Heap, HeapObject, HeapRef, ObjectValue};

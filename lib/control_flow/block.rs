use serde::{Deserialize, Serialize};
use std::fmt;

/// A basic block: a non-empty run of instructions with a single entry.
///
/// A block is identified by the offset of its first instruction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BasicBlock<I> {
    offset: u32,
    instructions: Vec<I>,
}

impl<I> BasicBlock<I> {
    pub fn new(offset: u32, instructions: Vec<I>) -> BasicBlock<I> {
        BasicBlock {
            offset,
            instructions,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn instructions(&self) -> &[I] {
        &self.instructions
    }

    pub fn instructions_mut(&mut self) -> &mut Vec<I> {
        &mut self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn first(&self) -> Option<&I> {
        self.instructions.first()
    }

    pub fn last(&self) -> Option<&I> {
        self.instructions.last()
    }
}

impl<I: fmt::Display> fmt::Display for BasicBlock<I> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[ Block: 0x{:X} ]", self.offset)?;
        for instruction in self.instructions.iter() {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}
